//! Conversation history normalization
//!
//! Client-supplied history is untrusted: entries may carry foreign roles,
//! non-string content, or nothing but whitespace. Normalization is total;
//! it never fails, only produces a possibly-empty result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rolling context window; when exceeded, the oldest turns are dropped first.
pub const MAX_TURNS: usize = 20;

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a conversation, in conversation order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Validate and bound a client-supplied message list.
///
/// Entries whose role is not `user`/`assistant`, whose content is not a
/// string, or whose content trims to empty are discarded. The result keeps
/// the newest [`MAX_TURNS`] entries, preserving relative order.
pub fn normalize_messages(raw: &[Value]) -> Vec<ChatMessage> {
    let mut cleaned: Vec<ChatMessage> = raw
        .iter()
        .filter_map(|entry| {
            let role = match entry.get("role").and_then(Value::as_str) {
                Some("user") => Role::User,
                Some("assistant") => Role::Assistant,
                _ => return None,
            };
            let content = entry.get("content").and_then(Value::as_str)?.trim();
            if content.is_empty() {
                return None;
            }
            Some(ChatMessage::new(role, content))
        })
        .collect();

    if cleaned.len() > MAX_TURNS {
        cleaned.drain(..cleaned.len() - MAX_TURNS);
    }
    cleaned
}

/// Prepend the system directive to a normalized history.
///
/// The directive is always the first message of the sequence sent upstream;
/// exactly one per request.
pub fn stitch(directive: &str, history: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut stitched = Vec::with_capacity(history.len() + 1);
    stitched.push(ChatMessage::new(Role::System, directive));
    stitched.extend_from_slice(history);
    stitched
}
