//! Gateway client: posts a conversation turn and consumes the event stream
//!
//! The consumer trusts transport closure, not terminal events, as the
//! authoritative end of a stream: a gateway that crashes mid-answer still
//! ends the read loop here.

use futures::StreamExt;
use serde_json::json;

use jibu_server::gateway::{ChatMessage, EventKind, OutboundEvent, SseDecoder};

use crate::error::{CliError, CliResult};

/// Result of one completed conversation turn
#[derive(Debug, Default)]
pub struct TurnOutcome {
    /// Assistant text accumulated from token events, possibly partial
    pub content: String,
    /// Error payload if the stream ended with an error event
    pub error: Option<String>,
}

/// Client for the gateway's streaming chat endpoint
pub struct ChatClient {
    http: reqwest::Client,
    gateway_url: String,
    token: String,
    provider: Option<String>,
    system_prompt: Option<String>,
}

impl ChatClient {
    pub fn new(
        gateway_url: String,
        token: String,
        provider: Option<String>,
        system_prompt: Option<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            gateway_url,
            token,
            provider,
            system_prompt,
        }
    }

    /// Send the conversation so far and stream the reply.
    ///
    /// Every decoded event is handed to `on_event` in arrival order so the
    /// caller can render incrementally; the accumulated outcome is returned
    /// once the transport closes.
    pub async fn send_turn(
        &self,
        history: &[ChatMessage],
        mut on_event: impl FnMut(&OutboundEvent),
    ) -> CliResult<TurnOutcome> {
        let mut body = json!({ "messages": history });
        if let Some(provider) = &self.provider {
            body["provider"] = json!(provider);
        }
        if let Some(prompt) = &self.system_prompt {
            body["systemPrompt"] = json!(prompt);
        }

        let url = format!("{}/chat", self.gateway_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
                .unwrap_or(text);
            return Err(CliError(format!("Gateway refused request ({status}): {message}")));
        }

        let mut outcome = TurnOutcome::default();
        let mut decoder = SseDecoder::new();
        let mut chunks = response.bytes_stream();

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            for event in decoder.push(&String::from_utf8_lossy(&chunk)) {
                match event.kind {
                    EventKind::Token => outcome.content.push_str(&event.payload),
                    EventKind::Error => outcome.error = Some(event.payload.clone()),
                    EventKind::Open | EventKind::Info | EventKind::Done => {}
                }
                on_event(&event);
            }
        }

        Ok(outcome)
    }
}
