//! Hosted Server-Sent-Events streaming backend
//!
//! Speaks the hosted chat-completions protocol: `data: {json}` blocks
//! separated by blank lines, with the text delta nested at
//! `choices[0].delta.content` and a literal `[DONE]` sentinel closing the
//! stream. Requires a bearer credential resolved at startup.

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::gateway::history::ChatMessage;

use super::{ChatBackend, TokenStream};

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Serialize)]
struct HostedChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    temperature: f32,
}

#[derive(Deserialize)]
struct HostedChunk {
    #[serde(default)]
    choices: Vec<HostedChoice>,
}

#[derive(Deserialize)]
struct HostedChoice {
    #[serde(default)]
    delta: HostedDelta,
}

#[derive(Deserialize, Default)]
struct HostedDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Adapter for the hosted chat-completions endpoint
#[derive(Clone)]
pub struct HostedBackend {
    client: reqwest::Client,
    api_url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
}

impl HostedBackend {
    pub fn new(
        client: reqwest::Client,
        api_url: String,
        model: String,
        temperature: f32,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            api_url,
            model,
            temperature,
            api_key,
        }
    }
}

/// Position of the first blank-line frame separator, if a full frame is buffered
fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\n\n")
}

#[async_trait]
impl ChatBackend for HostedBackend {
    fn name(&self) -> &'static str {
        "hosted"
    }

    async fn open_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        // Checked before any network call
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            GatewayError::MissingCredential(
                "Hosted backend API key is not configured.".to_string(),
            )
        })?;

        let request = HostedChatRequest {
            model: &self.model,
            messages,
            stream: true,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Network(format!("hosted backend unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let mut chunks = response.bytes_stream();
        let stream = try_stream! {
            let mut buffer = BytesMut::new();
            'read: while let Some(chunk) = chunks.next().await {
                let chunk = chunk.map_err(|e| {
                    GatewayError::Network(format!("hosted stream read failed: {e}"))
                })?;
                buffer.extend_from_slice(&chunk);

                while let Some(idx) = find_frame_end(&buffer) {
                    let frame = buffer.split_to(idx + 2);
                    let frame = String::from_utf8_lossy(&frame);

                    for line in frame.lines() {
                        let Some(data) = line.trim().strip_prefix("data:") else {
                            continue;
                        };
                        let data = data.trim();
                        if data == DONE_SENTINEL {
                            break 'read;
                        }

                        match serde_json::from_str::<HostedChunk>(data) {
                            Ok(parsed) => {
                                let delta = parsed
                                    .choices
                                    .into_iter()
                                    .next()
                                    .and_then(|choice| choice.delta.content);
                                if let Some(token) = delta {
                                    if !token.is_empty() {
                                        yield token;
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::debug!("skipping malformed hosted stream block: {e}");
                            }
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
