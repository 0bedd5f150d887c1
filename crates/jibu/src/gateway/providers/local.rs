//! Local newline-delimited-JSON streaming backend
//!
//! Speaks the local inference server's chat protocol: one JSON object per
//! line, each carrying an incremental `message.content` delta, with a
//! `done: true` object marking successful completion.

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::gateway::history::ChatMessage;

use super::{ChatBackend, TokenStream};

#[derive(Serialize)]
struct LocalChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct LocalChunk {
    #[serde(default)]
    message: Option<LocalChunkMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct LocalChunkMessage {
    #[serde(default)]
    content: String,
}

/// Adapter for a locally-hosted inference server
#[derive(Clone)]
pub struct LocalBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl LocalBackend {
    pub fn new(client: reqwest::Client, base_url: String, model: String) -> Self {
        Self {
            client,
            base_url,
            model,
        }
    }
}

#[async_trait]
impl ChatBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn open_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let request = LocalChatRequest {
            model: &self.model,
            messages,
            stream: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Network(format!("local backend unreachable: {e}")))?;

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
            // Buffer raw bytes and only convert complete lines, so multi-byte
            // UTF-8 sequences split across network chunks stay intact.
            let mut buffer = BytesMut::new();
            'read: while let Some(chunk) = chunks.next().await {
                let chunk = chunk.map_err(|e| {
                    GatewayError::Network(format!("local stream read failed: {e}"))
                })?;
                buffer.extend_from_slice(&chunk);

                while let Some(idx) = buffer.iter().position(|&b| b == b'\n') {
                    let line = buffer.split_to(idx + 1);
                    let line = String::from_utf8_lossy(&line);
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    match serde_json::from_str::<LocalChunk>(line) {
                        Ok(parsed) => {
                            if let Some(message) = parsed.message {
                                if !message.content.is_empty() {
                                    yield message.content;
                                }
                            }
                            if parsed.done {
                                break 'read;
                            }
                        }
                        // Upstream framing is not assumed reliable; isolated
                        // bad lines must not abort a healthy stream.
                        Err(e) => tracing::debug!("skipping malformed local stream line: {e}"),
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
