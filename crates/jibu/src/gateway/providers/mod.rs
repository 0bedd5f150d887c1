//! Upstream backend abstraction
//!
//! Both backends share one contract: given a stitched message sequence,
//! open a streaming call and hand back a lazy, finite, non-restartable
//! token stream. Connection-phase failures surface in the returned
//! `Result`; failures after the stream opens arrive as `Err` items.

mod hosted;
mod local;

pub use hosted::HostedBackend;
pub use local::LocalBackend;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;
use crate::gateway::history::ChatMessage;

/// Lazy sequence of token deltas produced by one upstream call
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Trait for streaming chat backends
///
/// Implementations are stateless functions of their inputs plus read-only
/// configuration; one instance serves concurrent requests.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Human-readable backend name, used in logs and fallback notices
    fn name(&self) -> &'static str;

    /// Issue a single streaming request for the stitched sequence.
    ///
    /// Returns an error without yielding a stream when the upstream rejects
    /// the initial call; the stream itself ends after the upstream's
    /// terminal marker.
    async fn open_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream>;
}
