pub mod client;
pub mod logging;
pub mod mock_client;
pub mod stream;

use crate::error::StreamError;
use crate::types::{CompletionRequest, Increment};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

pub use client::ApiClient;

pub type IncrementStream = Pin<Box<dyn Stream<Item = Result<Increment, StreamError>> + Send>>;

/// Upstream text generation. One call opens one stream; the stream ends
/// naturally or yields an error item.
#[async_trait]
pub trait CompletionSource: Send + Sync {
    async fn open_stream(&self, request: &CompletionRequest)
        -> Result<IncrementStream, StreamError>;
}
