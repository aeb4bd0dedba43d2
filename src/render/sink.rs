use super::presentation::DisplayState;
use crate::error::RenderError;
use async_trait::async_trait;

/// Opaque reference to the one posted message a request keeps editing.
/// Not `Clone`: a handle belongs to exactly one request.
#[derive(Debug, PartialEq, Eq)]
pub struct RenderHandle {
    id: String,
}

impl RenderHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Presentation boundary. Every request origin (slash interaction, prefix
/// message, terminal) implements these three operations.
#[async_trait]
pub trait RenderSink: Send + Sync {
    async fn post(&self, display: &DisplayState) -> Result<RenderHandle, RenderError>;

    async fn edit(&self, handle: &RenderHandle, display: &DisplayState)
        -> Result<(), RenderError>;

    /// One-shot plain error reply, used when no handle exists.
    async fn reply_error(&self, message: &str) -> Result<(), RenderError>;
}
