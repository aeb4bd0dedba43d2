use thiserror::Error;

/// Request-level failures. Producer-side variants never cross the task
/// boundary directly; they travel as `StreamEvent::Error` text.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to open upstream stream: {0}")]
    UpstreamOpen(String),
    #[error("upstream stream failed: {0}")]
    UpstreamRead(String),
    #[error("failed to post initial display: {0}")]
    RenderPost(#[source] RenderError),
    #[error("failed to render final display: {0}")]
    RenderFinal(#[source] RenderError),
}

/// Failures reported by a render sink.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("transient render failure: {0}")]
    Transient(String),
    #[error("render rejected with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("terminal write failed: {0}")]
    Terminal(#[from] std::io::Error),
}

impl RenderError {
    /// A fatal error means further edits of the same handle cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RenderError::Rejected { .. })
    }
}
