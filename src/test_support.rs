use crate::error::RenderError;
use crate::render::{DisplayState, RenderHandle, RenderSink};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Mutex as AsyncMutex;

/// Process-wide lock for tests that mutate environment variables.
/// Use `.blocking_lock()` in sync tests and `.lock().await` in async tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Post(DisplayState),
    Edit(DisplayState),
    ErrorReply(String),
}

/// Render sink that records every successful call and can be told to fail.
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    transient_edit_failures: AtomicUsize,
    reject_edits: AtomicBool,
    fail_post: AtomicBool,
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_next_edits(&self, count: usize) {
        self.transient_edit_failures.store(count, Ordering::SeqCst);
    }

    pub fn reject_edits(&self) {
        self.reject_edits.store(true, Ordering::SeqCst);
    }

    pub fn fail_post(&self) {
        self.fail_post.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: SinkCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RenderSink for RecordingSink {
    async fn post(&self, display: &DisplayState) -> Result<RenderHandle, RenderError> {
        if self.fail_post.load(Ordering::SeqCst) {
            return Err(RenderError::Transient("post refused".to_string()));
        }
        self.record(SinkCall::Post(display.clone()));
        Ok(RenderHandle::new("recorded-1"))
    }

    async fn edit(&self, _handle: &RenderHandle, display: &DisplayState) -> Result<(), RenderError> {
        if self.reject_edits.load(Ordering::SeqCst) {
            return Err(RenderError::Rejected {
                status: 404,
                message: "Unknown Message".to_string(),
            });
        }
        let remaining = self.transient_edit_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_edit_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(RenderError::Transient("rate limited".to_string()));
        }
        self.record(SinkCall::Edit(display.clone()));
        Ok(())
    }

    async fn reply_error(&self, message: &str) -> Result<(), RenderError> {
        self.record(SinkCall::ErrorReply(message.to_string()));
        Ok(())
    }
}
