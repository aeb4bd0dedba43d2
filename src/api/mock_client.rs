use super::{CompletionSource, IncrementStream};
use crate::error::StreamError;
use crate::types::{CompletionRequest, Increment, TokenUsage};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted step of a mock upstream stream.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Delta(String),
    /// An increment that carries no content.
    Empty,
    Usage(TokenUsage),
    Sleep(Duration),
    Fail(String),
    /// Never yields again.
    Hang,
}

/// Replays scripted streams, one script per `open_stream` call.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    scripts: Arc<Mutex<Vec<Result<Vec<ScriptStep>, String>>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedSource {
    pub fn new(scripts: Vec<Vec<ScriptStep>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into_iter().map(Ok).collect())),
            requests: Arc::default(),
        }
    }

    pub fn deltas(deltas: &[&str]) -> Self {
        Self::new(vec![deltas
            .iter()
            .map(|delta| ScriptStep::Delta(delta.to_string()))
            .collect()])
    }

    /// A source whose next `open_stream` call fails outright.
    pub fn failing_open(message: impl Into<String>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(vec![Err(message.into())])),
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionSource for ScriptedSource {
    async fn open_stream(&self, request: &CompletionRequest) -> Result<IncrementStream, StreamError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let script = {
            let mut scripts = self
                .scripts
                .lock()
                .map_err(|_| StreamError::UpstreamOpen("mock script lock poisoned".to_string()))?;
            if scripts.is_empty() {
                return Err(StreamError::UpstreamOpen(
                    "ScriptedSource: no more scripts configured".to_string(),
                ));
            }
            scripts.remove(0)
        };
        let steps = script.map_err(StreamError::UpstreamOpen)?;

        let items = stream::iter(steps).then(|step| async move {
            match step {
                ScriptStep::Delta(text) => Some(Ok(Increment::text(text))),
                ScriptStep::Empty => Some(Ok(Increment::empty())),
                ScriptStep::Usage(usage) => Some(Ok(Increment {
                    delta: None,
                    usage: Some(usage),
                })),
                ScriptStep::Sleep(duration) => {
                    tokio::time::sleep(duration).await;
                    None
                }
                ScriptStep::Fail(message) => Some(Err(StreamError::UpstreamRead(message))),
                ScriptStep::Hang => {
                    futures::future::pending::<()>().await;
                    None
                }
            }
        });
        Ok(Box::pin(items.filter_map(futures::future::ready)))
    }
}
