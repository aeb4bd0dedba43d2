use crate::api::CompletionSource;
use crate::error::StreamError;
use crate::types::{CompletionRequest, StreamEvent, TokenUsage};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What the producer observed, handed back through its `JoinHandle`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerReport {
    pub deltas: usize,
    pub usage: Option<TokenUsage>,
    pub error: Option<String>,
    /// The consumer stopped listening before the stream finished.
    pub consumer_gone: bool,
}

/// Reads one upstream stream and forwards its deltas into the transfer
/// channel, always ending with exactly one `End` or `Error`.
pub struct StreamProducer {
    source: Arc<dyn CompletionSource>,
    request: CompletionRequest,
}

impl StreamProducer {
    pub fn new(source: Arc<dyn CompletionSource>, request: CompletionRequest) -> Self {
        Self { source, request }
    }

    /// Runs on its own task so upstream I/O never blocks the reveal loop.
    pub fn spawn(self, tx: mpsc::Sender<StreamEvent>) -> JoinHandle<ProducerReport> {
        tokio::spawn(self.run(tx))
    }

    pub async fn run(self, tx: mpsc::Sender<StreamEvent>) -> ProducerReport {
        let mut report = ProducerReport::default();

        let terminal = match self.pump(&tx, &mut report).await {
            Ok(()) => StreamEvent::End,
            Err(error) => {
                warn!(%error, deltas = report.deltas, "upstream stream failed");
                let message = error.to_string();
                report.error = Some(message.clone());
                StreamEvent::Error(message)
            }
        };

        if !report.consumer_gone && tx.send(terminal).await.is_err() {
            report.consumer_gone = true;
        }
        if report.consumer_gone {
            debug!(deltas = report.deltas, "consumer finished before the upstream stream");
        }
        report
    }

    async fn pump(
        &self,
        tx: &mpsc::Sender<StreamEvent>,
        report: &mut ProducerReport,
    ) -> Result<(), StreamError> {
        let mut stream = self.source.open_stream(&self.request).await?;

        while let Some(item) = stream.next().await {
            let increment = item?;
            if let Some(usage) = increment.usage {
                report.usage = Some(usage);
            }
            let Some(delta) = increment.delta.filter(|delta| !delta.is_empty()) else {
                continue;
            };
            if tx.send(StreamEvent::Delta(delta)).await.is_err() {
                report.consumer_gone = true;
                return Ok(());
            }
            report.deltas += 1;
        }
        Ok(())
    }
}
