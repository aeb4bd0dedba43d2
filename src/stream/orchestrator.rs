use super::consumer::{ConsumerOutcome, DisplayConsumer, PacingConfig};
use super::producer::{ProducerReport, StreamProducer};
use crate::api::CompletionSource;
use crate::error::StreamError;
use crate::render::{PresentationBuilder, RenderHandle, RenderSink};
use crate::types::{AskerIdentity, CompletionRequest};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const EMPTY_ANSWER_FALLBACK: &str = "No answer returned.";

/// What one request ended up showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSummary {
    pub text: String,
    pub stalled: bool,
    pub upstream_error: Option<String>,
}

/// Per-request wiring of producer, consumer and render sink. Holds no state
/// across requests; collaborators are injected.
pub struct Orchestrator {
    source: Arc<dyn CompletionSource>,
    sink: Arc<dyn RenderSink>,
    builder: PresentationBuilder,
    pacing: PacingConfig,
    model: String,
    system_prompt: String,
    channel_capacity: usize,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn CompletionSource>,
        sink: Arc<dyn RenderSink>,
        builder: PresentationBuilder,
        pacing: PacingConfig,
    ) -> Self {
        Self {
            source,
            sink,
            builder,
            pacing,
            model: crate::config::DEFAULT_MODEL.to_string(),
            system_prompt: crate::config::DEFAULT_SYSTEM_PROMPT.to_string(),
            channel_capacity: crate::config::DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn from_config(
        config: &crate::config::Config,
        source: Arc<dyn CompletionSource>,
        sink: Arc<dyn RenderSink>,
    ) -> Self {
        Self::new(
            source,
            sink,
            PresentationBuilder::new(config.limits),
            config.pacing,
        )
        .with_model(config.model.clone(), config.system_prompt.clone())
        .with_channel_capacity(config.channel_capacity)
    }

    pub fn with_model(mut self, model: String, system_prompt: String) -> Self {
        self.model = model;
        self.system_prompt = system_prompt;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Answer one question. On failure exactly one best-effort error message
    /// is shown before the error is returned.
    pub async fn respond(
        &self,
        question: &str,
        asker: &AskerIdentity,
    ) -> Result<RequestSummary, StreamError> {
        let mut handle = None;
        match self.run(question, asker, &mut handle).await {
            Ok(summary) => Ok(summary),
            Err(failure) => {
                error!(error = %failure, "request failed");
                self.report_failure(question, asker, handle.as_ref(), &failure)
                    .await;
                Err(failure)
            }
        }
    }

    async fn run(
        &self,
        question: &str,
        asker: &AskerIdentity,
        handle_slot: &mut Option<RenderHandle>,
    ) -> Result<RequestSummary, StreamError> {
        let initial = self.builder.build_initial(question, asker);
        let handle = self
            .sink
            .post(&initial)
            .await
            .map_err(StreamError::RenderPost)?;
        let handle = handle_slot.insert(handle);
        debug!(handle = handle.id(), "initial display posted");

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let producer = StreamProducer::new(
            Arc::clone(&self.source),
            CompletionRequest {
                model: self.model.clone(),
                system_prompt: self.system_prompt.clone(),
                user_text: question.to_string(),
            },
        )
        .spawn(tx);

        let outcome = DisplayConsumer::new(self.sink.as_ref(), handle, &self.builder, self.pacing)
            .run(rx, initial)
            .await;

        let report = if outcome.terminal_seen {
            settle_producer(producer).await
        } else {
            detach_producer(producer);
            None
        };

        let final_display = self.final_display(&outcome, report.as_ref());
        self.sink
            .edit(handle, &final_display)
            .await
            .map_err(StreamError::RenderFinal)?;

        info!(
            chars = outcome.text.chars().count(),
            stalled = outcome.stalled,
            failed = outcome.upstream_error.is_some(),
            "answer finalized"
        );
        Ok(RequestSummary {
            text: outcome.text,
            stalled: outcome.stalled,
            upstream_error: outcome.upstream_error,
        })
    }

    fn final_display(
        &self,
        outcome: &ConsumerOutcome,
        report: Option<&ProducerReport>,
    ) -> crate::render::DisplayState {
        let body = if outcome.text.trim().is_empty() {
            EMPTY_ANSWER_FALLBACK
        } else {
            outcome.text.as_str()
        };
        let usage_note = report.and_then(|report| report.usage).map(|usage| usage.note());
        let done = self
            .builder
            .with_final(&outcome.display, body, usage_note.as_deref());
        match &outcome.upstream_error {
            Some(message) => self.builder.with_error_note(&done, message),
            None => done,
        }
    }

    async fn report_failure(
        &self,
        question: &str,
        asker: &AskerIdentity,
        handle: Option<&RenderHandle>,
        failure: &StreamError,
    ) {
        let message = format!("⚠️ Error: {failure}");
        let attempt = match handle {
            Some(handle) => {
                let display = self.builder.build_error(question, asker, &message);
                self.sink.edit(handle, &display).await
            }
            None => self.sink.reply_error(&message).await,
        };
        if let Err(render_error) = attempt {
            debug!(error = %render_error, "error reply could not be shown");
        }
    }
}

async fn settle_producer(producer: JoinHandle<ProducerReport>) -> Option<ProducerReport> {
    match producer.await {
        Ok(report) => {
            if let Some(error) = &report.error {
                debug!(%error, deltas = report.deltas, "producer finished with an error");
            }
            Some(report)
        }
        Err(join_error) => {
            warn!(error = %join_error, "producer task did not complete");
            None
        }
    }
}

/// The consumer already finalized; let a still-blocked producer finish on
/// its own and only log the result.
fn detach_producer(producer: JoinHandle<ProducerReport>) {
    tokio::spawn(async move {
        match producer.await {
            Ok(report) => debug!(
                deltas = report.deltas,
                error = report.error.as_deref().unwrap_or("none"),
                "detached producer finished"
            ),
            Err(join_error) => warn!(error = %join_error, "detached producer did not complete"),
        }
    });
}
