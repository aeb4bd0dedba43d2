pub mod consumer;
pub mod orchestrator;
pub mod producer;

pub use consumer::{ConsumerOutcome, ConsumerPhase, DisplayConsumer, PacingConfig};
pub use orchestrator::{Orchestrator, RequestSummary, EMPTY_ANSWER_FALLBACK};
pub use producer::{ProducerReport, StreamProducer};
