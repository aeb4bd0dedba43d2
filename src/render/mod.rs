pub mod chunker;
pub mod presentation;
pub mod sink;
pub mod terminal;
pub mod webhook;

pub use chunker::chunk;
pub use presentation::{DisplayState, PresentationBuilder, RenderLimits, Segment, Tone};
pub use sink::{RenderHandle, RenderSink};
pub use terminal::TerminalSink;
pub use webhook::WebhookSink;
