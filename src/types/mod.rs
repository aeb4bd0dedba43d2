mod api_types;
mod events;

pub use api_types::{
    ApiErrorBody, ApiMessage, ChatCompletionChunk, ChunkChoice, ChunkDelta, TokenUsage,
};
pub use events::{AskerIdentity, CompletionRequest, Increment, StreamEvent};
