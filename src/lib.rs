pub mod api;
pub mod config;
pub mod error;
pub mod render;
pub mod stream;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;

pub use error::{RenderError, StreamError};
