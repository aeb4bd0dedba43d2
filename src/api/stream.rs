use super::logging::emit_sse_parse_error;
use crate::error::StreamError;
use crate::types::{ChatCompletionChunk, Increment};

/// Incremental parser for OpenAI-compatible `text/event-stream` bodies.
#[derive(Default)]
pub struct ChatStreamParser {
    /// Bytes of a code point split across chunks.
    pending: Vec<u8>,
    buffer: String,
    finished: bool,
}

impl ChatStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the `[DONE]` sentinel has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn process(&mut self, chunk: &[u8]) -> Result<Vec<Increment>, StreamError> {
        if self.finished {
            return Ok(Vec::new());
        }
        self.pending.extend_from_slice(chunk);
        self.decode_pending();
        self.parse_frames()
    }

    /// Parse whatever is left once the byte stream has ended, treating an
    /// unterminated trailing frame as complete.
    pub fn finish(&mut self) -> Result<Vec<Increment>, StreamError> {
        if self.finished {
            return Ok(Vec::new());
        }
        let tail = std::mem::take(&mut self.pending);
        self.buffer.push_str(&String::from_utf8_lossy(&tail));
        if self.buffer.trim().is_empty() {
            self.buffer.clear();
            return Ok(Vec::new());
        }
        self.buffer.push_str("\n\n");
        self.parse_frames()
    }

    /// Move the longest valid UTF-8 prefix of `pending` into `buffer`. An
    /// incomplete trailing sequence waits for the next chunk; invalid bytes
    /// become U+FFFD.
    fn decode_pending(&mut self) {
        let mut consumed = 0;
        while consumed < self.pending.len() {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    consumed = self.pending.len();
                }
                Err(error) => {
                    let valid = consumed + error.valid_up_to();
                    self.buffer
                        .push_str(std::str::from_utf8(&self.pending[consumed..valid]).unwrap_or_default());
                    match error.error_len() {
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            consumed = valid + len;
                        }
                        None => {
                            consumed = valid;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..consumed);
    }

    fn parse_frames(&mut self) -> Result<Vec<Increment>, StreamError> {
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut increments = Vec::new();
        let mut start = 0;

        while let Some(end) = self.buffer[start..].find("\n\n") {
            let event_end = start + end + 2;
            let event_text = &self.buffer[start..event_end];

            let data = event_text
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(str::trim)
                .collect::<Vec<_>>()
                .join("\n");

            start = event_end;
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                self.finished = true;
                self.buffer.clear();
                self.pending.clear();
                return Ok(increments);
            }

            match serde_json::from_str::<ChatCompletionChunk>(&data) {
                Ok(frame) => {
                    if let Some(error) = frame.error {
                        self.buffer.drain(..start);
                        return Err(StreamError::UpstreamRead(error.message));
                    }
                    increments.push(frame_increment(frame));
                }
                Err(error) => emit_sse_parse_error(&data, &error),
            }
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        Ok(increments)
    }
}

fn frame_increment(frame: ChatCompletionChunk) -> Increment {
    let delta = frame
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .collect::<String>();
    Increment {
        delta: Some(delta).filter(|text| !text.is_empty()),
        usage: frame.usage,
    }
}
