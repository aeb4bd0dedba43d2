use super::chunker::chunk;
use crate::types::AskerIdentity;
use crate::util::{char_len, char_prefix};
use serde::Serialize;

pub const QUESTION_SEGMENT: &str = "Question";
pub const ANSWER_SEGMENT: &str = "Answer";
pub const STREAMING_ANSWER_SEGMENT: &str = "Answer (streaming)";
pub const USAGE_SEGMENT: &str = "Usage";
pub const ERROR_SEGMENT: &str = "Error";

pub const WAITING_LABEL: &str = "🤖 Thinking…";
pub const TRUNCATION_MARKER: &str = "\n\n…(truncated)";
pub const CURSOR_GLYPH: &str = " ▌";
pub const DEFAULT_TITLE: &str = "🤖 Ask";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Pending,
    Streaming,
    Done,
    Error,
}

/// One bounded, named piece of the display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    name: String,
    body: String,
    continuation_index: usize,
}

impl Segment {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn continuation_index(&self) -> usize {
        self.continuation_index
    }

    fn is_answer(&self) -> bool {
        self.name.starts_with(ANSWER_SEGMENT)
    }
}

/// A complete snapshot of what the render sink should show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayState {
    title: String,
    segments: Vec<Segment>,
    tone: Tone,
    author_label: Option<String>,
    author_icon: Option<String>,
}

impl DisplayState {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn tone(&self) -> Tone {
        self.tone
    }

    pub fn author_label(&self) -> Option<&str> {
        self.author_label.as_deref()
    }

    pub fn author_icon(&self) -> Option<&str> {
        self.author_icon.as_deref()
    }

    /// Answer segment bodies joined in order.
    pub fn answer_text(&self) -> String {
        self.segments
            .iter()
            .filter(|segment| segment.is_answer())
            .map(|segment| segment.body.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|segment| segment.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderLimits {
    pub field_limit: usize,
    pub answer_limit: usize,
}

impl Default for RenderLimits {
    fn default() -> Self {
        Self {
            field_limit: 1024,
            answer_limit: 3800,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PresentationBuilder {
    limits: RenderLimits,
    title: String,
}

impl PresentationBuilder {
    pub fn new(limits: RenderLimits) -> Self {
        Self {
            limits,
            title: DEFAULT_TITLE.to_string(),
        }
    }

    pub fn limits(&self) -> RenderLimits {
        self.limits
    }

    pub fn build_initial(&self, question: &str, author: &AskerIdentity) -> DisplayState {
        let mut segments = self.named_segments(QUESTION_SEGMENT, QUESTION_SEGMENT, question);
        segments.push(Segment {
            name: ANSWER_SEGMENT.to_string(),
            body: WAITING_LABEL.to_string(),
            continuation_index: 0,
        });

        let author_label = Some(author.label.trim())
            .filter(|label| !label.is_empty())
            .map(str::to_string);

        DisplayState {
            title: self.title.clone(),
            segments,
            tone: Tone::Pending,
            author_label,
            author_icon: author.icon_url.clone(),
        }
    }

    pub fn with_partial(&self, prev: &DisplayState, body: &str, show_cursor: bool) -> DisplayState {
        let mut visible = self.clamp_answer(body);
        if show_cursor {
            let trimmed_len = visible.trim_end().len();
            visible.truncate(trimmed_len);
            visible.push_str(CURSOR_GLYPH);
        }

        let mut segments = retained_segments(prev);
        segments.extend(self.named_segments(STREAMING_ANSWER_SEGMENT, ANSWER_SEGMENT, &visible));

        DisplayState {
            segments,
            tone: Tone::Streaming,
            ..prev.clone_header()
        }
    }

    pub fn with_final(
        &self,
        prev: &DisplayState,
        body: &str,
        usage_note: Option<&str>,
    ) -> DisplayState {
        let visible = self.clamp_answer(body);

        let mut segments = retained_segments(prev);
        segments.extend(self.named_segments(ANSWER_SEGMENT, ANSWER_SEGMENT, &visible));
        if let Some(note) = usage_note.map(str::trim).filter(|note| !note.is_empty()) {
            segments.push(Segment {
                name: USAGE_SEGMENT.to_string(),
                body: char_prefix(note, self.limits.field_limit).to_string(),
                continuation_index: 0,
            });
        }

        DisplayState {
            segments,
            tone: Tone::Done,
            ..prev.clone_header()
        }
    }

    /// Append a trailing error segment and switch the tone to `Error`.
    pub fn with_error_note(&self, prev: &DisplayState, message: &str) -> DisplayState {
        let mut segments: Vec<Segment> = prev
            .segments
            .iter()
            .filter(|segment| segment.name != ERROR_SEGMENT)
            .cloned()
            .collect();
        segments.push(self.error_segment(message));

        DisplayState {
            segments,
            tone: Tone::Error,
            ..prev.clone_header()
        }
    }

    /// Question plus a single error segment, used when a request fails after
    /// its display was posted.
    pub fn build_error(
        &self,
        question: &str,
        author: &AskerIdentity,
        message: &str,
    ) -> DisplayState {
        let initial = self.build_initial(question, author);
        let mut segments = retained_segments(&initial);
        segments.push(self.error_segment(message));

        DisplayState {
            segments,
            tone: Tone::Error,
            ..initial
        }
    }

    fn error_segment(&self, message: &str) -> Segment {
        let body = Some(message.trim())
            .filter(|message| !message.is_empty())
            .unwrap_or("unknown error");
        Segment {
            name: ERROR_SEGMENT.to_string(),
            body: char_prefix(body, self.limits.field_limit).to_string(),
            continuation_index: 0,
        }
    }

    fn clamp_answer(&self, body: &str) -> String {
        if char_len(body) > self.limits.answer_limit {
            let mut clamped = char_prefix(body, self.limits.answer_limit)
                .trim_end()
                .to_string();
            clamped.push_str(TRUNCATION_MARKER);
            clamped
        } else {
            body.to_string()
        }
    }

    fn named_segments(&self, first_name: &str, base_name: &str, body: &str) -> Vec<Segment> {
        chunk(body, self.limits.field_limit)
            .into_iter()
            .enumerate()
            .map(|(index, piece)| Segment {
                name: if index == 0 {
                    first_name.to_string()
                } else {
                    format!("{base_name} (cont. {index})")
                },
                body: piece,
                continuation_index: index,
            })
            .collect()
    }
}

fn retained_segments(prev: &DisplayState) -> Vec<Segment> {
    prev.segments
        .iter()
        .filter(|segment| !segment.is_answer() && segment.name != USAGE_SEGMENT)
        .cloned()
        .collect()
}

impl DisplayState {
    fn clone_header(&self) -> DisplayState {
        DisplayState {
            title: self.title.clone(),
            segments: Vec::new(),
            tone: self.tone,
            author_label: self.author_label.clone(),
            author_icon: self.author_icon.clone(),
        }
    }
}
