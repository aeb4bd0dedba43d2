use super::TokenUsage;

/// What the producer hands to the consumer. Exactly one `End` or `Error`
/// closes the sequence for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta(String),
    End,
    Error(String),
}

/// One item read from the upstream stream. Either field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Increment {
    pub delta: Option<String>,
    pub usage: Option<TokenUsage>,
}

impl Increment {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: Some(delta.into()),
            usage: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_text: String,
}

/// Who asked. Read once when a request starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AskerIdentity {
    pub label: String,
    pub icon_url: Option<String>,
}

impl AskerIdentity {
    pub fn new(label: impl Into<String>, icon_url: Option<String>) -> Self {
        Self {
            label: label.into(),
            icon_url,
        }
    }
}
