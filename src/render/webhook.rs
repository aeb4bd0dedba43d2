use super::presentation::{DisplayState, Tone};
use super::sink::{RenderHandle, RenderSink};
use crate::error::RenderError;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Posts and edits one embed message through a chat-platform webhook.
#[derive(Clone)]
pub struct WebhookSink {
    http: reqwest::Client,
    webhook_url: Url,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    embeds: Vec<Embed<'a>>,
}

#[derive(Debug, Serialize, PartialEq)]
struct Embed<'a> {
    title: &'a str,
    color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<EmbedAuthor<'a>>,
    fields: Vec<EmbedField<'a>>,
}

#[derive(Debug, Serialize, PartialEq)]
struct EmbedAuthor<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_url: Option<&'a str>,
}

#[derive(Debug, Serialize, PartialEq)]
struct EmbedField<'a> {
    name: &'a str,
    value: &'a str,
    inline: bool,
}

#[derive(Debug, Deserialize)]
struct PostedMessage {
    id: String,
}

impl WebhookSink {
    pub fn new(webhook_url: &str) -> Result<Self, RenderError> {
        let webhook_url = Url::parse(webhook_url.trim()).map_err(|error| RenderError::Rejected {
            status: 0,
            message: format!("invalid webhook url: {error}"),
        })?;
        Ok(Self {
            http: reqwest::Client::new(),
            webhook_url,
        })
    }

    fn post_url(&self) -> Url {
        let mut url = self.webhook_url.clone();
        url.query_pairs_mut().append_pair("wait", "true");
        url
    }

    fn message_url(&self, message_id: &str) -> Result<Url, RenderError> {
        let mut url = self.webhook_url.clone();
        url.path_segments_mut()
            .map_err(|_| RenderError::Rejected {
                status: 0,
                message: "webhook url cannot carry a message path".to_string(),
            })?
            .pop_if_empty()
            .push("messages")
            .push(message_id);
        Ok(url)
    }
}

#[async_trait]
impl RenderSink for WebhookSink {
    async fn post(&self, display: &DisplayState) -> Result<RenderHandle, RenderError> {
        let payload = WebhookPayload {
            content: None,
            embeds: vec![embed(display)],
        };
        let response = self
            .http
            .post(self.post_url())
            .json(&payload)
            .send()
            .await
            .map_err(map_webhook_error)?;
        let response = check_status(response).await?;
        let posted: PostedMessage = response
            .json()
            .await
            .map_err(|error| RenderError::Transient(format!("unreadable webhook reply: {error}")))?;
        debug!(message_id = %posted.id, "webhook message posted");
        Ok(RenderHandle::new(posted.id))
    }

    async fn edit(&self, handle: &RenderHandle, display: &DisplayState) -> Result<(), RenderError> {
        let payload = WebhookPayload {
            content: None,
            embeds: vec![embed(display)],
        };
        let response = self
            .http
            .patch(self.message_url(handle.id())?)
            .json(&payload)
            .send()
            .await
            .map_err(map_webhook_error)?;
        check_status(response).await?;
        Ok(())
    }

    async fn reply_error(&self, message: &str) -> Result<(), RenderError> {
        let payload = WebhookPayload {
            content: Some(message),
            embeds: Vec::new(),
        };
        let response = self
            .http
            .post(self.webhook_url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(map_webhook_error)?;
        check_status(response).await?;
        Ok(())
    }
}

fn embed(display: &DisplayState) -> Embed<'_> {
    Embed {
        title: display.title(),
        color: tone_color(display.tone()),
        author: display.author_label().map(|name| EmbedAuthor {
            name,
            icon_url: display.author_icon(),
        }),
        fields: display
            .segments()
            .iter()
            .map(|segment| EmbedField {
                name: segment.name(),
                value: segment.body(),
                inline: false,
            })
            .collect(),
    }
}

fn tone_color(tone: Tone) -> u32 {
    match tone {
        Tone::Pending => 0xF1C40F,
        Tone::Streaming => 0x3498DB,
        Tone::Done => 0x2ECC71,
        Tone::Error => 0xE74C3C,
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RenderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, body))
}

fn classify_status(status: StatusCode, body: String) -> RenderError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        RenderError::Transient(format!("webhook returned HTTP {status}: {body}"))
    } else {
        RenderError::Rejected {
            status: status.as_u16(),
            message: body,
        }
    }
}

fn map_webhook_error(error: reqwest::Error) -> RenderError {
    if error.is_timeout() {
        return RenderError::Transient(format!("webhook request timed out: {error}"));
    }
    if error.is_connect() {
        return RenderError::Transient(format!("cannot reach webhook: {error}"));
    }
    RenderError::Transient(format!("webhook request failed: {error}"))
}
