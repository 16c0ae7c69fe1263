//! Telegram Bot API adapter.
//!
//! Implements the `tgb-core` notifier and uploader ports with plain HTTPS
//! calls: `sendMessage` (JSON) and `sendDocument` (multipart, streamed from
//! disk).

use std::path::Path;

use async_trait::async_trait;
use reqwest::{
    header::CONTENT_TYPE,
    multipart::{Form, Part},
    Body,
};
use serde::Serialize;
use tokio_util::io::ReaderStream;

use tgb_core::{
    config::DEFAULT_API_BASE_URL,
    domain::ChatId,
    errors::Error,
    ports::{DocumentUploader, Notifier},
    Result,
};

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_notification: bool,
}

#[derive(Clone, Debug)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, DEFAULT_API_BASE_URL)
    }

    /// Client for a specific Bot API server (e.g. a self-hosted one).
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        // No request timeout: large documents take as long as they take.
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::External(format!("http client build failed: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    // reqwest errors embed the URL, which carries the bot token.
    fn map_err(e: reqwest::Error) -> Error {
        let e = e.without_url();
        let mut msg = e.to_string();
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            msg.push_str(": ");
            msg.push_str(&cause.to_string());
            source = cause.source();
        }
        Error::Transport(msg)
    }

    async fn check_response(resp: reqwest::Response) -> Result<()> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.map_err(Self::map_err)?;
        Err(Error::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn send_text(&self, chat_id: &ChatId, html: &str) -> Result<()> {
        let payload = serde_json::to_vec(&SendMessage {
            chat_id: chat_id.as_str(),
            text: html,
            parse_mode: "HTML",
            disable_notification: true,
        })?;

        let resp = self
            .http
            .post(self.method_url("sendMessage"))
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(Self::map_err)?;
        Self::check_response(resp).await
    }
}

#[async_trait]
impl DocumentUploader for TelegramClient {
    async fn send_document(
        &self,
        chat_id: &ChatId,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<()> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidPath {
                path: path.to_path_buf(),
                reason: "has no file name".to_string(),
            })?;

        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        let document = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), len)
            .file_name(file_name.clone())
            .mime_str("application/octet-stream")
            .map_err(Self::map_err)?;

        let mut form = Form::new()
            .part("document", document)
            .text("chat_id", chat_id.as_str().to_string())
            .text("disable_notification", "true");
        if let Some(c) = caption {
            form = form.text("caption", c.to_string());
        }

        tracing::debug!(file = %file_name, bytes = len, chat = %chat_id, "sendDocument");
        let resp = self
            .http
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(Self::map_err)?;
        Self::check_response(resp).await
    }
}
