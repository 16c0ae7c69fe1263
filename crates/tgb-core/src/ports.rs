use std::path::Path;

use async_trait::async_trait;

use crate::{domain::ChatId, Result};

/// Sends short HTML-formatted status messages to a chat.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, chat_id: &ChatId, html: &str) -> Result<()>;
}

/// Uploads one file from disk as a document message.
///
/// Implementations use the file's base name as the document name and must
/// surface a non-success remote answer as [`crate::Error::Api`].
#[async_trait]
pub trait DocumentUploader: Send + Sync {
    async fn send_document(
        &self,
        chat_id: &ChatId,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<()>;
}

/// How a notification failure affects the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotifyPolicy {
    /// The failure is returned and aborts the current operation.
    Required,
    /// The failure is logged and swallowed.
    BestEffort,
}

/// Send a notification, applying `policy` to its outcome.
pub async fn notify(
    notifier: &dyn Notifier,
    chat_id: &ChatId,
    html: &str,
    policy: NotifyPolicy,
) -> Result<()> {
    match notifier.send_text(chat_id, html).await {
        Ok(()) => Ok(()),
        Err(e) if policy == NotifyPolicy::BestEffort => {
            tracing::warn!(error = %e, "best-effort notification failed");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
