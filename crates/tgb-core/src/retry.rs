use std::{path::Path, time::Duration};

use tokio::time::sleep;

use crate::{
    domain::ChatId,
    errors::Error,
    formatting,
    ports::{notify, DocumentUploader, Notifier, NotifyPolicy},
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next one.
    pub delay: Duration,
}

/// Upload one file, retrying up to `policy.max_attempts` times.
///
/// Every failed attempt is reported to the chat on a best-effort basis. When
/// the bound is reached the result is [`Error::MaxAttemptsReached`]; the
/// individual attempt errors are only logged. Returns the number of attempts
/// used on success.
pub async fn upload_with_retry(
    uploader: &dyn DocumentUploader,
    notifier: &dyn Notifier,
    chat_id: &ChatId,
    path: &Path,
    caption: Option<&str>,
    policy: RetryPolicy,
) -> Result<u32> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let mut attempts = 0u32;
    while attempts < policy.max_attempts {
        match uploader.send_document(chat_id, path, caption).await {
            Ok(()) => {
                tracing::info!(file = %file_name, attempt = attempts + 1, "document sent");
                return Ok(attempts + 1);
            }
            Err(e) => {
                tracing::warn!(
                    file = %file_name,
                    attempt = attempts + 1,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "upload attempt failed"
                );
                let html =
                    formatting::attempt_failed(&file_name, attempts + 1, policy.max_attempts);
                notify(notifier, chat_id, &html, NotifyPolicy::BestEffort).await?;
                attempts += 1;
            }
        }

        if attempts < policy.max_attempts && !policy.delay.is_zero() {
            sleep(policy.delay).await;
        }
    }

    Err(Error::MaxAttemptsReached {
        path: path.to_path_buf(),
        attempts,
    })
}
