//! The backup pipeline: classify the target, archive and split as needed,
//! upload every resulting file in order and clean up afterwards.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    archive,
    config::Config,
    domain::ChatId,
    errors::Error,
    formatting::{self, StatusMessage},
    fragment,
    ports::{notify, DocumentUploader, Notifier, NotifyPolicy},
    retry::{upload_with_retry, RetryPolicy},
    Result,
};

/// How the target ended up being delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Sent as-is.
    Direct,
    /// Zipped into a single document.
    Archived,
    /// Zipped, then split into `parts` documents.
    Split { parts: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackupReport {
    pub route: Route,
    /// Upload attempts used across every document.
    pub attempts: u32,
}

pub struct BackupPipeline {
    cfg: Config,
    notifier: Arc<dyn Notifier>,
    uploader: Arc<dyn DocumentUploader>,
    chat_id: ChatId,
}

impl BackupPipeline {
    pub fn new(
        cfg: Config,
        notifier: Arc<dyn Notifier>,
        uploader: Arc<dyn DocumentUploader>,
        chat_id: ChatId,
    ) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            notifier,
            uploader,
            chat_id,
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Back up `target` (file or directory) to the chat.
    ///
    /// Any error aborts the run. Artifacts are only removed once every
    /// document has been delivered; an aborted run leaves them in the work
    /// directory until the next run sweeps them.
    pub async fn run(&self, target: &Path) -> Result<BackupReport> {
        let meta = fs::metadata(target)?;
        let limit = self.cfg.fragment_limit;
        let mut msg = StatusMessage::backing_up(target);

        if meta.is_dir() {
            msg.line("It is a directory, creating zip...");
        } else if meta.len() <= limit {
            tracing::info!(
                path = %target.display(),
                size = meta.len(),
                "sending file directly"
            );
            msg.line("It is a file under the size limit");
            self.announce(&msg).await?;
            let attempts = self.upload(target, None).await?;
            return Ok(BackupReport {
                route: Route::Direct,
                attempts,
            });
        } else {
            msg.line("It is a file over the size limit, creating zip...");
        }

        self.ensure_not_artifact(target)?;
        self.sweep_stale_artifacts()?;

        let archive_path =
            archive::archive(target, &self.cfg.archive_path(), &self.cfg.work_dir)?;
        let size = fs::metadata(&archive_path)?.len();
        tracing::info!(archive = %archive_path.display(), size, limit, "archive ready");

        if size <= limit {
            msg.line("The resulting zip is under the size limit");
            self.announce(&msg).await?;
            let attempts = self.upload(&archive_path, None).await?;
            remove_artifacts(&[archive_path])?;
            return Ok(BackupReport {
                route: Route::Archived,
                attempts,
            });
        }

        let parts = fragment::split(&archive_path, limit).map_err(|f| {
            tracing::warn!(parts_left = f.parts.len(), error = %f.error, "split failed");
            Error::from(f)
        })?;
        let digest = fragment::sha256_file(&archive_path)?;
        let total = parts.len();

        msg.line(&format!("Splitting file into {total} parts"));
        msg.line(&format!("SHA-256 of the whole zip: {digest}"));
        self.announce(&msg).await?;

        let mut attempts = 0u32;
        for (i, part) in parts.iter().enumerate() {
            let caption = formatting::part_caption(i + 1, total);
            attempts += self.upload(part, Some(&caption)).await?;
        }

        let mut artifacts = parts;
        artifacts.push(archive_path);
        remove_artifacts(&artifacts)?;

        Ok(BackupReport {
            route: Route::Split { parts: total },
            attempts,
        })
    }

    async fn announce(&self, msg: &StatusMessage) -> Result<()> {
        notify(
            self.notifier.as_ref(),
            &self.chat_id,
            &msg.html(),
            NotifyPolicy::Required,
        )
        .await
    }

    async fn upload(&self, path: &Path, caption: Option<&str>) -> Result<u32> {
        upload_with_retry(
            self.uploader.as_ref(),
            self.notifier.as_ref(),
            &self.chat_id,
            path,
            caption,
            RetryPolicy {
                max_attempts: self.cfg.max_attempts,
                delay: self.cfg.retry_delay,
            },
        )
        .await
    }

    /// Refuse targets the sweep or the archive writer would clobber.
    fn ensure_not_artifact(&self, target: &Path) -> Result<()> {
        let Some(name) = target.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Ok(());
        };
        if !fragment::is_artifact_name(&name, &self.cfg.archive_name) {
            return Ok(());
        }
        let parent = fs::canonicalize(target)?
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        if parent == fs::canonicalize(&self.cfg.work_dir)? {
            return Err(Error::InvalidPath {
                path: target.to_path_buf(),
                reason: "target is the tool's own archive artifact".to_string(),
            });
        }
        Ok(())
    }

    /// Remove the archive and parts an earlier aborted run left behind.
    fn sweep_stale_artifacts(&self) -> Result<usize> {
        let mut removed = 0usize;
        for entry in fs::read_dir(&self.cfg.work_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !fragment::is_artifact_name(&name, &self.cfg.archive_name) {
                continue;
            }
            if !entry.file_type()?.is_file() {
                continue;
            }
            fs::remove_file(entry.path())?;
            removed += 1;
        }
        if removed > 0 {
            tracing::info!(removed, work_dir = %self.cfg.work_dir.display(), "swept stale artifacts");
        }
        Ok(removed)
    }
}

fn remove_artifacts(paths: &[PathBuf]) -> Result<()> {
    for p in paths {
        fs::remove_file(p)?;
    }
    tracing::debug!(count = paths.len(), "artifacts removed");
    Ok(())
}
