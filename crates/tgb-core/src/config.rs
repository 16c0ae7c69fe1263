use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Largest document the tool will hand to the Bot API in one request.
///
/// The documented ceiling is 50 MiB (the real one is a few hundred bytes
/// less); 49 MiB leaves room for the multipart envelope.
pub const DEFAULT_FRAGMENT_LIMIT: u64 = 49 * 1024 * 1024;

/// Documents the Bot API accepts in a single media group. Every part is sent
/// as its own message, so this is informational only.
pub const MAX_FILES_PER_MESSAGE: usize = 10;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

pub const DEFAULT_ARCHIVE_NAME: &str = "salida.zip";

pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";

/// Pipeline tunables.
///
/// Passed explicitly into the pipeline so tests can run with tiny limits.
#[derive(Clone, Debug)]
pub struct Config {
    pub fragment_limit: u64,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Directory where the archive and its parts are written.
    pub work_dir: PathBuf,
    pub archive_name: String,
    pub api_base_url: String,
}

impl Config {
    /// Load from `.env` (if present) and the process environment.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        let cwd = env::current_dir()?;
        Self::from_lookup(cwd, |key| env::var(key).ok())
    }

    /// Parse the configuration from an arbitrary key lookup.
    ///
    /// `cwd` is the default work directory.
    pub fn from_lookup(cwd: PathBuf, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let fragment_limit = parse_u64(&lookup, "BACKUP_FRAGMENT_LIMIT_BYTES")?
            .unwrap_or(DEFAULT_FRAGMENT_LIMIT);
        let max_attempts = match parse_u64(&lookup, "BACKUP_MAX_ATTEMPTS")? {
            Some(n) => u32::try_from(n).map_err(|_| {
                Error::Config(format!("BACKUP_MAX_ATTEMPTS out of range: {n}"))
            })?,
            None => DEFAULT_MAX_ATTEMPTS,
        };
        let retry_delay =
            Duration::from_millis(parse_u64(&lookup, "BACKUP_RETRY_DELAY_MS")?.unwrap_or(0));

        let work_dir = lookup("BACKUP_WORK_DIR")
            .and_then(non_empty)
            .map(PathBuf::from)
            .unwrap_or(cwd);
        let archive_name = lookup("BACKUP_ARCHIVE_NAME")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_ARCHIVE_NAME.to_string());
        let api_base_url = lookup("TELEGRAM_API_URL")
            .and_then(non_empty)
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let cfg = Self {
            fragment_limit,
            max_attempts,
            retry_delay,
            work_dir,
            archive_name,
            api_base_url,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults rooted at `work_dir`.
    pub fn with_work_dir(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            fragment_limit: DEFAULT_FRAGMENT_LIMIT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::ZERO,
            work_dir: work_dir.into(),
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.fragment_limit == 0 {
            return Err(Error::Config(
                "fragment limit must be greater than zero".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config(
                "max attempts must be greater than zero".to_string(),
            ));
        }
        let nested = self
            .archive_name
            .contains(|c: char| c == '/' || c == '\\');
        if self.archive_name.trim().is_empty() || nested {
            return Err(Error::Config(format!(
                "archive name must be a plain file name: {:?}",
                self.archive_name
            )));
        }
        Ok(())
    }

    /// Where the archive artifact is written.
    pub fn archive_path(&self) -> PathBuf {
        self.work_dir.join(&self.archive_name)
    }
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    let Some(raw) = lookup(key).and_then(non_empty) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} must be an unsigned integer, got {raw:?}")))
}

/// Export `KEY=value` lines from `path` into the process environment.
///
/// Variables that are already set win. A missing file is not an error.
pub fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        &val[1..val.len() - 1]
    } else {
        val
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
