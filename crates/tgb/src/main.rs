use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::{CommandFactory, Parser};

use tgb_core::{
    config::{load_dotenv_if_present, Config, DEFAULT_API_BASE_URL},
    domain::ChatId,
    formatting::escape_html,
    pipeline::{BackupPipeline, BackupReport},
    ports::Notifier,
    Error, Result,
};
use tgb_telegram::TelegramClient;

/// Back up a file or directory to a Telegram chat.
///
/// Directories are zipped; anything over the Bot API upload limit is split
/// into numbered parts that concatenate back into the zip.
#[derive(Parser, Debug)]
#[command(author, version, long_about = None)]
struct Cli {
    /// File or directory to back up
    #[arg(long, short = 'f', alias = "archivo")]
    file: Option<PathBuf>,

    /// Bot token
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Chat that receives the backup (numeric id or @channel)
    #[arg(
        long = "chat-id",
        alias = "id_chat",
        env = "TELEGRAM_CHAT_ID",
        allow_hyphen_values = true
    )]
    chat_id: Option<String>,
}

impl Cli {
    /// The three required inputs, or `None` if any is missing.
    fn required(self) -> Option<(PathBuf, String, ChatId)> {
        let file = self.file.filter(|p| !p.as_os_str().is_empty())?;
        let token = self.token.filter(|t| !t.trim().is_empty())?;
        let chat_id = self.chat_id.filter(|c| !c.trim().is_empty())?;
        Some((file, token, ChatId::from(chat_id)))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // `.env` has to be in the environment before clap reads its `env` fallbacks.
    load_dotenv_if_present(Path::new(".env"));
    let Some((target, token, chat_id)) = Cli::parse().required() else {
        let _ = Cli::command().print_help();
        return ExitCode::SUCCESS;
    };

    if let Err(e) = tgb_core::logging::init("tgb") {
        eprintln!("{e}");
    }

    let cfg = Config::load();
    let base_url = cfg
        .as_ref()
        .map(|c| c.api_base_url.clone())
        .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
    let client = match TelegramClient::with_base_url(token, base_url) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            println!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cfg {
        Ok(cfg) => backup(cfg, client.clone(), chat_id.clone(), &target).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(report) => {
            tracing::info!(route = ?report.route, attempts = report.attempts, "backup finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_failure(client.as_ref(), &chat_id, &e).await;
            ExitCode::FAILURE
        }
    }
}

async fn backup(
    cfg: Config,
    client: Arc<TelegramClient>,
    chat_id: ChatId,
    target: &Path,
) -> Result<BackupReport> {
    let pipeline = BackupPipeline::new(cfg, client.clone(), client, chat_id)?;
    pipeline.run(target).await
}

/// Tell the chat what went wrong; fall back to stdout if that fails too.
async fn report_failure(notifier: &dyn Notifier, chat_id: &ChatId, err: &Error) {
    tracing::error!(error = %err, "backup failed");
    if let Err(send_err) = notifier
        .send_text(chat_id, &escape_html(&err.to_string()))
        .await
    {
        println!("Error: {err} (reporting to chat failed: {send_err})");
    }
}
