use std::path::PathBuf;

use chrono::Local;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use ragbot_core::types::ConversationTurn;

/// Append-only plain-text transcript of answered questions.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

    /// Record one turn. Failures are logged and otherwise ignored.
    pub async fn append(&self, turn: &ConversationTurn) {
        if let Err(e) = self.try_append(turn).await {
            warn!(path = %self.path.display(), error = %e, "could not write history log");
        }
    }

    async fn try_append(&self, turn: &ConversationTurn) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        let block = format!(
            "{}\nPergunta: {}\nResposta: {}\n{}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            turn.question,
            turn.answer,
            "-".repeat(50)
        );
        file.write_all(block.as_bytes()).await?;
        file.flush().await
    }
}
