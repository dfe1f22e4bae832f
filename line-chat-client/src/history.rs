//! Durable chat transcript.
//!
//! The session pushes every received line onto the history queue;
//! [`save_messages`] drains that queue into `history_logs.txt` so the next
//! run can replay it with [`load_history`].

use std::{
    io,
    path::{Path, PathBuf},
};

use tokio::{
    fs::OpenOptions,
    io::AsyncWriteExt,
    sync::mpsc::UnboundedReceiver,
};
use tracing::debug;

pub const HISTORY_FILE_NAME: &str = "history_logs.txt";

pub fn history_path(dir: &Path) -> PathBuf {
    dir.join(HISTORY_FILE_NAME)
}

/// Appends each queued line to `path` until the queue closes.
pub async fn save_messages(path: PathBuf, mut queue: UnboundedReceiver<String>) -> io::Result<()> {
    let mut log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;

    while let Some(message) = queue.recv().await {
        log_file.write_all(message.as_bytes()).await?;
        log_file.write_all(b"\n").await?;
        log_file.flush().await?;
    }

    debug!(path = %path.display(), "history queue closed");
    Ok(())
}

/// Previously logged lines, oldest first. A missing file is an empty history.
pub async fn load_history(path: &Path) -> io::Result<Vec<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(contents.lines().map(str::to_string).collect()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(error) => Err(error),
    }
}
