use anyhow::{Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only log of processed commands, one `<timestamp>: <command>` line each.
///
/// Appends are serialized so lines from concurrent sessions never interleave.
pub struct AuditLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        AuditLog {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Best effort: a failed write is logged, never returned.
    pub async fn record(&self, command: &str) {
        if let Err(e) = self.append(command).await {
            error!(path = %self.path.display(), error = ?e, "Failed to write audit record");
        }
    }

    async fn append(&self, command: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        // Timestamp taken under the lock: lines are appended in time order
        let line = format!("{}: {}\n", Local::now().format(TIMESTAMP_FORMAT), command);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open audit log: {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        debug!("Audit record written");
        Ok(())
    }
}
