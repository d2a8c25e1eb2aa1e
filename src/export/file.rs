//! Append-only JSON Lines file sink.

use super::{ExportError, ExportFuture, Exporter};
use crate::reading::Reading;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Appends one JSON record per line to `path`.
///
/// The file and its parent directories are created on first use. Every call
/// opens the file in append mode and writes the whole record with a single
/// `write_all`, so earlier records are never truncated.
#[derive(Debug)]
pub struct JsonFileExporter {
    path: PathBuf,
    // Serializes appends from concurrent calls on the same instance.
    lock: Mutex<()>,
}

impl JsonFileExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, reading: &Reading) -> Result<(), ExportError> {
        let mut line = serde_json::to_vec(reading)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        tracing::debug!(path = %self.path.display(), "appended reading");
        Ok(())
    }
}

impl Exporter for JsonFileExporter {
    fn name(&self) -> &str {
        "file"
    }

    fn export<'a>(&'a self, reading: &'a Reading) -> ExportFuture<'a> {
        Box::pin(self.append(reading))
    }
}
