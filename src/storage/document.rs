use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::datasets::transfers::TransferRecord;
use crate::models::errors::SinkError;

/// Append-only JSON Lines file, one record per line.
pub struct DocumentStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl DocumentStore {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub async fn append(&self, records: &[TransferRecord]) -> Result<usize, SinkError> {
        if records.is_empty() {
            return Ok(0);
        }

        // The whole batch is serialized before the file is touched
        let mut buffer = Vec::with_capacity(records.len() * 512);
        for record in records {
            serde_json::to_writer(&mut buffer, record)?;
            buffer.push(b'\n');
        }

        let mut file = self.file.lock().await;
        file.write_all(&buffer).await?;
        file.flush().await?;

        debug!("Appended {} records to {}", records.len(), self.path.display());
        Ok(records.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
