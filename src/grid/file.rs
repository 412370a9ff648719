use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use super::memory::write_into;
use super::{GridError, GridStore};

/// Grid store backed by a JSON file holding the raw rows
/// (`[["date","table","12:00",...], ...]`).
///
/// Every read goes to disk so edits made to the file by hand are picked up.
/// Writes are read-modify-write under a process-local mutex and land via
/// rename.
pub struct JsonFileGridStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileGridStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `rows` unless the file already exists. Returns whether it did.
    pub async fn create_if_missing(&self, rows: &[Vec<String>]) -> Result<bool, GridError> {
        let _guard = self.lock.lock().await;
        if tokio::fs::try_exists(&self.path).await.map_err(unavailable)? {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(unavailable)?;
        }
        self.store(rows).await?;
        info!("seeded grid file {} with {} rows", self.path.display(), rows.len());
        Ok(true)
    }

    async fn load(&self) -> Result<Vec<Vec<String>>, GridError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(unavailable)?;
        serde_json::from_slice(&bytes).map_err(|e| GridError::Malformed(e.to_string()))
    }

    async fn store(&self, rows: &[Vec<String>]) -> Result<(), GridError> {
        let bytes = serde_json::to_vec_pretty(rows).map_err(|e| GridError::Malformed(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(unavailable)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(unavailable)
    }
}

fn unavailable(e: std::io::Error) -> GridError {
    GridError::Unavailable(e.to_string())
}

#[async_trait]
impl GridStore for JsonFileGridStore {
    async fn read_rows(&self) -> Result<Vec<Vec<String>>, GridError> {
        self.load().await
    }

    async fn write_range(
        &self,
        row: usize,
        start_col: usize,
        end_col: usize,
        value: &str,
    ) -> Result<(), GridError> {
        if start_col > end_col {
            return Err(GridError::Malformed(format!(
                "empty column range {start_col}..={end_col}"
            )));
        }
        let _guard = self.lock.lock().await;
        let mut rows = self.load().await?;
        write_into(&mut rows, row, start_col, end_col, value);
        self.store(&rows).await
    }
}
