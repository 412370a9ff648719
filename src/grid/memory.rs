use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{GridError, GridStore};

/// Grid store held entirely in memory. Rows and columns grow on write.
#[derive(Debug, Default)]
pub struct MemoryGridStore {
    rows: RwLock<Vec<Vec<String>>>,
}

impl MemoryGridStore {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self {
            rows: RwLock::new(rows),
        }
    }

    pub async fn cell(&self, row: usize, col: usize) -> Option<String> {
        self.rows.read().await.get(row)?.get(col).cloned()
    }
}

pub(super) fn write_into(rows: &mut Vec<Vec<String>>, row: usize, start_col: usize, end_col: usize, value: &str) {
    if rows.len() <= row {
        rows.resize_with(row + 1, Vec::new);
    }
    let cells = &mut rows[row];
    if cells.len() <= end_col {
        cells.resize(end_col + 1, String::new());
    }
    for cell in &mut cells[start_col..=end_col] {
        *cell = value.to_string();
    }
}

#[async_trait]
impl GridStore for MemoryGridStore {
    async fn read_rows(&self) -> Result<Vec<Vec<String>>, GridError> {
        Ok(self.rows.read().await.clone())
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
        write_into(&mut *self.rows.write().await, row, start_col, end_col, value);
        Ok(())
    }
}
