//! The visual schedule: a spreadsheet-shaped grid mirrored from the ledger.
//!
//! Layout of the raw sheet:
//! - row 0 is the header: `date`, `table`, then one hourly time label per column;
//! - every following block of [`TABLE_COUNT`] rows is one date, row `k` of the
//!   block being table `k + 1`; the date label sits in column 0 of the block;
//! - a cell is free when empty or absent, blocked when it holds
//!   [`BLOCKED_MARKER`], and occupied otherwise.

mod availability;
mod file;
mod memory;
mod schedule;
mod snapshot;

pub use availability::{
    available_dates, available_end_times_for_table, available_start_times,
    best_table_and_end_times, range_is_free, AvailableDate,
};
pub use file::JsonFileGridStore;
pub use memory::MemoryGridStore;
pub use schedule::Schedule;
pub use snapshot::{parse_date_label, Cell, DayBlock, SlotGrid};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::*;

pub const HEADER_ROW: usize = 0;
pub const DATE_COLUMN: usize = 0;
pub const TABLE_COLUMN: usize = 1;
pub const FIRST_SLOT_COLUMN: usize = 2;

/// Sentinel written across a whole day when an admin closes it.
pub const BLOCKED_MARKER: &str = "blocked";

#[derive(Debug)]
pub enum GridError {
    /// The backing store could not be reached or written.
    Unavailable(String),
    /// The sheet does not have the expected shape.
    Malformed(String),
}

impl std::fmt::Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridError::Unavailable(e) => write!(f, "grid store unavailable: {e}"),
            GridError::Malformed(e) => write!(f, "malformed grid: {e}"),
        }
    }
}

impl std::error::Error for GridError {}

/// Raw tabular store addressed by zero-based row and column.
#[async_trait]
pub trait GridStore: Send + Sync {
    /// Every row of the sheet; rows may be shorter than the header.
    async fn read_rows(&self) -> Result<Vec<Vec<String>>, GridError>;

    /// Write `value` into `row`, columns `start_col..=end_col`.
    async fn write_range(
        &self,
        row: usize,
        start_col: usize,
        end_col: usize,
        value: &str,
    ) -> Result<(), GridError>;

    async fn clear_range(&self, row: usize, start_col: usize, end_col: usize) -> Result<(), GridError> {
        self.write_range(row, start_col, end_col, "").await
    }
}

/// Hourly slot labels from opening until the last slot that ends by closing.
pub fn operating_columns() -> Vec<SlotTime> {
    let mut out = Vec::new();
    let mut t = OPENING;
    while t.is_bookable_start() {
        out.push(t);
        t = t.slot_end();
    }
    out
}

/// An empty sheet for `dates`: header plus one labelled row per table and
/// date. Slot cells are left absent, which reads as free.
pub fn blank_sheet(dates: &[NaiveDate], columns: &[SlotTime]) -> Vec<Vec<String>> {
    let mut header = vec!["date".to_string(), "table".to_string()];
    header.extend(columns.iter().map(|c| c.to_string()));

    let mut rows = vec![header];
    for date in dates {
        for (k, name) in TABLE_NAMES.iter().enumerate() {
            let mut row = vec![String::new(); FIRST_SLOT_COLUMN];
            if k == 0 {
                row[DATE_COLUMN] = date.format("%d.%m.%y").to_string();
            }
            row[TABLE_COLUMN] = name.to_string();
            rows.push(row);
        }
    }
    rows
}
