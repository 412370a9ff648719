use chrono::{Datelike, NaiveDate};
use tracing::{debug, warn};

use crate::model::*;

use super::{GridError, BLOCKED_MARKER, DATE_COLUMN, FIRST_SLOT_COLUMN, HEADER_ROW};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Free,
    Blocked,
    Occupied(String),
}

impl Cell {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            Cell::Free
        } else if raw.eq_ignore_ascii_case(BLOCKED_MARKER) {
            Cell::Blocked
        } else {
            Cell::Occupied(raw.to_string())
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, Cell::Free)
    }
}

/// The rows of one date: one row of cells per table, one cell per column.
#[derive(Debug, Clone)]
pub struct DayBlock {
    pub date: NaiveDate,
    /// Sheet row of table 1.
    pub first_row: usize,
    tables: Vec<Vec<Cell>>,
}

impl DayBlock {
    /// Cells of one table, `None` for a table id outside `1..=TABLE_COUNT`.
    pub fn table_row(&self, table_id: TableId) -> Option<&[Cell]> {
        if !is_valid_table(table_id) {
            return None;
        }
        self.tables.get(table_id as usize - 1).map(Vec::as_slice)
    }

    pub fn cell(&self, table_id: TableId, column: usize) -> Option<&Cell> {
        self.table_row(table_id)?.get(column)
    }

    pub fn sheet_row(&self, table_id: TableId) -> Option<usize> {
        is_valid_table(table_id).then(|| self.first_row + table_id as usize - 1)
    }
}

/// A parsed, addressed snapshot of the schedule sheet.
///
/// Column indexes here are relative to the first slot column.
#[derive(Debug, Clone)]
pub struct SlotGrid {
    columns: Vec<Option<SlotTime>>,
    days: Vec<DayBlock>,
}

impl SlotGrid {
    /// Parse raw sheet rows. Bad date labels skip their block, bad time
    /// headers leave an unusable column, a trailing partial block is
    /// ignored. Only a missing header row is an error.
    pub fn parse(rows: &[Vec<String>], today: NaiveDate) -> Result<Self, GridError> {
        let header = rows
            .get(HEADER_ROW)
            .ok_or_else(|| GridError::Malformed("missing header row".into()))?;

        let columns: Vec<Option<SlotTime>> = header
            .iter()
            .skip(FIRST_SLOT_COLUMN)
            .enumerate()
            .map(|(i, label)| {
                if label.trim().is_empty() {
                    return None;
                }
                match label.parse::<SlotTime>() {
                    Ok(t) => Some(t),
                    Err(e) => {
                        warn!("grid column {}: {e}", i + FIRST_SLOT_COLUMN);
                        None
                    }
                }
            })
            .collect();

        let body = &rows[HEADER_ROW + 1..];
        let partial = body.len() % TABLE_COUNT;
        if partial != 0 {
            debug!("ignoring {partial} trailing grid rows (incomplete date block)");
        }

        let mut days = Vec::new();
        for (b, block) in body.chunks_exact(TABLE_COUNT).enumerate() {
            let first_row = HEADER_ROW + 1 + b * TABLE_COUNT;
            let label = block
                .iter()
                .filter_map(|row| row.get(DATE_COLUMN))
                .map(|s| s.trim())
                .find(|s| !s.is_empty())
                .unwrap_or("");
            let Some(date) = parse_date_label(label, today) else {
                warn!("grid row {first_row}: skipping block with bad date label {label:?}");
                continue;
            };
            let tables = block
                .iter()
                .map(|row| {
                    (0..columns.len())
                        .map(|c| {
                            row.get(FIRST_SLOT_COLUMN + c)
                                .map_or(Cell::Free, |raw| Cell::parse(raw))
                        })
                        .collect()
                })
                .collect();
            days.push(DayBlock {
                date,
                first_row,
                tables,
            });
        }

        Ok(Self { columns, days })
    }

    pub fn columns(&self) -> &[Option<SlotTime>] {
        &self.columns
    }

    pub fn days(&self) -> &[DayBlock] {
        &self.days
    }

    pub fn day(&self, date: NaiveDate) -> Option<&DayBlock> {
        self.days.iter().find(|d| d.date == date)
    }

    /// Column whose label equals `time`, ignoring zero padding.
    pub fn column_of(&self, time: SlotTime) -> Option<usize> {
        self.columns.iter().position(|c| *c == Some(time))
    }

    /// First and last column covering exactly `[start, end)`, or `None` if
    /// a label is missing or the columns in between are not contiguous.
    pub fn columns_between(&self, start: SlotTime, end: SlotTime) -> Option<(usize, usize)> {
        if start.ordinal() >= end.ordinal() {
            return None;
        }
        let first = self.column_of(start)?;
        let mut expected = start;
        for (col, label) in self.columns.iter().enumerate().skip(first) {
            if *label != Some(expected) {
                return None;
            }
            expected = expected.slot_end();
            if expected.ordinal() == end.ordinal() {
                return Some((first, col));
            }
            if expected.ordinal() > end.ordinal() {
                return None;
            }
        }
        None
    }
}

/// Parse `dd.mm` or `dd.mm.yy` (also `dd.mm.yyyy`). A year-less label takes
/// whichever of last, this or next year puts it closest to `today`.
pub fn parse_date_label(label: &str, today: NaiveDate) -> Option<NaiveDate> {
    let parts: Vec<&str> = label.trim().split('.').collect();
    let (day, month, year) = match parts.as_slice() {
        [d, m] => (d.parse().ok()?, m.parse().ok()?, None),
        [d, m, y] => {
            let y: i32 = y.parse().ok()?;
            let y = match y {
                0..=99 => 2000 + y,
                1000..=9999 => y,
                _ => return None,
            };
            (d.parse().ok()?, m.parse().ok()?, Some(y))
        }
        _ => return None,
    };
    if let Some(y) = year {
        return NaiveDate::from_ymd_opt(y, month, day);
    }
    (today.year() - 1..=today.year() + 1)
        .filter_map(|y| NaiveDate::from_ymd_opt(y, month, day))
        .min_by_key(|d| (*d - today).num_days().abs())
}
