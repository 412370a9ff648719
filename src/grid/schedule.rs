use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::debug;

use crate::model::*;

use super::snapshot::{Cell, SlotGrid};
use super::{GridError, GridStore, BLOCKED_MARKER, FIRST_SLOT_COLUMN};

/// Addressed access to the schedule sheet: turns (date, table, time range)
/// into raw row/column writes on a [`GridStore`].
#[derive(Clone)]
pub struct Schedule {
    store: Arc<dyn GridStore>,
}

impl Schedule {
    pub fn new(store: Arc<dyn GridStore>) -> Self {
        Self { store }
    }

    /// Fresh snapshot; the sheet is re-read on every call.
    pub async fn read_snapshot(&self) -> Result<SlotGrid, GridError> {
        self.read_snapshot_at(Local::now().date_naive()).await
    }

    pub async fn read_snapshot_at(&self, today: NaiveDate) -> Result<SlotGrid, GridError> {
        let rows = self.store.read_rows().await?;
        SlotGrid::parse(&rows, today)
    }

    /// Stamp `value` over `[start, end)` of one table on one date.
    /// `Ok(false)` if the date or the time range is not on the sheet.
    pub async fn write_cells(
        &self,
        date: NaiveDate,
        table_id: TableId,
        start: SlotTime,
        end: SlotTime,
        value: &str,
    ) -> Result<bool, GridError> {
        let grid = self.read_snapshot().await?;
        let Some(row) = grid.day(date).and_then(|d| d.sheet_row(table_id)) else {
            debug!("grid has no row for table {table_id} on {date}");
            return Ok(false);
        };
        let Some((first, last)) = grid.columns_between(start, end) else {
            debug!("grid has no contiguous columns for {start}-{end}");
            return Ok(false);
        };
        self.store
            .write_range(row, FIRST_SLOT_COLUMN + first, FIRST_SLOT_COLUMN + last, value)
            .await?;
        Ok(true)
    }

    /// Empty `[start, end)` of one table on one date. Cells holding the
    /// blocked marker stay blocked. `Ok(false)` if the range is not on the sheet.
    pub async fn clear_cells(
        &self,
        date: NaiveDate,
        table_id: TableId,
        start: SlotTime,
        end: SlotTime,
    ) -> Result<bool, GridError> {
        let grid = self.read_snapshot().await?;
        let Some(day) = grid.day(date) else {
            return Ok(false);
        };
        let (Some(row), Some((first, last))) =
            (day.sheet_row(table_id), grid.columns_between(start, end))
        else {
            return Ok(false);
        };

        let mut run: Option<(usize, usize)> = None;
        for c in first..=last {
            if matches!(day.cell(table_id, c), Some(Cell::Blocked)) {
                if let Some((a, b)) = run.take() {
                    self.store.clear_range(row, FIRST_SLOT_COLUMN + a, FIRST_SLOT_COLUMN + b).await?;
                }
                continue;
            }
            run = Some(run.map_or((c, c), |(a, _)| (a, c)));
        }
        if let Some((a, b)) = run {
            self.store.clear_range(row, FIRST_SLOT_COLUMN + a, FIRST_SLOT_COLUMN + b).await?;
        }
        Ok(true)
    }

    /// Mark every slot of every table on `date` as blocked.
    pub async fn block_day(&self, date: NaiveDate) -> Result<bool, GridError> {
        let grid = self.read_snapshot().await?;
        let (Some(day), Some(last)) = (grid.day(date), grid.columns().len().checked_sub(1)) else {
            return Ok(false);
        };
        for table_id in table_ids() {
            if let Some(row) = day.sheet_row(table_id) {
                self.store
                    .write_range(row, FIRST_SLOT_COLUMN, FIRST_SLOT_COLUMN + last, BLOCKED_MARKER)
                    .await?;
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{blank_sheet, operating_columns, MemoryGridStore};

    fn t(s: &str) -> SlotTime {
        s.parse().unwrap()
    }

    fn schedule_for(date: NaiveDate) -> (Arc<MemoryGridStore>, Schedule) {
        let store = Arc::new(MemoryGridStore::new(blank_sheet(&[date], &operating_columns())));
        let schedule = Schedule::new(store.clone());
        (store, schedule)
    }

    #[tokio::test]
    async fn stamp_and_clear_exact_range() {
        let date = Local::now().date_naive();
        let (_store, schedule) = schedule_for(date);

        assert!(schedule.write_cells(date, 2, t("22:00"), t("01:00"), "Ann\n+7").await.unwrap());
        let grid = schedule.read_snapshot().await.unwrap();
        let day = grid.day(date).unwrap();
        let occupied: Vec<String> = grid
            .columns()
            .iter()
            .enumerate()
            .filter(|(c, _)| !day.cell(2, *c).unwrap().is_free())
            .map(|(_, l)| l.unwrap().to_string())
            .collect();
        assert_eq!(occupied, vec!["22:00", "23:00", "00:00"]);
        let c = grid.column_of(t("23:00")).unwrap();
        assert_eq!(day.cell(2, c), Some(&Cell::Occupied("Ann\n+7".into())));
        assert!(day.cell(1, c).unwrap().is_free());

        assert!(schedule.clear_cells(date, 2, t("22:00"), t("01:00")).await.unwrap());
        let grid = schedule.read_snapshot().await.unwrap();
        let day = grid.day(date).unwrap();
        assert!((0..grid.columns().len()).all(|c| day.cell(2, c).unwrap().is_free()));
    }

    #[tokio::test]
    async fn unknown_addresses_fail_soft() {
        let date = Local::now().date_naive();
        let (store, schedule) = schedule_for(date);
        let before = store.read_rows().await.unwrap();

        let other = date.succ_opt().unwrap();
        assert!(!schedule.write_cells(other, 1, t("19:00"), t("20:00"), "x").await.unwrap());
        assert!(!schedule.write_cells(date, 1, t("09:00"), t("10:00"), "x").await.unwrap());
        assert!(!schedule.write_cells(date, 5, t("19:00"), t("20:00"), "x").await.unwrap());
        assert_eq!(store.read_rows().await.unwrap(), before);
    }

    #[tokio::test]
    async fn clearing_keeps_blocked_cells() {
        let date = Local::now().date_naive();
        let (store, schedule) = schedule_for(date);
        assert!(schedule.write_cells(date, 1, t("19:00"), t("23:00"), "Ann\n+7").await.unwrap());
        let col = |time: &str| FIRST_SLOT_COLUMN + operating_columns().iter().position(|c| *c == t(time)).unwrap();
        store.write_range(1, col("20:00"), col("20:00"), BLOCKED_MARKER).await.unwrap();
        store.write_range(1, col("22:00"), col("22:00"), "BLOCKED").await.unwrap();

        assert!(schedule.clear_cells(date, 1, t("19:00"), t("23:00")).await.unwrap());
        let rows = store.read_rows().await.unwrap();
        let cells: Vec<&str> = ["19:00", "20:00", "21:00", "22:00"]
            .iter()
            .map(|time| rows[1][col(time)].as_str())
            .collect();
        assert_eq!(cells, vec!["", "blocked", "", "BLOCKED"]);
    }

    #[tokio::test]
    async fn blocked_day_has_no_free_cells() {
        let date = Local::now().date_naive();
        let (_store, schedule) = schedule_for(date);
        assert!(schedule.block_day(date).await.unwrap());
        let grid = schedule.read_snapshot().await.unwrap();
        let day = grid.day(date).unwrap();
        for table in table_ids() {
            assert!(day.table_row(table).unwrap().iter().all(|c| *c == Cell::Blocked));
        }
    }
}
