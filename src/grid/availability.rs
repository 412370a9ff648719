//! Availability queries over a parsed [`SlotGrid`].
//!
//! Every function here is pure and total: "nothing available" is an empty
//! result, never an error.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;

use crate::model::*;

use super::snapshot::{DayBlock, SlotGrid};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableDate {
    pub date: NaiveDate,
    pub weekday: Weekday,
    pub label: String,
}

/// Dates on which at least one table has at least one free cell.
pub fn available_dates(grid: &SlotGrid) -> Vec<AvailableDate> {
    grid.days()
        .iter()
        .filter(|day| {
            table_ids().any(|t| {
                (0..grid.columns().len()).any(|c| day.cell(t, c).is_none_or(|cell| cell.is_free()))
            })
        })
        .map(|day| AvailableDate {
            date: day.date,
            weekday: day.date.weekday(),
            label: day.date.format("%d.%m.%y").to_string(),
        })
        .collect()
}

/// Bookable start labels on `date`, in grid column order. With
/// [`TablePreference::Any`] a column qualifies if any table is free there.
pub fn available_start_times(grid: &SlotGrid, date: NaiveDate, pref: TablePreference) -> Vec<SlotTime> {
    let Some(day) = grid.day(date) else {
        return Vec::new();
    };
    let tables: Vec<TableId> = match pref {
        TablePreference::Any => table_ids().collect(),
        TablePreference::Table(t) if is_valid_table(t) => vec![t],
        TablePreference::Table(_) => return Vec::new(),
    };
    grid.columns()
        .iter()
        .enumerate()
        .filter_map(|(c, label)| {
            let time = (*label)?;
            let free = time.is_bookable_start()
                && tables.iter().any(|&t| day.cell(t, c).is_some_and(|cell| cell.is_free()));
            free.then_some(time)
        })
        .collect()
}

/// Walk right from the `start` column while cells stay free, labels stay
/// contiguous and slots stay inside opening hours. Each free column yields
/// the time its slot ends.
fn walk_end_times(grid: &SlotGrid, day: &DayBlock, table_id: TableId, start: SlotTime) -> Vec<SlotTime> {
    let Some(first) = grid.column_of(start) else {
        return Vec::new();
    };
    let mut ends = Vec::new();
    let mut expected = start;
    for (c, label) in grid.columns().iter().enumerate().skip(first) {
        let Some(time) = *label else { break };
        if time != expected || !time.is_bookable_start() {
            break;
        }
        if !day.cell(table_id, c).is_some_and(|cell| cell.is_free()) {
            break;
        }
        expected = time.slot_end();
        ends.push(expected);
    }
    ends
}

/// The table offering the longest free run from `start` and that run's end
/// times. Ties go to the lowest table id; `(None, [])` if no table is free
/// at `start`.
pub fn best_table_and_end_times(
    grid: &SlotGrid,
    date: NaiveDate,
    start: SlotTime,
) -> (Option<TableId>, Vec<SlotTime>) {
    let Some(day) = grid.day(date) else {
        return (None, Vec::new());
    };
    let mut best: (Option<TableId>, Vec<SlotTime>) = (None, Vec::new());
    for t in table_ids() {
        let ends = walk_end_times(grid, day, t, start);
        if ends.len() > best.1.len() {
            best = (Some(t), ends);
        }
    }
    best
}

pub fn available_end_times_for_table(
    grid: &SlotGrid,
    date: NaiveDate,
    start: SlotTime,
    table_id: TableId,
) -> Vec<SlotTime> {
    if !is_valid_table(table_id) {
        return Vec::new();
    }
    grid.day(date)
        .map(|day| walk_end_times(grid, day, table_id, start))
        .unwrap_or_default()
}

/// Whether every cell of `[start, end)` is free for the table. `None` when
/// the range cannot be addressed on this grid.
pub fn range_is_free(
    grid: &SlotGrid,
    date: NaiveDate,
    table_id: TableId,
    start: SlotTime,
    end: SlotTime,
) -> Option<bool> {
    let day = grid.day(date)?;
    let (first, last) = grid.columns_between(start, end)?;
    day.table_row(table_id)?;
    Some((first..=last).all(|c| day.cell(table_id, c).is_some_and(|cell| cell.is_free())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{blank_sheet, operating_columns, FIRST_SLOT_COLUMN};

    fn t(s: &str) -> SlotTime {
        s.parse().unwrap()
    }

    fn labels(times: &[SlotTime]) -> Vec<String> {
        times.iter().map(|t| t.to_string()).collect()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 20).unwrap()
    }

    struct Sheet {
        rows: Vec<Vec<String>>,
    }

    impl Sheet {
        fn new() -> Self {
            Self {
                rows: blank_sheet(&[day()], &operating_columns()),
            }
        }

        fn set(&mut self, table: TableId, time: &str, value: &str) -> &mut Self {
            let col = FIRST_SLOT_COLUMN
                + operating_columns().iter().position(|c| *c == t(time)).unwrap();
            let row = &mut self.rows[table as usize];
            if row.len() <= col {
                row.resize(col + 1, String::new());
            }
            row[col] = value.to_string();
            self
        }

        fn fill(&mut self, table: TableId, from: &str, to: &str) -> &mut Self {
            let mut cur = t(from);
            while cur != t(to) {
                self.set(table, &cur.to_string(), "x");
                cur = cur.slot_end();
            }
            self
        }

        fn grid(&self) -> SlotGrid {
            SlotGrid::parse(&self.rows, today()).unwrap()
        }
    }

    #[test]
    fn end_times_stop_at_occupied_column() {
        let mut sheet = Sheet::new();
        sheet.set(1, "23:00", "Bob\n+1");
        let ends = available_end_times_for_table(&sheet.grid(), day(), t("19:00"), 1);
        assert_eq!(labels(&ends), vec!["20:00", "21:00", "22:00", "23:00"]);
    }

    #[test]
    fn end_times_stop_at_closing() {
        let grid = Sheet::new().grid();
        let ends = available_end_times_for_table(&grid, day(), t("00:00"), 2);
        assert_eq!(labels(&ends), vec!["01:00", "02:00", "03:00"]);
    }

    #[test]
    fn best_table_prefers_longest_run() {
        let mut sheet = Sheet::new();
        // Table 4 free 19..24 (5 hours), table 2 free 19..22 (3 hours), others taken at 19.
        sheet.set(1, "19:00", "x");
        sheet.set(3, "19:00", "x");
        sheet.set(2, "22:00", "x");
        sheet.set(4, "00:00", "x");
        let (table, ends) = best_table_and_end_times(&sheet.grid(), day(), t("19:00"));
        assert_eq!(table, Some(4));
        assert_eq!(labels(&ends), vec!["20:00", "21:00", "22:00", "23:00", "00:00"]);
    }

    #[test]
    fn best_table_ties_go_to_lowest_id() {
        let mut sheet = Sheet::new();
        sheet.set(1, "19:00", "x");
        sheet.set(2, "22:00", "x");
        sheet.set(3, "22:00", "x");
        sheet.set(4, "20:00", "x");
        let (table, ends) = best_table_and_end_times(&sheet.grid(), day(), t("19:00"));
        assert_eq!(table, Some(2));
        assert_eq!(ends.len(), 3);
    }

    #[test]
    fn best_table_none_when_all_taken() {
        let mut sheet = Sheet::new();
        for table in table_ids() {
            sheet.set(table, "19:00", "blocked");
        }
        assert_eq!(best_table_and_end_times(&sheet.grid(), day(), t("19:00")), (None, vec![]));
        let unknown = NaiveDate::from_ymd_opt(2027, 1, 1).unwrap();
        assert_eq!(best_table_and_end_times(&sheet.grid(), unknown, t("19:00")), (None, vec![]));
    }

    #[test]
    fn start_times_respect_preference() {
        let mut sheet = Sheet::new();
        sheet.fill(1, "12:00", "03:00");
        sheet.set(2, "13:00", "x");
        let grid = sheet.grid();

        assert!(available_start_times(&grid, day(), TablePreference::Table(1)).is_empty());
        let two = available_start_times(&grid, day(), TablePreference::Table(2));
        assert_eq!(two.len(), 14);
        assert!(!two.contains(&t("13:00")));
        let any = available_start_times(&grid, day(), TablePreference::Any);
        assert_eq!(labels(&any).first().map(String::as_str), Some("12:00"));
        assert_eq!(labels(&any).last().map(String::as_str), Some("02:00"));
        assert!(available_start_times(&grid, day(), TablePreference::Table(9)).is_empty());
    }

    #[test]
    fn start_times_skip_columns_outside_opening_hours() {
        let rows = vec![
            vec!["date", "table", "10:00", "11:00", "12:00", "02:00", "03:00"],
            vec!["20.10.26", "leopard"],
            vec!["", "blue"],
            vec!["", "green"],
            vec!["", "red"],
        ]
        .into_iter()
        .map(|r| r.into_iter().map(String::from).collect())
        .collect::<Vec<Vec<String>>>();
        let grid = SlotGrid::parse(&rows, today()).unwrap();
        let starts = available_start_times(&grid, day(), TablePreference::Any);
        assert_eq!(labels(&starts), vec!["12:00", "02:00"]);
    }

    #[test]
    fn dates_with_any_free_cell() {
        let second = day().succ_opt().unwrap();
        let mut rows = blank_sheet(&[day(), second], &operating_columns());
        for row in rows.iter_mut().skip(1).take(TABLE_COUNT) {
            row.resize(FIRST_SLOT_COLUMN + operating_columns().len(), "blocked".into());
        }
        let grid = SlotGrid::parse(&rows, today()).unwrap();
        let dates = available_dates(&grid);
        assert_eq!(dates.len(), 1);
        assert_eq!(dates[0].date, second);
        assert_eq!(dates[0].weekday, Weekday::Wed);
        assert_eq!(dates[0].label, "21.10.26");
    }

    #[test]
    fn range_check() {
        let mut sheet = Sheet::new();
        sheet.set(3, "21:00", "x");
        let grid = sheet.grid();
        assert_eq!(range_is_free(&grid, day(), 3, t("19:00"), t("21:00")), Some(true));
        assert_eq!(range_is_free(&grid, day(), 3, t("20:00"), t("22:00")), Some(false));
        assert_eq!(range_is_free(&grid, day(), 3, t("20:00"), t("05:00")), None);
        assert_eq!(range_is_free(&grid, day(), 7, t("19:00"), t("21:00")), None);
    }
}
