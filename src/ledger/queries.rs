use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::Ledger;

impl Ledger {
    pub fn get(&self, id: Ulid) -> Option<Reservation> {
        self.reservations.get(&id).map(|r| r.value().clone())
    }

    /// Reservations matching every provided field of `filter`, ordered by
    /// date then start time (venue order, so after-midnight starts sort last).
    pub fn list(&self, filter: &BookingFilter) -> Vec<Reservation> {
        let mut out: Vec<Reservation> = self
            .reservations
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        out.sort_by(|a, b| {
            (a.booking_date, a.start_time, a.table_id, a.created_at)
                .cmp(&(b.booking_date, b.start_time, b.table_id, b.created_at))
        });
        out.truncate(MAX_LIST_RESULTS);
        out
    }

    /// True iff no active reservation on `table_id`/`date` overlaps
    /// `[start, end)`, ignoring `exclude` (the reservation being edited).
    /// A backwards or empty range is never free.
    pub async fn is_table_free(
        &self,
        table_id: TableId,
        date: NaiveDate,
        start: SlotTime,
        end: SlotTime,
        exclude: Option<Ulid>,
    ) -> bool {
        let Some(span) = Span::from_times(start, end) else {
            return false;
        };
        let Some(day) = self.days.get(&DayKey { table_id, date }).map(|d| d.value().clone()) else {
            return true;
        };
        let guard = day.read().await;
        guard.overlapping(&span).all(|b| Some(b.id) == exclude)
    }

    pub fn list_tables(&self) -> Vec<TableInfo> {
        table_ids()
            .zip(TABLE_NAMES)
            .map(|(id, name)| TableInfo {
                id,
                name: name.to_string(),
            })
            .collect()
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }
}
