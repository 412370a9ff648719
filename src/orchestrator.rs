//! Booking workflow on top of the ledger, client registry and schedule grid.
//!
//! The ledger is authoritative. The grid is consulted before a commit as a
//! fast pre-check and written after it as a mirror; neither grid step can
//! undo or block a ledger outcome on its own except an explicitly taken cell.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::grid::{self, AvailableDate, GridError, Schedule, SlotGrid};
use crate::ledger::{validate_span, Ledger, LedgerError};
use crate::model::*;
use crate::observability;

/// What a caller is allowed to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// A guest, identified by phone once known.
    Guest { phone: Option<String> },
    Admin,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    fn guest_phone(&self) -> Option<&str> {
        match self {
            Role::Guest { phone } => phone.as_deref(),
            Role::Admin => None,
        }
    }
}

/// A reservation being assembled field by field over a dialogue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationIntent {
    pub date: Option<NaiveDate>,
    pub table_preference: TablePreference,
    /// Concrete table once chosen; wins over `table_preference`.
    pub table_id: Option<TableId>,
    pub start_time: Option<SlotTime>,
    pub end_time: Option<SlotTime>,
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
}

/// Partial update to an intent; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IntentUpdate {
    pub date: Option<NaiveDate>,
    pub table_preference: Option<TablePreference>,
    pub table_id: Option<TableId>,
    pub start_time: Option<SlotTime>,
    pub end_time: Option<SlotTime>,
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
}

impl ReservationIntent {
    pub fn apply(&mut self, update: IntentUpdate) {
        if let Some(date) = update.date {
            self.date = Some(date);
        }
        if let Some(pref) = update.table_preference {
            self.table_preference = pref;
            // An explicit preference change drops a previously chosen table.
            self.table_id = None;
        }
        if let Some(table) = update.table_id {
            self.table_id = Some(table);
        }
        if let Some(start) = update.start_time {
            self.start_time = Some(start);
        }
        if let Some(end) = update.end_time {
            self.end_time = Some(end);
        }
        if let Some(name) = update.client_name {
            self.client_name = Some(name);
        }
        if let Some(phone) = update.client_phone {
            self.client_phone = Some(phone);
        }
    }
}

#[derive(Debug)]
pub enum BookingError {
    Forbidden(&'static str),
    /// A required intent field is missing.
    Incomplete(&'static str),
    Invalid(String),
    SlotTaken,
    NotActive(Ulid),
    Ledger(LedgerError),
    Grid(GridError),
}

impl BookingError {
    /// Stable error kind for callers.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::Forbidden(_) => "forbidden",
            BookingError::Incomplete(_) => "incomplete",
            BookingError::Invalid(_) => "invalid",
            BookingError::SlotTaken => "slot_taken",
            BookingError::NotActive(_) => "not_active",
            BookingError::Ledger(_) | BookingError::Grid(_) => "unavailable",
        }
    }

    /// Message safe to show a caller; infrastructure detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            BookingError::Ledger(_) | BookingError::Grid(_) => {
                "booking service temporarily unavailable".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::Forbidden(what) => write!(f, "not allowed: {what}"),
            BookingError::Incomplete(field) => write!(f, "missing {field}"),
            BookingError::Invalid(reason) => write!(f, "invalid request: {reason}"),
            BookingError::SlotTaken => write!(f, "the requested time is already taken"),
            BookingError::NotActive(id) => write!(f, "reservation {id} is not active"),
            BookingError::Ledger(e) => write!(f, "{e}"),
            BookingError::Grid(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for BookingError {}

impl From<LedgerError> for BookingError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Conflict(_) => BookingError::SlotTaken,
            LedgerError::InvalidTransition { id, .. } => BookingError::NotActive(id),
            LedgerError::WalError(_) => BookingError::Ledger(e),
            other => BookingError::Invalid(other.to_string()),
        }
    }
}

impl From<GridError> for BookingError {
    fn from(e: GridError) -> Self {
        BookingError::Grid(e)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitOutcome {
    pub reservation: Reservation,
    /// Whether the schedule grid now shows the booking.
    pub mirrored: bool,
}

/// The validated, table-resolved form of an intent.
struct Request {
    date: NaiveDate,
    start: SlotTime,
    end: SlotTime,
    name: String,
    phone: String,
}

pub struct BookingService {
    ledger: Arc<Ledger>,
    schedule: Schedule,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

impl BookingService {
    pub fn new(ledger: Arc<Ledger>, schedule: Schedule) -> Self {
        Self { ledger, schedule }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn tables(&self) -> Vec<TableInfo> {
        self.ledger.list_tables()
    }

    // ── Availability ────────────────────────────────────────────

    /// Dates from today on with at least one free cell.
    pub async fn available_dates(&self) -> Result<Vec<AvailableDate>, BookingError> {
        let grid = self.schedule.read_snapshot().await?;
        let today = today();
        Ok(grid::available_dates(&grid)
            .into_iter()
            .filter(|d| d.date >= today)
            .collect())
    }

    pub async fn available_start_times(
        &self,
        date: NaiveDate,
        pref: TablePreference,
    ) -> Result<Vec<SlotTime>, BookingError> {
        if let TablePreference::Table(t) = pref
            && !is_valid_table(t)
        {
            return Err(BookingError::Invalid(format!("no such table: {t}")));
        }
        let grid = self.schedule.read_snapshot().await?;
        Ok(grid::available_start_times(&grid, date, pref))
    }

    pub async fn best_table_and_end_times(
        &self,
        date: NaiveDate,
        start: SlotTime,
    ) -> Result<(Option<TableId>, Vec<SlotTime>), BookingError> {
        let grid = self.schedule.read_snapshot().await?;
        Ok(grid::best_table_and_end_times(&grid, date, start))
    }

    pub async fn end_times_for_table(
        &self,
        date: NaiveDate,
        start: SlotTime,
        table_id: TableId,
    ) -> Result<Vec<SlotTime>, BookingError> {
        if !is_valid_table(table_id) {
            return Err(BookingError::Invalid(format!("no such table: {table_id}")));
        }
        let grid = self.schedule.read_snapshot().await?;
        Ok(grid::available_end_times_for_table(&grid, date, start, table_id))
    }

    // ── Commit ──────────────────────────────────────────────────

    /// Turn a complete intent into an active reservation.
    pub async fn commit_booking(
        &self,
        role: &Role,
        intent: &ReservationIntent,
    ) -> Result<CommitOutcome, BookingError> {
        let req = validate_intent(role, intent)?;

        let grid = match self.schedule.read_snapshot().await {
            Ok(grid) => Some(grid),
            Err(e) => {
                warn!("grid pre-check skipped: {e}");
                None
            }
        };

        let table_id = match intent.table_id {
            Some(t) => t,
            None => match intent.table_preference {
                TablePreference::Table(t) => t,
                TablePreference::Any => self.resolve_any_table(grid.as_ref(), &req).await?,
            },
        };
        if !is_valid_table(table_id) {
            return Err(BookingError::Invalid(format!("no such table: {table_id}")));
        }

        if let Some(grid) = &grid
            && grid::range_is_free(grid, req.date, table_id, req.start, req.end) == Some(false)
        {
            metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(BookingError::SlotTaken);
        }

        self.ledger.record_visit(&req.name, &req.phone, req.date).await?;

        let draft = ReservationDraft {
            table_id,
            client_name: req.name,
            client_phone: req.phone,
            booking_date: req.date,
            start_time: req.start,
            end_time: req.end,
        };
        let reservation = match self.ledger.create_reservation(draft).await {
            Ok(r) => r,
            Err(e @ LedgerError::Conflict(_)) => {
                metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };
        metrics::counter!(observability::BOOKINGS_COMMITTED_TOTAL).increment(1);
        info!(
            "reservation {} committed: table {} on {} {}-{}",
            reservation.id,
            reservation.table_id,
            reservation.booking_date,
            reservation.start_time,
            reservation.end_time
        );

        let mirrored = self
            .mirror(&reservation, Some(reservation.grid_label().as_str()))
            .await;
        Ok(CommitOutcome {
            reservation,
            mirrored,
        })
    }

    /// Pick a table for an `Any` preference: the best table when it covers the
    /// requested end, else the lowest table whose run does. Without a grid
    /// the ledger decides.
    async fn resolve_any_table(
        &self,
        grid: Option<&SlotGrid>,
        req: &Request,
    ) -> Result<TableId, BookingError> {
        if let Some(grid) = grid {
            let (best, ends) = grid::best_table_and_end_times(grid, req.date, req.start);
            if let Some(best) = best
                && ends.contains(&req.end)
            {
                return Ok(best);
            }
            return table_ids()
                .find(|&t| {
                    grid::available_end_times_for_table(grid, req.date, req.start, t)
                        .contains(&req.end)
                })
                .ok_or(BookingError::SlotTaken);
        }
        for t in table_ids() {
            if self
                .ledger
                .is_table_free(t, req.date, req.start, req.end, None)
                .await
            {
                return Ok(t);
            }
        }
        Err(BookingError::SlotTaken)
    }

    /// Write (or with `None`, clear) the reservation's cells. Never fails the
    /// caller; returns whether the grid reflects the change.
    async fn mirror(&self, r: &Reservation, value: Option<&str>) -> bool {
        let result = match value {
            Some(v) => {
                self.schedule
                    .write_cells(r.booking_date, r.table_id, r.start_time, r.end_time, v)
                    .await
            }
            None => {
                self.schedule
                    .clear_cells(r.booking_date, r.table_id, r.start_time, r.end_time)
                    .await
            }
        };
        match result {
            Ok(true) => true,
            Ok(false) => {
                warn!("reservation {}: no grid cells for {} {}-{}", r.id, r.booking_date, r.start_time, r.end_time);
                metrics::counter!(observability::GRID_MIRROR_FAILURES_TOTAL).increment(1);
                false
            }
            Err(e) => {
                warn!("reservation {}: grid mirror failed: {e}", r.id);
                metrics::counter!(observability::GRID_MIRROR_FAILURES_TOTAL).increment(1);
                false
            }
        }
    }

    // ── Cancel, list, block ─────────────────────────────────────

    /// Cancel an active reservation. `Ok(None)` for an unknown id. Guests may
    /// only cancel reservations made under their own phone.
    pub async fn cancel_booking(
        &self,
        role: &Role,
        id: Ulid,
    ) -> Result<Option<Reservation>, BookingError> {
        let Some(reservation) = self.ledger.get(id) else {
            return Ok(None);
        };
        if !role.is_admin() && role.guest_phone() != Some(reservation.client_phone.as_str()) {
            return Err(BookingError::Forbidden("cancel another client's reservation"));
        }
        if !reservation.status.is_active() {
            return Err(BookingError::NotActive(id));
        }

        self.mirror(&reservation, None).await;
        let cancelled = self
            .ledger
            .set_status(id, ReservationStatus::Cancelled)
            .await?;
        if cancelled.is_some() {
            metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
            info!("reservation {id} cancelled");
        }
        Ok(cancelled)
    }

    /// Admins see everything matching `filter`; guests only their own.
    pub fn list_bookings(
        &self,
        role: &Role,
        mut filter: BookingFilter,
    ) -> Result<Vec<Reservation>, BookingError> {
        match role {
            Role::Admin => {}
            Role::Guest { phone: Some(phone) } => filter.client_phone = Some(phone.clone()),
            Role::Guest { phone: None } => return Err(BookingError::Incomplete("phone")),
        }
        Ok(self.ledger.list(&filter))
    }

    /// Close a whole date on the schedule. Existing reservations are untouched.
    pub async fn block_day(&self, role: &Role, date: NaiveDate) -> Result<bool, BookingError> {
        if !role.is_admin() {
            return Err(BookingError::Forbidden("block a day"));
        }
        let blocked = self.schedule.block_day(date).await?;
        if blocked {
            info!("day {date} blocked");
        } else {
            debug!("day {date} not on the schedule, nothing blocked");
        }
        Ok(blocked)
    }
}

fn validate_intent(role: &Role, intent: &ReservationIntent) -> Result<Request, BookingError> {
    let date = intent.date.ok_or(BookingError::Incomplete("date"))?;
    let start = intent.start_time.ok_or(BookingError::Incomplete("start_time"))?;
    let end = intent.end_time.ok_or(BookingError::Incomplete("end_time"))?;
    let name = intent
        .client_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(BookingError::Incomplete("client_name"))?;
    let phone = intent
        .client_phone
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(BookingError::Incomplete("client_phone"))?;

    if let Some(own) = role.guest_phone()
        && own != phone
    {
        return Err(BookingError::Forbidden("book for another client"));
    }
    if date < today() {
        return Err(BookingError::Invalid(format!("{date} is in the past")));
    }
    validate_span(start, end)?;

    Ok(Request {
        date,
        start,
        end,
        name: name.to_string(),
        phone: phone.to_string(),
    })
}
