use ulid::Ulid;

use crate::model::{ReservationStatus, SlotTime, TableId};

#[derive(Debug)]
pub enum LedgerError {
    NotFound(Ulid),
    /// Overlaps the given active reservation on the same table and date.
    Conflict(Ulid),
    PhoneTaken(String),
    InvalidTable(TableId),
    InvalidSpan {
        start: SlotTime,
        end: SlotTime,
    },
    InvalidTransition {
        id: Ulid,
        from: ReservationStatus,
        to: ReservationStatus,
    },
    InvalidInput(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::NotFound(id) => write!(f, "not found: {id}"),
            LedgerError::Conflict(id) => write!(f, "conflict with reservation: {id}"),
            LedgerError::PhoneTaken(phone) => write!(f, "phone already registered: {phone}"),
            LedgerError::InvalidTable(id) => write!(f, "no such table: {id}"),
            LedgerError::InvalidSpan { start, end } => {
                write!(f, "invalid time range [{start}, {end})")
            }
            LedgerError::InvalidTransition { id, from, to } => {
                write!(f, "reservation {id} cannot go from {from} to {to}")
            }
            LedgerError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            LedgerError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            LedgerError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for LedgerError {}
