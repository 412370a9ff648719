use chrono::{Local, NaiveDate, Utc};
use tokio::sync::oneshot;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, validate_draft};
use super::{Ledger, LedgerError, WalCommand};

impl Ledger {
    /// Insert an active reservation. The overlap check and the insert share
    /// the table-day write lock, so concurrent overlapping creates resolve to
    /// exactly one success and `Conflict` for the rest.
    pub async fn create_reservation(
        &self,
        draft: ReservationDraft,
    ) -> Result<Reservation, LedgerError> {
        let span = validate_draft(&draft)?;
        if self.reservations.len() >= MAX_RESERVATIONS {
            return Err(LedgerError::LimitExceeded("too many reservations"));
        }

        let day = self.table_day(DayKey {
            table_id: draft.table_id,
            date: draft.booking_date,
        });
        let mut guard = day.write().await;
        check_no_conflict(&guard, &span, None)?;

        let reservation = Reservation {
            id: Ulid::new(),
            table_id: draft.table_id,
            client_name: draft.client_name,
            client_phone: draft.client_phone,
            booking_date: draft.booking_date,
            start_time: draft.start_time,
            end_time: draft.end_time,
            created_at: Utc::now(),
            status: ReservationStatus::Active,
        };
        let event = Event::ReservationCreated {
            reservation: reservation.clone(),
        };
        self.persist_and_apply(Some(&mut guard), &event).await?;
        Ok(reservation)
    }

    /// Move a reservation to `status`. `Ok(None)` for an unknown id; setting
    /// the current status again is a no-op. Only `active` may be left.
    pub async fn set_status(
        &self,
        id: Ulid,
        status: ReservationStatus,
    ) -> Result<Option<Reservation>, LedgerError> {
        Ok(self.transition(id, status).await?.map(|(r, _)| r))
    }

    /// Returns the reservation after the call and whether it changed.
    async fn transition(
        &self,
        id: Ulid,
        to: ReservationStatus,
    ) -> Result<Option<(Reservation, bool)>, LedgerError> {
        let Some(key) = self.reservations.get(&id).map(|r| r.day_key()) else {
            return Ok(None);
        };
        let day = self.table_day(key);
        let mut guard = day.write().await;

        // Re-read under the lock: another transition may have won the race.
        let Some(current) = self.get(id) else {
            return Ok(None);
        };
        if current.status == to {
            return Ok(Some((current, false)));
        }
        if !current.status.is_active() {
            return Err(LedgerError::InvalidTransition {
                id,
                from: current.status,
                to,
            });
        }
        if to.is_active() {
            check_no_conflict(&guard, &current.span(), Some(id))?;
        }

        let event = Event::ReservationStatusChanged { id, status: to };
        self.persist_and_apply(Some(&mut guard), &event).await?;
        let updated = Reservation { status: to, ..current };
        Ok(Some((updated, true)))
    }

    /// Mark every active reservation dated before today (venue local time)
    /// as completed. Returns how many changed.
    pub async fn update_past_bookings_status(&self) -> Result<usize, LedgerError> {
        self.complete_bookings_before(Local::now().date_naive()).await
    }

    /// Sweep body with an explicit "today". Never runs concurrently with
    /// itself; rerunning with the same day changes nothing.
    pub async fn complete_bookings_before(&self, today: NaiveDate) -> Result<usize, LedgerError> {
        let _sweep = self.sweep_lock.lock().await;

        let due: Vec<Ulid> = self
            .reservations
            .iter()
            .filter(|r| r.status.is_active() && r.booking_date < today)
            .map(|r| r.id)
            .collect();

        let mut completed = 0;
        for id in due {
            match self.transition(id, ReservationStatus::Completed).await {
                Ok(Some((_, true))) => completed += 1,
                Ok(_) => {}
                // Cancelled between the scan and the transition.
                Err(LedgerError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        if completed > 0 {
            info!("marked {completed} past reservations completed");
        }
        Ok(completed)
    }

    /// Rewrite the WAL with only the events needed to recreate current state.
    pub async fn compact_wal(&self) -> Result<(), LedgerError> {
        let _gate = self.compaction_gate.write().await;
        let mut events: Vec<Event> = self
            .clients
            .iter()
            .map(|c| Event::ClientCreated {
                client: c.value().clone(),
            })
            .collect();
        let mut reservations: Vec<Reservation> =
            self.reservations.iter().map(|r| r.value().clone()).collect();
        reservations.sort_by_key(|r| r.id);
        events.extend(
            reservations
                .into_iter()
                .map(|reservation| Event::ReservationCreated { reservation }),
        );

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| LedgerError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| LedgerError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| LedgerError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
