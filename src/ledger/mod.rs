mod clients;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use conflict::validate_span;
pub use error::LedgerError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedTableDay = Arc<RwLock<TableDay>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends.
/// 4. One flush_sync for the whole batch, then answer every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        respond_batch(batch, &result);

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so partially buffered bytes don't
    // leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match append_err.or(flush_err) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The authoritative store of reservations and clients.
///
/// Reservations are indexed twice: by id for lookups and listings, and per
/// table-day (active ones only) for conflict checks. The table-day write lock
/// is the consistency boundary: the overlap check and the insert both happen
/// under it.
pub struct Ledger {
    reservations: DashMap<Ulid, Reservation>,
    days: DashMap<DayKey, SharedTableDay>,
    clients: DashMap<Ulid, Client>,
    phone_index: DashMap<String, Ulid>,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Serialises phone-uniqueness check + client insert.
    client_lock: Mutex<()>,
    /// Keeps the completed-status sweep from overlapping with itself.
    sweep_lock: Mutex<()>,
    /// Shared by every append+apply, exclusive while compaction snapshots
    /// state, so a compacted log never misses an acknowledged event.
    compaction_gate: RwLock<()>,
}

impl Ledger {
    /// Replay the WAL at `wal_path` and start the group-commit writer.
    /// Must be called inside a tokio runtime.
    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let ledger = Self {
            reservations: DashMap::new(),
            days: DashMap::new(),
            clients: DashMap::new(),
            phone_index: DashMap::new(),
            wal_tx,
            client_lock: Mutex::new(()),
            sweep_lock: Mutex::new(()),
            compaction_gate: RwLock::new(()),
        };

        // Sole owner of every lock here, so try_write always succeeds. Never
        // block_on: this may run inside an async context.
        for event in &events {
            match ledger.event_day_key(event) {
                Some(key) => {
                    let day = ledger.table_day(key);
                    let mut guard = day
                        .try_write()
                        .map_err(|_| io::Error::other("replay: table-day lock contended"))?;
                    ledger.apply(Some(&mut guard), event);
                }
                None => ledger.apply(None, event),
            }
        }
        tracing::debug!(
            "ledger replayed {} events ({} reservations, {} clients)",
            events.len(),
            ledger.reservations.len(),
            ledger.clients.len()
        );

        Ok(ledger)
    }

    /// Get or create the lock cell for one table on one date.
    pub(super) fn table_day(&self, key: DayKey) -> SharedTableDay {
        self.days
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(TableDay::new(key))))
            .clone()
    }

    fn event_day_key(&self, event: &Event) -> Option<DayKey> {
        match event {
            Event::ReservationCreated { reservation } => Some(reservation.day_key()),
            Event::ReservationStatusChanged { id, .. } => {
                self.reservations.get(id).map(|r| r.day_key())
            }
            Event::ClientCreated { .. } | Event::ClientVisited { .. } => None,
        }
    }

    /// Apply an event to the indexes. Reservation events need the matching
    /// table-day, locked by the caller.
    fn apply(&self, day: Option<&mut TableDay>, event: &Event) {
        match event {
            Event::ReservationCreated { reservation } => {
                if reservation.status.is_active()
                    && let Some(day) = day
                {
                    day.insert_booked(Booked {
                        id: reservation.id,
                        span: reservation.span(),
                    });
                }
                self.reservations.insert(reservation.id, reservation.clone());
            }
            Event::ReservationStatusChanged { id, status } => {
                let Some(mut entry) = self.reservations.get_mut(id) else {
                    return;
                };
                let was_active = entry.status.is_active();
                entry.status = *status;
                let span = entry.span();
                drop(entry);
                if let Some(day) = day {
                    if was_active && !status.is_active() {
                        day.remove_booked(*id);
                    } else if !was_active && status.is_active() {
                        day.insert_booked(Booked { id: *id, span });
                    }
                }
            }
            Event::ClientCreated { client } => {
                self.phone_index.insert(client.phone.clone(), client.id);
                self.clients.insert(client.id, client.clone());
            }
            Event::ClientVisited { id, visit_date } => {
                if let Some(mut client) = self.clients.get_mut(id) {
                    client.visit_date = *visit_date;
                }
            }
        }
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), LedgerError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| LedgerError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| LedgerError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| LedgerError::WalError(e.to_string()))
    }

    /// WAL-append, then apply. Nothing is applied if the append fails.
    pub(super) async fn persist_and_apply(
        &self,
        day: Option<&mut TableDay>,
        event: &Event,
    ) -> Result<(), LedgerError> {
        let _gate = self.compaction_gate.read().await;
        self.wal_append(event).await?;
        self.apply(day, event);
        Ok(())
    }
}
