use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::ledger::Ledger;
use crate::observability;
use crate::session::SessionStore;

/// Background task that marks past reservations completed. The first tick
/// fires immediately, so a restart catches up on missed days.
pub async fn run_status_sweeper(ledger: Arc<Ledger>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match ledger.update_past_bookings_status().await {
            Ok(0) => debug!("status sweep: nothing to complete"),
            Ok(n) => {
                metrics::counter!(observability::SWEEP_COMPLETED_TOTAL).increment(n as u64);
                info!("status sweep completed {n} reservations");
            }
            Err(e) => warn!("status sweep failed: {e}"),
        }
    }
}

/// Background task that drops idle dialogue sessions.
pub async fn run_session_reaper(sessions: Arc<SessionStore>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let removed = sessions.expire_idle();
        if removed > 0 {
            debug!("reaped {removed} idle sessions");
        }
    }
}

/// Background task that compacts the WAL once enough appends pile up.
pub async fn run_compactor(ledger: Arc<Ledger>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        if compact_if_due(&ledger, threshold).await {
            info!("WAL compacted");
        }
    }
}

async fn compact_if_due(ledger: &Ledger, threshold: u64) -> bool {
    if ledger.wal_appends_since_compact().await < threshold {
        return false;
    }
    match ledger.compact_wal().await {
        Ok(()) => true,
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use chrono::{Days, Local};
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("tablebook_test_reaper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn draft(date: chrono::NaiveDate, phone: &str) -> ReservationDraft {
        ReservationDraft {
            table_id: 1,
            client_name: "Ann".into(),
            client_phone: phone.into(),
            booking_date: date,
            start_time: "19:00".parse().unwrap(),
            end_time: "21:00".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn sweeper_completes_past_bookings_on_first_tick() {
        let path = test_wal_path("sweeper_first_tick.wal");
        let ledger = Arc::new(Ledger::open(path).unwrap());
        let today = Local::now().date_naive();
        let past = ledger
            .create_reservation(draft(today - Days::new(2), "+1"))
            .await
            .unwrap();
        let upcoming = ledger
            .create_reservation(draft(today + Days::new(1), "+2"))
            .await
            .unwrap();

        let task = tokio::spawn(run_status_sweeper(ledger.clone(), Duration::from_secs(3600)));
        for _ in 0..100 {
            if ledger.get(past.id).unwrap().status == ReservationStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        task.abort();

        assert_eq!(ledger.get(past.id).unwrap().status, ReservationStatus::Completed);
        assert_eq!(ledger.get(upcoming.id).unwrap().status, ReservationStatus::Active);
    }

    #[tokio::test]
    async fn compaction_waits_for_threshold() {
        let path = test_wal_path("compact_threshold.wal");
        let ledger = Ledger::open(path).unwrap();
        let today = Local::now().date_naive();
        ledger.create_reservation(draft(today, "+1")).await.unwrap();

        assert!(!compact_if_due(&ledger, 5).await);
        assert!(compact_if_due(&ledger, 1).await);
        assert_eq!(ledger.wal_appends_since_compact().await, 0);
        assert_eq!(ledger.reservation_count(), 1);
    }
}
