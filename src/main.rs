use std::sync::Arc;

use chrono::{Days, Local, NaiveDate};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use tablebook::config::Config;
use tablebook::grid::{self, JsonFileGridStore, Schedule};
use tablebook::ledger::Ledger;
use tablebook::orchestrator::BookingService;
use tablebook::session::SessionStore;
use tablebook::{reaper, wire};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    tablebook::observability::init(config.metrics_port);

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let ledger = Arc::new(Ledger::open(config.wal_path())?);
    info!("ledger loaded: {} reservations", ledger.reservation_count());

    let grid_store = Arc::new(JsonFileGridStore::new(config.grid_path.clone()));
    let today = Local::now().date_naive();
    let dates: Vec<NaiveDate> = (0..config.grid_days as u64)
        .filter_map(|d| today.checked_add_days(Days::new(d)))
        .collect();
    grid_store
        .create_if_missing(&grid::blank_sheet(&dates, &grid::operating_columns()))
        .await?;

    let service = Arc::new(BookingService::new(ledger.clone(), Schedule::new(grid_store)));
    let sessions = Arc::new(SessionStore::new(config.session_ttl));
    let ctx = Arc::new(wire::Context {
        service,
        sessions: sessions.clone(),
        admin_token: config.admin_token.clone(),
    });

    tokio::spawn(reaper::run_status_sweeper(ledger.clone(), config.sweep_interval));
    tokio::spawn(reaper::run_session_reaper(sessions, std::time::Duration::from_secs(60)));
    tokio::spawn(reaper::run_compactor(ledger, config.compact_threshold));

    let max_connections = config.max_connections;
    let semaphore = Arc::new(Semaphore::new(max_connections));

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("tablebook listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  grid: {}", config.grid_path.display());
    info!("  max_connections: {max_connections}");
    info!("  admin: {}", if config.admin_token.is_some() { "enabled" } else { "disabled" });
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(tablebook::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(tablebook::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(tablebook::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let ctx = ctx.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    if let Err(e) = wire::process_connection(socket, ctx).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(tablebook::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    // Wait for in-flight connections to finish (up to 10s)
    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    info!("tablebook stopped");
    Ok(())
}
