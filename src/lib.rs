pub mod config;
pub mod grid;
pub mod ledger;
pub mod limits;
pub mod model;
pub mod observability;
pub mod orchestrator;
pub mod reaper;
pub mod session;
pub mod wal;
pub mod wire;
