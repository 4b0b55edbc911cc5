mod batch;
mod core;
mod server;
mod store;
mod trial;

pub use crate::batch::{
    BatchOptions, BatchReport, BatchStatistics, Finding, Orchestrator, PairOutcome, RowTargeting,
    TrialRecord,
};
pub use crate::core::errors::{Error, Result};
pub use crate::core::lock_stats::LockStatsSnapshot;
pub use crate::server::{router, start_server, AppState};
pub use crate::store::{Connection, IsolationLevel, MenuId, MenuItem, MenuStore, StoreOptions};
pub use crate::trial::{run_trial, Scenario, TrialOutcome, TrialReport, TrialSpec};
