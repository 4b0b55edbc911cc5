use tracing::{debug, error, warn};

use crate::core::errors::{Error, Result};
use crate::store::{Connection, IsolationLevel, MenuId, MenuStore};

use super::{Scenario, TrialOutcome, TrialReport};

const DIRTY_READ_DELTA: f64 = 10.0;
const NON_REPEATABLE_READ_DELTA: f64 = 15.0;
const LOST_UPDATE_T1_DELTA: f64 = 5.0;
const LOST_UPDATE_T2_DELTA: f64 = 10.0;

/// What to run: a scenario, an isolation level, and a target row.
#[derive(Debug, Clone, Copy)]
pub struct TrialSpec {
    pub scenario: Scenario,
    pub isolation: IsolationLevel,
    pub menu_id: MenuId,
}

impl TrialSpec {
    pub fn new(scenario: Scenario, menu_id: MenuId) -> Self {
        Self {
            scenario,
            isolation: scenario.default_isolation(),
            menu_id,
        }
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }
}

/// Run one scripted two-session trial against the store.
///
/// The target row is read up front so a missing row fails before any
/// transaction starts. Whatever the script does, cleanup rolls back both
/// sessions and restores the baseline price with an autocommit write; a
/// script error becomes a failed report rather than an `Err`, so callers
/// only see `Err` for problems outside the script itself.
pub async fn run_trial(store: &MenuStore, spec: TrialSpec) -> Result<TrialReport> {
    let baseline = store.read_committed_price(spec.menu_id).await?;
    let (mut t1, mut t2) = store.connection_pair().await?;
    t1.set_isolation(spec.isolation)?;
    t2.set_isolation(spec.isolation)?;
    debug!(
        scenario = %spec.scenario,
        isolation = %spec.isolation,
        menu_id = spec.menu_id,
        baseline,
        "starting trial"
    );

    let script = match spec.scenario {
        Scenario::DirtyRead => dirty_read(store, &mut t1, &mut t2, spec).await,
        Scenario::NonRepeatableRead => {
            non_repeatable_read(&mut t1, &mut t2, spec, baseline).await
        }
        Scenario::LostUpdate => lost_update(store, &mut t1, &mut t2, spec, baseline).await,
    };
    let cleanup = restore_row(store, &mut t1, &mut t2, spec.menu_id, baseline).await;

    match (script, cleanup) {
        (Ok(outcome), Ok(())) => Ok(TrialReport::completed(spec.scenario, outcome)),
        (Ok(outcome), Err(cleanup_err)) => {
            error!(scenario = %spec.scenario, error = %cleanup_err, "trial cleanup failed");
            Ok(TrialReport::completed_with_cleanup_warning(
                spec.scenario,
                outcome,
                &cleanup_err,
            ))
        }
        (Err(err), cleanup) => {
            if let Err(cleanup_err) = cleanup {
                error!(scenario = %spec.scenario, error = %cleanup_err, "trial cleanup failed");
            }
            if err.is_concurrency_control() {
                debug!(scenario = %spec.scenario, error = %err, "trial stopped by concurrency control");
            } else {
                warn!(scenario = %spec.scenario, error = %err, "trial script failed");
            }
            Ok(TrialReport::failed(spec.scenario, &err))
        }
    }
}

/// T2 changes the price without committing, T1 reads in between, then T2
/// rolls back.
async fn dirty_read(
    store: &MenuStore,
    t1: &mut Connection,
    t2: &mut Connection,
    spec: TrialSpec,
) -> Result<TrialOutcome> {
    let menu_id = spec.menu_id;
    t1.begin().await?;
    t2.begin().await?;

    let t1_read1 = t1.read_price(menu_id).await?;
    debug!(price = t1_read1, "T1 first read");

    t2.write_price(menu_id, t1_read1 + DIRTY_READ_DELTA).await?;
    debug!(price = t1_read1 + DIRTY_READ_DELTA, "T2 wrote without committing");

    let t1_read2 = t1.read_price(menu_id).await?;
    debug!(price = t1_read2, "T1 second read");

    t2.rollback().await?;
    t1.commit().await?;

    let final_price = store.read_committed_price(menu_id).await?;
    let occurred = t1_read1 != t1_read2 && t1_read2 != final_price;
    let description = if occurred {
        "T1 read T2's uncommitted price change, which T2 then rolled back".to_string()
    } else {
        format!(
            "{} kept T2's uncommitted price change invisible to T1",
            spec.isolation
        )
    };
    Ok(TrialOutcome::DirtyRead {
        isolation: spec.isolation,
        t1_read1,
        t1_read2,
        final_price_after_rollback: final_price,
        dirty_read_occurred: occurred,
        description,
    })
}

/// T1 reads twice while T2 commits a change in between.
async fn non_repeatable_read(
    t1: &mut Connection,
    t2: &mut Connection,
    spec: TrialSpec,
    baseline: f64,
) -> Result<TrialOutcome> {
    let menu_id = spec.menu_id;
    t1.begin().await?;
    let t1_read1 = t1.read_price(menu_id).await?;
    debug!(price = t1_read1, "T1 first read");

    t2.begin().await?;
    t2.write_price(menu_id, baseline + NON_REPEATABLE_READ_DELTA)
        .await?;
    t2.commit().await?;
    debug!(price = baseline + NON_REPEATABLE_READ_DELTA, "T2 committed a change");

    let t1_read2 = t1.read_price(menu_id).await?;
    debug!(price = t1_read2, "T1 second read");
    t1.commit().await?;

    let occurred = t1_read1 != t1_read2;
    let description = if occurred {
        "T1 read the same row twice and saw different prices after T2 committed in between"
            .to_string()
    } else {
        format!(
            "{} gave T1 a stable view despite T2's committed change",
            spec.isolation
        )
    };
    Ok(TrialOutcome::NonRepeatableRead {
        isolation: spec.isolation,
        initial_price: baseline,
        t1_read1,
        t1_read2,
        non_repeatable_read_occurred: occurred,
        description,
    })
}

/// T1 and T2 both read the starting price, then write back their own
/// increments; whether both survive depends on the isolation level.
async fn lost_update(
    store: &MenuStore,
    t1: &mut Connection,
    t2: &mut Connection,
    spec: TrialSpec,
    baseline: f64,
) -> Result<TrialOutcome> {
    let menu_id = spec.menu_id;
    t1.begin().await?;
    t2.begin().await?;

    let t1_read_price = t1.read_price(menu_id).await?;
    let t2_read_price = t2.read_price(menu_id).await?;
    debug!(t1 = t1_read_price, t2 = t2_read_price, "both sessions read");

    t1.write_price(menu_id, t1_read_price + LOST_UPDATE_T1_DELTA)
        .await?;
    t1.commit().await?;
    debug!(price = t1_read_price + LOST_UPDATE_T1_DELTA, "T1 committed its update");

    t2.write_price(menu_id, t2_read_price + LOST_UPDATE_T2_DELTA)
        .await?;
    t2.commit().await?;
    debug!(price = t2_read_price + LOST_UPDATE_T2_DELTA, "T2 committed its update");

    let final_price = store.read_committed_price(menu_id).await?;
    let expected = baseline + LOST_UPDATE_T1_DELTA + LOST_UPDATE_T2_DELTA;
    let occurred = final_price != expected;
    let description = if occurred {
        "T1 and T2 both read the starting price and wrote back increments; T2's commit overwrote T1's update".to_string()
    } else {
        "both increments survived; the final price reflects T1's and T2's updates".to_string()
    };
    Ok(TrialOutcome::LostUpdate {
        isolation: spec.isolation,
        initial_price: baseline,
        t1_read_price,
        t2_read_price,
        final_price,
        expected_price_without_concurrency: expected,
        lost_update_occurred: occurred,
        description,
    })
}

/// Roll back whatever is still open and put the baseline price back.
async fn restore_row(
    store: &MenuStore,
    t1: &mut Connection,
    t2: &mut Connection,
    menu_id: MenuId,
    baseline: f64,
) -> Result<()> {
    let mut first_error: Option<Error> = None;
    for conn in [t1, t2] {
        if conn.in_transaction() {
            if let Err(err) = conn.rollback().await {
                first_error.get_or_insert(err);
            }
        }
    }
    if let Err(err) = store.write_price_autocommit(menu_id, baseline).await {
        first_error.get_or_insert(err);
    }
    match first_error {
        Some(err) => Err(Error::Cleanup(err.to_string())),
        None => Ok(()),
    }
}
