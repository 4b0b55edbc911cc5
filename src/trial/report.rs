use serde::{Deserialize, Serialize};

use crate::core::errors::Error;
use crate::store::IsolationLevel;

use super::Scenario;

/// Envelope returned by every trial endpoint.
///
/// `success` reports whether the trial script ran to completion, not
/// whether an anomaly occurred; a dirty read that was observed as planned
/// is still a successful trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialReport {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<TrialOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-scenario observations, tagged by scenario label on the wire.
///
/// Field names follow the JSON casing clients already consume, with the
/// session that observes the anomaly called T1 and the interfering
/// session called T2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scenario")]
pub enum TrialOutcome {
    #[serde(rename = "Dirty Read")]
    DirtyRead {
        #[serde(rename = "isolationLevel")]
        isolation: IsolationLevel,
        #[serde(rename = "T1_read1")]
        t1_read1: f64,
        #[serde(rename = "T1_read2")]
        t1_read2: f64,
        #[serde(rename = "finalPriceAfterRollback")]
        final_price_after_rollback: f64,
        #[serde(rename = "dirtyReadOccurred")]
        dirty_read_occurred: bool,
        description: String,
    },
    #[serde(rename = "Non-repeatable Read")]
    NonRepeatableRead {
        #[serde(rename = "isolationLevel")]
        isolation: IsolationLevel,
        #[serde(rename = "initialPrice")]
        initial_price: f64,
        #[serde(rename = "T1_read1")]
        t1_read1: f64,
        #[serde(rename = "T1_read2")]
        t1_read2: f64,
        #[serde(rename = "nonRepeatableReadOccurred")]
        non_repeatable_read_occurred: bool,
        description: String,
    },
    #[serde(rename = "Lost Update")]
    LostUpdate {
        #[serde(rename = "isolationLevel")]
        isolation: IsolationLevel,
        #[serde(rename = "initialPrice")]
        initial_price: f64,
        #[serde(rename = "T1_read_price")]
        t1_read_price: f64,
        #[serde(rename = "T2_read_price")]
        t2_read_price: f64,
        #[serde(rename = "finalPrice")]
        final_price: f64,
        #[serde(rename = "expectedPriceWithoutConcurrency")]
        expected_price_without_concurrency: f64,
        #[serde(rename = "lostUpdateOccurred")]
        lost_update_occurred: bool,
        description: String,
    },
}

impl TrialOutcome {
    pub fn scenario(&self) -> Scenario {
        match self {
            TrialOutcome::DirtyRead { .. } => Scenario::DirtyRead,
            TrialOutcome::NonRepeatableRead { .. } => Scenario::NonRepeatableRead,
            TrialOutcome::LostUpdate { .. } => Scenario::LostUpdate,
        }
    }

    /// Whether the scenario's anomaly was actually observed.
    pub fn anomaly_occurred(&self) -> bool {
        match self {
            TrialOutcome::DirtyRead {
                dirty_read_occurred, ..
            } => *dirty_read_occurred,
            TrialOutcome::NonRepeatableRead {
                non_repeatable_read_occurred,
                ..
            } => *non_repeatable_read_occurred,
            TrialOutcome::LostUpdate {
                lost_update_occurred,
                ..
            } => *lost_update_occurred,
        }
    }

    pub fn isolation(&self) -> IsolationLevel {
        match self {
            TrialOutcome::DirtyRead { isolation, .. }
            | TrialOutcome::NonRepeatableRead { isolation, .. }
            | TrialOutcome::LostUpdate { isolation, .. } => *isolation,
        }
    }
}

impl TrialReport {
    pub fn completed(scenario: Scenario, outcome: TrialOutcome) -> Self {
        Self {
            success: true,
            message: format!("{} Test Completed", scenario.label()),
            results: Some(outcome),
            error: None,
        }
    }

    /// A trial that completed but could not restore the row afterwards.
    pub fn completed_with_cleanup_warning(
        scenario: Scenario,
        outcome: TrialOutcome,
        cleanup: &Error,
    ) -> Self {
        Self {
            success: true,
            message: format!("{} Test Completed ({cleanup})", scenario.label()),
            results: Some(outcome),
            error: None,
        }
    }

    pub fn failed(scenario: Scenario, error: &Error) -> Self {
        Self {
            success: false,
            message: format!("{} Test Failed", scenario.label()),
            results: None,
            error: Some(error.to_string()),
        }
    }
}
