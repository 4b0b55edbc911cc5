mod report;
mod runner;

pub use report::{TrialOutcome, TrialReport};
pub use runner::{run_trial, TrialSpec};

use serde::{Deserialize, Serialize};

use crate::store::IsolationLevel;

/// The three scripted anomaly scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scenario {
    #[serde(rename = "Dirty Read")]
    DirtyRead,
    #[serde(rename = "Non-repeatable Read")]
    NonRepeatableRead,
    #[serde(rename = "Lost Update")]
    LostUpdate,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [
        Scenario::DirtyRead,
        Scenario::NonRepeatableRead,
        Scenario::LostUpdate,
    ];

    /// Human-readable label used in messages and report tags.
    pub fn label(&self) -> &'static str {
        match self {
            Scenario::DirtyRead => "Dirty Read",
            Scenario::NonRepeatableRead => "Non-repeatable Read",
            Scenario::LostUpdate => "Lost Update",
        }
    }

    /// URL path segment under `/api/test/concurrency/`.
    pub fn path(&self) -> &'static str {
        match self {
            Scenario::DirtyRead => "dirty-read",
            Scenario::NonRepeatableRead => "non-repeatable-read",
            Scenario::LostUpdate => "lost-update",
        }
    }

    /// Isolation level a trial runs at when the request names none.
    ///
    /// Dirty reads are only observable below READ COMMITTED, so that
    /// scenario defaults lower than the others.
    pub fn default_isolation(&self) -> IsolationLevel {
        match self {
            Scenario::DirtyRead => IsolationLevel::ReadUncommitted,
            Scenario::NonRepeatableRead | Scenario::LostUpdate => IsolationLevel::ReadCommitted,
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_url_safe_labels() {
        for scenario in Scenario::ALL {
            let derived = scenario.label().to_lowercase().replace(' ', "-");
            assert_eq!(scenario.path(), derived);
        }
    }

    #[test]
    fn serializes_as_label() {
        let json = serde_json::to_string(&Scenario::NonRepeatableRead).expect("serialize");
        assert_eq!(json, "\"Non-repeatable Read\"");
    }
}
