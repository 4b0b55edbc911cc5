use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::Error;

/// The four ANSI isolation levels, weakest first.
///
/// Parsing accepts the SQL spellings (`READ UNCOMMITTED`, `READ COMMITTED`,
/// `REPEATABLE READ`, `SERIALIZABLE`), case-insensitively. Anything else is
/// rejected at the boundary, before a transaction is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IsolationLevel {
    /// Reads may observe other transactions' uncommitted writes.
    #[serde(rename = "READ UNCOMMITTED")]
    ReadUncommitted,
    /// Reads observe the newest committed value, re-evaluated per read.
    #[serde(rename = "READ COMMITTED")]
    ReadCommitted,
    /// Reads observe the snapshot taken at the transaction's first read.
    #[serde(rename = "REPEATABLE READ")]
    RepeatableRead,
    /// Repeatable-read visibility plus first-updater-wins write conflicts.
    #[serde(rename = "SERIALIZABLE")]
    Serializable,
}

impl IsolationLevel {
    pub const ALL: [IsolationLevel; 4] = [
        IsolationLevel::ReadUncommitted,
        IsolationLevel::ReadCommitted,
        IsolationLevel::RepeatableRead,
        IsolationLevel::Serializable,
    ];

    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }

    /// Whether reads at this level pin the transaction to a snapshot.
    pub(crate) fn uses_snapshot(&self) -> bool {
        matches!(
            self,
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable
        )
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for IsolationLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "READ UNCOMMITTED" => Ok(IsolationLevel::ReadUncommitted),
            "READ COMMITTED" => Ok(IsolationLevel::ReadCommitted),
            "REPEATABLE READ" => Ok(IsolationLevel::RepeatableRead),
            "SERIALIZABLE" => Ok(IsolationLevel::Serializable),
            _ => Err(Error::InvalidIsolationLevel(s.to_string())),
        }
    }
}
