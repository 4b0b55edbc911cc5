use thiserror::Error;

use crate::store::MenuId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid isolation level: {0}. Valid levels are: READ UNCOMMITTED, READ COMMITTED, REPEATABLE READ, SERIALIZABLE")]
    InvalidIsolationLevel(String),

    #[error("menu item {0} not found")]
    RowNotFound(MenuId),

    #[error("lock wait timeout exceeded on menu item {menu_id} after {waited_ms} ms")]
    LockWaitTimeout { menu_id: MenuId, waited_ms: u64 },

    #[error("serialization failure: menu item {menu_id} was changed by a concurrent transaction")]
    WriteConflict { menu_id: MenuId },

    #[error("transaction already active")]
    TransactionAlreadyActive,

    #[error("no active transaction")]
    NoActiveTransaction,

    #[error("invalid transaction state: {0}")]
    InvalidTransactionState(String),

    #[error("connection pool closed")]
    PoolClosed,

    #[error("invalid batch options: {0}")]
    InvalidBatchOptions(String),

    #[error("cleanup failed: {0}")]
    Cleanup(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures produced by the store's own concurrency control:
    /// a lock wait that ran out of time or a serialization conflict. These
    /// are expected outcomes under contention, not harness defects.
    pub fn is_concurrency_control(&self) -> bool {
        matches!(
            self,
            Error::LockWaitTimeout { .. } | Error::WriteConflict { .. }
        )
    }
}
