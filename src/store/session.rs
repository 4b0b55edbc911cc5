use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;
use tracing::debug;

use crate::core::errors::{Error, Result};

use super::isolation::IsolationLevel;
use super::{MenuId, StoreInner, Timestamp, TxnId};

/// Bookkeeping for one open transaction.
pub(crate) struct ActiveTxn {
    pub id: TxnId,
    pub isolation: IsolationLevel,
    /// Read timestamp, established at the first read (or write) under a
    /// snapshot level.
    pub snapshot_ts: Option<Timestamp>,
    /// Rows this transaction has pending writes on.
    pub writes: Vec<MenuId>,
}

impl ActiveTxn {
    fn new(id: TxnId, isolation: IsolationLevel) -> Self {
        Self {
            id,
            isolation,
            snapshot_ts: None,
            writes: Vec::new(),
        }
    }
}

/// One pooled session against the store, holding at most one open
/// transaction.
///
/// The isolation level is set per session and applies to transactions begun
/// afterwards. Dropping a connection rolls back any transaction still open
/// and returns its pool permit.
pub struct Connection {
    store: Arc<StoreInner>,
    isolation: IsolationLevel,
    txn: Option<ActiveTxn>,
    _permit: Arc<OwnedSemaphorePermit>,
}

impl Connection {
    pub(crate) fn new(store: Arc<StoreInner>, permit: Arc<OwnedSemaphorePermit>) -> Self {
        let isolation = store.default_isolation;
        Self {
            store,
            isolation,
            txn: None,
            _permit: permit,
        }
    }

    /// Choose the isolation level for subsequent transactions.
    ///
    /// Rejected while a transaction is open; the level of a running
    /// transaction is fixed at `begin`.
    pub fn set_isolation(&mut self, level: IsolationLevel) -> Result<()> {
        if self.txn.is_some() {
            return Err(Error::InvalidTransactionState(
                "isolation level cannot change while a transaction is open".into(),
            ));
        }
        self.isolation = level;
        Ok(())
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    pub async fn begin(&mut self) -> Result<()> {
        if self.txn.is_some() {
            return Err(Error::TransactionAlreadyActive);
        }
        let id = self.store.allocate_txn_id();
        debug!(txn = id, isolation = %self.isolation, "transaction started");
        self.txn = Some(ActiveTxn::new(id, self.isolation));
        Ok(())
    }

    /// Read the row's price as visible to this transaction.
    ///
    /// Plain reads never take locks, at any isolation level.
    pub async fn read_price(&mut self, menu_id: MenuId) -> Result<f64> {
        let txn = self.txn.as_mut().ok_or(Error::NoActiveTransaction)?;
        self.store.read_row(menu_id, txn)
    }

    /// Overwrite the row's price, taking the row's exclusive lock.
    ///
    /// The write stays invisible to other transactions (except under
    /// `READ UNCOMMITTED`) until commit.
    pub async fn write_price(&mut self, menu_id: MenuId, price: f64) -> Result<()> {
        let txn = self.txn.as_mut().ok_or(Error::NoActiveTransaction)?;
        self.store.write_row(menu_id, txn, price).await
    }

    pub async fn commit(&mut self) -> Result<()> {
        let txn = self.txn.take().ok_or(Error::NoActiveTransaction)?;
        debug!(txn = txn.id, "transaction committed");
        self.store.commit_txn(txn);
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<()> {
        let txn = self.txn.take().ok_or(Error::NoActiveTransaction)?;
        debug!(txn = txn.id, "transaction rolled back");
        self.store.rollback_txn(txn);
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(txn) = self.txn.take() {
            debug!(txn = txn.id, "connection dropped with open transaction, rolling back");
            self.store.rollback_txn(txn);
        }
    }
}
