mod isolation;
mod locks;
mod session;
mod version;

pub use isolation::IsolationLevel;
pub use session::Connection;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::core::errors::{Error, Result};
use crate::core::lock_stats::{LockStats, LockStatsSnapshot};

use locks::RowLocks;
use session::ActiveTxn;
use version::{PriceVersion, VersionChain};

pub type MenuId = u64;
pub type TxnId = u64;
pub type Timestamp = u64;

pub(crate) const TXN_NONE: TxnId = 0;
pub(crate) const TS_NONE: Timestamp = 0;

/// Configuration for opening a menu store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Connections that may be checked out at once (default: 10).
    ///
    /// A trial holds two for its whole run; values below 2 are raised to 2
    /// when the store opens.
    pub max_connections: usize,
    /// How long a writer waits for a row lock before giving up.
    pub lock_wait_timeout: Duration,
    /// Isolation level for sessions that never choose one.
    pub default_isolation: IsolationLevel,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            lock_wait_timeout: Duration::from_millis(200),
            default_isolation: IsolationLevel::RepeatableRead,
        }
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout = timeout;
        self
    }

    pub fn default_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.default_isolation = isolation;
        self
    }
}

/// One menu row as seen through the committed view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: MenuId,
    pub name: String,
    pub price: f64,
}

struct MenuRow {
    name: String,
    chain: VersionChain,
}

struct StoreState {
    rows: HashMap<MenuId, MenuRow>,
    /// Logical commit clock; bumped under the write guard so snapshot
    /// reads and commit stamps are linearized by the same lock.
    clock: Timestamp,
}

pub(crate) struct StoreInner {
    state: RwLock<StoreState>,
    locks: RowLocks,
    next_txn_id: AtomicU64,
    pool: Arc<Semaphore>,
    pub(crate) default_isolation: IsolationLevel,
    stats: Arc<LockStats>,
}

/// An in-memory, multi-versioned menu store with row-level write locks and
/// a bounded connection pool.
///
/// The store exists to make transaction behavior observable: sessions pick
/// an isolation level, and what their reads see (and which writes conflict)
/// follows from it. Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct MenuStore {
    inner: Arc<StoreInner>,
}

impl MenuStore {
    pub fn new() -> Self {
        Self::with_options(StoreOptions::default())
    }

    pub fn with_options(options: StoreOptions) -> Self {
        // connection_pair() takes two permits at once, so a smaller pool
        // could never satisfy a single trial.
        let max_connections = options.max_connections.clamp(2, Semaphore::MAX_PERMITS);
        let stats = Arc::new(LockStats::default());
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(StoreState {
                    rows: HashMap::new(),
                    clock: TS_NONE,
                }),
                locks: RowLocks::new(options.lock_wait_timeout, stats.clone()),
                next_txn_id: AtomicU64::new(TXN_NONE),
                pool: Arc::new(Semaphore::new(max_connections)),
                default_isolation: options.default_isolation,
                stats,
            }),
        }
    }

    /// Insert (or reseed) a menu row with a committed price.
    pub fn insert_item(&self, id: MenuId, name: &str, price: f64) {
        let mut state = self.inner.state.write();
        state.clock += 1;
        let commit_ts = state.clock;
        state.rows.insert(
            id,
            MenuRow {
                name: name.to_string(),
                chain: VersionChain::seeded(price, commit_ts),
            },
        );
    }

    /// A small fixed menu for the demo server and examples.
    pub fn seed_demo_menu(&self) {
        for (id, name, price) in [
            (1, "Cheeseburger", 8.50),
            (2, "Caesar Salad", 7.25),
            (3, "Margherita Pizza", 10.00),
            (4, "Iced Tea", 2.75),
        ] {
            self.insert_item(id, name, price);
        }
    }

    /// Check out one pooled connection, waiting if the pool is exhausted.
    pub async fn connection(&self) -> Result<Connection> {
        let permit = self
            .inner
            .pool
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::PoolClosed)?;
        Ok(Connection::new(self.inner.clone(), Arc::new(permit)))
    }

    /// Check out the two connections a trial needs in one step.
    ///
    /// Both permits are taken atomically, so concurrent trials cannot wedge
    /// the pool by each holding one connection while waiting for a second.
    pub async fn connection_pair(&self) -> Result<(Connection, Connection)> {
        let permit = self
            .inner
            .pool
            .clone()
            .acquire_many_owned(2)
            .await
            .map_err(|_| Error::PoolClosed)?;
        let permit = Arc::new(permit);
        Ok((
            Connection::new(self.inner.clone(), permit.clone()),
            Connection::new(self.inner.clone(), permit),
        ))
    }

    /// The newest committed price, read outside any transaction.
    pub async fn read_committed_price(&self, menu_id: MenuId) -> Result<f64> {
        let state = self.inner.state.read();
        let row = state.rows.get(&menu_id).ok_or(Error::RowNotFound(menu_id))?;
        let version = row
            .chain
            .newest_committed()
            .ok_or(Error::RowNotFound(menu_id))?;
        Ok(version.price)
    }

    /// Write and commit a price in one step, honoring row locks.
    ///
    /// Used by trial cleanup to restore a row; like any writer it waits for
    /// the row's lock and can time out under contention.
    pub async fn write_price_autocommit(&self, menu_id: MenuId, price: f64) -> Result<()> {
        let txn_id = self.inner.allocate_txn_id();
        self.inner.locks.acquire(menu_id, txn_id).await?;
        let result = self.inner.apply_autocommit(menu_id, txn_id, price);
        self.inner.locks.release_all(txn_id);
        result
    }

    /// Committed view of one row.
    pub fn item(&self, menu_id: MenuId) -> Option<MenuItem> {
        let state = self.inner.state.read();
        let row = state.rows.get(&menu_id)?;
        let version = row.chain.newest_committed()?;
        Some(MenuItem {
            id: menu_id,
            name: row.name.clone(),
            price: version.price,
        })
    }

    /// Committed view of the whole menu, ordered by id.
    pub fn items(&self) -> Vec<MenuItem> {
        let state = self.inner.state.read();
        let mut items: Vec<MenuItem> = state
            .rows
            .iter()
            .filter_map(|(id, row)| {
                let version = row.chain.newest_committed()?;
                Some(MenuItem {
                    id: *id,
                    name: row.name.clone(),
                    price: version.price,
                })
            })
            .collect();
        items.sort_by_key(|item| item.id);
        items
    }

    pub fn row_count(&self) -> usize {
        self.inner.state.read().rows.len()
    }

    pub fn lock_stats(&self) -> LockStatsSnapshot {
        self.inner.stats.snapshot()
    }
}

impl Default for MenuStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreInner {
    pub(crate) fn allocate_txn_id(&self) -> TxnId {
        self.next_txn_id.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Read the row's visible price, pinning the transaction's snapshot on
    /// first contact under a snapshot level.
    pub(crate) fn read_row(&self, menu_id: MenuId, txn: &mut ActiveTxn) -> Result<f64> {
        let state = self.state.read();
        if txn.isolation.uses_snapshot() && txn.snapshot_ts.is_none() {
            txn.snapshot_ts = Some(state.clock);
        }
        let row = state.rows.get(&menu_id).ok_or(Error::RowNotFound(menu_id))?;
        let version = row
            .chain
            .find_visible(txn.id, txn.isolation, txn.snapshot_ts)
            .ok_or(Error::RowNotFound(menu_id))?;
        Ok(version.price)
    }

    /// Install an uncommitted version after taking the row's lock.
    ///
    /// Under `SERIALIZABLE`, a commit newer than the transaction's snapshot
    /// fails the write instead of silently overwriting it.
    pub(crate) async fn write_row(
        &self,
        menu_id: MenuId,
        txn: &mut ActiveTxn,
        price: f64,
    ) -> Result<()> {
        self.locks.acquire(menu_id, txn.id).await?;
        let mut guard = self.state.write();
        let state = &mut *guard;
        if txn.isolation.uses_snapshot() && txn.snapshot_ts.is_none() {
            txn.snapshot_ts = Some(state.clock);
        }
        let row = state
            .rows
            .get_mut(&menu_id)
            .ok_or(Error::RowNotFound(menu_id))?;
        if txn.isolation == IsolationLevel::Serializable {
            if let Some(snapshot_ts) = txn.snapshot_ts {
                if row.chain.latest_commit_ts() > snapshot_ts {
                    self.stats.record_write_conflict();
                    return Err(Error::WriteConflict { menu_id });
                }
            }
        }
        match row.chain.pending_mut(txn.id) {
            Some(version) => version.price = price,
            None => {
                row.chain.prepend(PriceVersion {
                    price,
                    txn_id: txn.id,
                    commit_ts: None,
                });
                txn.writes.push(menu_id);
            }
        }
        Ok(())
    }

    /// Stamp the transaction's writes with the next clock tick and release
    /// its locks.
    pub(crate) fn commit_txn(&self, txn: ActiveTxn) {
        if !txn.writes.is_empty() {
            let mut guard = self.state.write();
            let state = &mut *guard;
            state.clock += 1;
            let commit_ts = state.clock;
            for menu_id in &txn.writes {
                if let Some(row) = state.rows.get_mut(menu_id) {
                    row.chain.mark_committed(txn.id, commit_ts);
                }
            }
        }
        self.locks.release_all(txn.id);
    }

    /// Discard the transaction's pending versions and release its locks.
    pub(crate) fn rollback_txn(&self, txn: ActiveTxn) {
        if !txn.writes.is_empty() {
            let mut guard = self.state.write();
            let state = &mut *guard;
            for menu_id in &txn.writes {
                if let Some(row) = state.rows.get_mut(menu_id) {
                    row.chain.unlink_aborted(txn.id);
                }
            }
        }
        self.locks.release_all(txn.id);
    }

    fn apply_autocommit(&self, menu_id: MenuId, txn_id: TxnId, price: f64) -> Result<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.clock += 1;
        let commit_ts = state.clock;
        let row = state
            .rows
            .get_mut(&menu_id)
            .ok_or(Error::RowNotFound(menu_id))?;
        row.chain.prepend(PriceVersion {
            price,
            txn_id,
            commit_ts: Some(commit_ts),
        });
        Ok(())
    }
}
