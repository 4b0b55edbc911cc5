use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::core::errors::{Error, Result};
use crate::core::lock_stats::LockStats;

use super::{MenuId, TxnId};

struct Waiter {
    txn_id: TxnId,
    grant: oneshot::Sender<()>,
}

#[derive(Default)]
struct RowLockState {
    holder: Option<TxnId>,
    waiters: VecDeque<Waiter>,
}

/// Exclusive per-row write locks with FIFO handoff.
///
/// Waiters park on a oneshot channel. Release assigns the lock to the next
/// live waiter while still holding the table mutex, so a grant cannot slip
/// between a release and a wakeup.
pub(crate) struct RowLocks {
    table: Mutex<HashMap<MenuId, RowLockState>>,
    wait_timeout: Duration,
    stats: Arc<LockStats>,
}

impl RowLocks {
    pub fn new(wait_timeout: Duration, stats: Arc<LockStats>) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            wait_timeout,
            stats,
        }
    }

    /// Acquire the lock on `menu_id` for `txn_id`, waiting at most the
    /// configured timeout. Reentrant for the current holder.
    pub async fn acquire(&self, menu_id: MenuId, txn_id: TxnId) -> Result<()> {
        let start = Instant::now();
        let receiver = {
            let mut table = self.table.lock();
            let state = table.entry(menu_id).or_default();
            if state.holder == Some(txn_id) {
                return Ok(());
            }
            if state.holder.is_none() && state.waiters.is_empty() {
                state.holder = Some(txn_id);
                self.stats.record_granted();
                return Ok(());
            }
            let (grant, receiver) = oneshot::channel();
            state.waiters.push_back(Waiter { txn_id, grant });
            receiver
        };

        self.stats.record_waited();
        match tokio::time::timeout(self.wait_timeout, receiver).await {
            Ok(Ok(())) => {
                self.stats.record_granted();
                Ok(())
            }
            Ok(Err(_)) => Err(Error::PoolClosed),
            Err(_) => {
                let mut table = self.table.lock();
                if let Some(state) = table.get_mut(&menu_id) {
                    if state.holder == Some(txn_id) {
                        // The grant raced with the deadline; the lock is ours.
                        self.stats.record_granted();
                        return Ok(());
                    }
                    state.waiters.retain(|waiter| waiter.txn_id != txn_id);
                }
                self.stats.record_wait_timeout();
                Err(Error::LockWaitTimeout {
                    menu_id,
                    waited_ms: start.elapsed().as_millis() as u64,
                })
            }
        }
    }

    /// Release every lock held by `txn_id`, handing each to its next waiter.
    pub fn release_all(&self, txn_id: TxnId) {
        let mut table = self.table.lock();
        table.retain(|_, state| {
            if state.holder == Some(txn_id) {
                grant_next(state);
            }
            state.holder.is_some() || !state.waiters.is_empty()
        });
    }

    #[cfg(test)]
    pub fn holder(&self, menu_id: MenuId) -> Option<TxnId> {
        self.table.lock().get(&menu_id).and_then(|state| state.holder)
    }
}

fn grant_next(state: &mut RowLockState) {
    state.holder = None;
    while let Some(waiter) = state.waiters.pop_front() {
        let txn_id = waiter.txn_id;
        if waiter.grant.send(()).is_ok() {
            state.holder = Some(txn_id);
            return;
        }
    }
}
