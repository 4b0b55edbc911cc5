use super::isolation::IsolationLevel;
use super::{Timestamp, TxnId, TS_NONE, TXN_NONE};

/// One write to a row's price. `commit_ts` stays `None` until the writer
/// commits; rollback removes the version instead of stamping it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PriceVersion {
    pub price: f64,
    pub txn_id: TxnId,
    pub commit_ts: Option<Timestamp>,
}

/// Newest-first history of one row's price.
///
/// Writers must hold the row's exclusive lock, so at most one uncommitted
/// version exists at a time and it is always the head.
#[derive(Debug)]
pub(crate) struct VersionChain {
    versions: Vec<PriceVersion>,
}

impl VersionChain {
    pub fn seeded(price: f64, commit_ts: Timestamp) -> Self {
        Self {
            versions: vec![PriceVersion {
                price,
                txn_id: TXN_NONE,
                commit_ts: Some(commit_ts),
            }],
        }
    }

    pub fn prepend(&mut self, version: PriceVersion) {
        self.versions.insert(0, version);
    }

    /// The version a transaction observes under the given level, if any.
    ///
    /// Snapshot levels need the caller to supply the transaction's read
    /// timestamp; without one nothing committed is visible to them.
    pub fn find_visible(
        &self,
        txn_id: TxnId,
        isolation: IsolationLevel,
        snapshot_ts: Option<Timestamp>,
    ) -> Option<&PriceVersion> {
        // Own pending writes are always visible.
        if let Some(own) = self
            .versions
            .iter()
            .find(|v| v.commit_ts.is_none() && v.txn_id == txn_id)
        {
            return Some(own);
        }
        match isolation {
            IsolationLevel::ReadUncommitted => self.versions.first(),
            IsolationLevel::ReadCommitted => self.newest_committed(),
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable => {
                let read_ts = snapshot_ts?;
                self.versions
                    .iter()
                    .find(|v| matches!(v.commit_ts, Some(ts) if ts <= read_ts))
            }
        }
    }

    pub fn newest_committed(&self) -> Option<&PriceVersion> {
        self.versions.iter().find(|v| v.commit_ts.is_some())
    }

    /// Commit timestamp of the newest committed version.
    pub fn latest_commit_ts(&self) -> Timestamp {
        self.newest_committed()
            .and_then(|v| v.commit_ts)
            .unwrap_or(TS_NONE)
    }

    pub fn pending_mut(&mut self, txn_id: TxnId) -> Option<&mut PriceVersion> {
        self.versions
            .iter_mut()
            .find(|v| v.commit_ts.is_none() && v.txn_id == txn_id)
    }

    /// Stamp the transaction's pending version as committed at `ts`.
    pub fn mark_committed(&mut self, txn_id: TxnId, ts: Timestamp) {
        for version in self
            .versions
            .iter_mut()
            .filter(|v| v.commit_ts.is_none() && v.txn_id == txn_id)
        {
            version.commit_ts = Some(ts);
        }
    }

    /// Drop the transaction's pending versions, as if never written.
    pub fn unlink_aborted(&mut self, txn_id: TxnId) {
        self.versions
            .retain(|v| v.commit_ts.is_some() || v.txn_id != txn_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_with_pending() -> VersionChain {
        // Committed 10.0 at ts 1, then txn 7 wrote 20.0 without committing.
        let mut chain = VersionChain::seeded(10.0, 1);
        chain.prepend(PriceVersion {
            price: 20.0,
            txn_id: 7,
            commit_ts: None,
        });
        chain
    }

    #[test]
    fn read_uncommitted_sees_pending_head() {
        let chain = chain_with_pending();
        let visible = chain
            .find_visible(99, IsolationLevel::ReadUncommitted, None)
            .expect("version");
        assert_eq!(visible.price, 20.0);
    }

    #[test]
    fn read_committed_skips_pending_head() {
        let chain = chain_with_pending();
        let visible = chain
            .find_visible(99, IsolationLevel::ReadCommitted, None)
            .expect("version");
        assert_eq!(visible.price, 10.0);
    }

    #[test]
    fn own_pending_write_always_visible() {
        let chain = chain_with_pending();
        for isolation in IsolationLevel::ALL {
            let visible = chain.find_visible(7, isolation, Some(1)).expect("version");
            assert_eq!(visible.price, 20.0, "own write hidden at {isolation}");
        }
    }

    #[test]
    fn snapshot_read_ignores_later_commits() {
        let mut chain = VersionChain::seeded(10.0, 1);
        chain.prepend(PriceVersion {
            price: 30.0,
            txn_id: 3,
            commit_ts: Some(5),
        });
        let old = chain
            .find_visible(99, IsolationLevel::RepeatableRead, Some(2))
            .expect("version");
        assert_eq!(old.price, 10.0);
        let new = chain
            .find_visible(99, IsolationLevel::RepeatableRead, Some(5))
            .expect("version");
        assert_eq!(new.price, 30.0);
    }

    #[test]
    fn unlink_aborted_restores_committed_view() {
        let mut chain = chain_with_pending();
        chain.unlink_aborted(7);
        let visible = chain
            .find_visible(99, IsolationLevel::ReadUncommitted, None)
            .expect("version");
        assert_eq!(visible.price, 10.0);
        assert_eq!(chain.latest_commit_ts(), 1);
    }

    #[test]
    fn mark_committed_stamps_pending_version() {
        let mut chain = chain_with_pending();
        chain.mark_committed(7, 9);
        assert_eq!(chain.latest_commit_ts(), 9);
        let visible = chain
            .find_visible(99, IsolationLevel::ReadCommitted, None)
            .expect("version");
        assert_eq!(visible.price, 20.0);
    }
}
