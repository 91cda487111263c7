//! Scripted commit status source

use async_trait::async_trait;
use consortium_commit::{TxStatus, TxStatusSource};
use consortium_core::{Result, TxId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};

/// Replica whose answers are scripted per transaction.
///
/// A script is consumed one status per query; its last status repeats
/// forever. Transactions without a script report `Unknown`.
#[derive(Debug, Default)]
pub struct ScriptedReplica {
    scripts: Mutex<BTreeMap<TxId, VecDeque<TxStatus>>>,
    queries: Mutex<Vec<TxId>>,
}

impl ScriptedReplica {
    /// Replica that knows no transactions
    pub fn new() -> Self {
        Self::default()
    }

    /// Always report `status` for `tx`
    pub fn set(&self, tx: TxId, status: TxStatus) {
        self.script(tx, [status]);
    }

    /// Report `statuses` for `tx` in order, repeating the last
    pub fn script(&self, tx: TxId, statuses: impl IntoIterator<Item = TxStatus>) {
        self.scripts.lock().insert(tx, statuses.into_iter().collect());
    }

    /// Linear committed history: seqno `i + 1` committed in `views[i]`, every
    /// other view below the commit view invalid
    pub fn commit_linear(&self, views: &[u64]) {
        let max_view = views.iter().copied().max().unwrap_or(0);
        for (i, &committed_view) in views.iter().enumerate() {
            let seqno = i as u64 + 1;
            for view in 1..=max_view {
                let status = if view == committed_view {
                    TxStatus::Committed
                } else {
                    TxStatus::Invalid
                };
                self.set(TxId::new(view, seqno), status);
            }
        }
    }

    /// Transactions queried so far, in order
    pub fn queries(&self) -> Vec<TxId> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl TxStatusSource for ScriptedReplica {
    async fn tx_status(&self, tx: TxId) -> Result<TxStatus> {
        self.queries.lock().push(tx);
        let mut scripts = self.scripts.lock();
        let status = match scripts.get_mut(&tx) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap_or_default(),
            Some(script) => script.front().copied().unwrap_or_default(),
            None => TxStatus::Unknown,
        };
        Ok(status)
    }
}
