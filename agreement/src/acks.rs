use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use labrpc::{
    anyhow::Result,
    log::{debug, trace},
    tokio::{
        sync::{oneshot, Notify},
        time::{timeout_at, Instant},
    },
    NodeId,
};

use super::CoordinatorService;
use crate::TxnId;

/// Commit acknowledgements received by one coordinator, per open transaction.
///
/// Participants report through `coordinator_svc::have_committed`; the coordinator
/// waits on a notification instead of polling.
#[derive(Debug, Clone, Default)]
pub struct AckTracker {
    open: Arc<Mutex<HashMap<TxnId, HashSet<NodeId>>>>,
    notify: Arc<Notify>,
}

impl AckTracker {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start collecting acknowledgements for `txid`.
    pub fn open(&self, txid: TxnId) {
        self.lock().entry(txid).or_default();
    }

    /// Record that `node` applied `txid`. Returns `false` when `txid` is not open.
    pub fn record(&self, txid: TxnId, node: NodeId) -> bool {
        let recorded = match self.lock().get_mut(&txid) {
            Some(nodes) => {
                nodes.insert(node);
                true
            }
            None => false,
        };
        if recorded {
            trace!("{} acknowledged by node {}", txid, node);
            self.notify.notify_waiters();
        } else {
            debug!("late acknowledgement of {} from node {}", txid, node);
        }
        recorded
    }

    /// Acknowledgements seen so far for `txid`.
    pub fn count(&self, txid: TxnId) -> usize {
        self.lock().get(&txid).map_or(0, HashSet::len)
    }

    /// Stop collecting for `txid`, returning how many nodes acknowledged.
    pub fn close(&self, txid: TxnId) -> usize {
        self.lock().remove(&txid).map_or(0, |nodes| nodes.len())
    }

    /// Wait until `expected` nodes acknowledged `txid` or `timeout` passed, then close it.
    pub async fn wait(&self, txid: TxnId, expected: usize, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if self.count(txid) >= expected {
                break;
            }
            if timeout_at(deadline, notified).await.is_err() {
                break;
            }
        }
        let acked = self.close(txid);
        if acked < expected {
            debug!("{} acknowledged by {} of {} nodes", txid, acked, expected);
        }
        acked
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TxnId, HashSet<NodeId>>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[labrpc::async_trait]
impl CoordinatorService for AckTracker {
    async fn have_committed(&mut self, txid: TxnId, node: NodeId) -> Result<bool> {
        Ok(self.record(txid, node))
    }
}

/// Outcome of a committed transaction whose acknowledgements may still be arriving.
#[derive(Debug)]
pub struct Receipt {
    txid: TxnId,
    acks: oneshot::Receiver<usize>,
}

impl Receipt {
    pub(crate) fn new(txid: TxnId, acks: oneshot::Receiver<usize>) -> Self {
        Self { txid, acks }
    }

    /// Transaction the receipt belongs to.
    pub fn txid(&self) -> TxnId {
        self.txid
    }

    /// Number of participants that acknowledged before the coordinator stopped waiting.
    pub async fn acknowledged(self) -> usize {
        self.acks.await.unwrap_or(0)
    }
}
