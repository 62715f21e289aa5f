use std::collections::HashMap;

use labrpc::{
    anyhow::Result,
    log::{debug, info, warn},
    tokio, NodeId,
};

use super::ParticipantService;
use crate::{CoordinatorClient, ReplicaStore, Request, TxnId};

/// 2PC participant role of one node.
///
/// Writes wait in `staged` between a "yes" vote and the coordinator's decision.
/// Nothing reaches the store before `do_commit`.
#[derive(Debug)]
pub struct Participant {
    id: NodeId,
    store: ReplicaStore,
    staged: HashMap<TxnId, Request>,
    coordinators: Vec<CoordinatorClient>,
}

impl Participant {
    /// Participant of node `id`; `coordinators[i]` reaches the coordinator of node `i`.
    pub fn new(id: NodeId, store: ReplicaStore, coordinators: Vec<CoordinatorClient>) -> Self {
        Self {
            id,
            store,
            staged: HashMap::new(),
            coordinators,
        }
    }

    /// Writes voted for and not yet decided.
    pub fn staged(&self) -> &HashMap<TxnId, Request> {
        &self.staged
    }

    /// Vote on `request`, staging it on "yes".
    pub fn vote(&mut self, txid: TxnId, request: Request) -> bool {
        if self.staged.contains_key(&txid) {
            return true;
        }
        if let Err(e) = request.validate() {
            warn!("participant {} votes no on {}: {}", self.id, txid, e);
            return false;
        }
        self.release_superseded(txid);
        if let Some(other) = self
            .staged
            .iter()
            .find(|(_, staged)| staged.key() == request.key())
            .map(|(other, _)| *other)
        {
            debug!(
                "participant {} votes no on {}: {} holds key {}",
                self.id,
                txid,
                other,
                request.key()
            );
            return false;
        }
        debug!("participant {} staged {} for {}", self.id, request, txid);
        self.staged.insert(txid, request);
        true
    }

    /// A coordinator runs one transaction at a time, so its older stages are
    /// left over from a decision this node never heard.
    fn release_superseded(&mut self, txid: TxnId) {
        let id = self.id;
        self.staged.retain(|old, request| {
            let superseded = old.coordinator == txid.coordinator && old.seq < txid.seq;
            if superseded {
                warn!(
                    "participant {} drops {} staged by {}, superseded by {}",
                    id, request, old, txid
                );
            }
            !superseded
        });
    }

    /// Apply the staged write of `txid`.
    pub fn commit(&mut self, txid: TxnId, request: Request) {
        let request = match self.staged.remove(&txid) {
            Some(staged) => staged,
            None => {
                warn!(
                    "participant {} commits {} with nothing staged, applying {}",
                    self.id, txid, request
                );
                request
            }
        };
        self.store.apply(&request);
        info!("participant {} committed {} for {}", self.id, request, txid);
    }

    /// Discard whatever `txid` staged.
    pub fn abort(&mut self, txid: TxnId) {
        if let Some(request) = self.staged.remove(&txid) {
            debug!("participant {} discarded {} for {}", self.id, request, txid);
        }
    }

    fn acknowledge(&self, txid: TxnId) {
        let coordinator = match self.coordinators.get(txid.coordinator as usize) {
            Some(c) => c.clone(),
            None => {
                warn!(
                    "participant {} has no route to coordinator {}",
                    self.id, txid.coordinator
                );
                return;
            }
        };
        let node = self.id;
        tokio::spawn(async move {
            if let Err(e) = coordinator.have_committed(txid, node).await {
                debug!("acknowledgement of {} from node {} lost: {}", txid, node, e);
            }
        });
    }
}

#[labrpc::async_trait]
impl ParticipantService for Participant {
    async fn can_commit(&mut self, txid: TxnId, request: Request) -> Result<bool> {
        Ok(self.vote(txid, request))
    }
    async fn do_commit(&mut self, txid: TxnId, request: Request) -> Result<bool> {
        self.commit(txid, request);
        self.acknowledge(txid);
        Ok(true)
    }
    async fn do_abort(&mut self, txid: TxnId, _request: Request) -> Result<bool> {
        self.abort(txid);
        Ok(true)
    }
}
