use std::collections::HashMap;

use labrpc::{anyhow::Result, log::debug, NodeId};
use serde::{Deserialize, Serialize};

use super::AcceptorService;
use crate::{ProposalNumber, ReplicaStore, Request};

/// State an acceptor keeps for the life of the node.
///
/// `highest_promised` never decreases, and the last accepted proposal is never
/// above it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromiseRecord {
    highest_promised: ProposalNumber,
    accepted: Option<(ProposalNumber, Request)>,
    learned: HashMap<String, ProposalNumber>,
}

impl PromiseRecord {
    /// Highest number this acceptor promised to.
    pub fn highest_promised(&self) -> ProposalNumber {
        self.highest_promised
    }

    /// Number and request most recently accepted, for any key.
    pub fn last_accepted(&self) -> Option<(ProposalNumber, &Request)> {
        self.accepted.as_ref().map(|(n, r)| (*n, r))
    }

    /// Number of the most recently accepted proposal.
    pub fn last_accepted_proposal(&self) -> Option<ProposalNumber> {
        self.accepted.as_ref().map(|(n, _)| *n)
    }

    /// Key of the most recently accepted proposal.
    pub fn last_accepted_key(&self) -> Option<&str> {
        self.accepted.as_ref().map(|(_, r)| r.key())
    }

    /// Value of the most recently accepted proposal; `None` also for deletes.
    pub fn last_accepted_value(&self) -> Option<&str> {
        self.accepted.as_ref().and_then(|(_, r)| r.value())
    }

    /// Highest number this node applied through `learn` for `key`.
    pub fn learned(&self, key: &str) -> Option<ProposalNumber> {
        self.learned.get(key).copied()
    }
}

/// Answer to `prepare`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrepareReply {
    /// The acceptor promised; its record as of the promise.
    Promise(PromiseRecord),
    /// A number at least as high was already promised.
    Refused {
        /// The number that beat the request.
        promised: ProposalNumber,
    },
}

/// Acceptor and learner roles of one node.
#[derive(Debug)]
pub struct Acceptor {
    id: NodeId,
    record: PromiseRecord,
    store: ReplicaStore,
}

impl Acceptor {
    /// Acceptor of node `id`, learning into `store`.
    pub fn new(id: NodeId, store: ReplicaStore) -> Self {
        Self {
            id,
            record: PromiseRecord::default(),
            store,
        }
    }

    /// Current promise record.
    pub fn record(&self) -> &PromiseRecord {
        &self.record
    }

    /// Phase 1b.
    pub fn on_prepare(&mut self, number: ProposalNumber) -> PrepareReply {
        if number > self.record.highest_promised {
            self.record.highest_promised = number;
            debug!("acceptor {} promised {}", self.id, number);
            PrepareReply::Promise(self.record.clone())
        } else {
            debug!(
                "acceptor {} refused {}, promised {}",
                self.id, number, self.record.highest_promised
            );
            PrepareReply::Refused {
                promised: self.record.highest_promised,
            }
        }
    }

    /// Phase 2b. Accepts only the number it promised last.
    pub fn on_propose(&mut self, number: ProposalNumber, request: Request) -> bool {
        if number != self.record.highest_promised {
            debug!(
                "acceptor {} rejected {} for {}, promised {}",
                self.id, number, request, self.record.highest_promised
            );
            return false;
        }
        debug!("acceptor {} accepted {} for {}", self.id, number, request);
        self.record.accepted = Some((number, request));
        true
    }

    /// Phase 3. Applies unconditionally; applying twice equals applying once.
    pub fn on_learn(&mut self, number: ProposalNumber, request: &Request) {
        self.store.apply(request);
        let mark = self
            .record
            .learned
            .entry(request.key().to_owned())
            .or_insert(number);
        if number > *mark {
            *mark = number;
        }
        debug!("learner {} applied {} under {}", self.id, request, number);
    }
}

#[labrpc::async_trait]
impl AcceptorService for Acceptor {
    async fn prepare(&mut self, number: ProposalNumber) -> Result<PrepareReply> {
        Ok(self.on_prepare(number))
    }
    async fn propose(&mut self, number: ProposalNumber, request: Request) -> Result<bool> {
        Ok(self.on_propose(number, request))
    }
    async fn learn(&mut self, number: ProposalNumber, request: Request) -> Result<()> {
        self.on_learn(number, &request);
        Ok(())
    }
}
