use std::time::Duration;

use labrpc::{
    futures::future::join_all,
    log::{debug, info, warn},
    tokio, NodeId,
};
use rand::Rng;

use crate::{
    AcceptorClient, Agreement, KvError, PaxosConfig, Phase, PrepareReply, PromiseRecord,
    ProposalCounter, ProposalNumber, Request, RoundError,
};

/// Proposer role of one node.
///
/// Drives a write through prepare, propose and learn against every acceptor
/// of the cluster, its own included. A round needs more than half of the
/// acceptors at each phase; a failed round is retried with a larger number.
#[derive(Debug, Clone)]
pub struct Proposer {
    id: NodeId,
    acceptors: Vec<(NodeId, AcceptorClient)>,
    counter: ProposalCounter,
    config: PaxosConfig,
}

impl Proposer {
    /// Proposer of node `id` talking to `acceptors`.
    pub fn new(id: NodeId, acceptors: Vec<(NodeId, AcceptorClient)>, config: PaxosConfig) -> Self {
        Self {
            id,
            acceptors,
            counter: ProposalCounter::new(id),
            config,
        }
    }

    fn majority(&self) -> usize {
        self.acceptors.len() / 2 + 1
    }

    /// Get `request` chosen and learned, returning the number it was chosen under.
    ///
    /// A round that ends up completing some earlier accepted value for the same
    /// key is followed by another round for `request`, inside the same budget.
    pub async fn choose(&mut self, request: Request) -> Result<ProposalNumber, KvError> {
        let rounds = self.config.max_rounds.max(1);
        for attempt in 1..=rounds {
            let number = self.counter.next();
            match self.round(number, &request).await {
                Ok(chosen) if chosen == request => {
                    info!("proposer {} chose {} under {}", self.id, request, number);
                    return Ok(number);
                }
                Ok(chosen) => {
                    info!(
                        "proposer {} completed earlier {} under {}, {} still pending",
                        self.id, chosen, number, request
                    );
                }
                Err(e) => {
                    warn!(
                        "proposer {} round {} ({}/{}) failed: {}",
                        self.id, number, attempt, rounds, e
                    );
                }
            }
            if attempt < rounds {
                let dt = rand::thread_rng().gen_range(self.config.backoff());
                tokio::time::sleep(Duration::from_millis(dt)).await;
            }
        }
        Err(KvError::AggregateFailure(format!(
            "{} not chosen after {} rounds",
            request, rounds
        )))
    }

    async fn round(&mut self, number: ProposalNumber, request: &Request) -> Result<Request, RoundError> {
        let majority = self.majority();

        let replies = join_all(
            self.acceptors
                .iter()
                .map(|(id, c)| async move { (*id, c.prepare(number).await) }),
        )
        .await;
        let mut promised = Vec::new();
        let mut promises = Vec::new();
        for (id, reply) in replies {
            match reply {
                Ok(PrepareReply::Promise(record)) => {
                    promised.push(id);
                    promises.push(record);
                }
                Ok(PrepareReply::Refused { promised: higher }) => {
                    debug!("acceptor {} refused {}, saw {}", id, number, higher);
                    self.counter.observe(higher);
                }
                Err(e) => warn!("prepare {} to acceptor {} failed: {}", number, id, e),
            }
        }
        if promised.len() < majority {
            return Err(RoundError::QuorumNotReached {
                phase: Phase::Prepare,
                got: promised.len(),
                need: majority,
            });
        }

        let value = choose_value(request, &promises);
        if &value != request {
            info!("proposer {} adopts {} under {}", self.id, value, number);
        }

        let replies = join_all(
            self.acceptors
                .iter()
                .filter(|(id, _)| promised.contains(id))
                .map(|(id, c)| {
                    let value = value.clone();
                    async move { (*id, c.propose(number, value).await) }
                }),
        )
        .await;
        let mut accepted = 0;
        for (id, reply) in replies {
            match reply {
                Ok(true) => accepted += 1,
                Ok(false) => debug!("acceptor {} rejected {}", id, number),
                Err(e) => warn!("propose {} to acceptor {} failed: {}", number, id, e),
            }
        }
        if accepted < majority {
            return Err(RoundError::QuorumNotReached {
                phase: Phase::Propose,
                got: accepted,
                need: majority,
            });
        }

        // Broadcast so replicas that missed phase 2 still converge.
        let replies = join_all(self.acceptors.iter().map(|(id, c)| {
            let value = value.clone();
            async move { (*id, c.learn(number, value).await) }
        }))
        .await;
        let mut learned = 0;
        for (id, reply) in replies {
            match reply {
                Ok(()) => learned += 1,
                Err(e) => warn!("learn {} at node {} failed: {}", number, id, e),
            }
        }
        if learned < majority {
            return Err(RoundError::QuorumNotReached {
                phase: Phase::Learn,
                got: learned,
                need: majority,
            });
        }
        Ok(value)
    }
}

#[labrpc::async_trait]
impl Agreement for Proposer {
    async fn submit(&mut self, request: Request) -> Result<(), KvError> {
        self.choose(request).await.map(|_| ())
    }
}

/// Pick what a round proposes after phase 1.
///
/// If a promise reports a value accepted for the same key, the highest-numbered
/// such value replaces `request`, unless a promise shows that a decision on that
/// key numbered at least as high was already learned.
pub fn choose_value(request: &Request, promises: &[PromiseRecord]) -> Request {
    let learned = promises
        .iter()
        .filter_map(|p| p.learned(request.key()))
        .max();
    promises
        .iter()
        .filter_map(PromiseRecord::last_accepted)
        .filter(|(_, r)| r.key() == request.key())
        .filter(|(n, _)| learned.map_or(true, |l| *n > l))
        .max_by_key(|(n, _)| *n)
        .map(|(_, r)| r.clone())
        .unwrap_or_else(|| request.clone())
}
