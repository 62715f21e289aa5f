use labrpc::{
    futures::future::join_all,
    log::{debug, error, info, warn},
    tokio::{self, sync::oneshot},
    NodeId,
};

use crate::{
    retry::with_retries, AckTracker, Agreement, KvError, ParticipantClient, Phase, Receipt,
    Request, RoundError, TwoPhaseConfig, TxnId,
};

/// Where a transaction stands on its coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    /// Transaction id assigned, nothing sent.
    Init,
    /// `can_commit` sent to every participant.
    AwaitVotes,
    /// Unanimous; `do_commit` being sent.
    Commit,
    /// At least one "no"; `do_abort` being sent.
    Abort,
    /// Committed, acknowledgements still arriving.
    AwaitAcks,
    /// Nothing left to do.
    Done,
}

/// Bookkeeping of one in-flight transaction.
#[derive(Debug)]
struct RoundState {
    txid: TxnId,
    phase: CoordinatorPhase,
    yes: Vec<NodeId>,
    no: Vec<NodeId>,
}

impl RoundState {
    fn new(txid: TxnId) -> Self {
        Self {
            txid,
            phase: CoordinatorPhase::Init,
            yes: Vec::new(),
            no: Vec::new(),
        }
    }

    fn advance(&mut self, phase: CoordinatorPhase) {
        debug!("{}: {:?} -> {:?}", self.txid, self.phase, phase);
        self.phase = phase;
    }

    fn unanimous(&self, voters: usize) -> bool {
        self.no.is_empty() && self.yes.len() == voters
    }
}

/// 2PC coordinator role of one node.
///
/// The node's own participant is one of `participants`, so it votes like
/// everyone else. Acknowledgements land in the shared [`AckTracker`] that the
/// node's coordinator service answers from.
#[derive(Debug, Clone)]
pub struct Coordinator {
    id: NodeId,
    participants: Vec<(NodeId, ParticipantClient)>,
    acks: AckTracker,
    seq: u64,
    config: TwoPhaseConfig,
}

impl Coordinator {
    /// Coordinator of node `id`.
    pub fn new(
        id: NodeId,
        participants: Vec<(NodeId, ParticipantClient)>,
        acks: AckTracker,
        config: TwoPhaseConfig,
    ) -> Self {
        Self {
            id,
            participants,
            acks,
            seq: 0,
            config,
        }
    }

    fn next_txid(&mut self) -> TxnId {
        self.seq += 1;
        TxnId {
            coordinator: self.id,
            seq: self.seq,
        }
    }

    /// Run one transaction to its decision.
    ///
    /// Commits only if every participant votes yes; any "no" or unreachable
    /// participant aborts the transaction everywhere.
    pub async fn transact(&mut self, request: Request) -> Result<Receipt, KvError> {
        request.validate()?;
        let txid = self.next_txid();
        let mut round = RoundState::new(txid);
        // Opened early: a fast participant may acknowledge before the commit fan-out returns.
        self.acks.open(txid);

        round.advance(CoordinatorPhase::AwaitVotes);
        let attempts = self.config.vote_attempts;
        let votes = join_all(self.participants.iter().map(|(id, c)| {
            let request = &request;
            async move {
                let vote = with_retries(*id, "can_commit", attempts, || {
                    c.can_commit(txid, request.clone())
                })
                .await;
                (*id, vote)
            }
        }))
        .await;
        for (id, vote) in votes {
            match vote {
                Ok(true) => round.yes.push(id),
                Ok(false) => {
                    debug!("{}: node {} votes no", txid, id);
                    round.no.push(id);
                }
                Err(e) => {
                    warn!("{}: counting node {} as no: {}", txid, id, e);
                    round.no.push(id);
                }
            }
        }

        if !round.unanimous(self.participants.len()) {
            round.advance(CoordinatorPhase::Abort);
            self.acks.close(txid);
            self.apply(&round, "do_abort", &request).await;
            round.advance(CoordinatorPhase::Done);
            let e = RoundError::QuorumNotReached {
                phase: Phase::Vote,
                got: round.yes.len(),
                need: self.participants.len(),
            };
            info!("{} aborted {}: {}", txid, request, e);
            return Err(KvError::AggregateFailure(format!("{} aborted: {}", txid, e)));
        }

        round.advance(CoordinatorPhase::Commit);
        self.apply(&round, "do_commit", &request).await;
        info!("{} committed {}", txid, request);

        round.advance(CoordinatorPhase::AwaitAcks);
        let (tx, rx) = oneshot::channel();
        let acks = self.acks.clone();
        let expected = self.participants.len();
        let timeout = self.config.ack_timeout();
        tokio::spawn(async move {
            let n = acks.wait(txid, expected, timeout).await;
            // Nobody may be holding the receipt any more.
            let _ = tx.send(n);
        });
        round.advance(CoordinatorPhase::Done);
        Ok(Receipt::new(txid, rx))
    }

    /// Send the decision to every participant. Failures are logged, never rolled back.
    async fn apply(&self, round: &RoundState, method: &str, request: &Request) {
        let txid = round.txid;
        let commit = round.phase == CoordinatorPhase::Commit;
        let attempts = self.config.apply_attempts;
        let replies = join_all(self.participants.iter().map(|(id, c)| async move {
            let reply = with_retries(*id, method, attempts, || async move {
                if commit {
                    c.do_commit(txid, request.clone()).await
                } else {
                    c.do_abort(txid, request.clone()).await
                }
            })
            .await;
            (*id, reply)
        }))
        .await;
        for (id, reply) in replies {
            match reply {
                Ok(_) => {}
                Err(e) if commit => {
                    error!("{}: node {} may never apply {}: {}", txid, id, request, e)
                }
                Err(e) => warn!("{}: node {} did not hear the abort: {}", txid, id, e),
            }
        }
    }
}

#[labrpc::async_trait]
impl Agreement for Coordinator {
    async fn submit(&mut self, request: Request) -> Result<(), KvError> {
        self.transact(request).await.map(|_| ())
    }
}
