#![deny(missing_docs)]
#![deny(clippy::all)]
//! Agreement protocols for a replicated key-value store.
//!
//! Two interchangeable ways to get one write onto every replica: two-phase
//! commit, which needs every node to vote yes, and Paxos, which needs a
//! majority at each phase. Both end by applying the write to each node's
//! [`ReplicaStore`].

use labrpc::NodeId;

labrpc::service! {
    service participant_svc {
        fn can_commit(txid: TxnId, request: Request) -> bool;
        fn do_commit(txid: TxnId, request: Request) -> bool;
        fn do_abort(txid: TxnId, request: Request) -> bool;
    }
}

labrpc::service! {
    service coordinator_svc {
        fn have_committed(txid: TxnId, node: NodeId) -> bool;
    }
}

labrpc::service! {
    service acceptor_svc {
        fn prepare(number: ProposalNumber) -> PrepareReply;
        fn propose(number: ProposalNumber, request: Request) -> bool;
        fn learn(number: ProposalNumber, request: Request) -> ();
    }
}

pub use participant_svc::{
    Client as ParticipantClient, Server as ParticipantServer, Service as ParticipantService,
};

pub use coordinator_svc::{
    Client as CoordinatorClient, Server as CoordinatorServer, Service as CoordinatorService,
};

pub use acceptor_svc::{
    Client as AcceptorClient, Server as AcceptorServer, Service as AcceptorService,
};

mod acceptor;
mod acks;
pub mod bootstrap;
mod config;
mod coordinator;
mod error;
mod number;
mod participant;
mod proposer;
mod request;
mod retry;
mod store;

/// Util functions for testing.
pub mod tests;

pub use acceptor::{Acceptor, PrepareReply, PromiseRecord};
pub use acks::{AckTracker, Receipt};
pub use config::{PaxosConfig, TwoPhaseConfig};
pub use coordinator::{Coordinator, CoordinatorPhase};
pub use error::{KvError, Phase, RoundError};
pub use number::{ProposalCounter, ProposalNumber};
pub use participant::Participant;
pub use proposer::{choose_value, Proposer};
pub use request::{validate_key, validate_value, Request, TxnId};
pub use store::ReplicaStore;

/// Something that can get a write agreed on and applied across the cluster.
#[labrpc::async_trait]
pub trait Agreement: Send {
    /// Drive `request` to a decision. `Ok` means it was applied on enough replicas.
    async fn submit(&mut self, request: Request) -> Result<(), KvError>;
}
