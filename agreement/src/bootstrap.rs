//! Wiring of one node's protocol services onto a [`Network`].
//!
//! Each role gets its own route so a handler never has to call back into the
//! server it is running on.

use std::time::Duration;

use labrpc::{
    client::Client,
    tokio::{self, task::JoinHandle},
    Directory, Network, NodeId,
};

use crate::{
    AckTracker, Acceptor, AcceptorClient, AcceptorServer, Coordinator, CoordinatorClient,
    CoordinatorServer, PaxosConfig, Participant, ParticipantClient, ParticipantServer, Proposer,
    ReplicaStore, TwoPhaseConfig,
};

/// Route suffix of the 2PC participant service.
pub const PARTICIPANT: &str = "participant";
/// Route suffix of the 2PC acknowledgement service.
pub const COORDINATOR: &str = "coordinator";
/// Route suffix of the Paxos acceptor/learner service.
pub const ACCEPTOR: &str = "acceptor";

fn clients<C: Client>(
    net: &Network,
    directory: &Directory,
    service: &str,
) -> Vec<(NodeId, C)> {
    directory
        .nodes()
        .map(|j| (j, net.client(directory.route(j, service))))
        .collect()
}

/// Register node `id`'s participant and acknowledgement services and build its coordinator.
///
/// Must run inside a tokio runtime; the returned handles serve until aborted.
pub fn spawn_two_phase_node(
    net: &Network,
    directory: &Directory,
    id: NodeId,
    store: ReplicaStore,
    rpc_timeout: Duration,
    config: TwoPhaseConfig,
) -> (Coordinator, Vec<JoinHandle<()>>) {
    let coordinators = clients::<CoordinatorClient>(net, directory, COORDINATOR)
        .into_iter()
        .map(|(_, c)| c.with_timeout(rpc_timeout))
        .collect();
    let participant = Participant::new(id, store, coordinators);
    let (_, serve_participant) = net
        .register_service::<ParticipantServer<Participant>, ParticipantClient>(
            directory.route(id, PARTICIPANT),
            participant,
        );

    let acks = AckTracker::new();
    let (_, serve_acks) = net.register_service::<CoordinatorServer<AckTracker>, CoordinatorClient>(
        directory.route(id, COORDINATOR),
        acks.clone(),
    );

    let participants = clients::<ParticipantClient>(net, directory, PARTICIPANT)
        .into_iter()
        .map(|(j, c)| (j, c.with_timeout(rpc_timeout)))
        .collect();
    let coordinator = Coordinator::new(id, participants, acks, config);
    (
        coordinator,
        vec![tokio::spawn(serve_participant), tokio::spawn(serve_acks)],
    )
}

/// Register node `id`'s acceptor service and build its proposer.
///
/// Must run inside a tokio runtime; the returned handle serves until aborted.
pub fn spawn_paxos_node(
    net: &Network,
    directory: &Directory,
    id: NodeId,
    store: ReplicaStore,
    rpc_timeout: Duration,
    config: PaxosConfig,
) -> (Proposer, Vec<JoinHandle<()>>) {
    let (_, serve_acceptor) = net.register_service::<AcceptorServer<Acceptor>, AcceptorClient>(
        directory.route(id, ACCEPTOR),
        Acceptor::new(id, store),
    );
    let acceptors = clients::<AcceptorClient>(net, directory, ACCEPTOR)
        .into_iter()
        .map(|(j, c)| (j, c.with_timeout(rpc_timeout)))
        .collect();
    let proposer = Proposer::new(id, acceptors, config);
    (proposer, vec![tokio::spawn(serve_acceptor)])
}
