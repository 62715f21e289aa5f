use crate::{
    bootstrap::{spawn_paxos_node, spawn_two_phase_node},
    Coordinator, PaxosConfig, Proposer, ReplicaStore, TwoPhaseConfig,
};

use labrpc::{
    client::Client, network::NetworkPackage, tokio, tokio::sync::mpsc::Sender, Directory,
    FaultHandle, Network,
};
use std::time::Duration;
use tokio::task::JoinHandle;

#[cfg(test)]
use crate::{
    bootstrap::{ACCEPTOR, PARTICIPANT},
    AcceptorClient, Agreement, KvError, ParticipantClient, ProposalNumber, Request, TxnId,
};
#[cfg(test)]
use labrpc::{FaultPolicy, Partition};
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-call timeout used by the test clusters.
pub const RPC_TIMEOUT: Duration = Duration::from_millis(100);

/// N nodes of one protocol sharing an in-process network.
///
/// Tasks are aborted when the cluster is dropped.
pub struct TestCluster<D> {
    /// Addresses of the nodes.
    pub directory: Directory,
    /// Fault policy of the shared network.
    pub faults: FaultHandle,
    /// Store of node `i`.
    pub stores: Vec<ReplicaStore>,
    /// Coordinator or proposer of node `i`.
    pub drivers: Vec<D>,
    net_tx: Sender<NetworkPackage>,
    handles: Vec<JoinHandle<()>>,
}

impl<D> TestCluster<D> {
    /// Client for `service` on node `id`, bypassing the driver.
    pub fn client<C: Client>(&self, id: u32, service: &str) -> C {
        C::from_server(self.directory.route(id, service), self.net_tx.clone())
    }
}

impl<D> Drop for TestCluster<D> {
    fn drop(&mut self) {
        for h in &self.handles {
            h.abort();
        }
    }
}

fn build<D>(
    n: u32,
    spawn: impl Fn(&Network, &Directory, u32, ReplicaStore) -> (D, Vec<JoinHandle<()>>),
) -> TestCluster<D> {
    let mut net = Network::new();
    let directory = Directory::new("127.0.0.1", 9000, n);
    let mut stores = Vec::new();
    let mut drivers = Vec::new();
    let mut handles = Vec::new();

    for i in directory.nodes() {
        let store = ReplicaStore::new();
        let (driver, tasks) = spawn(&net, &directory, i, store.clone());
        stores.push(store);
        drivers.push(driver);
        handles.extend(tasks);
    }

    let faults = net.faults();
    let net_tx = net.tx.clone();
    handles.push(tokio::spawn(async move {
        net.run().await;
    }));

    TestCluster {
        directory,
        faults,
        stores,
        drivers,
        net_tx,
        handles,
    }
}

/// Create a cluster of `n` 2PC nodes for testing.
pub fn twopc_cluster(n: u32, config: TwoPhaseConfig) -> TestCluster<Coordinator> {
    build(n, |net, dir, i, store| {
        spawn_two_phase_node(net, dir, i, store, RPC_TIMEOUT, config.clone())
    })
}

/// Create a cluster of `n` Paxos nodes for testing.
pub fn paxos_cluster(n: u32, config: PaxosConfig) -> TestCluster<Proposer> {
    build(n, |net, dir, i, store| {
        spawn_paxos_node(net, dir, i, store, RPC_TIMEOUT, config.clone())
    })
}

#[cfg(test)]
fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[cfg(test)]
fn fast_paxos(max_rounds: usize) -> PaxosConfig {
    PaxosConfig {
        max_rounds,
        backoff_min_ms: 1,
        backoff_max_ms: 10,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_twopc_all_yes_commits_everywhere() {
    init_logger();
    let mut c = twopc_cluster(3, TwoPhaseConfig::default());

    let receipt = c.drivers[0]
        .transact(Request::put("k", "v"))
        .await
        .unwrap();
    for s in &c.stores {
        assert_eq!(s.get("k").unwrap(), "v");
    }
    assert_eq!(receipt.acknowledged().await, 3);

    // Any node may coordinate.
    c.drivers[2].submit(Request::delete("k")).await.unwrap();
    for s in &c.stores {
        assert!(s.is_empty());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_twopc_one_no_commits_nowhere() {
    init_logger();
    let mut c = twopc_cluster(3, TwoPhaseConfig::default());

    // Another transaction holds "k" on node 2, so node 2 votes no.
    let blocker = TxnId {
        coordinator: 9,
        seq: 1,
    };
    let p2: ParticipantClient = c.client(2, PARTICIPANT);
    assert!(p2.can_commit(blocker, Request::put("k", "other")).await.unwrap());

    let r = c.drivers[0].submit(Request::put("k", "v")).await;
    assert!(matches!(r, Err(KvError::AggregateFailure(_))));
    for s in &c.stores {
        assert!(s.get("k").is_err());
    }

    // Aborting released the stage on nodes 0 and 1; releasing node 2 lets the write through.
    assert!(p2.do_abort(blocker, Request::put("k", "other")).await.unwrap());
    c.drivers[1].submit(Request::put("k", "v")).await.unwrap();
    for s in &c.stores {
        assert_eq!(s.get("k").unwrap(), "v");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_twopc_unreachable_participant_aborts() {
    init_logger();
    let config = TwoPhaseConfig {
        vote_attempts: 2,
        apply_attempts: 1,
        ..TwoPhaseConfig::default()
    };
    let mut c = twopc_cluster(3, config);
    c.faults.set(Partition::isolate(vec![c.directory.address(2)]));

    let r = c.drivers[0].submit(Request::put("k", "v")).await;
    assert!(matches!(r, Err(KvError::AggregateFailure(_))));
    for s in &c.stores {
        assert!(s.is_empty());
    }

    c.faults.clear();
    c.drivers[0].submit(Request::put("k", "v")).await.unwrap();
    for s in &c.stores {
        assert_eq!(s.get("k").unwrap(), "v");
    }
}

/// Lets the first package to `route` through and drops every later one.
#[cfg(test)]
#[derive(Debug)]
struct FirstOnly {
    route: String,
    passed: AtomicBool,
}

#[cfg(test)]
impl FaultPolicy for FirstOnly {
    fn should_drop(&self, route: &str) -> bool {
        route == self.route && self.passed.swap(true, Ordering::SeqCst)
    }
}

/// Node 2 votes yes on the first write, then hears nothing more.
#[cfg(test)]
fn lose_decisions_at_node_2(c: &TestCluster<Coordinator>) {
    c.faults.set(FirstOnly {
        route: c.directory.route(2, PARTICIPANT),
        passed: AtomicBool::new(false),
    });
}

#[cfg(test)]
fn lossy_apply() -> TwoPhaseConfig {
    TwoPhaseConfig {
        vote_attempts: 1,
        apply_attempts: 2,
        ack_timeout_ms: 200,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_twopc_lost_commit_is_not_rolled_back() {
    init_logger();
    let mut c = twopc_cluster(3, lossy_apply());
    lose_decisions_at_node_2(&c);

    let receipt = c.drivers[0]
        .transact(Request::put("k", "v"))
        .await
        .unwrap();
    assert_eq!(c.stores[0].get("k").unwrap(), "v");
    assert_eq!(c.stores[1].get("k").unwrap(), "v");
    assert!(c.stores[2].is_empty());
    assert_eq!(receipt.acknowledged().await, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_twopc_key_usable_after_lost_commit() {
    init_logger();
    let mut c = twopc_cluster(3, lossy_apply());
    lose_decisions_at_node_2(&c);
    c.drivers[0].submit(Request::put("k", "v1")).await.unwrap();
    assert!(c.stores[2].is_empty());

    c.faults.clear();
    c.drivers[0].submit(Request::put("k", "v2")).await.unwrap();
    for s in &c.stores {
        assert_eq!(s.get("k").unwrap(), "v2");
    }
    c.drivers[1].submit(Request::put("k", "v3")).await.unwrap();
    for s in &c.stores {
        assert_eq!(s.get("k").unwrap(), "v3");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_twopc_rejects_invalid_before_voting() {
    init_logger();
    let mut c = twopc_cluster(3, TwoPhaseConfig::default());
    let r = c.drivers[0].submit(Request::put("k", "")).await;
    assert!(matches!(r, Err(KvError::Validation(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_paxos_basic() {
    init_logger();
    let mut c = paxos_cluster(3, fast_paxos(3));

    c.drivers[1].choose(Request::put("a", "1")).await.unwrap();
    c.drivers[2].choose(Request::put("b", "2")).await.unwrap();
    c.drivers[0].choose(Request::delete("a")).await.unwrap();
    for s in &c.stores {
        assert!(s.get("a").is_err());
        assert_eq!(s.get("b").unwrap(), "2");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_paxos_survives_one_unreachable_acceptor() {
    init_logger();
    let mut c = paxos_cluster(3, fast_paxos(3));
    c.faults.set(Partition::isolate(vec![c.directory.address(2)]));

    c.drivers[0].choose(Request::put("k", "v")).await.unwrap();
    assert_eq!(c.stores[0].get("k").unwrap(), "v");
    assert_eq!(c.stores[1].get("k").unwrap(), "v");
    assert!(c.stores[2].is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_paxos_fails_without_majority() {
    init_logger();
    let mut c = paxos_cluster(3, fast_paxos(3));
    c.faults.set(Partition::isolate(vec![
        c.directory.address(1),
        c.directory.address(2),
    ]));

    let r = c.drivers[0].submit(Request::put("k", "v")).await;
    assert!(matches!(r, Err(KvError::AggregateFailure(_))));
    for s in &c.stores {
        assert!(s.is_empty());
    }
}

/// Acceptors 0 and 1 accepted `k=v1` under #5.9, but nobody learned it.
#[cfg(test)]
async fn seed_accepted(c: &TestCluster<Proposer>) {
    let number = ProposalNumber::new(5, 9);
    for i in 0..2 {
        let a: AcceptorClient = c.client(i, ACCEPTOR);
        a.prepare(number).await.unwrap();
        assert!(a.propose(number, Request::put("k", "v1")).await.unwrap());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_paxos_carries_accepted_value() {
    init_logger();
    // Round 1 is refused, round 2 has to finish v1 and the budget ends there.
    let mut c = paxos_cluster(3, fast_paxos(2));
    seed_accepted(&c).await;

    let r = c.drivers[2].choose(Request::put("k", "v2")).await;
    assert!(matches!(r, Err(KvError::AggregateFailure(_))));
    for s in &c.stores {
        assert_eq!(s.get("k").unwrap(), "v1");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_paxos_own_value_after_carry() {
    init_logger();
    let mut c = paxos_cluster(3, fast_paxos(3));
    seed_accepted(&c).await;

    let number = c.drivers[2].choose(Request::put("k", "v2")).await.unwrap();
    assert!(number > ProposalNumber::new(5, 9));
    for s in &c.stores {
        assert_eq!(s.get("k").unwrap(), "v2");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_paxos_learn_idempotent() {
    init_logger();
    let c = paxos_cluster(3, fast_paxos(3));
    let a: AcceptorClient = c.client(0, ACCEPTOR);
    let number = ProposalNumber::new(1, 0);

    a.learn(number, Request::put("k", "v")).await.unwrap();
    let once = c.stores[0].snapshot();
    a.learn(number, Request::put("k", "v")).await.unwrap();
    assert_eq!(c.stores[0].snapshot(), once);

    a.learn(number, Request::delete("k")).await.unwrap();
    a.learn(number, Request::delete("k")).await.unwrap();
    assert!(c.stores[0].is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_paxos_concurrent_proposers() {
    init_logger();
    let c = paxos_cluster(3, fast_paxos(20));

    let mut tasks = Vec::new();
    for (i, mut p) in c.drivers.iter().cloned().enumerate() {
        tasks.push(tokio::spawn(async move {
            p.choose(Request::put(format!("key{}", i), format!("v{}", i)))
                .await
        }));
    }
    for t in tasks {
        t.await.unwrap().unwrap();
    }
    for i in 0..3 {
        let key = format!("key{}", i);
        let holders = c.stores.iter().filter(|s| s.get(&key).is_ok()).count();
        assert!(holders >= 2, "{} on {} nodes", key, holders);
    }
}
