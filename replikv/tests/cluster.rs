use agreement::{KvError, PaxosConfig};
use labrpc::{tokio, Partition};
use rand::{distributions::Alphanumeric, Rng};
use replikv::{Cluster, ClusterConfig, Protocol};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Create random string of length n.
fn random_string(n: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(n)
        .map(char::from)
        .collect()
}

fn config(protocol: Protocol) -> ClusterConfig {
    ClusterConfig {
        protocol,
        rpc_timeout_ms: 100,
        paxos: PaxosConfig {
            backoff_min_ms: 1,
            backoff_max_ms: 10,
            ..PaxosConfig::default()
        },
        ..ClusterConfig::default()
    }
}

async fn put_get_delete(protocol: Protocol) {
    let cluster = Cluster::launch(&config(protocol)).unwrap();
    let client = cluster.client();

    client.put("k", "v1").await.unwrap();
    client.put("k", "v2").await.unwrap();
    assert_eq!(client.get("k").await.unwrap(), "v2");
    for s in cluster.stores() {
        assert_eq!(s.get("k").unwrap(), "v2");
    }

    client.delete("k").await.unwrap();
    assert_eq!(client.get("k").await, Err(KvError::NotFound("k".into())));
    assert_eq!(client.delete("k").await, Err(KvError::NotFound("k".into())));
    for s in cluster.stores() {
        assert!(s.is_empty());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_put_get_delete_2pc() {
    init_logger();
    put_get_delete(Protocol::TwoPhaseCommit).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_put_get_delete_paxos() {
    init_logger();
    put_get_delete(Protocol::Paxos).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_validation_errors() {
    init_logger();
    let cluster = Cluster::launch(&config(Protocol::Paxos)).unwrap();
    let client = cluster.client();
    assert!(matches!(client.put("", "v").await, Err(KvError::Validation(_))));
    assert!(matches!(client.put("k", "  ").await, Err(KvError::Validation(_))));
    assert!(matches!(client.get(" ").await, Err(KvError::Validation(_))));
    assert!(matches!(client.delete("").await, Err(KvError::Validation(_))));
    for s in cluster.stores() {
        assert!(s.is_empty());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_client_fails_over() {
    init_logger();
    let cluster = Cluster::launch(&config(Protocol::Paxos)).unwrap();
    let client = cluster.client();
    cluster
        .faults()
        .set(Partition::isolate(vec![cluster.directory().address(0)]));

    // Node 0 is gone, the client moves on to node 1 and its majority still holds.
    client.put("k", "v").await.unwrap();
    assert_eq!(client.get("k").await.unwrap(), "v");
    assert!(cluster.store(0).unwrap().is_empty());
    assert_eq!(cluster.store(1).unwrap().get("k").unwrap(), "v");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_no_node_reachable() {
    init_logger();
    let cluster = Cluster::launch(&config(Protocol::TwoPhaseCommit)).unwrap();
    let client = cluster.client();
    let dir = cluster.directory().clone();
    cluster
        .faults()
        .set(Partition::isolate(dir.nodes().map(|i| dir.address(i))));
    assert!(matches!(
        client.get("k").await,
        Err(KvError::AggregateFailure(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_2pc_any_node_unreachable_rejects_writes() {
    init_logger();
    let mut c = config(Protocol::TwoPhaseCommit);
    c.two_phase.vote_attempts = 1;
    c.two_phase.apply_attempts = 1;
    let cluster = Cluster::launch(&c).unwrap();
    cluster
        .faults()
        .set(Partition::isolate(vec![cluster.directory().address(2)]));

    let replica = cluster.replica(0).unwrap();
    assert!(matches!(
        replica.put("k", "v").await,
        Err(KvError::AggregateFailure(_))
    ));
    for s in cluster.stores() {
        assert!(s.is_empty());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_writers() {
    init_logger();
    const N: usize = 10;
    for protocol in [Protocol::TwoPhaseCommit, Protocol::Paxos].iter().copied() {
        let mut c = config(protocol);
        c.paxos.max_rounds = 20;
        let cluster = Cluster::launch(&c).unwrap();

        // Each node serializes its own writes; distinct keys never conflict.
        let mut writers = Vec::new();
        for i in 0..N {
            let replica = cluster.replica((i % 3) as u32).unwrap().clone();
            writers.push(tokio::spawn(async move {
                replica
                    .put(&format!("key-{}", i), &format!("value-{}", i))
                    .await
            }));
        }
        for w in writers {
            w.await.unwrap().unwrap();
        }

        let client = cluster.client();
        for i in 0..N {
            assert_eq!(
                client.get(&format!("key-{}", i)).await.unwrap(),
                format!("value-{}", i)
            );
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_paxos_under_random_faults() {
    init_logger();
    let mut c = config(Protocol::Paxos);
    c.fault_probability = 0.1;
    c.paxos.max_rounds = 10;
    let cluster = Cluster::launch(&c).unwrap();
    let client = cluster.client();

    let mut written = Vec::new();
    for _ in 0..20 {
        let (k, v) = (random_string(8), random_string(8));
        if client.put(&k, &v).await.is_ok() {
            written.push((k, v));
        }
    }
    assert!(written.len() > 10, "only {} of 20 writes succeeded", written.len());

    for (k, v) in &written {
        let holders = cluster
            .stores()
            .filter(|s| s.get(k).as_ref() == Ok(v))
            .count();
        assert!(holders >= 2, "{} held by {} nodes", k, holders);
    }
}
