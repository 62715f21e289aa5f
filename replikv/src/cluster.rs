use agreement::{
    bootstrap::{spawn_paxos_node, spawn_two_phase_node, ACCEPTOR, PARTICIPANT},
    Agreement, ReplicaStore,
};
use labrpc::{
    anyhow::Result,
    tokio::{self, task::JoinHandle},
    Directory, FaultHandle, Network, NodeId, RandomFaults,
};

use log::info;

use crate::{Client, ClusterConfig, KvClient, KvServer, Protocol, Replica};

/// Route suffix of the client-facing service.
pub const KV: &str = "kv";

/// All nodes of a cluster running inside this process on one [`Network`].
///
/// Tasks are aborted when the cluster is dropped.
pub struct Cluster {
    config: ClusterConfig,
    directory: Directory,
    faults: FaultHandle,
    replicas: Vec<Replica>,
    kv_clients: Vec<KvClient>,
    handles: Vec<JoinHandle<()>>,
}

impl Cluster {
    /// Spawn every node of `config`. Must run inside a tokio runtime.
    pub fn launch(config: &ClusterConfig) -> Result<Self> {
        config.validate()?;
        let mut net = Network::new();
        let directory = config.directory();
        let mut replicas = Vec::new();
        let mut kv_clients = Vec::new();
        let mut handles = Vec::new();

        for id in directory.nodes() {
            let store = ReplicaStore::new();
            let (driver, tasks) = match config.protocol {
                Protocol::TwoPhaseCommit => {
                    let (c, tasks) = spawn_two_phase_node(
                        &net,
                        &directory,
                        id,
                        store.clone(),
                        config.rpc_timeout(),
                        config.two_phase.clone(),
                    );
                    (Box::new(c) as Box<dyn Agreement>, tasks)
                }
                Protocol::Paxos => {
                    let (p, tasks) = spawn_paxos_node(
                        &net,
                        &directory,
                        id,
                        store.clone(),
                        config.rpc_timeout(),
                        config.paxos.clone(),
                    );
                    (Box::new(p) as Box<dyn Agreement>, tasks)
                }
            };
            handles.extend(tasks);

            let replica = Replica::new(id, store, driver);
            let (client, serve) = net.register_service::<KvServer<Replica>, KvClient>(
                directory.route(id, KV),
                replica.clone(),
            );
            handles.push(tokio::spawn(serve));
            replicas.push(replica);
            kv_clients.push(client);
        }

        let faults = net.faults();
        if config.fault_probability > 0.0 {
            faults.set(
                RandomFaults::new(config.fault_probability).services(&[ACCEPTOR, PARTICIPANT]),
            );
        }
        handles.push(tokio::spawn(async move {
            net.run().await;
        }));
        info!(
            "launched {} {} nodes from {}",
            config.nodes,
            config.protocol,
            directory.address(0)
        );

        Ok(Self {
            config: config.clone(),
            directory,
            faults,
            replicas,
            kv_clients,
            handles,
        })
    }

    /// Settings the cluster was launched with.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Node addresses.
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Fault policy of the cluster's network.
    pub fn faults(&self) -> FaultHandle {
        self.faults.clone()
    }

    /// Node `id`'s front-end, called directly.
    pub fn replica(&self, id: NodeId) -> Option<&Replica> {
        self.replicas.get(id as usize)
    }

    /// Node `id`'s local copy of the data.
    pub fn store(&self, id: NodeId) -> Option<&ReplicaStore> {
        self.replica(id).map(Replica::store)
    }

    /// Every node's local copy, by node id.
    pub fn stores(&self) -> impl Iterator<Item = &ReplicaStore> {
        self.replicas.iter().map(Replica::store)
    }

    /// Failover client over every node, in id order.
    pub fn client(&self) -> Client {
        Client::new(self.kv_clients.clone())
    }

    /// Client that only talks to node `id`.
    pub fn node_client(&self, id: NodeId) -> Option<KvClient> {
        self.kv_clients.get(id as usize).cloned()
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        for h in &self.handles {
            h.abort();
        }
    }
}
