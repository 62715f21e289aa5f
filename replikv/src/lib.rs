#![deny(missing_docs)]
#![deny(clippy::all)]
//! Replicated in-memory KV store.
//!
//! Every node keeps a full copy of the data. Reads are answered from the local
//! copy; writes go through two-phase commit or Paxos, chosen per cluster.

use agreement::KvError;

labrpc::service! {
    service kv_service {
        fn get(key: String) -> Result<String, KvError>;
        fn put(key: String, value: String) -> Result<(), KvError>;
        fn delete(key: String) -> Result<(), KvError>;
    }
}

pub use kv_service::{Client as KvClient, Service as KvService, SharedServer as KvServer};

/// KV Store Server.
pub mod kv;

/// KV Store Client.
pub mod client;

/// Cluster settings.
pub mod config;

/// In-process cluster.
pub mod cluster;

pub use client::Client;
pub use cluster::Cluster;
pub use config::{ClusterConfig, Protocol};
pub use kv::Replica;
