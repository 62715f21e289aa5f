//! A small in-process RPC framework for experimenting with replication protocols.
//!
//! Services are declared with [`service!`], routed through a [`Network`], and
//! can be made unreliable at runtime through a [`FaultPolicy`].

pub mod client;
pub mod directory;
pub mod fault;
mod macros;
pub mod network;
pub mod server;

pub use anyhow;
pub use async_trait::async_trait;
pub use futures;
pub use log;
pub use rand;
pub use serde;
pub use serde_json;
pub use tokio;

pub use directory::{Directory, NodeId};
pub use fault::{FaultHandle, FaultPolicy, NoFaults, Partition, RandomFaults};
pub use network::Network;
