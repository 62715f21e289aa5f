use std::{path::PathBuf, str::FromStr};
use structopt::StructOpt;

use labrpc::{
    anyhow::{anyhow, Error},
    tokio,
};
use replikv::{Cluster, ClusterConfig, Protocol};

/// One client operation given on the command line.
#[derive(Debug)]
enum Op {
    Put(String, String),
    Get(String),
    Delete(String),
}

impl FromStr for Op {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("put"), Some(k), Some(v)) => Ok(Op::Put(k.to_owned(), v.to_owned())),
            (Some("get"), Some(k), None) => Ok(Op::Get(k.to_owned())),
            (Some("delete"), Some(k), None) => Ok(Op::Delete(k.to_owned())),
            _ => Err(anyhow!(
                "bad operation {:?}, expected put:KEY:VALUE, get:KEY or delete:KEY",
                s
            )),
        }
    }
}

#[derive(StructOpt, Debug)]
#[structopt(name = env!("CARGO_PKG_NAME"), version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"), author = env!("CARGO_PKG_AUTHORS"))]
struct Opt {
    /// JSON cluster config; flags below override it
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Number of nodes
    #[structopt(short, long)]
    nodes: Option<u32>,

    /// Agreement protocol, 2pc or paxos
    #[structopt(short, long)]
    protocol: Option<Protocol>,

    /// Node i listens on base_port + i + 1
    #[structopt(long)]
    base_port: Option<u16>,

    /// Probability that a protocol message is lost
    #[structopt(long)]
    fault_probability: Option<f32>,

    /// Operations to run in order: put:KEY:VALUE, get:KEY, delete:KEY
    #[structopt(name = "OP")]
    ops: Vec<Op>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    let mut config = match &opt.config {
        Some(path) => ClusterConfig::from_file(path)?,
        None => ClusterConfig::default(),
    };
    if let Some(n) = opt.nodes {
        config.nodes = n;
    }
    if let Some(p) = opt.protocol {
        config.protocol = p;
    }
    if let Some(port) = opt.base_port {
        config.base_port = port;
    }
    if let Some(p) = opt.fault_probability {
        config.fault_probability = p;
    }

    let cluster = Cluster::launch(&config)?;
    let client = cluster.client();
    for op in opt.ops {
        match op {
            Op::Put(k, v) => match client.put(&k, &v).await {
                Ok(()) => println!("put {}={}: ok", k, v),
                Err(e) => println!("put {}={}: {}", k, v, e),
            },
            Op::Get(k) => match client.get(&k).await {
                Ok(v) => println!("get {}: {}", k, v),
                Err(e) => println!("get {}: {}", k, e),
            },
            Op::Delete(k) => match client.delete(&k).await {
                Ok(()) => println!("delete {}: ok", k),
                Err(e) => println!("delete {}: {}", k, e),
            },
        }
    }

    for id in cluster.directory().nodes() {
        if let Some(store) = cluster.store(id) {
            println!("{} {:?}", cluster.directory().address(id), store.snapshot());
        }
    }
    Ok(())
}
