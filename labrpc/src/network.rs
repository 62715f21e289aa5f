use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use futures::Future;
use log::{debug, trace, warn};
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::{client::Client, fault::FaultHandle, server::Server};

#[derive(Debug, Clone)]
pub struct NetworkPackage {
    pub to: String,
    pub reply: Sender<String>,
    pub data: String,
}

/// Routes packages from clients to registered servers.
///
/// Every package passes the current [`FaultPolicy`](crate::FaultPolicy) first; a dropped
/// package takes its reply channel with it, so the caller observes a transport failure.
pub struct Network {
    pub tx: Sender<NetworkPackage>,
    rx: Receiver<NetworkPackage>,
    pub nodes: Arc<Mutex<HashMap<String, Sender<NetworkPackage>>>>,
    faults: FaultHandle,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(100);
        Self {
            tx,
            rx,
            nodes: Arc::new(Mutex::new(HashMap::default())),
            faults: FaultHandle::default(),
        }
    }

    /// Handle to swap the fault policy while the router runs.
    pub fn faults(&self) -> FaultHandle {
        self.faults.clone()
    }

    /// Build a client for `id` without owning its server.
    pub fn client<C: Client>(&self, id: impl Into<String>) -> C {
        C::from_server(id.into(), self.tx.clone())
    }

    /// Register `svc` under `id`. The returned future serves requests until the runtime drops it.
    pub fn register_service<S, C>(&self, id: String, svc: S::Service) -> (C, impl Future<Output = ()>)
    where
        S: Server + Send + 'static,
        C: Client,
    {
        let client = C::from_server(id.clone(), self.tx.clone());
        let mut server = S::from_service(svc);
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), server.client_chan());
        (client, async move {
            server.run().await;
            debug!("service {} stopped", id);
        })
    }

    pub async fn run(&mut self) {
        while let Some(p) = self.rx.recv().await {
            if self.faults.should_drop(&p.to) {
                trace!("fault injected, dropped package to {}", p.to);
                continue;
            }
            let node = {
                let x = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
                x.get(&p.to).cloned()
            };

            if let Some(x) = node {
                if x.send(p).await.is_err() {
                    warn!("send to node failed, dropped");
                }
            } else {
                warn!("node {} not found", p.to);
            }
        }
    }
}
