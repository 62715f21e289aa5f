use std::sync::Arc;

use agreement::{validate_key, Agreement, KvError, ReplicaStore, Request};
use labrpc::{anyhow::Result, tokio::sync::Mutex, NodeId};
use log::debug;

use super::KvService;

/// Client entry point of one node.
///
/// Writes hold the node's write gate for the whole agreement round, so one node
/// runs one round at a time. Reads only touch the local store and never wait for
/// the gate.
#[derive(Clone)]
pub struct Replica {
    id: NodeId,
    store: ReplicaStore,
    driver: Arc<Mutex<Box<dyn Agreement>>>,
}

impl Replica {
    /// Node `id` serving `store` and writing through `driver`.
    pub fn new(id: NodeId, store: ReplicaStore, driver: Box<dyn Agreement>) -> Self {
        Self {
            id,
            store,
            driver: Arc::new(Mutex::new(driver)),
        }
    }

    /// Node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Local copy of the data.
    pub fn store(&self) -> &ReplicaStore {
        &self.store
    }

    /// Local read.
    pub fn get(&self, key: &str) -> Result<String, KvError> {
        validate_key(key)?;
        self.store.get(key)
    }

    /// Agreed upsert.
    pub async fn put(&self, key: &str, value: &str) -> Result<(), KvError> {
        let request = Request::put(key, value);
        request.validate()?;
        let mut driver = self.driver.lock().await;
        debug!("node {} submits {}", self.id, request);
        driver.submit(request).await
    }

    /// Agreed removal. Fails with `NotFound` when this node does not hold `key`.
    pub async fn delete(&self, key: &str) -> Result<(), KvError> {
        validate_key(key)?;
        let mut driver = self.driver.lock().await;
        if !self.store.contains(key) {
            return Err(KvError::NotFound(key.to_owned()));
        }
        let request = Request::delete(key);
        debug!("node {} submits {}", self.id, request);
        driver.submit(request).await
    }
}

#[labrpc::async_trait]
impl KvService for Replica {
    async fn get(&mut self, key: String) -> Result<Result<String, KvError>> {
        Ok(Replica::get(self, &key))
    }
    async fn put(&mut self, key: String, value: String) -> Result<Result<(), KvError>> {
        Ok(Replica::put(self, &key, &value).await)
    }
    async fn delete(&mut self, key: String) -> Result<Result<(), KvError>> {
        Ok(Replica::delete(self, &key).await)
    }
}
