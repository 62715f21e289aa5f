use std::future::Future;

use agreement::KvError;
use labrpc::anyhow;
use log::warn;

use super::KvClient;

/// Client for a KV cluster.
///
/// Tries nodes in order and moves on only when a node cannot be reached. An
/// answer from a node, error or not, is final.
#[derive(Debug, Clone)]
pub struct Client {
    clients: Vec<KvClient>,
}

impl Client {
    /// Create a new client from a set of clients of kv.
    pub fn new(clients: Vec<KvClient>) -> Self {
        Self { clients }
    }

    /// Number of nodes the client knows.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether the client knows no node at all.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Read `key` from the first reachable node.
    pub async fn get(&self, key: &str) -> Result<String, KvError> {
        let key = key.to_owned();
        self.first_answer("get", |c| {
            let key = key.clone();
            async move { c.get(key).await }
        })
        .await
    }

    /// Write `key` through the first reachable node.
    pub async fn put(&self, key: &str, value: &str) -> Result<(), KvError> {
        let (key, value) = (key.to_owned(), value.to_owned());
        self.first_answer("put", |c| {
            let (key, value) = (key.clone(), value.clone());
            async move { c.put(key, value).await }
        })
        .await
    }

    /// Delete `key` through the first reachable node.
    pub async fn delete(&self, key: &str) -> Result<(), KvError> {
        let key = key.to_owned();
        self.first_answer("delete", |c| {
            let key = key.clone();
            async move { c.delete(key).await }
        })
        .await
    }

    async fn first_answer<T, F, Fut>(&self, op: &str, call: F) -> Result<T, KvError>
    where
        F: Fn(KvClient) -> Fut,
        Fut: Future<Output = anyhow::Result<Result<T, KvError>>>,
    {
        for c in &self.clients {
            match call(c.clone()).await {
                Ok(answer) => return answer,
                Err(e) => warn!("{} via {} failed: {}", op, c.server_id(), e),
            }
        }
        Err(KvError::AggregateFailure(format!(
            "{}: none of {} nodes reachable",
            op,
            self.clients.len()
        )))
    }
}
