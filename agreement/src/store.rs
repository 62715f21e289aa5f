use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, PoisonError, RwLock},
};

use labrpc::log::trace;

use crate::{KvError, Request};

/// In-memory key-value map shared by the protocol handlers of one node.
///
/// Locks are held only for the single map operation; no lock spans a network
/// round-trip. Mutations arrive through the node's participant or learner
/// service, which handle one message at a time.
#[derive(Debug, Clone, Default)]
pub struct ReplicaStore {
    map: Arc<RwLock<HashMap<String, String>>>,
}

impl ReplicaStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `key`.
    pub fn get(&self, key: &str) -> Result<String, KvError> {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| KvError::NotFound(key.to_owned()))
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Upsert, returning the previous value.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into())
    }

    /// Remove `key`, returning its value.
    pub fn delete(&self, key: &str) -> Result<String, KvError> {
        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .ok_or_else(|| KvError::NotFound(key.to_owned()))
    }

    /// Apply an agreed write. Both operations are idempotent.
    pub fn apply(&self, request: &Request) {
        trace!("apply {}", request);
        match request {
            Request::Put { key, value } => {
                self.put(key.clone(), value.clone());
            }
            Request::Delete { key } => {
                let _ = self.delete(key);
            }
        }
    }

    /// Sorted copy of the contents.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.map.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_put_delete() {
        let s = ReplicaStore::new();
        assert_eq!(s.get("a"), Err(KvError::NotFound("a".into())));
        assert_eq!(s.put("a", "1"), None);
        assert_eq!(s.put("a", "2"), Some("1".into()));
        assert_eq!(s.get("a").unwrap(), "2");
        assert!(s.contains("a"));
        assert_eq!(s.delete("a").unwrap(), "2");
        assert!(matches!(s.delete("a"), Err(KvError::NotFound(_))));
        assert!(s.is_empty());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let s = ReplicaStore::new();
        let put = Request::put("k", "v");
        s.apply(&put);
        let once = s.snapshot();
        s.apply(&put);
        assert_eq!(s.snapshot(), once);

        let del = Request::delete("k");
        s.apply(&del);
        let once = s.snapshot();
        s.apply(&del);
        assert_eq!(s.snapshot(), once);
        assert!(s.is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let s = ReplicaStore::new();
        let t = s.clone();
        s.put("x", "1");
        assert_eq!(t.get("x").unwrap(), "1");
        assert_eq!(t.len(), 1);
    }
}
