use std::fmt;

use labrpc::NodeId;
use serde::{Deserialize, Serialize};

use crate::KvError;

/// A write the cluster has to agree on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Request {
    /// Insert or overwrite `key`.
    Put {
        /// Target key.
        key: String,
        /// New value.
        value: String,
    },
    /// Remove `key` if present.
    Delete {
        /// Target key.
        key: String,
    },
}

impl Request {
    /// A `Put` of `value` under `key`.
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Request::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// A `Delete` of `key`.
    pub fn delete(key: impl Into<String>) -> Self {
        Request::Delete { key: key.into() }
    }

    /// Key the request writes.
    pub fn key(&self) -> &str {
        match self {
            Request::Put { key, .. } | Request::Delete { key } => key,
        }
    }

    /// Value written, `None` for deletes.
    pub fn value(&self) -> Option<&str> {
        match self {
            Request::Put { value, .. } => Some(value),
            Request::Delete { .. } => None,
        }
    }

    /// Reject requests that must never reach a protocol round.
    pub fn validate(&self) -> Result<(), KvError> {
        validate_key(self.key())?;
        if let Request::Put { value, .. } = self {
            validate_value(value)?;
        }
        Ok(())
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Put { key, value } => write!(f, "PUT {}={}", key, value),
            Request::Delete { key } => write!(f, "DELETE {}", key),
        }
    }
}

/// Keys must contain something other than whitespace.
pub fn validate_key(key: &str) -> Result<(), KvError> {
    if key.trim().is_empty() {
        return Err(KvError::Validation("key is empty".into()));
    }
    Ok(())
}

/// Values must contain something other than whitespace.
pub fn validate_value(value: &str) -> Result<(), KvError> {
    if value.trim().is_empty() {
        return Err(KvError::Validation("value is empty".into()));
    }
    Ok(())
}

/// Identifies one 2PC transaction: the coordinating node and its local sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxnId {
    /// Node driving the transaction; acknowledgements go back here.
    pub coordinator: NodeId,
    /// Strictly increasing per coordinator.
    pub seq: u64,
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx{}.{}", self.coordinator, self.seq)
    }
}
