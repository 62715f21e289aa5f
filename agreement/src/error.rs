use std::fmt;

use labrpc::NodeId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced to whoever asked for a read or a write.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum KvError {
    /// Empty or otherwise unusable key or value. Never retried.
    #[error("invalid request: {0}")]
    Validation(String),
    /// `get` or `delete` of a key this replica does not hold.
    #[error("key not found: {0}")]
    NotFound(String),
    /// Every attempt to reach agreement was used up.
    #[error("agreement failed: {0}")]
    AggregateFailure(String),
}

/// Protocol step a round failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// 2PC vote collection.
    Vote,
    /// Paxos phase 1.
    Prepare,
    /// Paxos phase 2.
    Propose,
    /// Paxos phase 3.
    Learn,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Vote => "vote",
            Phase::Prepare => "prepare",
            Phase::Propose => "propose",
            Phase::Learn => "learn",
        };
        f.write_str(name)
    }
}

/// Why a single round did not conclude. Absorbed by the round's driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoundError {
    /// A peer could not be reached within the retry budget of one call.
    #[error("node {node} unavailable: {reason}")]
    RemoteUnavailable {
        /// The peer that did not answer.
        node: NodeId,
        /// Last transport error seen.
        reason: String,
    },
    /// Peers answered, but not enough of them agreed.
    #[error("{phase} quorum not reached: {got} of {need}")]
    QuorumNotReached {
        /// Where the round stopped.
        phase: Phase,
        /// Positive answers collected.
        got: usize,
        /// Positive answers required.
        need: usize,
    },
}
