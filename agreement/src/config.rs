use std::{ops::Range, time::Duration};

use serde::{Deserialize, Serialize};

/// Retry and timing knobs of the 2PC coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwoPhaseConfig {
    /// Attempts per `can_commit` call before the participant counts as a "no".
    pub vote_attempts: usize,
    /// Attempts per `do_commit`/`do_abort` call before giving up on that participant.
    pub apply_attempts: usize,
    /// How long the coordinator watches for commit acknowledgements.
    pub ack_timeout_ms: u64,
}

impl Default for TwoPhaseConfig {
    fn default() -> Self {
        Self {
            vote_attempts: 4,
            apply_attempts: 4,
            ack_timeout_ms: 1000,
        }
    }
}

impl TwoPhaseConfig {
    /// `ack_timeout_ms` as a [`Duration`].
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// Retry and timing knobs of the Paxos proposer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaxosConfig {
    /// Rounds, each with a fresh proposal number, before the write is rejected.
    pub max_rounds: usize,
    /// Lower bound of the randomised pause between rounds.
    pub backoff_min_ms: u64,
    /// Upper bound (exclusive) of the randomised pause between rounds.
    pub backoff_max_ms: u64,
}

impl Default for PaxosConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            backoff_min_ms: 10,
            backoff_max_ms: 50,
        }
    }
}

impl PaxosConfig {
    /// Backoff range in milliseconds, never empty.
    pub fn backoff(&self) -> Range<u64> {
        let min = self.backoff_min_ms.min(u64::MAX - 1);
        let max = self.backoff_max_ms.max(min + 1);
        min..max
    }
}
