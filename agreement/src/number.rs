use std::fmt;

use labrpc::NodeId;
use serde::{Deserialize, Serialize};

/// Paxos proposal number.
///
/// Ordered by `round` first and by `node` second, so numbers from different
/// proposers never tie and every proposer can always produce a larger one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ProposalNumber {
    round: u64,
    node: NodeId,
}

impl ProposalNumber {
    /// Lower than any number a proposer hands out.
    pub const ZERO: Self = Self { round: 0, node: 0 };

    /// Number `round` of proposer `node`.
    pub const fn new(round: u64, node: NodeId) -> Self {
        Self { round, node }
    }

    /// Round component.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Proposer that issued the number.
    pub fn node(&self) -> NodeId {
        self.node
    }
}

impl fmt::Display for ProposalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.round, self.node)
    }
}

/// Issues strictly increasing proposal numbers for one proposer.
#[derive(Debug, Clone)]
pub struct ProposalCounter {
    node: NodeId,
    round: u64,
}

impl ProposalCounter {
    /// Counter for proposer `node`, starting below round 1.
    pub fn new(node: NodeId) -> Self {
        Self { node, round: 0 }
    }

    /// A number larger than everything issued or observed so far.
    pub fn next(&mut self) -> ProposalNumber {
        self.round += 1;
        ProposalNumber::new(self.round, self.node)
    }

    /// Remember a number seen elsewhere so the next one beats it.
    pub fn observe(&mut self, seen: ProposalNumber) {
        self.round = self.round.max(seen.round);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order() {
        assert!(ProposalNumber::new(1, 0) > ProposalNumber::ZERO);
        assert!(ProposalNumber::new(2, 0) > ProposalNumber::new(1, 9));
        assert!(ProposalNumber::new(1, 2) > ProposalNumber::new(1, 1));
        assert_ne!(ProposalNumber::new(1, 1), ProposalNumber::new(1, 2));
    }

    #[test]
    fn test_counter_strictly_increasing() {
        let mut c = ProposalCounter::new(3);
        let mut last = ProposalNumber::ZERO;
        for _ in 0..100 {
            let n = c.next();
            assert!(n > last);
            assert_eq!(n.node(), 3);
            last = n;
        }
    }

    #[test]
    fn test_counter_observe() {
        let mut c = ProposalCounter::new(0);
        let first = c.next();
        let seen = ProposalNumber::new(40, 7);
        c.observe(seen);
        let n = c.next();
        assert!(n > seen);
        assert!(n > first);

        // Observing an older number never moves the counter back.
        c.observe(ProposalNumber::new(1, 1));
        assert!(c.next() > n);
    }
}
