//! Leader schedule.
//! The initial leader of a state is derived from the id of the state
//! transaction, so that every peer agrees on it without communication.
//! Each missed deadline moves the leadership to the next peer in order.
use sc_concurrency::time;
use sc_consensus_crypto::keccak256::Keccak256;
use sc_consensus_roles::{committee::PeerIndex, ledger::TransactionId};

/// Initial leader for the state anchored by the transaction `state_tx`,
/// in a committee of `size` peers.
pub fn initial_leader(state_tx: &TransactionId, size: u16) -> PeerIndex {
    let seed = Keccak256::new(state_tx.0.as_bytes()).prefix_u64();
    PeerIndex((seed % u64::from(size)) as u16)
}

/// Leader following `current` in a committee of `size` peers.
pub fn next_leader(current: PeerIndex, size: u16) -> PeerIndex {
    PeerIndex(((u32::from(current.0) + 1) % u32::from(size)) as u16)
}

/// Current leader together with the deadline for it to start a round.
#[derive(Debug, Clone)]
pub(crate) struct LeaderRotation {
    current: PeerIndex,
    deadline: time::Deadline,
}

impl LeaderRotation {
    pub(crate) fn new(state_tx: &TransactionId, size: u16) -> Self {
        Self {
            current: initial_leader(state_tx, size),
            deadline: time::Deadline::Infinite,
        }
    }

    pub(crate) fn current(&self) -> PeerIndex {
        self.current
    }

    pub(crate) fn deadline(&self) -> time::Deadline {
        self.deadline
    }

    /// Sets the deadline, unless one is already pending.
    pub(crate) fn arm(&mut self, deadline: time::Instant) {
        if self.deadline == time::Deadline::Infinite {
            self.deadline = deadline.into();
        }
    }

    pub(crate) fn disarm(&mut self) {
        self.deadline = time::Deadline::Infinite;
    }

    pub(crate) fn is_due(&self, now: time::Instant) -> bool {
        self.deadline.has_passed(now)
    }

    /// Moves the leadership to the next peer. Returns the new leader.
    pub(crate) fn rotate(&mut self, size: u16) -> PeerIndex {
        self.current = next_leader(self.current, size);
        self.deadline = time::Deadline::Infinite;
        self.current
    }
}
