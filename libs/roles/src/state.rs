//! Replicated state of the smart contract instance.
use crate::{ledger::TransactionId, request::RequestId};
use sc_consensus_crypto::keccak256::Keccak256;
use std::fmt;

/// Monotonically increasing index of the replicated state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateIndex(pub u32);

impl StateIndex {
    /// Index of the state following this one. `None` once the index space is exhausted.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for StateIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Committed state data at one state index.
/// The data is opaque to the consensus operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableState {
    index: StateIndex,
    data: Vec<u8>,
}

impl VariableState {
    /// Constructs the variable state at `index`.
    pub fn new(index: StateIndex, data: Vec<u8>) -> Self {
        Self { index, data }
    }

    /// State index.
    pub fn state_index(&self) -> StateIndex {
        self.index
    }

    /// Committed data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Content hash, binding the data to its index.
    pub fn hash(&self) -> Keccak256 {
        Keccak256::from_parts([self.index.0.to_be_bytes().as_slice(), &self.data])
    }
}

/// Ledger transaction which anchors a variable state at one state index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateTransaction {
    /// Ledger id of the transaction.
    pub id: TransactionId,
    /// Index of the committed state.
    pub state_index: StateIndex,
    /// Hash of the committed variable state.
    pub state_hash: Keccak256,
    /// Requests processed by the batch which produced this state.
    pub request_ids: Vec<RequestId>,
}
