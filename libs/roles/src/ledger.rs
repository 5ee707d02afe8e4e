//! Ledger-side types: addresses, unspent outputs, signatures and
//! the transaction produced by a round.
use crate::{
    request::RequestId,
    state::{StateIndex, StateTransaction},
};
use sc_concurrency::time;
use sc_consensus_crypto::keccak256::Keccak256;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

/// Ledger address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub Keccak256);

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "addr:{}", self.0.short())
    }
}

/// Ledger transaction id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub Keccak256);

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx:{}", self.0.short())
    }
}

/// Reference to an output of a ledger transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputId {
    /// Transaction which created the output.
    pub tx: TransactionId,
    /// Position of the output in the transaction.
    pub index: u16,
}

/// Snapshot of the unspent outputs of an address, with their amounts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Balances(pub BTreeMap<OutputId, u64>);

impl Balances {
    /// Sum of all the outputs.
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    /// Unspent outputs, in canonical order.
    pub fn outputs(&self) -> impl Iterator<Item = &OutputId> {
        self.0.keys()
    }
}

/// Partial signature produced by one key share holder.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SigShare(pub Vec<u8>);

impl fmt::Debug for SigShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigShare({}B)", self.0.len())
    }
}

/// Signature aggregated from a quorum of signature shares.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct JointSignature(pub Vec<u8>);

impl fmt::Debug for JointSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JointSignature({}B)", self.0.len())
    }
}

/// Error returned by [`ResultTransaction::validate_consumption_of_inputs`].
#[derive(Debug, thiserror::Error)]
pub enum InputsError {
    /// The transaction spends outputs of another address.
    #[error("inputs belong to {got:?}, expected {want:?}")]
    WrongAddress {
        /// Expected address.
        want: Address,
        /// Address of the transaction.
        got: Address,
    },
    /// The transaction doesn't consume anything.
    #[error("transaction has no inputs")]
    NoInputs,
    /// The same output is consumed twice.
    #[error("output {0:?} consumed twice")]
    Duplicate(OutputId),
    /// The transaction consumes an output missing from the balances.
    #[error("output {0:?} is not in the balances")]
    Unknown(OutputId),
    /// An output of the balances is left unconsumed.
    #[error("output {0:?} is not consumed")]
    NotConsumed(OutputId),
}

/// State transition transaction computed for a batch.
/// Everything except the signature forms the essence, which is what the
/// committee co-signs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultTransaction {
    /// Index of the state produced by the batch.
    pub state_index: StateIndex,
    /// Hash of the variable state produced by the batch.
    pub state_hash: Keccak256,
    /// Timestamp of the round.
    pub timestamp: time::Utc,
    /// Committee address whose outputs are consumed.
    pub address: Address,
    /// Requests processed by the batch, in batch order.
    pub request_ids: Vec<RequestId>,
    /// Outputs of the committee address consumed by the transaction.
    pub inputs: Vec<OutputId>,
    /// Address receiving the processing reward.
    pub reward_address: Address,
    /// Joint signature, present once the transaction is finalized.
    pub signature: Option<JointSignature>,
}

impl ResultTransaction {
    /// Canonical encoding of the essence. Vectors are length-prefixed.
    pub fn essence_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.state_index.0.to_be_bytes());
        buf.extend_from_slice(self.state_hash.as_bytes());
        buf.extend_from_slice(&self.timestamp.unix_nanos().to_be_bytes());
        buf.extend_from_slice(self.address.0.as_bytes());
        buf.extend_from_slice(&(self.request_ids.len() as u32).to_be_bytes());
        for id in &self.request_ids {
            buf.extend_from_slice(id.0.as_bytes());
        }
        buf.extend_from_slice(&(self.inputs.len() as u32).to_be_bytes());
        for input in &self.inputs {
            buf.extend_from_slice(input.tx.0.as_bytes());
            buf.extend_from_slice(&input.index.to_be_bytes());
        }
        buf.extend_from_slice(self.reward_address.0.as_bytes());
        buf
    }

    /// Hash of the essence. Peers compare essence hashes to detect
    /// disagreement before verifying signature shares.
    pub fn essence_hash(&self) -> Keccak256 {
        Keccak256::new(&self.essence_bytes())
    }

    /// Ledger id of the transaction, covering the signature.
    pub fn id(&self) -> TransactionId {
        let signature = self.signature.as_ref().map(|s| s.0.as_slice()).unwrap_or_default();
        TransactionId(Keccak256::from_parts([
            self.essence_hash().as_bytes().as_slice(),
            signature,
        ]))
    }

    /// Checks that the transaction consumes exactly the outputs of `balances`,
    /// which is the snapshot of the outputs of `address` the batch was computed with.
    /// A transaction leaving outputs behind, or spending outputs it doesn't own,
    /// would be rejected by the ledger.
    pub fn validate_consumption_of_inputs(
        &self,
        address: &Address,
        balances: &Balances,
    ) -> Result<(), InputsError> {
        if self.address != *address {
            return Err(InputsError::WrongAddress {
                want: *address,
                got: self.address,
            });
        }
        if self.inputs.is_empty() {
            return Err(InputsError::NoInputs);
        }
        let mut seen = BTreeSet::new();
        for input in &self.inputs {
            if !seen.insert(*input) {
                return Err(InputsError::Duplicate(*input));
            }
            if !balances.0.contains_key(input) {
                return Err(InputsError::Unknown(*input));
            }
        }
        if let Some(left) = balances.outputs().find(|o| !seen.contains(*o)) {
            return Err(InputsError::NotConsumed(*left));
        }
        Ok(())
    }

    /// State transaction which this transaction becomes once confirmed by the ledger.
    pub fn to_state_transaction(&self) -> StateTransaction {
        StateTransaction {
            id: self.id(),
            state_index: self.state_index,
            state_hash: self.state_hash,
            request_ids: self.request_ids.clone(),
        }
    }
}
