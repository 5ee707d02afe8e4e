//! Messages exchanged between committee peers.
//! The wire encoding is owned by the transport; only the fields needed by
//! the consensus operator are modelled here.
use crate::{
    committee::PeerIndex,
    ledger::{Address, Balances, SigShare},
    request::{BatchHash, RequestId},
    state::StateIndex,
};
use sc_concurrency::time;
use sc_consensus_crypto::keccak256::Keccak256;

/// Message sent by the leader asking peers to compute the result of a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartProcessing {
    /// State index the batch is computed on top of.
    pub state_index: StateIndex,
    /// Address receiving the processing reward.
    pub reward_address: Address,
    /// Leader's snapshot of the committee address outputs.
    pub balances: Balances,
    /// Ordered ids of the requests in the batch.
    pub request_ids: Vec<RequestId>,
}

/// Message sent by a peer to the leader, carrying its signature share over
/// the result of a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedResult {
    /// State index the batch was computed on top of.
    pub state_index: StateIndex,
    /// Batch the result belongs to.
    pub batch_hash: BatchHash,
    /// Essence hash of the computed result transaction.
    pub essence_hash: Keccak256,
    /// Signature share over the essence.
    pub sig_share: SigShare,
}

/// Message announcing which requests the sender has available.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotifyRequests {
    /// State index the notification refers to.
    pub state_index: StateIndex,
    /// Ids of the requests available at the sender.
    pub request_ids: Vec<RequestId>,
}

/// Messages exchanged between committee peers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerMsg {
    /// Leader to peers: compute the batch.
    StartProcessing(StartProcessing),
    /// Peer to leader: signed result of a batch.
    SignedResult(SignedResult),
    /// Peer to leader: available requests.
    NotifyRequests(NotifyRequests),
}

impl PeerMsg {
    /// Label of the message type, for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::StartProcessing(_) => "start_processing",
            Self::SignedResult(_) => "signed_result",
            Self::NotifyRequests(_) => "notify_requests",
        }
    }

    /// State index the message refers to.
    pub fn state_index(&self) -> StateIndex {
        match self {
            Self::StartProcessing(m) => m.state_index,
            Self::SignedResult(m) => m.state_index,
            Self::NotifyRequests(m) => m.state_index,
        }
    }
}

/// A peer message as delivered by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerEnvelope {
    /// Committee index of the sender.
    pub sender: PeerIndex,
    /// Timestamp assigned by the transport of the sender at send time.
    pub timestamp: time::Utc,
    /// The message.
    pub msg: PeerMsg,
}
