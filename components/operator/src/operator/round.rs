//! Round state of the leader.
use sc_concurrency::time;
use sc_consensus_crypto::keccak256::Keccak256;
use sc_consensus_roles::{
    committee::PeerIndex,
    ledger::{Balances, ResultTransaction, SigShare},
    request::{BatchHash, RequestId},
};

/// Signature share slot of one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Nothing received yet.
    Empty,
    /// Share received, not verified yet.
    Signed {
        essence_hash: Keccak256,
        sig_share: SigShare,
    },
    /// Share rejected. The slot stays closed until the end of the round.
    Discarded,
}

/// A round started by this peer as a leader.
#[derive(Debug)]
pub(crate) struct LeaderStatus {
    /// Local generation counter, distinguishing rounds with equal batches.
    pub(crate) round_id: u64,
    pub(crate) request_ids: Vec<RequestId>,
    pub(crate) batch_hash: BatchHash,
    /// Balances the batch was announced with.
    pub(crate) balances: Balances,
    pub(crate) timestamp: time::Utc,
    pub(crate) started_at: time::Instant,
    /// Indexed by peer index.
    pub(crate) slots: Vec<Slot>,
    /// Own computation result. Carries the joint signature once finalized.
    pub(crate) result_tx: Option<ResultTransaction>,
    pub(crate) finalized: bool,
    /// Set when finalization produced an unusable transaction.
    /// The round is dead and waits for the next state.
    pub(crate) poisoned: bool,
    /// Signers of the last failed aggregation, so that it isn't retried
    /// on the same set of shares.
    pub(crate) failed_aggregation: Option<Vec<PeerIndex>>,
}

impl LeaderStatus {
    pub(crate) fn new(
        round_id: u64,
        request_ids: Vec<RequestId>,
        balances: Balances,
        timestamp: time::Utc,
        started_at: time::Instant,
        size: u16,
    ) -> Self {
        Self {
            round_id,
            batch_hash: BatchHash::new(&request_ids, timestamp),
            request_ids,
            balances,
            timestamp,
            started_at,
            slots: vec![Slot::Empty; size.into()],
            result_tx: None,
            finalized: false,
            poisoned: false,
            failed_aggregation: None,
        }
    }

    /// Whether the round still accepts shares and results.
    pub(crate) fn is_open(&self) -> bool {
        !self.finalized && !self.poisoned
    }
}
