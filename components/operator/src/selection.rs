//! Batch selection policy of the leader.
use bit_vec::BitVec;
use sc_consensus_roles::request::RequestId;
use std::fmt;

/// Leader's view of a pending request.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// Request id.
    pub id: RequestId,
    /// Whether the content of the request is available locally.
    pub available: bool,
    /// Which peers announced having the request, indexed by peer index.
    pub notifications: &'a BitVec,
}

impl Candidate<'_> {
    /// Number of peers which announced the request.
    pub fn notified(&self) -> usize {
        self.notifications.iter().filter(|b| *b).count()
    }
}

/// Policy choosing the requests of the next batch.
pub trait BatchSelector: fmt::Debug + Send + Sync {
    /// Chooses the ordered request ids of the next batch from `candidates`,
    /// which are ordered by request id. May return an empty batch.
    /// Every returned request has to be available locally.
    fn select(&self, candidates: &[Candidate<'_>], quorum: u16) -> Vec<RequestId>;
}

/// Selects requests available locally and announced by at least a quorum of peers,
/// so that a quorum is able to compute the batch without waiting for the request pool.
#[derive(Debug, Clone)]
pub struct QuorumNotified {
    /// Maximal number of requests in a batch.
    pub max_batch_size: usize,
}

impl BatchSelector for QuorumNotified {
    fn select(&self, candidates: &[Candidate<'_>], quorum: u16) -> Vec<RequestId> {
        candidates
            .iter()
            .filter(|c| c.available && c.notified() >= usize::from(quorum))
            .map(|c| c.id)
            .take(self.max_batch_size)
            .collect()
    }
}
