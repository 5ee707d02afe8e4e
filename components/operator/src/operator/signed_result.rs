//! Handler of a SignedResult message.
use super::{round::Slot, Operator};
use sc_consensus_roles::{
    committee::PeerIndex,
    messages::SignedResult,
    request::BatchHash,
    state::StateIndex,
};

/// Errors that can occur when processing a "signed result" message.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    /// Sender isn't another member of the committee.
    #[error("sender {sender} isn't another committee member")]
    NonCommitteeSender {
        /// Sender of the message.
        sender: PeerIndex,
    },
    /// No round is in progress.
    #[error("no round in progress")]
    NoRound,
    /// The round doesn't accept shares anymore.
    #[error("round is closed")]
    Closed,
    /// The message is for another state.
    #[error("wrong state index {got} (current: {current})")]
    WrongState {
        /// State index of the round.
        current: StateIndex,
        /// State index of the message.
        got: StateIndex,
    },
    /// The message is for another batch.
    #[error("unknown batch {got:?} (current: {current:?})")]
    UnknownBatch {
        /// Batch of the round.
        current: BatchHash,
        /// Batch of the message.
        got: BatchHash,
    },
    /// The sender already delivered a share in this round.
    #[error("duplicate share")]
    Duplicate,
    /// The share of the sender was already rejected in this round.
    #[error("share slot discarded")]
    Discarded,
}

impl Operator {
    /// Stores the signature share of a subordinate. The share is checked by
    /// the quorum check of the tick.
    pub(crate) fn process_signed_result(
        &mut self,
        sender: PeerIndex,
        msg: SignedResult,
    ) -> Result<(), Error> {
        if !self.committee.contains(sender) || sender == self.committee.own_index() {
            return Err(Error::NonCommitteeSender { sender });
        }
        let current = self.state_index();
        let status = self.leader_status.as_mut().ok_or(Error::NoRound)?;
        if !status.is_open() {
            return Err(Error::Closed);
        }
        if current != Some(msg.state_index) {
            return Err(Error::WrongState {
                current: current.unwrap_or_default(),
                got: msg.state_index,
            });
        }
        if status.batch_hash != msg.batch_hash {
            return Err(Error::UnknownBatch {
                current: status.batch_hash,
                got: msg.batch_hash,
            });
        }
        let slot = &mut status.slots[sender.as_usize()];
        match slot {
            Slot::Empty => {}
            Slot::Signed { .. } => return Err(Error::Duplicate),
            Slot::Discarded => return Err(Error::Discarded),
        }
        tracing::debug!(
            "share from {sender} for {:?}: essence {:?}",
            msg.batch_hash,
            msg.essence_hash
        );
        *slot = Slot::Signed {
            essence_hash: msg.essence_hash,
            sig_share: msg.sig_share,
        };
        Ok(())
    }
}
