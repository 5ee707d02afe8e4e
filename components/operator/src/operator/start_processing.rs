//! Handler of a StartProcessing message.
use super::{ComputationRequest, Operator};
use sc_concurrency::time;
use sc_consensus_roles::{committee::PeerIndex, messages::StartProcessing, state::StateIndex};

/// Errors that can occur when processing a "start processing" message.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    /// Sender isn't another member of the committee.
    #[error("sender {sender} isn't another committee member")]
    NonCommitteeSender {
        /// Sender of the message.
        sender: PeerIndex,
    },
    /// No state to compute on top of yet.
    #[error("no state yet")]
    NoState,
    /// Message refers to neither the current state nor the next one.
    #[error("unexpected state index {got} (current: {current})")]
    UnexpectedStateIndex {
        /// Current state index.
        current: StateIndex,
        /// State index of the message.
        got: StateIndex,
    },
    /// The batch is empty.
    #[error("empty batch")]
    EmptyBatch,
    /// The same batch was already received.
    #[error("duplicate batch")]
    Duplicate,
}

impl Operator {
    /// Records a batch announced by a leader. The computation starts from
    /// the tick once all the requests of the batch are available locally.
    pub(crate) fn process_start_processing(
        &mut self,
        sender: PeerIndex,
        timestamp: time::Utc,
        msg: StartProcessing,
    ) -> Result<(), Error> {
        if !self.committee.contains(sender) || sender == self.committee.own_index() {
            return Err(Error::NonCommitteeSender { sender });
        }
        let current = self.state_index().ok_or(Error::NoState)?;
        if msg.request_ids.is_empty() {
            return Err(Error::EmptyBatch);
        }
        let req = ComputationRequest::new(sender, timestamp, msg);
        let list = if req.msg.state_index == current {
            &mut self.current_state_comp_requests
        } else if Some(req.msg.state_index) == current.next() {
            &mut self.next_state_comp_requests
        } else {
            return Err(Error::UnexpectedStateIndex {
                current,
                got: req.msg.state_index,
            });
        };
        if list
            .iter()
            .any(|r| r.leader == req.leader && r.batch_hash == req.batch_hash)
        {
            return Err(Error::Duplicate);
        }
        tracing::debug!(
            "start processing {:?} from {sender} on state {}",
            req.batch_hash,
            req.msg.state_index
        );
        let for_current = req.msg.state_index == current;
        list.push(req);

        // The current leader started a round, it is not due for rotation.
        if let Some(leader) = self.leader.as_mut() {
            if for_current && leader.current() == sender {
                leader.disarm();
            }
        }
        Ok(())
    }
}
