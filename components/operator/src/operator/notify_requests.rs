//! Handler of a NotifyRequests message.
use super::{requests::BacklogEntry, Operator};
use sc_consensus_roles::{committee::PeerIndex, messages::NotifyRequests, state::StateIndex};

/// Errors that can occur when processing a "notify requests" message.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    /// Sender isn't another member of the committee.
    #[error("sender {sender} isn't another committee member")]
    NonCommitteeSender {
        /// Sender of the message.
        sender: PeerIndex,
    },
    /// The message refers to a past state.
    #[error("old notification for state {got} (current: {current})")]
    Old {
        /// Current state index.
        current: StateIndex,
        /// State index of the message.
        got: StateIndex,
    },
    /// The message refers to a state beyond the next one.
    #[error("notification for state {got} too far ahead (current: {current})")]
    TooNew {
        /// Current state index.
        current: StateIndex,
        /// State index of the message.
        got: StateIndex,
    },
}

impl Operator {
    /// Records which requests `sender` has. Notifications for the next state
    /// are kept in the backlog until that state arrives.
    pub(crate) fn process_notify_requests(
        &mut self,
        sender: PeerIndex,
        msg: NotifyRequests,
    ) -> Result<(), Error> {
        if !self.committee.contains(sender) || sender == self.committee.own_index() {
            return Err(Error::NonCommitteeSender { sender });
        }
        match self.state_index() {
            Some(current) if msg.state_index == current => {
                self.requests.mark_notified(sender, &msg.request_ids);
                Ok(())
            }
            Some(current) if msg.state_index < current => Err(Error::Old {
                current,
                got: msg.state_index,
            }),
            Some(current) if Some(msg.state_index) != current.next() => Err(Error::TooNew {
                current,
                got: msg.state_index,
            }),
            _ => {
                tracing::debug!(
                    "backlogging notification from {sender} for state {}",
                    msg.state_index
                );
                self.requests.push_backlog(BacklogEntry {
                    sender,
                    state_index: msg.state_index,
                    request_ids: msg.request_ids,
                });
                Ok(())
            }
        }
    }
}
