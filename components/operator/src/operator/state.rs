//! State transitions and the inputs feeding the pending requests and balances.
use super::{leader::LeaderRotation, Operator};
use crate::metrics;
use sc_consensus_roles::{
    ledger::{Address, Balances},
    messages::{NotifyRequests, PeerMsg},
    request::{ids_short, Request},
    state::{StateIndex, StateTransaction, VariableState},
};

/// Errors that can occur when processing balances.
#[derive(Debug, thiserror::Error)]
pub(crate) enum BalancesError {
    /// The balances are of another address.
    #[error("balances of {got:?}, expected {want:?}")]
    WrongAddress {
        /// Committee address.
        want: Address,
        /// Address of the balances.
        got: Address,
    },
}

impl Operator {
    /// Switches to a newly confirmed state.
    pub(crate) fn set_new_state(
        &mut self,
        state_tx: StateTransaction,
        variable_state: VariableState,
    ) {
        if self.state_tx.as_ref().is_some_and(|tx| tx.id == state_tx.id) {
            tracing::debug!("state transaction {:?} already known", state_tx.id);
            return;
        }
        let prev_index = self.state_index();
        let new_index = variable_state.state_index();
        tracing::info!(
            "new state {new_index} ({:?}), processed requests {}",
            state_tx.id,
            ids_short(&state_tx.request_ids)
        );
        metrics::METRICS.state_index.set(new_index.0.into());

        // The outputs of the committee address changed with the new state.
        self.balances = None;
        self.request_balances_deadline = None;

        self.leader = Some(LeaderRotation::new(&state_tx.id, self.committee.size()));
        self.leader_status = None;

        // Batches announced for the new state are still valid if the states are consecutive.
        if prev_index.and_then(StateIndex::next) == Some(new_index) {
            self.current_state_comp_requests = std::mem::take(&mut self.next_state_comp_requests);
        } else {
            self.current_state_comp_requests.clear();
            self.next_state_comp_requests.clear();
        }

        self.requests.remove(&state_tx.request_ids);
        self.requests.reset_notifications();
        let backlogged = self.requests.backlog().len();
        let replayed = self.requests.replay_backlog(new_index);
        if backlogged > 0 {
            tracing::debug!("replayed {replayed} of {backlogged} backlogged notifications");
        }

        self.state_tx = Some(state_tx);
        self.variable_state = Some(variable_state);
        self.request_outputs_if_needed();
        self.send_request_notifications_to_leader();
    }

    /// Stores the balances of the committee address.
    pub(crate) fn process_balances(
        &mut self,
        address: Address,
        balances: Balances,
    ) -> Result<(), BalancesError> {
        let want = *self.committee.address();
        if address != want {
            return Err(BalancesError::WrongAddress { want, got: address });
        }
        tracing::debug!(
            "balances: {} outputs, total {}",
            balances.0.len(),
            balances.total()
        );
        self.balances = Some(balances);
        Ok(())
    }

    /// Adds a request from the request pool.
    pub(crate) fn process_request(&mut self, request: Request) {
        let id = request.id;
        if !self.requests.add(request) {
            tracing::trace!("request {id:?} already known");
            return;
        }
        tracing::debug!("new request {id:?}, {} pending", self.requests.len());
        self.send_request_notifications_to_leader();
    }

    /// Tells the current leader which requests are available locally, and gives it
    /// until the rotation deadline to start a round. When leading, only arms the deadline.
    pub(crate) fn send_request_notifications_to_leader(&mut self) {
        let own = self.committee.own_index();
        let Some(state_index) = self.state_index() else {
            return;
        };
        let Some(leader) = self.current_leader() else {
            return;
        };
        let request_ids = self.requests.available_ids();
        if request_ids.is_empty() {
            return;
        }
        if leader == own {
            if self.leader_status.is_none() {
                self.arm_rotation_deadline();
            }
            return;
        }
        tracing::trace!("notifying {leader} about {}", ids_short(&request_ids));
        let msg = PeerMsg::NotifyRequests(NotifyRequests {
            state_index,
            request_ids,
        });
        if let Err(err) = self.transport.send_to_peer(leader, &msg) {
            tracing::debug!("send_to_peer({leader}): {err:#}");
        }
        // No deadline once the leader has started a round for this state.
        if self
            .current_state_comp_requests
            .iter()
            .any(|r| r.leader == leader)
        {
            return;
        }
        self.arm_rotation_deadline();
    }

    fn arm_rotation_deadline(&mut self) {
        let deadline = self.clock.now() + self.config.leader_rotation_timeout;
        if let Some(rotation) = self.leader.as_mut() {
            rotation.arm(deadline);
        }
    }
}
