//! Periodic actions of the operator.
use super::{
    computation::Target,
    round::{LeaderStatus, Slot},
    Operator,
};
use crate::{
    config::REQUEST_BALANCES_TIMEOUT,
    interface::{BatchParams, KeyShare},
    metrics,
};
use sc_consensus_roles::{
    committee::PeerIndex,
    ledger::{Address, InputsError, ResultTransaction, SigShare},
    messages::{PeerMsg, StartProcessing},
    request::ids_short,
};

/// Errors that can occur when finalizing a round.
#[derive(Debug, thiserror::Error)]
pub(crate) enum FinalizeError {
    /// Aggregation of the shares failed.
    #[error("aggregate(): {0:#}")]
    Aggregation(#[source] anyhow::Error),
    /// The aggregated signature doesn't validate.
    #[error("joint signature is invalid")]
    InvalidSignature,
    /// The transaction doesn't consume exactly the balances of the round.
    #[error("invalid inputs: {0:#}")]
    InvalidInputs(#[source] InputsError),
}

impl Operator {
    /// Single step of the state machine:
    /// 1. refresh balances if missing,
    /// 2. start a round, if this peer is the leader,
    /// 3. finalize the round once a quorum of shares is collected,
    /// 4. rotate the leader if it missed its deadline,
    /// 5. start the computations announced by other leaders.
    pub fn tick(&mut self) {
        self.request_outputs_if_needed();
        if self.is_leader() {
            self.start_processing_if_needed();
        }
        self.check_quorum();
        self.rotate_leader_if_needed();
        self.do_subordinate();
    }

    /// Asks the node for balances, at most once per [`REQUEST_BALANCES_TIMEOUT`].
    pub(crate) fn request_outputs_if_needed(&mut self) {
        if self.balances.is_some() {
            return;
        }
        let now = self.clock.now();
        if self.request_balances_deadline.is_some_and(|d| now < d) {
            return;
        }
        self.request_balances_deadline = Some(now + REQUEST_BALANCES_TIMEOUT);
        metrics::METRICS.balance_requests.inc();
        if let Err(err) = self.node_conn.request_outputs(self.committee.address()) {
            tracing::warn!("request_outputs(): {err:#}");
        }
    }

    /// Starts a round if none is in progress and there is something to process.
    pub(crate) fn start_processing_if_needed(&mut self) {
        if self.leader_status.is_some() {
            return;
        }
        let Some(variable_state) = self.variable_state.clone() else {
            return;
        };
        let Some(balances) = self.balances.clone() else {
            tracing::trace!("no balances, not starting a round");
            return;
        };
        let quorum = self.committee.quorum();
        let request_ids = self.selector.select(&self.requests.candidates(), quorum);
        if request_ids.is_empty() {
            return;
        }
        let Some(requests) = self.requests.contents(&request_ids) else {
            tracing::warn!("selected requests are not available locally");
            return;
        };
        let state_index = variable_state.state_index();
        let reward_address = self.registry.reward_address(self.committee.address());
        let msg = PeerMsg::StartProcessing(StartProcessing {
            state_index,
            reward_address,
            balances: balances.clone(),
            request_ids: request_ids.clone(),
        });
        let (delivered, timestamp) = self.transport.send_to_peers(&msg);
        // The leader itself is a member of the quorum.
        if delivered + 1 < usize::from(quorum) {
            tracing::warn!(
                "StartProcessing delivered to {delivered} peers only, quorum is {quorum}"
            );
            return;
        }
        let status = LeaderStatus::new(
            self.next_round_id,
            request_ids,
            balances.clone(),
            timestamp,
            self.clock.now(),
            self.committee.size(),
        );
        self.next_round_id += 1;
        tracing::info!(
            "round {} started on state {state_index}: {:?} {}",
            status.round_id,
            status.batch_hash,
            ids_short(&status.request_ids)
        );
        metrics::METRICS.rounds_started.inc();
        let target = Target::Leader {
            round_id: status.round_id,
        };
        let batch_hash = status.batch_hash;
        self.leader_status = Some(status);
        if let Some(rotation) = self.leader.as_mut() {
            rotation.disarm();
        }
        self.run_computation_async(
            target,
            batch_hash,
            BatchParams {
                variable_state,
                requests,
                balances,
                timestamp,
                committee_address: *self.committee.address(),
                reward_address,
                is_leader: true,
            },
        );
    }

    /// Verifies the collected shares and finalizes the round once a quorum of
    /// them is valid. Returns true if the round got finalized by this call.
    pub(crate) fn check_quorum(&mut self) -> bool {
        let quorum = usize::from(self.committee.quorum());
        let own = self.committee.own_index().as_usize();
        let Some(status) = self.leader_status.as_mut() else {
            return false;
        };
        if !status.is_open() {
            return false;
        }
        let Some(tx) = status.result_tx.clone() else {
            return false;
        };
        let Slot::Signed {
            essence_hash: reference,
            ..
        } = status.slots[own].clone()
        else {
            return false;
        };
        let essence = tx.essence_bytes();

        let mut shares = vec![];
        let mut signers = vec![];
        for (i, slot) in status.slots.iter_mut().enumerate() {
            let Slot::Signed {
                essence_hash,
                sig_share,
            } = &*slot
            else {
                continue;
            };
            if *essence_hash != reference {
                tracing::warn!(
                    "share of #{i} signs essence {essence_hash:?}, expected {reference:?}"
                );
                let labels = metrics::DiscardLabels::from(metrics::DiscardReason::WrongEssence);
                metrics::METRICS.discarded_shares[&labels].inc();
                *slot = Slot::Discarded;
                continue;
            }
            if let Err(err) = self.key_share.verify_share(&essence, sig_share) {
                tracing::warn!("share of #{i} is invalid: {err:#}");
                let labels = metrics::DiscardLabels::from(metrics::DiscardReason::InvalidShare);
                metrics::METRICS.discarded_shares[&labels].inc();
                *slot = Slot::Discarded;
                continue;
            }
            shares.push(sig_share.clone());
            signers.push(PeerIndex(i as u16));
        }
        if shares.len() < quorum {
            return false;
        }
        if status.failed_aggregation.as_ref() == Some(&signers) {
            return false;
        }

        match finalize(&*self.key_share, self.committee.address(), status, tx, &shares) {
            Ok(tx) => {
                tracing::info!(
                    "round {} finalized: {:?} with {} shares",
                    status.round_id,
                    tx.id(),
                    shares.len()
                );
                metrics::METRICS.rounds_finalized.inc();
                let elapsed = self.clock.now() - status.started_at;
                if let Ok(latency) = std::time::Duration::try_from(elapsed) {
                    metrics::METRICS.round_latency.observe(latency);
                }
                if let Err(err) = self.node_conn.post_transaction(&tx) {
                    tracing::warn!("post_transaction({:?}): {err:#}", tx.id());
                    metrics::METRICS.publish_failures.inc();
                }
                true
            }
            Err(err) => {
                tracing::error!("finalizing round {}: {err:#}", status.round_id);
                match err {
                    FinalizeError::Aggregation(_) => status.failed_aggregation = Some(signers),
                    FinalizeError::InvalidSignature | FinalizeError::InvalidInputs(_) => {
                        status.poisoned = true
                    }
                }
                false
            }
        }
    }

    /// Moves to the next leader if the current one missed its deadline.
    pub(crate) fn rotate_leader_if_needed(&mut self) {
        let now = self.clock.now();
        let own = self.committee.own_index();
        let size = self.committee.size();
        let Some(rotation) = self.leader.as_mut() else {
            return;
        };
        if !rotation.is_due(now) {
            return;
        }
        let prev = rotation.current();
        let deadline = rotation.deadline();
        let leader = rotation.rotate(size);
        tracing::info!("leader {prev} missed its deadline {deadline:?}, rotating to {leader}");
        metrics::METRICS.leader_rotations.inc();
        if leader != own {
            self.leader_status = None;
        }
        self.send_request_notifications_to_leader();
    }

    /// Starts the computations of the batches announced for the current state
    /// whose requests are all available locally.
    pub(crate) fn do_subordinate(&mut self) {
        let Some(variable_state) = &self.variable_state else {
            return;
        };
        let mut ready = vec![];
        for req in &mut self.current_state_comp_requests {
            if req.started {
                continue;
            }
            let Some(requests) = self.requests.contents(&req.msg.request_ids) else {
                continue;
            };
            req.started = true;
            ready.push((
                Target::Subordinate { leader: req.leader },
                req.batch_hash,
                BatchParams {
                    variable_state: variable_state.clone(),
                    requests,
                    balances: req.msg.balances.clone(),
                    timestamp: req.timestamp,
                    committee_address: *self.committee.address(),
                    reward_address: req.msg.reward_address,
                    is_leader: false,
                },
            ));
        }
        for (target, batch_hash, params) in ready {
            self.run_computation_async(target, batch_hash, params);
        }
    }
}

/// Aggregates the shares into the signed transaction of the round and marks the
/// round finalized. The round is left unchanged on error.
fn finalize(
    key_share: &dyn KeyShare,
    address: &Address,
    status: &mut LeaderStatus,
    mut tx: ResultTransaction,
    shares: &[SigShare],
) -> Result<ResultTransaction, FinalizeError> {
    tx.signature = Some(key_share.aggregate(shares).map_err(FinalizeError::Aggregation)?);
    if !key_share.validate_signature(&tx) {
        return Err(FinalizeError::InvalidSignature);
    }
    tx.validate_consumption_of_inputs(address, &status.balances)
        .map_err(FinalizeError::InvalidInputs)?;
    status.result_tx = Some(tx.clone());
    status.finalized = true;
    Ok(tx)
}
