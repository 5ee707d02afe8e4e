//! Background computation of batch results.
use super::Operator;
use crate::{interface::BatchParams, metrics, operator::round::Slot};
use sc_concurrency::time;
use sc_consensus_roles::{
    committee::PeerIndex,
    ledger::ResultTransaction,
    messages::{PeerMsg, SignedResult, StartProcessing},
    request::BatchHash,
    state::StateIndex,
};

/// `StartProcessing` message received from a leader.
#[derive(Debug, Clone)]
pub(crate) struct ComputationRequest {
    pub(crate) leader: PeerIndex,
    pub(crate) timestamp: time::Utc,
    pub(crate) batch_hash: BatchHash,
    pub(crate) msg: StartProcessing,
    /// Whether the computation has been started.
    pub(crate) started: bool,
}

impl ComputationRequest {
    pub(crate) fn new(leader: PeerIndex, timestamp: time::Utc, msg: StartProcessing) -> Self {
        Self {
            leader,
            timestamp,
            batch_hash: BatchHash::new(&msg.request_ids, timestamp),
            msg,
            started: false,
        }
    }
}

/// Who asked for a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    /// Own round, as a leader.
    Leader { round_id: u64 },
    /// Round of another leader.
    Subordinate { leader: PeerIndex },
}

/// Completion of a background computation.
#[derive(Debug)]
pub(crate) struct ComputationResult {
    pub(crate) target: Target,
    pub(crate) state_index: StateIndex,
    pub(crate) batch_hash: BatchHash,
    pub(crate) result: anyhow::Result<ResultTransaction>,
}

/// Errors that can occur when processing a computation result.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    /// The round the computation belongs to is gone.
    #[error("stale result for state {state_index} ({batch_hash:?})")]
    Stale {
        /// State the computation started from.
        state_index: StateIndex,
        /// Batch of the computation.
        batch_hash: BatchHash,
    },
    /// The VM failed.
    #[error("computation failed: {0:#}")]
    Failed(#[source] anyhow::Error),
    /// The VM returned a transaction for another batch.
    #[error("result doesn't match the batch")]
    Mismatch,
    /// Signing the essence failed.
    #[error("sign_share(): {0:#}")]
    Sign(#[source] anyhow::Error),
    /// Delivering the share to the leader failed.
    #[error("send_to_peer({leader}): {err:#}")]
    Send {
        /// Leader of the round.
        leader: PeerIndex,
        /// Transport error.
        #[source]
        err: anyhow::Error,
    },
}

impl Operator {
    /// Runs the batch computation in the background. The result is delivered
    /// back through the computation channel, tagged with `target`.
    pub(crate) fn run_computation_async(
        &self,
        target: Target,
        batch_hash: BatchHash,
        params: BatchParams,
    ) {
        let processor = self.processor.clone();
        let send = self.computation_send.clone();
        let state_index = params.state_index();
        tracing::debug!(
            "computing {batch_hash:?} on state {state_index}: {} requests",
            params.requests.len()
        );
        tokio::spawn(async move {
            let result = processor.run(params).await;
            // The operator may be gone already.
            let _ = send.send(ComputationResult {
                target,
                state_index,
                batch_hash,
                result,
            });
        });
    }

    /// Processes a computation result, dropping the stale ones.
    pub(crate) fn process_computation_result(&mut self, res: ComputationResult) {
        let res = match res.target {
            Target::Leader { round_id } => self.process_leader_result(round_id, res),
            Target::Subordinate { leader } => self.process_subordinate_result(leader, res),
        };
        let res = res.map_err(|err| match err {
            Error::Stale { .. } => tracing::debug!("process_computation_result: {err:#}"),
            err => tracing::warn!("process_computation_result: {err:#}"),
        });
        metrics::METRICS.inputs[&metrics::InputLabel::Computation.with_result(&res)].inc();
    }

    fn process_leader_result(
        &mut self,
        round_id: u64,
        res: ComputationResult,
    ) -> Result<(), Error> {
        let stale = Error::Stale {
            state_index: res.state_index,
            batch_hash: res.batch_hash,
        };
        if self.state_index() != Some(res.state_index) {
            return Err(stale);
        }
        let own = self.committee.own_index().as_usize();
        let Some(status) = self.leader_status.as_mut() else {
            return Err(stale);
        };
        if status.round_id != round_id || !status.is_open() || status.result_tx.is_some() {
            return Err(stale);
        }
        let tx = match res.result {
            Ok(tx) => tx,
            Err(err) => {
                status.poisoned = true;
                return Err(Error::Failed(err));
            }
        };
        if tx.request_ids != status.request_ids || tx.timestamp != status.timestamp {
            status.poisoned = true;
            return Err(Error::Mismatch);
        }
        let sig_share = match self.key_share.sign_share(&tx.essence_bytes()) {
            Ok(sig_share) => sig_share,
            Err(err) => {
                status.poisoned = true;
                return Err(Error::Sign(err));
            }
        };
        tracing::debug!(
            "own result for {:?}: essence {:?}",
            status.batch_hash,
            tx.essence_hash()
        );
        status.slots[own] = Slot::Signed {
            essence_hash: tx.essence_hash(),
            sig_share,
        };
        status.result_tx = Some(tx);
        Ok(())
    }

    fn process_subordinate_result(
        &mut self,
        leader: PeerIndex,
        res: ComputationResult,
    ) -> Result<(), Error> {
        let stale = Error::Stale {
            state_index: res.state_index,
            batch_hash: res.batch_hash,
        };
        if self.state_index() != Some(res.state_index)
            || !self
                .current_state_comp_requests
                .iter()
                .any(|r| r.leader == leader && r.batch_hash == res.batch_hash)
        {
            return Err(stale);
        }
        let tx = res.result.map_err(Error::Failed)?;
        let essence = tx.essence_bytes();
        let sig_share = self.key_share.sign_share(&essence).map_err(Error::Sign)?;
        let msg = PeerMsg::SignedResult(SignedResult {
            state_index: res.state_index,
            batch_hash: res.batch_hash,
            essence_hash: tx.essence_hash(),
            sig_share,
        });
        self.transport
            .send_to_peer(leader, &msg)
            .map_err(|err| Error::Send { leader, err })?;
        tracing::debug!("sent signed result for {:?} to {leader}", res.batch_hash);
        Ok(())
    }
}
