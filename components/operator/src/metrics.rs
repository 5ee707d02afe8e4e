//! Metrics of the consensus operator.
use std::time::Duration;
use vise::{
    Buckets, Counter, EncodeLabelSet, EncodeLabelValue, Family, Gauge, Histogram, Metrics, Unit,
};

/// Reason why a signature share was dropped by the leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
#[metrics(rename_all = "snake_case")]
pub(crate) enum DiscardReason {
    /// The share signs a different essence than the leader's.
    WrongEssence,
    /// The share doesn't verify.
    InvalidShare,
}

/// Labels of the discarded shares metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelSet)]
pub(crate) struct DiscardLabels {
    reason: DiscardReason,
}

impl From<DiscardReason> for DiscardLabels {
    fn from(reason: DiscardReason) -> Self {
        Self { reason }
    }
}

/// Type of an input of the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
#[metrics(rename_all = "snake_case")]
pub(crate) enum InputLabel {
    /// `StartProcessing` peer message.
    StartProcessing,
    /// `SignedResult` peer message.
    SignedResult,
    /// `NotifyRequests` peer message.
    NotifyRequests,
    /// Confirmed state transition.
    StateTransition,
    /// Balances of the committee address.
    Balances,
    /// Request from the request pool.
    Request,
    /// Result of a batch computation.
    Computation,
}

impl InputLabel {
    /// Attaches a result to this label.
    pub(crate) fn with_result<E>(self, result: &Result<(), E>) -> InputLabels {
        InputLabels {
            r#type: self,
            result: match result {
                Ok(()) => ResultLabel::Ok,
                Err(_) => ResultLabel::Err,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
#[metrics(rename_all = "snake_case")]
enum ResultLabel {
    Ok,
    Err,
}

/// Labels of the input processing metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelSet)]
pub(crate) struct InputLabels {
    r#type: InputLabel,
    result: ResultLabel,
}

/// Metrics defined by the consensus operator.
#[derive(Debug, Metrics)]
#[metrics(prefix = "operator")]
pub(crate) struct OperatorMetrics {
    /// Index of the last state confirmed by the ledger.
    pub(crate) state_index: Gauge<u64>,
    /// Rounds started by this peer as a leader.
    pub(crate) rounds_started: Counter,
    /// Rounds finalized by this peer as a leader.
    pub(crate) rounds_finalized: Counter,
    /// Finalized transactions the node refused to accept.
    pub(crate) publish_failures: Counter,
    /// Leader rotations caused by an inactive leader.
    pub(crate) leader_rotations: Counter,
    /// Balance requests sent to the ledger node.
    pub(crate) balance_requests: Counter,
    /// Signature shares dropped by the leader.
    pub(crate) discarded_shares: Family<DiscardLabels, Counter>,
    /// Processed inputs.
    pub(crate) inputs: Family<InputLabels, Counter>,
    /// Latency of a round as observed by the leader, from the start of
    /// the round until the transaction is finalized.
    #[metrics(buckets = Buckets::exponential(0.01..=20.0, 1.5), unit = Unit::Seconds)]
    pub(crate) round_latency: Histogram<Duration>,
}

/// Global instance of [`OperatorMetrics`].
#[vise::register]
pub(crate) static METRICS: vise::Global<OperatorMetrics> = vise::Global::new();
