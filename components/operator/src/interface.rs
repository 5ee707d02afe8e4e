//! Collaborators of the consensus operator.
//! The operator owns no networking, cryptography or VM code itself;
//! it talks to the outside world through the traits below.
use sc_concurrency::time;
use sc_consensus_roles::{
    committee::PeerIndex,
    ledger::{Address, Balances, JointSignature, ResultTransaction, SigShare},
    messages::PeerMsg,
    request::Request,
    state::{StateIndex, VariableState},
};
use std::{fmt, sync::Arc};

/// Point-to-point transport between the committee peers.
pub trait Transport: fmt::Debug + Send + Sync {
    /// Sends `msg` to every other peer of the committee.
    /// Returns the number of peers the message was handed over to, and the
    /// timestamp the transport attached to the message.
    fn send_to_peers(&self, msg: &PeerMsg) -> (usize, time::Utc);

    /// Sends `msg` to a single peer.
    fn send_to_peer(&self, peer: PeerIndex, msg: &PeerMsg) -> anyhow::Result<()>;
}

/// Registry of the node.
pub trait Registry: fmt::Debug + Send + Sync {
    /// Address rewarded for processing batches of the given committee.
    fn reward_address(&self, committee: &Address) -> Address;
}

/// Share of the committee's threshold key held by this peer.
pub trait KeyShare: fmt::Debug + Send + Sync {
    /// Signs `essence` with the own key share.
    fn sign_share(&self, essence: &[u8]) -> anyhow::Result<SigShare>;

    /// Verifies a signature share of any committee peer over `essence`.
    fn verify_share(&self, essence: &[u8], share: &SigShare) -> anyhow::Result<()>;

    /// Aggregates at least a quorum of valid signature shares into a joint signature.
    fn aggregate(&self, shares: &[SigShare]) -> anyhow::Result<JointSignature>;

    /// Checks that `tx` carries a valid joint signature of the committee.
    fn validate_signature(&self, tx: &ResultTransaction) -> bool;
}

/// Connection to the ledger node.
pub trait NodeConn: fmt::Debug + Send + Sync {
    /// Asks the node for the unspent outputs of `address`. The response is
    /// delivered asynchronously as [`crate::io::InputMessage::Balances`].
    fn request_outputs(&self, address: &Address) -> anyhow::Result<()>;

    /// Publishes a finalized transaction.
    fn post_transaction(&self, tx: &ResultTransaction) -> anyhow::Result<()>;
}

/// Everything the VM needs to compute the result of a batch.
#[derive(Debug, Clone)]
pub struct BatchParams {
    /// Committed state the batch is computed on top of.
    pub variable_state: VariableState,
    /// Requests of the batch, in batch order.
    pub requests: Vec<Request>,
    /// Leader's snapshot of the committee address outputs.
    pub balances: Balances,
    /// Timestamp of the round.
    pub timestamp: time::Utc,
    /// Address of the committee.
    pub committee_address: Address,
    /// Address receiving the processing reward.
    pub reward_address: Address,
    /// Whether the local peer is the leader of the round.
    pub is_leader: bool,
}

impl BatchParams {
    /// State index the batch is computed on top of.
    pub fn state_index(&self) -> StateIndex {
        self.variable_state.state_index()
    }
}

/// VM computing the result transaction of a batch.
/// The computation may take long, so the operator runs it in the background.
#[async_trait::async_trait]
pub trait Processor: fmt::Debug + Send + Sync {
    /// Computes the (unsigned) result transaction of a batch.
    async fn run(&self, batch: BatchParams) -> anyhow::Result<ResultTransaction>;
}

/// Collaborators of an operator.
#[derive(Debug, Clone)]
pub struct Collaborators {
    /// Transport to the committee peers.
    pub transport: Arc<dyn Transport>,
    /// Node registry.
    pub registry: Arc<dyn Registry>,
    /// Threshold key share.
    pub key_share: Arc<dyn KeyShare>,
    /// Ledger node connection.
    pub node_conn: Arc<dyn NodeConn>,
    /// VM.
    pub processor: Arc<dyn Processor>,
}
