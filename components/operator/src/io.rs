//! Input messages of the consensus operator.
use sc_consensus_roles::{
    ledger::{Address, Balances},
    messages::PeerEnvelope,
    request::Request,
    state::{StateTransaction, VariableState},
};

/// All the inputs of the consensus operator, besides the tick.
#[derive(Debug, Clone, PartialEq)]
pub enum InputMessage {
    /// Message from a committee peer.
    Peer(PeerEnvelope),
    /// New state confirmed by the ledger.
    StateTransition {
        /// Transaction anchoring the state.
        state_tx: StateTransaction,
        /// The confirmed state.
        variable_state: VariableState,
    },
    /// Unspent outputs of an address, answering a balance request.
    Balances {
        /// Address the outputs belong to.
        address: Address,
        /// The outputs.
        balances: Balances,
    },
    /// Request delivered by the request pool.
    Request(Request),
}

impl InputMessage {
    /// Label of the message type, for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Peer(env) => env.msg.label(),
            Self::StateTransition { .. } => "state_transition",
            Self::Balances { .. } => "balances",
            Self::Request(_) => "request",
        }
    }
}
