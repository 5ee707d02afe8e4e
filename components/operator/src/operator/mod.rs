//! The consensus operator state machine.
use crate::{
    config::Config,
    interface::{Collaborators, KeyShare, NodeConn, Processor, Registry, Transport},
    io::InputMessage,
    metrics,
    selection::{BatchSelector, QuorumNotified},
};
use anyhow::Context as _;
use sc_concurrency::{clock::Clock, time};
use sc_consensus_roles::{
    committee::{Committee, PeerIndex},
    ledger::Balances,
    messages::{PeerEnvelope, PeerMsg},
    state::{StateIndex, StateTransaction, VariableState},
};
use std::sync::Arc;
use tokio::sync::mpsc;

pub(crate) mod action;
pub(crate) mod computation;
pub(crate) mod leader;
pub(crate) mod notify_requests;
pub(crate) mod requests;
pub(crate) mod round;
pub(crate) mod signed_result;
pub(crate) mod start_processing;
pub(crate) mod state;

pub(crate) use computation::{ComputationRequest, ComputationResult};

/// Consensus operator of one committee peer.
///
/// All the state is owned by the operator and mutated only through
/// [`Operator::process_input`], [`Operator::tick`] and the completions of the
/// background batch computations. [`Operator::run`] serializes all of them.
#[derive(Debug)]
pub struct Operator {
    pub(crate) config: Config,
    pub(crate) committee: Committee,
    pub(crate) clock: Clock,

    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) registry: Arc<dyn Registry>,
    pub(crate) key_share: Arc<dyn KeyShare>,
    pub(crate) node_conn: Arc<dyn NodeConn>,
    pub(crate) processor: Arc<dyn Processor>,
    pub(crate) selector: Box<dyn BatchSelector>,

    /// Last confirmed state, if any.
    pub(crate) state_tx: Option<StateTransaction>,
    pub(crate) variable_state: Option<VariableState>,
    /// Snapshot of the committee address outputs for the current state.
    pub(crate) balances: Option<Balances>,
    /// No balance request is sent before this time.
    pub(crate) request_balances_deadline: Option<time::Instant>,
    /// Leader of the current state. `None` until the first state arrives.
    pub(crate) leader: Option<leader::LeaderRotation>,
    /// Round started by this peer, if it is the leader.
    pub(crate) leader_status: Option<round::LeaderStatus>,
    pub(crate) next_round_id: u64,

    pub(crate) requests: requests::Requests,
    /// `StartProcessing` messages received for the current state.
    pub(crate) current_state_comp_requests: Vec<ComputationRequest>,
    /// `StartProcessing` messages received for the state following the current one.
    pub(crate) next_state_comp_requests: Vec<ComputationRequest>,

    computation_send: mpsc::UnboundedSender<ComputationResult>,
    pub(crate) computation_recv: mpsc::UnboundedReceiver<ComputationResult>,
}

enum Event {
    Input(InputMessage),
    Computation(ComputationResult),
    Tick,
}

impl Operator {
    /// Creates an operator with the default batch selection policy.
    pub fn new(
        config: Config,
        committee: Committee,
        clock: Clock,
        collaborators: Collaborators,
    ) -> anyhow::Result<Self> {
        let selector = Box::new(QuorumNotified {
            max_batch_size: config.max_batch_size,
        });
        Self::with_selector(config, committee, clock, collaborators, selector)
    }

    /// Creates an operator with a custom batch selection policy.
    pub fn with_selector(
        config: Config,
        committee: Committee,
        clock: Clock,
        collaborators: Collaborators,
        selector: Box<dyn BatchSelector>,
    ) -> anyhow::Result<Self> {
        config.validate().context("config")?;
        let (computation_send, computation_recv) = mpsc::unbounded_channel();
        Ok(Self {
            requests: requests::Requests::new(committee.size(), committee.own_index()),
            config,
            committee,
            clock,
            transport: collaborators.transport,
            registry: collaborators.registry,
            key_share: collaborators.key_share,
            node_conn: collaborators.node_conn,
            processor: collaborators.processor,
            selector,
            state_tx: None,
            variable_state: None,
            balances: None,
            request_balances_deadline: None,
            leader: None,
            leader_status: None,
            next_round_id: 0,
            current_state_comp_requests: vec![],
            next_state_comp_requests: vec![],
            computation_send,
            computation_recv,
        })
    }

    /// Committee of the operator.
    pub fn committee(&self) -> &Committee {
        &self.committee
    }

    /// Index of the current state, if any.
    pub fn state_index(&self) -> Option<StateIndex> {
        self.variable_state.as_ref().map(|s| s.state_index())
    }

    /// Current leader, if a state is known.
    pub fn current_leader(&self) -> Option<PeerIndex> {
        self.leader.as_ref().map(|l| l.current())
    }

    /// Whether the local peer is the current leader.
    pub fn is_leader(&self) -> bool {
        self.current_leader() == Some(self.committee.own_index())
    }

    /// Processes a single input.
    /// Invalid inputs are logged and dropped, they never stop the operator.
    pub fn process_input(&mut self, input: InputMessage) {
        tracing::trace!("process_input({})", input.label());
        let (label, res) = match input {
            InputMessage::Peer(envelope) => self.process_peer_message(envelope),
            InputMessage::StateTransition {
                state_tx,
                variable_state,
            } => {
                self.set_new_state(state_tx, variable_state);
                (metrics::InputLabel::StateTransition, Ok(()))
            }
            InputMessage::Balances { address, balances } => {
                let res = self.process_balances(address, balances).map_err(|err| {
                    tracing::warn!("process_balances: {err:#}");
                });
                (metrics::InputLabel::Balances, res)
            }
            InputMessage::Request(request) => {
                self.process_request(request);
                (metrics::InputLabel::Request, Ok(()))
            }
        };
        metrics::METRICS.inputs[&label.with_result(&res)].inc();
    }

    fn process_peer_message(
        &mut self,
        envelope: PeerEnvelope,
    ) -> (metrics::InputLabel, Result<(), ()>) {
        let PeerEnvelope {
            sender,
            timestamp,
            msg,
        } = envelope;
        tracing::trace!("message from {sender} for state {}", msg.state_index());
        match msg {
            PeerMsg::StartProcessing(msg) => {
                let res = self
                    .process_start_processing(sender, timestamp, msg)
                    .map_err(|err| {
                        tracing::warn!("process_start_processing({sender}): {err:#}");
                    });
                (metrics::InputLabel::StartProcessing, res)
            }
            PeerMsg::SignedResult(msg) => {
                let res = self.process_signed_result(sender, msg).map_err(|err| {
                    tracing::warn!("process_signed_result({sender}): {err:#}");
                });
                (metrics::InputLabel::SignedResult, res)
            }
            PeerMsg::NotifyRequests(msg) => {
                let res = self.process_notify_requests(sender, msg).map_err(|err| {
                    tracing::debug!("process_notify_requests({sender}): {err:#}");
                });
                (metrics::InputLabel::NotifyRequests, res)
            }
        }
    }

    /// Runs the operator until `inbound` is closed.
    pub async fn run(
        mut self,
        mut inbound: mpsc::UnboundedReceiver<InputMessage>,
    ) -> anyhow::Result<()> {
        let period: std::time::Duration = self
            .config
            .tick_interval
            .try_into()
            .context("tick_interval")?;
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            "operator {} of committee {:?} started",
            self.committee.own_index(),
            self.committee.address()
        );
        loop {
            let event = tokio::select! {
                input = inbound.recv() => match input {
                    Some(input) => Event::Input(input),
                    None => break,
                },
                Some(res) = self.computation_recv.recv() => Event::Computation(res),
                _ = ticker.tick() => Event::Tick,
            };
            match event {
                Event::Input(input) => self.process_input(input),
                Event::Computation(res) => self.process_computation_result(res),
                Event::Tick => self.tick(),
            }
        }
        tracing::info!("operator {} stopped", self.committee.own_index());
        Ok(())
    }
}
