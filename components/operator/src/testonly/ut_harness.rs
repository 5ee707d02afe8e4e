use super::{TestKeyShare, TestNodeConn, TestProcessor, TestRegistry, TestTransport};
use crate::{
    interface::{Collaborators, KeyShare as _},
    io::InputMessage,
    operator::round::LeaderStatus,
    Config, Operator,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use sc_concurrency::{clock::ManualClock, time};
use sc_consensus_roles::{
    committee::{Committee, PeerIndex},
    ledger::{Address, Balances, ResultTransaction},
    messages::{NotifyRequests, PeerEnvelope, PeerMsg, SignedResult, StartProcessing},
    request::{Request, RequestId},
    state::{StateIndex, StateTransaction, VariableState},
};
use std::sync::Arc;

/// `UTHarness` provides various utilities for unit tests.
/// It drives a single operator directly, with a manual clock and
/// in-memory collaborators, without running the event loop.
///
/// It should be instantiated once for every test case.
pub(crate) struct UTHarness {
    pub(crate) operator: Operator,
    pub(crate) clock: ManualClock,
    pub(crate) transport: Arc<TestTransport>,
    pub(crate) node_conn: Arc<TestNodeConn>,
    pub(crate) key_share: Arc<TestKeyShare>,
    pub(crate) processor: Arc<TestProcessor>,
    pub(crate) reward_address: Address,
    /// Key shares of all the peers, indexed by peer index.
    keys: Vec<TestKeyShare>,
    rng: StdRng,
}

impl UTHarness {
    /// Operator `own` of a committee of `size` peers with the given quorum.
    /// Broadcasts reach every other peer.
    pub(crate) fn new(size: u16, quorum: u16, own: PeerIndex) -> Self {
        Self::new_with_config(size, quorum, own, Config::default())
    }

    pub(crate) fn new_with_config(size: u16, quorum: u16, own: PeerIndex, config: Config) -> Self {
        let mut rng = StdRng::seed_from_u64((u64::from(size) << 16) | u64::from(own.0));
        let clock = ManualClock::new();
        let committee = Committee::new(rng.gen(), size, own, quorum).unwrap();
        let transport = Arc::new(TestTransport::new(
            clock.clone().into(),
            usize::from(size) - 1,
        ));
        let node_conn = Arc::new(TestNodeConn::default());
        let key_share = Arc::new(TestKeyShare::new(own, size, quorum));
        let processor = Arc::new(TestProcessor::default());
        let reward_address = rng.gen();
        let operator = Operator::new(
            config,
            committee,
            clock.clone().into(),
            Collaborators {
                transport: transport.clone(),
                registry: Arc::new(TestRegistry(reward_address)),
                key_share: key_share.clone(),
                node_conn: node_conn.clone(),
                processor: processor.clone(),
            },
        )
        .unwrap();
        Self {
            operator,
            clock,
            transport,
            node_conn,
            key_share,
            processor,
            reward_address,
            keys: (0..size)
                .map(|i| TestKeyShare::new(PeerIndex(i), size, quorum))
                .collect(),
            rng,
        }
    }

    pub(crate) fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub(crate) fn own(&self) -> PeerIndex {
        self.operator.committee().own_index()
    }

    pub(crate) fn quorum(&self) -> usize {
        self.operator.committee().quorum().into()
    }

    pub(crate) fn address(&self) -> Address {
        *self.operator.committee().address()
    }

    /// Generates a state transaction whose initial leader is `leader`.
    pub(crate) fn make_state(
        &mut self,
        index: StateIndex,
        leader: PeerIndex,
        request_ids: Vec<RequestId>,
    ) -> (StateTransaction, VariableState) {
        let size = self.operator.committee().size();
        let id = loop {
            let id = self.rng.gen();
            if crate::initial_leader(&id, size) == leader {
                break id;
            }
        };
        let data: [u8; 8] = self.rng.gen();
        let variable_state = VariableState::new(index, data.to_vec());
        let state_tx = StateTransaction {
            id,
            state_index: index,
            state_hash: variable_state.hash(),
            request_ids,
        };
        (state_tx, variable_state)
    }

    /// Delivers a new state whose initial leader is `leader`.
    pub(crate) fn new_state(&mut self, index: StateIndex, leader: PeerIndex) -> StateTransaction {
        self.new_state_with_processed(index, leader, vec![])
    }

    pub(crate) fn new_state_with_processed(
        &mut self,
        index: StateIndex,
        leader: PeerIndex,
        processed: Vec<RequestId>,
    ) -> StateTransaction {
        let (state_tx, variable_state) = self.make_state(index, leader, processed);
        self.operator.process_input(InputMessage::StateTransition {
            state_tx: state_tx.clone(),
            variable_state,
        });
        state_tx
    }

    /// Delivers random balances of the committee address.
    pub(crate) fn give_balances(&mut self) -> Balances {
        let balances: Balances = self.rng.gen();
        self.operator.process_input(InputMessage::Balances {
            address: self.address(),
            balances: balances.clone(),
        });
        balances
    }

    /// Delivers `n` random requests from the request pool.
    pub(crate) fn add_requests(&mut self, n: usize) -> Vec<Request> {
        let requests: Vec<Request> = (0..n).map(|_| self.rng.gen()).collect();
        for req in &requests {
            self.operator.process_input(InputMessage::Request(req.clone()));
        }
        requests
    }

    pub(crate) fn deliver(&mut self, sender: PeerIndex, msg: PeerMsg) {
        self.operator.process_input(InputMessage::Peer(PeerEnvelope {
            sender,
            timestamp: self.clock.now_utc(),
            msg,
        }));
    }

    pub(crate) fn notify(&mut self, sender: PeerIndex, state_index: StateIndex, ids: &[RequestId]) {
        self.deliver(
            sender,
            PeerMsg::NotifyRequests(NotifyRequests {
                state_index,
                request_ids: ids.to_vec(),
            }),
        );
    }

    /// Delivers a `StartProcessing` message from `leader`, timestamped now.
    pub(crate) fn start_processing_from(
        &mut self,
        leader: PeerIndex,
        state_index: StateIndex,
        balances: Balances,
        ids: &[RequestId],
    ) {
        self.deliver(
            leader,
            PeerMsg::StartProcessing(StartProcessing {
                state_index,
                reward_address: self.reward_address,
                balances,
                request_ids: ids.to_vec(),
            }),
        );
    }

    /// Brings a leader up to a started round on state `index`:
    /// requests, notifications of a quorum, balances and a tick.
    pub(crate) fn start_round(&mut self, index: StateIndex, batch: usize) -> Vec<Request> {
        let own = self.own();
        self.new_state(index, own);
        self.give_balances();
        let requests = self.add_requests(batch);
        let ids: Vec<_> = requests.iter().map(|r| r.id).collect();
        let size = self.operator.committee().size();
        for peer in (0..size).map(PeerIndex).filter(|p| *p != own).take(self.quorum() - 1) {
            self.notify(peer, index, &ids);
        }
        self.operator.tick();
        assert!(self.operator.leader_status.is_some(), "round not started");
        requests
    }

    pub(crate) fn round(&self) -> &LeaderStatus {
        self.operator.leader_status.as_ref().unwrap()
    }

    /// Waits for the next background computation and processes its result.
    pub(crate) async fn process_next_computation(&mut self) {
        let res = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            self.operator.computation_recv.recv(),
        )
        .await
        .expect("computation timed out")
        .unwrap();
        self.operator.process_computation_result(res);
    }

    /// Own unsigned result of the current round.
    pub(crate) fn own_result(&self) -> ResultTransaction {
        self.round().result_tx.clone().unwrap()
    }

    /// `SignedResult` of `peer` over `tx`, for the current round.
    pub(crate) fn signed_result(&self, peer: PeerIndex, tx: &ResultTransaction) -> SignedResult {
        SignedResult {
            state_index: self.operator.state_index().unwrap(),
            batch_hash: self.round().batch_hash,
            essence_hash: tx.essence_hash(),
            sig_share: self.keys[peer.as_usize()].sign_share(&tx.essence_bytes()).unwrap(),
        }
    }

    pub(crate) fn deliver_share(&mut self, peer: PeerIndex, tx: &ResultTransaction) {
        let msg = self.signed_result(peer, tx);
        self.deliver(peer, PeerMsg::SignedResult(msg));
    }

    /// Other peers, in order.
    pub(crate) fn others(&self) -> Vec<PeerIndex> {
        let own = self.own();
        self.operator
            .committee()
            .peers()
            .filter(|p| *p != own)
            .collect()
    }

    pub(crate) fn advance(&self, d: time::Duration) {
        self.clock.advance(d);
    }
}
