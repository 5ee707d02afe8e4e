use crate::{
    io::InputMessage,
    operator::{notify_requests, start_processing},
    testonly::ut_harness::UTHarness,
};
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use rand::Rng as _;
use sc_concurrency::time;
use sc_consensus_roles::{
    committee::PeerIndex,
    ledger::Balances,
    messages::{NotifyRequests, StartProcessing},
    request::RequestId,
    state::StateIndex,
};
use test_casing::test_casing;

const CONTINUITY_CASES: [(u32, u32, bool); 4] =
    [(5, 6, true), (5, 5, false), (5, 7, false), (5, 4, false)];

#[test_casing(4, CONTINUITY_CASES)]
#[tokio::test]
async fn batches_for_next_state_survive_consecutive_transition(prev: u32, new: u32, carried: bool) {
    sc_concurrency::testonly::abort_on_panic();
    let mut util = UTHarness::new(4, 3, PeerIndex(1));
    util.new_state(StateIndex(prev), PeerIndex(0));
    let balances = util.rng().gen();
    let ids: Vec<RequestId> = vec![util.rng().gen()];
    util.start_processing_from(PeerIndex(0), StateIndex(prev + 1), balances, &ids);
    assert_eq!(util.operator.next_state_comp_requests.len(), 1);
    assert!(util.operator.current_state_comp_requests.is_empty());

    util.new_state(StateIndex(new), PeerIndex(0));
    assert_eq!(util.operator.current_state_comp_requests.len(), usize::from(carried));
    assert!(util.operator.next_state_comp_requests.is_empty());
}

#[tokio::test]
async fn start_processing_validation() {
    sc_concurrency::testonly::abort_on_panic();
    let mut util = UTHarness::new(4, 3, PeerIndex(1));
    let reward_address = util.reward_address;
    let msg = |index: u32, ids: Vec<RequestId>| StartProcessing {
        state_index: StateIndex(index),
        reward_address,
        balances: Balances::default(),
        request_ids: ids,
    };
    let ids: Vec<RequestId> = vec![util.rng().gen()];
    let now = util.clock.now_utc();

    assert_matches!(
        util.operator.process_start_processing(PeerIndex(0), now, msg(5, ids.clone())),
        Err(start_processing::Error::NoState)
    );
    util.new_state(StateIndex(5), PeerIndex(0));
    for index in [3, 4, 7] {
        assert_matches!(
            util.operator.process_start_processing(PeerIndex(0), now, msg(index, ids.clone())),
            Err(start_processing::Error::UnexpectedStateIndex { .. })
        );
    }
    assert_matches!(
        util.operator.process_start_processing(PeerIndex(1), now, msg(5, ids.clone())),
        Err(start_processing::Error::NonCommitteeSender { .. })
    );
    assert_matches!(
        util.operator.process_start_processing(PeerIndex(0), now, msg(5, vec![])),
        Err(start_processing::Error::EmptyBatch)
    );
    util.operator
        .process_start_processing(PeerIndex(0), now, msg(5, ids.clone()))
        .unwrap();
    assert_matches!(
        util.operator.process_start_processing(PeerIndex(0), now, msg(5, ids.clone())),
        Err(start_processing::Error::Duplicate)
    );
    // Same batch with another timestamp is another batch.
    let later = now + time::Duration::seconds(1);
    util.operator
        .process_start_processing(PeerIndex(0), later, msg(5, ids.clone()))
        .unwrap();
    util.operator
        .process_start_processing(PeerIndex(2), now, msg(6, ids))
        .unwrap();
    assert_eq!(util.operator.current_state_comp_requests.len(), 2);
    assert_eq!(util.operator.next_state_comp_requests.len(), 1);
}

#[tokio::test]
async fn live_notification_creates_placeholder() {
    sc_concurrency::testonly::abort_on_panic();
    let mut util = UTHarness::new(4, 3, PeerIndex(0));
    util.new_state(StateIndex(2), PeerIndex(0));
    let unknown: RequestId = util.rng().gen();
    util.notify(PeerIndex(2), StateIndex(2), &[unknown]);

    let req = util.operator.requests.get(&unknown).unwrap();
    assert!(req.request.is_none());
    assert!(req.notifications[2]);
    assert!(!req.notifications[0]);
    assert!(util.operator.requests.available_ids().is_empty());
}

#[tokio::test]
async fn old_notification_is_rejected() {
    sc_concurrency::testonly::abort_on_panic();
    let mut util = UTHarness::new(4, 3, PeerIndex(0));
    util.new_state(StateIndex(2), PeerIndex(0));
    let id: RequestId = util.rng().gen();
    let res = util.operator.process_notify_requests(
        PeerIndex(1),
        NotifyRequests {
            state_index: StateIndex(1),
            request_ids: vec![id],
        },
    );
    assert_matches!(res, Err(notify_requests::Error::Old { .. }));
    assert!(util.operator.requests.get(&id).is_none());
    assert!(util.operator.requests.backlog().is_empty());
}

#[tokio::test]
async fn backlog_is_replayed_once() {
    sc_concurrency::testonly::abort_on_panic();
    let mut util = UTHarness::new(4, 3, PeerIndex(0));
    util.new_state(StateIndex(5), PeerIndex(0));
    let known = util.add_requests(1)[0].id;
    let unknown: RequestId = util.rng().gen();

    util.notify(PeerIndex(1), StateIndex(6), &[known, unknown]);
    util.notify(PeerIndex(2), StateIndex(6), &[known]);
    assert_eq!(util.operator.requests.backlog().len(), 2);
    assert!(!util.operator.requests.get(&known).unwrap().notifications[1]);

    util.new_state(StateIndex(6), PeerIndex(0));
    let req = util.operator.requests.get(&known).unwrap();
    assert!(req.notifications[0]);
    assert!(req.notifications[1]);
    assert!(req.notifications[2]);
    assert!(!req.notifications[3]);
    // Backlogged notifications don't create placeholders.
    assert!(util.operator.requests.get(&unknown).is_none());
    assert!(util.operator.requests.backlog().is_empty());

    util.new_state(StateIndex(7), PeerIndex(0));
    let req = util.operator.requests.get(&known).unwrap();
    assert!(!req.notifications[1]);
    assert!(!req.notifications[2]);
}

#[tokio::test]
async fn backlog_is_bounded() {
    sc_concurrency::testonly::abort_on_panic();
    let mut util = UTHarness::new(4, 3, PeerIndex(0));
    let known = util.add_requests(1)[0].id;

    // Before the first state, the latest notification of each sender is kept.
    for _ in 0..10 {
        let index = StateIndex(util.rng().gen_range(1..100));
        util.notify(PeerIndex(2), index, &[known]);
    }
    util.notify(PeerIndex(2), StateIndex(1), &[known]);
    assert_eq!(util.operator.requests.backlog().len(), 1);

    util.new_state(StateIndex(1), PeerIndex(0));
    assert!(util.operator.requests.get(&known).unwrap().notifications[2]);

    let res = util.operator.process_notify_requests(
        PeerIndex(1),
        NotifyRequests {
            state_index: StateIndex(3),
            request_ids: vec![known],
        },
    );
    assert_matches!(res, Err(notify_requests::Error::TooNew { .. }));
    assert!(util.operator.requests.backlog().is_empty());

    for _ in 0..10 {
        util.notify(PeerIndex(1), StateIndex(2), &[known]);
    }
    assert_eq!(util.operator.requests.backlog().len(), 1);
}

#[tokio::test]
async fn notified_placeholders_expire_with_state() {
    sc_concurrency::testonly::abort_on_panic();
    let mut util = UTHarness::new(4, 3, PeerIndex(0));
    util.new_state(StateIndex(3), PeerIndex(0));
    let own = util.add_requests(2);
    let junk: Vec<RequestId> = (0..1000).map(|_| util.rng().gen()).collect();
    util.notify(PeerIndex(2), StateIndex(3), &junk);
    assert_eq!(util.operator.requests.len(), 1002);

    util.new_state(StateIndex(4), PeerIndex(0));
    assert_eq!(util.operator.requests.len(), 2);
    for req in &own {
        assert!(util.operator.requests.get(&req.id).unwrap().request.is_some());
    }
    for index in 5..10 {
        util.new_state(StateIndex(index), PeerIndex(0));
    }
    assert_eq!(util.operator.requests.len(), 2);
}

#[tokio::test]
async fn start_processing_at_last_state_index() {
    sc_concurrency::testonly::abort_on_panic();
    let mut util = UTHarness::new(4, 3, PeerIndex(1));
    util.new_state(StateIndex(u32::MAX), PeerIndex(0));
    let balances: Balances = util.rng().gen();
    let ids: Vec<RequestId> = vec![util.rng().gen()];
    util.start_processing_from(PeerIndex(0), StateIndex(u32::MAX), balances.clone(), &ids);
    assert_eq!(util.operator.current_state_comp_requests.len(), 1);

    let now = util.clock.now_utc();
    let res = util.operator.process_start_processing(
        PeerIndex(2),
        now,
        StartProcessing {
            state_index: StateIndex(0),
            reward_address: util.reward_address,
            balances,
            request_ids: ids,
        },
    );
    assert_matches!(res, Err(start_processing::Error::UnexpectedStateIndex { .. }));
    assert!(util.operator.next_state_comp_requests.is_empty());
}

#[tokio::test]
async fn notifications_before_first_state_are_backlogged() {
    sc_concurrency::testonly::abort_on_panic();
    let mut util = UTHarness::new(4, 3, PeerIndex(0));
    let known = util.add_requests(1)[0].id;
    util.notify(PeerIndex(3), StateIndex(1), &[known]);
    assert_eq!(util.operator.requests.backlog().len(), 1);

    util.new_state(StateIndex(1), PeerIndex(0));
    assert!(util.operator.requests.get(&known).unwrap().notifications[3]);
}

#[tokio::test]
async fn new_state_resets_requests() {
    sc_concurrency::testonly::abort_on_panic();
    let mut util = UTHarness::new(4, 3, PeerIndex(0));
    util.new_state(StateIndex(1), PeerIndex(0));
    let requests = util.add_requests(2);
    let (done, pending) = (requests[0].id, requests[1].id);
    let placeholder: RequestId = util.rng().gen();
    util.notify(PeerIndex(1), StateIndex(1), &[done, pending, placeholder]);

    util.new_state_with_processed(StateIndex(2), PeerIndex(0), vec![done]);
    assert!(util.operator.requests.get(&done).is_none());
    let req = util.operator.requests.get(&pending).unwrap();
    let bits: Vec<bool> = req.notifications.iter().collect();
    assert_eq!(bits, vec![true, false, false, false]);
    // Requests known only from notifications are dropped.
    assert!(util.operator.requests.get(&placeholder).is_none());
}

#[tokio::test]
async fn new_state_resets_leader_and_balances() {
    sc_concurrency::testonly::abort_on_panic();
    let mut util = UTHarness::new(4, 3, PeerIndex(0));
    util.start_round(StateIndex(1), 1);
    assert!(util.operator.balances.is_some());
    let requested = util.node_conn.output_requests();

    let state_tx = util.new_state(StateIndex(2), PeerIndex(2));
    assert!(util.operator.leader_status.is_none());
    assert!(util.operator.balances.is_none());
    assert_eq!(util.operator.current_leader(), Some(PeerIndex(2)));
    assert_eq!(
        util.operator.current_leader(),
        Some(crate::initial_leader(&state_tx.id, 4))
    );
    // Refreshed immediately, regardless of the cool-down.
    assert_eq!(util.node_conn.output_requests(), requested + 1);
    assert_eq!(util.operator.state_index(), Some(StateIndex(2)));
}

#[tokio::test]
async fn same_state_is_ignored() {
    sc_concurrency::testonly::abort_on_panic();
    let mut util = UTHarness::new(4, 3, PeerIndex(0));
    util.start_round(StateIndex(1), 1);
    let state_tx = util.operator.state_tx.clone().unwrap();
    let variable_state = util.operator.variable_state.clone().unwrap();
    util.operator.process_input(InputMessage::StateTransition {
        state_tx,
        variable_state,
    });
    assert!(util.operator.leader_status.is_some());
    assert!(util.operator.balances.is_some());
}

#[tokio::test]
async fn balance_requests_are_rate_limited() {
    sc_concurrency::testonly::abort_on_panic();
    let mut util = UTHarness::new(4, 3, PeerIndex(0));
    util.operator.tick();
    assert_eq!(util.node_conn.output_requests(), 1);

    for _ in 0..5 {
        util.advance(time::Duration::milliseconds(150));
        util.operator.tick();
    }
    assert_eq!(util.node_conn.output_requests(), 1);

    util.advance(time::Duration::milliseconds(250));
    util.operator.tick();
    assert_eq!(util.node_conn.output_requests(), 2);

    // Not requested while balances are known.
    util.give_balances();
    util.advance(time::Duration::seconds(10));
    util.operator.tick();
    assert_eq!(util.node_conn.output_requests(), 2);
}

#[tokio::test]
async fn balances_of_other_address_are_ignored() {
    sc_concurrency::testonly::abort_on_panic();
    let mut util = UTHarness::new(4, 3, PeerIndex(0));
    let address = util.rng().gen();
    let balances = util.rng().gen();
    util.operator.process_input(InputMessage::Balances { address, balances });
    assert!(util.operator.balances.is_none());
}
