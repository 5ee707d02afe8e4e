//! Pending requests and the notifications received about them.
use crate::selection::Candidate;
use bit_vec::BitVec;
use sc_consensus_roles::{
    committee::PeerIndex,
    request::{Request, RequestId},
    state::StateIndex,
};
use std::collections::BTreeMap;

/// A request which is not processed yet.
#[derive(Debug, Clone)]
pub(crate) struct PendingRequest {
    /// Content of the request. `None` for requests known only from notifications.
    pub(crate) request: Option<Request>,
    /// Which peers announced the request for the current state.
    pub(crate) notifications: BitVec,
}

/// Notification which arrived ahead of the state it refers to.
#[derive(Debug, Clone)]
pub(crate) struct BacklogEntry {
    pub(crate) sender: PeerIndex,
    pub(crate) state_index: StateIndex,
    pub(crate) request_ids: Vec<RequestId>,
}

/// Pending requests, ordered by id, together with the notification backlog.
#[derive(Debug)]
pub(crate) struct Requests {
    size: u16,
    own_index: PeerIndex,
    pending: BTreeMap<RequestId, PendingRequest>,
    backlog: Vec<BacklogEntry>,
}

impl Requests {
    pub(crate) fn new(size: u16, own_index: PeerIndex) -> Self {
        Self {
            size,
            own_index,
            pending: BTreeMap::new(),
            backlog: vec![],
        }
    }

    fn entry(&mut self, id: RequestId) -> &mut PendingRequest {
        let size = self.size.into();
        self.pending.entry(id).or_insert_with(|| PendingRequest {
            request: None,
            notifications: BitVec::from_elem(size, false),
        })
    }

    pub(crate) fn get(&self, id: &RequestId) -> Option<&PendingRequest> {
        self.pending.get(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// Stores the content of a request and marks it as available locally.
    /// Returns false if the content was already known.
    pub(crate) fn add(&mut self, request: Request) -> bool {
        let own = self.own_index.as_usize();
        let entry = self.entry(request.id);
        entry.notifications.set(own, true);
        if entry.request.is_some() {
            return false;
        }
        entry.request = Some(request);
        true
    }

    /// Records that `sender` has the requests `ids`.
    /// Requests unknown so far get a placeholder entry without content.
    pub(crate) fn mark_notified(&mut self, sender: PeerIndex, ids: &[RequestId]) {
        for id in ids {
            self.entry(*id).notifications.set(sender.as_usize(), true);
        }
    }

    /// Backlogs a notification. Only the latest notification of each sender
    /// is kept, as every notification lists all the requests of the sender.
    pub(crate) fn push_backlog(&mut self, entry: BacklogEntry) {
        self.backlog.retain(|e| e.sender != entry.sender);
        self.backlog.push(entry);
    }

    pub(crate) fn backlog(&self) -> &[BacklogEntry] {
        &self.backlog
    }

    /// Applies the backlogged notifications referring to `state_index` and
    /// drops the whole backlog. Unlike live notifications, backlogged ones
    /// only mark requests which are already pending.
    /// Returns the number of applied entries.
    pub(crate) fn replay_backlog(&mut self, state_index: StateIndex) -> usize {
        let mut applied = 0;
        for entry in std::mem::take(&mut self.backlog) {
            if entry.state_index != state_index {
                continue;
            }
            applied += 1;
            for id in &entry.request_ids {
                if let Some(req) = self.pending.get_mut(id) {
                    req.notifications.set(entry.sender.as_usize(), true);
                }
            }
        }
        applied
    }

    /// Drops processed requests.
    pub(crate) fn remove(&mut self, ids: &[RequestId]) {
        for id in ids {
            self.pending.remove(id);
        }
    }

    /// Clears all the notifications and drops the requests known only from
    /// them. Only the own bit of the requests available locally stays set.
    pub(crate) fn reset_notifications(&mut self) {
        let own = self.own_index.as_usize();
        self.pending.retain(|_, req| req.request.is_some());
        for req in self.pending.values_mut() {
            req.notifications.clear();
            req.notifications.set(own, req.request.is_some());
        }
    }

    /// Ids of the requests available locally, in order.
    pub(crate) fn available_ids(&self) -> Vec<RequestId> {
        self.pending
            .iter()
            .filter(|(_, r)| r.request.is_some())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Contents of the requests `ids`, in the given order.
    /// `None` unless all of them are available locally.
    pub(crate) fn contents(&self, ids: &[RequestId]) -> Option<Vec<Request>> {
        ids.iter()
            .map(|id| self.get(id)?.request.clone())
            .collect()
    }

    pub(crate) fn candidates(&self) -> Vec<Candidate<'_>> {
        self.pending
            .iter()
            .map(|(id, r)| Candidate {
                id: *id,
                available: r.request.is_some(),
                notifications: &r.notifications,
            })
            .collect()
    }
}
