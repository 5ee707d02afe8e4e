//! In-memory collaborators of the operator.
use crate::interface::{BatchParams, KeyShare, NodeConn, Processor, Registry, Transport};
use sc_concurrency::{clock::Clock, time};
use sc_consensus_crypto::keccak256::Keccak256;
use sc_consensus_roles::{
    committee::PeerIndex,
    ledger::{Address, JointSignature, ResultTransaction, SigShare},
    messages::PeerMsg,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Mutex,
};

/// Messages sent through a [`TestTransport`].
#[derive(Debug, Default)]
pub struct SentMessages {
    /// Messages sent to all peers.
    pub broadcasts: Vec<PeerMsg>,
    /// Messages sent to a single peer.
    pub direct: Vec<(PeerIndex, PeerMsg)>,
}

/// Transport recording the sent messages instead of delivering them.
#[derive(Debug)]
pub struct TestTransport {
    clock: Clock,
    /// Number of peers a broadcast reaches.
    deliveries: Mutex<usize>,
    unreachable: Mutex<BTreeSet<PeerIndex>>,
    sent: Mutex<SentMessages>,
}

impl TestTransport {
    /// Transport reaching `deliveries` peers with every broadcast. Broadcasts are
    /// timestamped with `clock`.
    pub fn new(clock: Clock, deliveries: usize) -> Self {
        Self {
            clock,
            deliveries: Mutex::new(deliveries),
            unreachable: Mutex::default(),
            sent: Mutex::default(),
        }
    }

    /// Changes the number of peers reached by a broadcast.
    pub fn set_deliveries(&self, deliveries: usize) {
        *self.deliveries.lock().unwrap() = deliveries;
    }

    /// Makes direct sends to `peer` fail.
    pub fn set_unreachable(&self, peer: PeerIndex) {
        self.unreachable.lock().unwrap().insert(peer);
    }

    /// Takes the messages sent so far.
    pub fn take(&self) -> SentMessages {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

impl Transport for TestTransport {
    fn send_to_peers(&self, msg: &PeerMsg) -> (usize, time::Utc) {
        self.sent.lock().unwrap().broadcasts.push(msg.clone());
        (*self.deliveries.lock().unwrap(), self.clock.now_utc())
    }

    fn send_to_peer(&self, peer: PeerIndex, msg: &PeerMsg) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.unreachable.lock().unwrap().contains(&peer),
            "peer {peer} unreachable"
        );
        self.sent.lock().unwrap().direct.push((peer, msg.clone()));
        Ok(())
    }
}

/// Registry with a single reward address.
#[derive(Debug, Clone)]
pub struct TestRegistry(pub Address);

impl Registry for TestRegistry {
    fn reward_address(&self, _committee: &Address) -> Address {
        self.0
    }
}

const SHARE_LEN: usize = 2 + 32;

/// Deterministic stand-in for a threshold key share.
/// A share is the signer index followed by the hash of the index and the essence.
/// A joint signature is the concatenation of a quorum of shares, ordered by signer.
#[derive(Debug)]
pub struct TestKeyShare {
    own: PeerIndex,
    size: u16,
    quorum: u16,
    fail_signing: Mutex<bool>,
    fail_aggregation: Mutex<bool>,
    reject_joint_signatures: Mutex<bool>,
    aggregations: Mutex<usize>,
}

impl TestKeyShare {
    /// Key share of peer `own` in a committee of `size` peers.
    pub fn new(own: PeerIndex, size: u16, quorum: u16) -> Self {
        Self {
            own,
            size,
            quorum,
            fail_signing: Mutex::new(false),
            fail_aggregation: Mutex::new(false),
            reject_joint_signatures: Mutex::new(false),
            aggregations: Mutex::new(0),
        }
    }

    /// Makes the signing of shares fail.
    pub fn set_fail_signing(&self, fail: bool) {
        *self.fail_signing.lock().unwrap() = fail;
    }

    /// Makes the aggregation fail.
    pub fn set_fail_aggregation(&self, fail: bool) {
        *self.fail_aggregation.lock().unwrap() = fail;
    }

    /// Makes every joint signature invalid.
    pub fn set_reject_joint_signatures(&self, reject: bool) {
        *self.reject_joint_signatures.lock().unwrap() = reject;
    }

    /// Number of aggregation attempts so far.
    pub fn aggregations(&self) -> usize {
        *self.aggregations.lock().unwrap()
    }

    fn digest(signer: u16, essence: &[u8]) -> Keccak256 {
        Keccak256::from_parts([signer.to_be_bytes().as_slice(), essence])
    }

    fn signer(share: &[u8]) -> anyhow::Result<u16> {
        anyhow::ensure!(share.len() == SHARE_LEN, "malformed share");
        Ok(u16::from_be_bytes([share[0], share[1]]))
    }

    fn verify(&self, essence: &[u8], share: &[u8]) -> anyhow::Result<u16> {
        let signer = Self::signer(share)?;
        anyhow::ensure!(signer < self.size, "unknown signer #{signer}");
        anyhow::ensure!(
            share[2..] == Self::digest(signer, essence).as_bytes()[..],
            "bad share of #{signer}"
        );
        Ok(signer)
    }
}

impl KeyShare for TestKeyShare {
    fn sign_share(&self, essence: &[u8]) -> anyhow::Result<SigShare> {
        anyhow::ensure!(!*self.fail_signing.lock().unwrap(), "key share unavailable");
        let mut share = self.own.0.to_be_bytes().to_vec();
        share.extend_from_slice(Self::digest(self.own.0, essence).as_bytes());
        Ok(SigShare(share))
    }

    fn verify_share(&self, essence: &[u8], share: &SigShare) -> anyhow::Result<()> {
        self.verify(essence, &share.0).map(|_| ())
    }

    fn aggregate(&self, shares: &[SigShare]) -> anyhow::Result<JointSignature> {
        *self.aggregations.lock().unwrap() += 1;
        anyhow::ensure!(!*self.fail_aggregation.lock().unwrap(), "aggregation failed");
        let mut by_signer = BTreeMap::new();
        for share in shares {
            by_signer.insert(Self::signer(&share.0)?, share);
        }
        anyhow::ensure!(
            by_signer.len() >= usize::from(self.quorum),
            "not enough shares: {} < {}",
            by_signer.len(),
            self.quorum
        );
        Ok(JointSignature(
            by_signer
                .values()
                .take(self.quorum.into())
                .flat_map(|s| s.0.iter().copied())
                .collect(),
        ))
    }

    fn validate_signature(&self, tx: &ResultTransaction) -> bool {
        if *self.reject_joint_signatures.lock().unwrap() {
            return false;
        }
        let Some(sig) = &tx.signature else {
            return false;
        };
        if sig.0.len() != SHARE_LEN * usize::from(self.quorum) {
            return false;
        }
        let essence = tx.essence_bytes();
        let mut signers = BTreeSet::new();
        for share in sig.0.chunks(SHARE_LEN) {
            match self.verify(&essence, share) {
                Ok(signer) => signers.insert(signer),
                Err(_) => return false,
            };
        }
        signers.len() == usize::from(self.quorum)
    }
}

/// Node connection recording the requests.
#[derive(Debug, Default)]
pub struct TestNodeConn {
    output_requests: Mutex<Vec<Address>>,
    posted: Mutex<Vec<ResultTransaction>>,
    fail_post: Mutex<bool>,
}

impl TestNodeConn {
    /// Number of balance requests so far.
    pub fn output_requests(&self) -> usize {
        self.output_requests.lock().unwrap().len()
    }

    /// Transactions posted so far, including the rejected ones.
    pub fn posted(&self) -> Vec<ResultTransaction> {
        self.posted.lock().unwrap().clone()
    }

    /// Makes the node reject posted transactions.
    pub fn set_fail_post(&self, fail: bool) {
        *self.fail_post.lock().unwrap() = fail;
    }
}

impl NodeConn for TestNodeConn {
    fn request_outputs(&self, address: &Address) -> anyhow::Result<()> {
        self.output_requests.lock().unwrap().push(*address);
        Ok(())
    }

    fn post_transaction(&self, tx: &ResultTransaction) -> anyhow::Result<()> {
        self.posted.lock().unwrap().push(tx.clone());
        anyhow::ensure!(!*self.fail_post.lock().unwrap(), "transaction rejected");
        Ok(())
    }
}

/// Deterministic VM: the new state hash commits to the old state and the
/// request payloads, and the transaction consumes all the balances.
#[derive(Debug, Default)]
pub struct TestProcessor {
    salt: Vec<u8>,
    fail: Mutex<bool>,
}

impl TestProcessor {
    /// VM whose results differ from the default one, simulating a peer
    /// disagreeing on the outcome of the batch.
    pub fn with_salt(salt: &[u8]) -> Self {
        Self {
            salt: salt.to_vec(),
            fail: Mutex::new(false),
        }
    }

    /// Makes the computations fail.
    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    /// Computes the result synchronously.
    pub fn compute(&self, batch: &BatchParams) -> ResultTransaction {
        let prev = batch.variable_state.hash();
        let state_hash = Keccak256::from_parts(
            [prev.as_bytes().as_slice(), &self.salt]
                .into_iter()
                .chain(batch.requests.iter().map(|r| r.payload.as_slice())),
        );
        ResultTransaction {
            state_index: batch.state_index().next().expect("state index overflow"),
            state_hash,
            timestamp: batch.timestamp,
            address: batch.committee_address,
            request_ids: batch.requests.iter().map(|r| r.id).collect(),
            inputs: batch.balances.outputs().copied().collect(),
            reward_address: batch.reward_address,
            signature: None,
        }
    }
}

#[async_trait::async_trait]
impl Processor for TestProcessor {
    async fn run(&self, batch: BatchParams) -> anyhow::Result<ResultTransaction> {
        anyhow::ensure!(!*self.fail.lock().unwrap(), "VM failure");
        Ok(self.compute(&batch))
    }
}
