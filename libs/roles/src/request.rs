//! Requests and batches.
use sc_concurrency::time;
use sc_consensus_crypto::keccak256::Keccak256;
use std::fmt;

/// Unique identifier of a request.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub Keccak256);

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req:{}", self.0.short())
    }
}

/// A request to the smart contract, as delivered by the request pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    /// Identifier of the request.
    pub id: RequestId,
    /// Opaque request body, interpreted by the VM.
    pub payload: Vec<u8>,
}

impl Request {
    /// Constructs a request identified by the hash of its payload.
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            id: RequestId(Keccak256::new(&payload)),
            payload,
        }
    }
}

/// Hash of a batch: a deterministic function of the ordered request ids
/// and the timestamp assigned to the round.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchHash(pub Keccak256);

impl BatchHash {
    /// Computes the batch hash. Request ids have a fixed length, so the
    /// concatenation is unambiguous.
    pub fn new(request_ids: &[RequestId], timestamp: time::Utc) -> Self {
        let ts = timestamp.unix_nanos().to_be_bytes();
        Self(Keccak256::from_parts(
            request_ids
                .iter()
                .map(|id| id.0.as_bytes().as_slice())
                .chain([ts.as_slice()]),
        ))
    }
}

impl fmt::Debug for BatchHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch:{}", self.0.short())
    }
}

/// Short representation of a list of request ids, for logs.
pub fn ids_short(ids: &[RequestId]) -> String {
    let ids: Vec<_> = ids.iter().map(|id| id.0.short()).collect();
    format!("[{}]", ids.join(","))
}
