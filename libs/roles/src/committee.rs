//! Committee membership.
use crate::ledger::Address;
use std::fmt;

/// Stable index of a peer in the committee, in range `0..size`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerIndex(pub u16);

impl PeerIndex {
    /// Index usable for addressing per-peer vectors.
    pub fn as_usize(self) -> usize {
        self.0.into()
    }
}

impl fmt::Display for PeerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Fixed ordered set of peers sharing one ledger address.
/// Immutable for the lifetime of the smart contract instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Committee {
    address: Address,
    size: u16,
    own_index: PeerIndex,
    quorum: u16,
}

impl Committee {
    /// Creates a committee of `size` peers, as seen by the peer `own_index`.
    /// `quorum` is the minimum number of valid signature shares required
    /// to produce a joint signature.
    pub fn new(
        address: Address,
        size: u16,
        own_index: PeerIndex,
        quorum: u16,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(size > 0, "committee must contain at least one peer");
        anyhow::ensure!(
            own_index.0 < size,
            "own index {own_index} out of range for committee of size {size}"
        );
        anyhow::ensure!(
            (1..=size).contains(&quorum),
            "quorum {quorum} out of range for committee of size {size}"
        );
        Ok(Self {
            address,
            size,
            own_index,
            quorum,
        })
    }

    /// Ledger address controlled by the committee.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Number of peers.
    pub fn size(&self) -> u16 {
        self.size
    }

    /// Index of the local peer.
    pub fn own_index(&self) -> PeerIndex {
        self.own_index
    }

    /// Quorum threshold.
    pub fn quorum(&self) -> u16 {
        self.quorum
    }

    /// Checks whether `peer` is a member of the committee.
    pub fn contains(&self, peer: PeerIndex) -> bool {
        peer.0 < self.size
    }

    /// Iterates over all peer indices, in order.
    pub fn peers(&self) -> impl Iterator<Item = PeerIndex> {
        (0..self.size).map(PeerIndex)
    }
}

/// Default quorum threshold for a committee of `size` peers: `floor(2 * size / 3) + 1`.
/// With this threshold a committee tolerates `size - quorum` faulty peers.
pub fn quorum_threshold(size: u16) -> u16 {
    // Computed in u32 to avoid overflow for large committees.
    (u32::from(size) * 2 / 3 + 1).min(u32::from(size)) as u16
}
