//! Types shared by the members of a smart contract committee.
//!
//! - `committee`: the fixed, ordered set of peers jointly controlling one ledger address,
//!                together with the quorum threshold of the key share.
//! - `state`: state indices, committed variable state and the state transaction anchoring it.
//! - `ledger`: addresses, unspent outputs (balances), signatures and the result transaction
//!             produced by a round.
//! - `request`: request identifiers and batches.
//! - `messages`: messages exchanged between committee peers.

pub mod committee;
pub mod ledger;
pub mod messages;
pub mod request;
pub mod state;
pub mod testonly;
