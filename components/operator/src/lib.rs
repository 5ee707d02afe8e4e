//! Consensus operator of a smart contract committee.
//!
//! A committee of `N` peers jointly controls one ledger address through a
//! threshold key share. The operator running on each peer repeatedly:
//! - collects requests and tells the current leader which ones it has,
//! - as a leader, picks a batch, asks the committee to compute it and
//!   aggregates a quorum of signature shares into a joint signature,
//! - as a subordinate, computes the batch announced by the leader and
//!   returns its signature share,
//! - rotates the leader when it doesn't start a round in time.
//!
//! The operator is a single-threaded state machine. All the inputs (peer messages,
//! confirmed state transitions, balances, requests, results of the batch
//! computations) and the periodic tick are serialized through [`Operator::run`].

pub mod config;
pub mod interface;
pub mod io;
mod metrics;
mod operator;
pub mod selection;
pub mod testonly;
#[cfg(test)]
mod tests;

pub use config::Config;
pub use operator::{
    leader::{initial_leader, next_leader},
    Operator,
};
