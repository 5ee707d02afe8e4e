//! Hashing primitives used by the committee consensus operator.
//! Signatures are produced by the distributed key share service, not here.

pub mod keccak256;
