//! Time and clock primitives shared by the operator crates.

pub mod clock;
pub mod testonly;
pub mod time;
