//! This module contains utilities that are only meant for testing purposes.
use crate::io::InputMessage;
use rand::{distributions::Standard, prelude::Distribution, Rng};

mod fakes;
#[cfg(test)]
pub(crate) mod ut_harness;

pub use fakes::*;

// Generates a random InputMessage carrying a request.
impl Distribution<InputMessage> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> InputMessage {
        InputMessage::Request(rng.gen())
    }
}
