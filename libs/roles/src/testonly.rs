//! Test-only utilities: random generation of roles types.
use crate::{
    ledger::{Address, Balances, OutputId, TransactionId},
    request::{Request, RequestId},
};
use rand::{
    distributions::{Distribution, Standard},
    Rng,
};

impl Distribution<RequestId> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> RequestId {
        RequestId(rng.gen())
    }
}

impl Distribution<Request> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Request {
        let payload: [u8; 16] = rng.gen();
        Request::new(payload.to_vec())
    }
}

impl Distribution<Address> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Address {
        Address(rng.gen())
    }
}

impl Distribution<TransactionId> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> TransactionId {
        TransactionId(rng.gen())
    }
}

impl Distribution<OutputId> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> OutputId {
        OutputId {
            tx: rng.gen(),
            index: rng.gen_range(0..8),
        }
    }
}

impl Distribution<Balances> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Balances {
        let n = rng.gen_range(1..4);
        Balances(
            (0..n)
                .map(|_| (rng.gen(), rng.gen_range(1..1_000_000)))
                .collect(),
        )
    }
}
