use std::any::TypeId;
use std::cell::RefMut;

use crate::context::Context;
use crate::hashing::hash_str;
use crate::log::trace;
use crate::rand::distr::uniform::{SampleRange, SampleUniform};
use crate::rand::distr::Distribution;
use crate::rand::{Rng, SeedableRng};
use crate::random::{RngHolder, RngId, RngPlugin};

/// The stream for `R`, seeded from the base seed and the stream's name on first use.
fn stream<R: RngId + 'static>(context: &Context) -> RefMut<'_, R::RngType> {
    let data = context.get_data(RngPlugin);
    let seed = data.base_seed.wrapping_add(hash_str(R::get_name()));
    RefMut::map(data.rng_holders.borrow_mut(), |holders| {
        holders
            .entry(TypeId::of::<R>())
            .or_insert_with(|| {
                trace!("seeding stream {} with {seed}", R::get_name());
                RngHolder {
                    rng: Box::new(R::RngType::seed_from_u64(seed)),
                }
            })
            .rng
            .downcast_mut::<R::RngType>()
            .expect("stream holder has the stream's generator type")
    })
}

/// Named random streams on a `Context`.
///
/// Each stream declared with `define_rng!` is an independent generator. Changing how many draws
/// one part of the model takes leaves every other stream's sequence unchanged.
pub trait ContextRandomExt {
    /// Sets the base seed. Streams are reseeded lazily the next time they are used.
    fn init_random(&mut self, base_seed: u64);

    /// Runs `sampler` with the generator of stream `rng_id`. This is how the free functions in
    /// `crate::random` are called.
    ///
    /// The stream stays borrowed while `sampler` runs, so `sampler` must not sample the same
    /// stream through the context again.
    fn sample<R: RngId + 'static, T>(
        &self,
        rng_id: R,
        sampler: impl FnOnce(&mut R::RngType) -> T,
    ) -> T;

    /// One draw from `distribution`.
    fn sample_distr<R: RngId + 'static, T>(&self, rng_id: R, distribution: impl Distribution<T>) -> T
    where
        R::RngType: Rng;

    /// A uniform draw from `range`.
    fn sample_range<R: RngId + 'static, S, T>(&self, rng_id: R, range: S) -> T
    where
        R::RngType: Rng,
        S: SampleRange<T>,
        T: SampleUniform;

    /// True with probability `p`.
    fn sample_bool<R: RngId + 'static>(&self, rng_id: R, p: f64) -> bool
    where
        R::RngType: Rng;
}

impl ContextRandomExt for Context {
    fn init_random(&mut self, base_seed: u64) {
        trace!("base seed {base_seed}");
        let data = self.get_data_mut(RngPlugin);
        data.base_seed = base_seed;
        data.rng_holders.get_mut().clear();
    }

    fn sample<R: RngId + 'static, T>(
        &self,
        _rng_id: R,
        sampler: impl FnOnce(&mut R::RngType) -> T,
    ) -> T {
        sampler(&mut stream::<R>(self))
    }

    fn sample_distr<R: RngId + 'static, T>(&self, rng_id: R, distribution: impl Distribution<T>) -> T
    where
        R::RngType: Rng,
    {
        self.sample(rng_id, |rng| distribution.sample(rng))
    }

    fn sample_range<R: RngId + 'static, S, T>(&self, rng_id: R, range: S) -> T
    where
        R::RngType: Rng,
        S: SampleRange<T>,
        T: SampleUniform,
    {
        self.sample(rng_id, |rng| rng.random_range(range))
    }

    fn sample_bool<R: RngId + 'static>(&self, rng_id: R, p: f64) -> bool
    where
        R::RngType: Rng,
    {
        self.sample(rng_id, |rng| rng.random_bool(p))
    }
}
