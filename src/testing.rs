//! Daily testing and test positivity.
//!
//! Each day every locale administers two kinds of tests: tests of clinical cases
//! whose symptoms began that day, and screening tests of the general population.
//! Only symptomatic tests can come back positive, less the false negatives.
//! The counts feed the locale's rolling windows, from which the positivity rate
//! read by the alert policy is computed.
use rand::Rng;

use crate::locale::Locale;
use crate::log::trace;
use crate::network::Network;
use crate::parameters::Params;
use crate::random::{binomial, poisson};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DailyTests {
    pub symptomatic: u64,
    pub screening: u64,
    pub positives: u64,
}

impl DailyTests {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.symptomatic + self.screening
    }
}

/// Draws one day of tests for a locale from its onsets and susceptibles.
#[allow(clippy::cast_precision_loss)]
pub fn sample_daily_tests<R: Rng + ?Sized>(
    rng: &mut R,
    params: &Params,
    locale: &Locale,
) -> DailyTests {
    let symptomatic = binomial(rng, locale.counts.new_onsets, params.p_symptomatic_tested);
    let screening = poisson(rng, params.screening_rate * locale.susceptible as f64);
    let positives = binomial(rng, symptomatic, 1.0 - params.false_negative_rate);
    DailyTests {
        symptomatic,
        screening,
        positives,
    }
}

/// Tests every locale, in locale order, and records the results.
pub fn run_daily_tests<R: Rng + ?Sized>(rng: &mut R, params: &Params, network: &mut Network) {
    for locale in network.locales_mut() {
        let tests = sample_daily_tests(rng, params, locale);
        trace!(
            "locale {}: {} symptomatic and {} screening tests, {} positive",
            locale.name,
            tests.symptomatic,
            tests.screening,
            tests.positives
        );
        locale.record_tests(tests.total(), tests.positives);
    }
}
