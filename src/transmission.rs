//! The branching engine.
//!
//! Every live case puts its future exposures into one time-ordered queue. Each
//! simulated day the engine flushes the queue up to the day's boundary: due
//! exposures are removed from the queue as one wave, each is accepted or
//! rejected against the current state of its source's home locale, and accepted
//! exposures become new cases whose own exposures go back into the queue. New
//! exposures can fall before the boundary, so waves repeat until nothing is due.
//!
//! After the flush, cases whose recovery time has been reached are removed, and
//! any exposure still queued for a removed case is discarded.
use std::time::Instant;

use rand::Rng;

use crate::case::{Case, CaseArena, CaseId, CaseKind, CaseOrigin};
use crate::locale::LocaleId;
use crate::log::{debug, trace, warn};
use crate::network::Network;
use crate::parameters::{Params, Weighting};
use crate::plan::Queue;
use crate::random::uniform;

/// A queued exposure: the case that will cause it. The serial guards against
/// the source's slot having been recycled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Exposure {
    pub source: CaseId,
    pub source_serial: u64,
}

/// What a flush did.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub waves: usize,
    /// Exposures taken off the queue.
    pub realized: usize,
    /// Exposures that became cases.
    pub accepted: usize,
    /// The wall-clock deadline passed before the queue was exhausted.
    pub timed_out: bool,
}

/// The live cases of a run and their queued exposures.
#[derive(Default)]
pub struct Outbreak {
    cases: CaseArena,
    exposures: Queue<Exposure, ()>,
    next_serial: u64,
}

/// Probability that an exposure caused by `source` at `time` becomes a case.
#[must_use]
pub fn acceptance_probability(
    network: &Network,
    params: &Params,
    source: &Case,
    time: f64,
) -> f64 {
    let home = network.locale(source.locale);
    home.control
        * home.susceptible_fraction()
        * source.infectiousness_at(time, params.isolation_effect)
}

/// Chooses where an accepted exposure from `origin` lands.
///
/// With probability equal to the origin's flow rate a neighbor is drawn by
/// cumulative weight, and the move goes ahead with probability
/// `connection flow / origin flow`. Otherwise the case stays at `origin`.
pub fn redirect<R: Rng + ?Sized>(
    rng: &mut R,
    network: &Network,
    origin: LocaleId,
    weighting: Weighting,
) -> LocaleId {
    let flow_rate = network.locale(origin).flow_rate;
    if flow_rate <= 0.0 || network.degree(origin) == 0 {
        return origin;
    }
    if uniform(rng) >= flow_rate {
        return origin;
    }
    let draw = uniform(rng) * network.outbound_weight(origin, weighting);
    match network.select_neighbor(origin, weighting, draw) {
        Some(connection) if uniform(rng) < connection.flow_rate / flow_rate => connection.to,
        _ => origin,
    }
}

impl Outbreak {
    #[must_use]
    pub fn new() -> Outbreak {
        Outbreak::default()
    }

    #[must_use]
    pub fn cases(&self) -> &CaseArena {
        &self.cases
    }

    #[must_use]
    pub fn live_cases(&self) -> usize {
        self.cases.live()
    }

    #[must_use]
    pub fn pending_exposures(&self) -> usize {
        self.exposures.len()
    }

    /// No live cases and nothing queued.
    #[must_use]
    pub fn is_extinct(&self) -> bool {
        self.cases.is_empty() && self.exposures.is_empty()
    }

    /// Time of the earliest queued exposure.
    pub fn next_exposure_time(&mut self) -> Option<f64> {
        self.exposures.peek_time()
    }

    /// Creates a case, charges it to its locale and queues its exposures.
    ///
    /// Returns `None` without creating anything if the case would use up a
    /// susceptible at a locale that has none left.
    pub fn add_case<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        params: &Params,
        network: &mut Network,
        origin: CaseOrigin,
    ) -> Option<CaseId> {
        let locale = network.locale_mut(origin.locale);
        if !origin.external && locale.susceptible == 0 {
            return None;
        }
        let serial = self.next_serial;
        self.next_serial += 1;
        let case = Case::sample(rng, params, serial, origin);

        if origin.external {
            locale.counts.arrivals += 1;
        } else {
            locale.susceptible -= 1;
        }
        locale.counts.record_infection(case.kind);

        let id = self.cases.insert(case);
        let case = self.cases.get(id)?;
        for &time in &case.exposures {
            self.exposures.add_plan(
                time,
                Exposure {
                    source: id,
                    source_serial: serial,
                },
                (),
            );
        }
        trace!(
            "case {serial} ({:?}) at locale {} exposed at {:.3} with {} exposures",
            case.kind,
            case.locale,
            case.t0,
            case.exposures.len()
        );
        Some(id)
    }

    /// Seeds `count` cases across the network in proportion to population, with
    /// exposure times spread over `[now - burn_in, now]`. Exposures before `now`
    /// are discarded.
    #[allow(clippy::cast_precision_loss)]
    pub fn seed<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        params: &Params,
        network: &mut Network,
        count: u32,
        burn_in: f64,
        now: f64,
    ) -> u32 {
        let total = network.total_population() as f64;
        let mut seeded = 0;
        for _ in 0..count {
            let draw = uniform(rng) * total;
            let mut cumulative = 0.0;
            let mut chosen = LocaleId(network.len().saturating_sub(1));
            for locale in network.locales() {
                cumulative += locale.pop0 as f64;
                if cumulative >= draw {
                    chosen = locale.id;
                    break;
                }
            }
            let t0 = now - uniform(rng) * burn_in;
            let origin = CaseOrigin {
                locale: chosen,
                t0,
                not_before: now,
                predecessor: None,
                external: false,
            };
            if self.add_case(rng, params, network, origin).is_some() {
                seeded += 1;
            } else {
                warn!("no susceptibles left to seed at locale {chosen}");
            }
        }
        debug!("seeded {seeded} initial cases");
        seeded
    }

    /// Adds an imported case at `locale`, exposed at `time`.
    pub fn import<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        params: &Params,
        network: &mut Network,
        locale: LocaleId,
        time: f64,
    ) -> Option<CaseId> {
        let origin = CaseOrigin {
            locale,
            t0: time,
            not_before: time,
            predecessor: None,
            external: true,
        };
        self.add_case(rng, params, network, origin)
    }

    /// Realizes every exposure before `boundary`, including exposures created by
    /// cases realized during this call.
    ///
    /// Stops early, with `timed_out` set, if `deadline` passes between waves.
    pub fn flush<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        params: &Params,
        network: &mut Network,
        boundary: f64,
        deadline: Option<Instant>,
    ) -> FlushStats {
        let mut stats = FlushStats::default();
        loop {
            let wave = self.exposures.drain_before(boundary);
            if wave.is_empty() {
                break;
            }
            stats.waves += 1;
            stats.realized += wave.len();
            for plan in wave {
                if self.realize(rng, params, network, plan.time, plan.data) {
                    stats.accepted += 1;
                }
            }
            if deadline.is_some_and(|deadline| Instant::now() > deadline) {
                stats.timed_out = true;
                break;
            }
        }
        stats
    }

    /// Returns true if the exposure became a case.
    fn realize<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        params: &Params,
        network: &mut Network,
        time: f64,
        exposure: Exposure,
    ) -> bool {
        let Some(source) = self
            .cases
            .get(exposure.source)
            .filter(|case| case.serial == exposure.source_serial)
        else {
            trace!("dropping exposure from departed case {}", exposure.source_serial);
            return false;
        };
        let home = source.locale;
        let p_accept = acceptance_probability(network, params, source, time);
        if uniform(rng) >= p_accept {
            return false;
        }

        let target = redirect(rng, network, home, params.weighting);
        if network.locale(target).susceptible == 0 {
            warn!(
                "dropping infection redirected from locale {home} to exhausted locale {target}"
            );
            return false;
        }
        let origin = CaseOrigin {
            locale: target,
            t0: time,
            not_before: time,
            predecessor: Some(exposure.source_serial),
            external: false,
        };
        if self.add_case(rng, params, network, origin).is_none() {
            return false;
        }
        if let Some(source) = self.cases.get_mut(exposure.source) {
            source.offspring += 1;
        }
        true
    }

    /// Ends the day `[day_start, boundary)`: counts symptom onsets, then removes
    /// every case whose recovery time has been reached and discards the exposures
    /// they still had queued. Returns the recovered cases.
    pub fn progress(&mut self, network: &mut Network, day_start: f64, boundary: f64) -> Vec<Case> {
        let mut recovering = Vec::new();
        for (id, case) in self.cases.iter() {
            if case.kind == CaseKind::Clinical && case.onset >= day_start && case.onset < boundary
            {
                network.locale_mut(case.locale).counts.new_onsets += 1;
            }
            if case.recovery <= boundary {
                recovering.push(id);
            }
        }

        let mut recovered = Vec::with_capacity(recovering.len());
        for id in recovering {
            if let Some(case) = self.cases.remove(id) {
                network.locale_mut(case.locale).counts.record_recovery();
                recovered.push(case);
            }
        }

        if !recovered.is_empty() {
            let before = self.exposures.len();
            let cases = &self.cases;
            self.exposures.retain(|exposure| {
                cases
                    .get(exposure.source)
                    .is_some_and(|case| case.serial == exposure.source_serial)
            });
            let discarded = before - self.exposures.len();
            if discarded > 0 {
                debug!("discarded {discarded} exposures from recovered cases");
            }
        }
        recovered
    }
}
