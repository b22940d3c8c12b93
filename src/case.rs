//! Cases: one infected individual each, with its whole future drawn at creation.
//!
//! When a case is created it samples, once, its branch (clinical or subclinical),
//! its reproduction number, the timestamps of onset, isolation, hospitalization
//! and recovery, and the times of every exposure it will cause. Later changes in
//! control only affect whether those exposures are accepted, never whether they
//! exist.
//!
//! Live cases are stored in a `CaseArena`: a dense vector of slots addressed by
//! `CaseId`, with recovered cases' slots recycled through a free list. Because
//! slots are reused, each case also carries a `serial` number that is unique for
//! the whole run.
use rand::Rng;
use serde_derive::Serialize;

use crate::locale::LocaleId;
use crate::parameters::Params;
use crate::random::{exponential, gamma, poisson, uniform, weibull_truncated};

/// Slot of a live case in the `CaseArena`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaseId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseKind {
    /// Symptomatic: isolates after detection and may be hospitalized.
    Clinical,
    /// Asymptomatic: never isolates, transmits at a reduced rate.
    Subclinical,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Hospitalization {
    pub admitted: f64,
    pub discharged: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Case {
    pub serial: u64,
    pub kind: CaseKind,
    pub locale: LocaleId,
    /// Serial of the case that infected this one.
    pub predecessor: Option<u64>,
    /// Imported from outside the network.
    pub external: bool,
    /// Exposure time. Negative for cases seeded during burn-in.
    pub t0: f64,
    pub base_r: f64,
    pub onset: f64,
    /// Clinical cases isolate once detected.
    pub isolation: Option<f64>,
    pub hospitalization: Option<Hospitalization>,
    pub recovery: f64,
    /// Exposures from this case that became cases.
    pub offspring: u32,
    /// Times of this case's future exposures, ascending.
    pub exposures: Vec<f64>,
}

/// Where and when a new case starts.
#[derive(Copy, Clone, Debug)]
pub struct CaseOrigin {
    pub locale: LocaleId,
    pub t0: f64,
    /// Exposures drawn before this time are discarded.
    pub not_before: f64,
    pub predecessor: Option<u64>,
    pub external: bool,
}

impl Case {
    /// Samples a new case and its entire future.
    pub fn sample<R: Rng + ?Sized>(
        rng: &mut R,
        params: &Params,
        serial: u64,
        origin: CaseOrigin,
    ) -> Case {
        let t0 = origin.t0;
        let kind = if uniform(rng) < params.p_clinical {
            CaseKind::Clinical
        } else {
            CaseKind::Subclinical
        };
        let mean_r = match kind {
            CaseKind::Clinical => params.r_clinical,
            CaseKind::Subclinical => params.r_clinical * params.subclinical_r_fraction,
        };
        let base_r = match params.r_dispersion {
            Some(k) if mean_r > 0.0 => gamma(rng, k, mean_r / k),
            _ => mean_r,
        };

        let onset = t0 + gamma(rng, params.onset_shape, params.onset_scale);
        let (isolation, hospitalization) = match kind {
            CaseKind::Clinical => {
                let isolation = onset + exponential(rng, params.detection_delay_mean);
                let hospitalization = if uniform(rng) < params.p_hospitalized {
                    let admitted = onset + exponential(rng, params.hospital_delay_mean);
                    Some(Hospitalization {
                        admitted,
                        discharged: admitted + exponential(rng, params.hospital_stay_mean),
                    })
                } else {
                    None
                };
                (Some(isolation), hospitalization)
            }
            CaseKind::Subclinical => (None, None),
        };

        let recovery = t0 + params.disease_duration;
        let count = poisson(rng, base_r);
        let mut exposures: Vec<f64> = (0..count)
            .map(|_| {
                t0 + weibull_truncated(
                    rng,
                    params.generation_shape,
                    params.generation_scale,
                    0.0,
                    params.disease_duration,
                )
            })
            .filter(|time| *time >= origin.not_before)
            .collect();
        exposures.sort_by(f64::total_cmp);

        Case {
            serial,
            kind,
            locale: origin.locale,
            predecessor: origin.predecessor,
            external: origin.external,
            t0,
            base_r,
            onset,
            isolation,
            hospitalization,
            recovery,
            offspring: 0,
            exposures,
        }
    }

    /// True if the case is isolated at `time`.
    #[must_use]
    pub fn is_isolated_at(&self, time: f64) -> bool {
        self.isolation.is_some_and(|isolation| time >= isolation)
    }

    /// Relative infectiousness at `time`: reduced by `isolation_effect` once isolated.
    #[must_use]
    pub fn infectiousness_at(&self, time: f64, isolation_effect: f64) -> f64 {
        if self.is_isolated_at(time) {
            1.0 - isolation_effect
        } else {
            1.0
        }
    }
}

/// Dense storage for live cases with slot recycling.
#[derive(Clone, Debug, Default)]
pub struct CaseArena {
    slots: Vec<Option<Case>>,
    free: Vec<usize>,
    live: usize,
}

impl CaseArena {
    #[must_use]
    pub fn new() -> CaseArena {
        CaseArena::default()
    }

    pub fn insert(&mut self, case: Case) -> CaseId {
        self.live += 1;
        if let Some(slot) = self.free.pop() {
            self.slots[slot] = Some(case);
            CaseId(slot)
        } else {
            self.slots.push(Some(case));
            CaseId(self.slots.len() - 1)
        }
    }

    /// Removes a case, freeing its slot for reuse.
    pub fn remove(&mut self, id: CaseId) -> Option<Case> {
        let case = self.slots.get_mut(id.0)?.take()?;
        self.free.push(id.0);
        self.live -= 1;
        Some(case)
    }

    #[must_use]
    pub fn get(&self, id: CaseId) -> Option<&Case> {
        self.slots.get(id.0)?.as_ref()
    }

    pub fn get_mut(&mut self, id: CaseId) -> Option<&mut Case> {
        self.slots.get_mut(id.0)?.as_mut()
    }

    /// Number of live cases.
    #[must_use]
    pub fn live(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Live cases in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (CaseId, &Case)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, case)| case.as_ref().map(|case| (CaseId(slot), case)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn origin(t0: f64, not_before: f64) -> CaseOrigin {
        CaseOrigin {
            locale: LocaleId(0),
            t0,
            not_before,
            predecessor: None,
            external: false,
        }
    }

    #[test]
    fn clinical_case_timeline() {
        let mut rng = SmallRng::seed_from_u64(42);
        let params = Params {
            p_clinical: 1.0,
            p_hospitalized: 1.0,
            ..Params::default()
        };
        for serial in 0..200 {
            let case = Case::sample(&mut rng, &params, serial, origin(2.0, 2.0));
            assert_eq!(case.kind, CaseKind::Clinical);
            assert!(case.onset > case.t0);
            let isolation = case.isolation.unwrap();
            assert!(isolation >= case.onset);
            let hospitalization = case.hospitalization.unwrap();
            assert!(hospitalization.admitted >= case.onset);
            assert!(hospitalization.discharged >= hospitalization.admitted);
            assert!((case.recovery - 32.0).abs() < 1e-12);
        }
    }

    #[test]
    fn subclinical_cases_never_isolate() {
        let mut rng = SmallRng::seed_from_u64(42);
        let params = Params {
            p_clinical: 0.0,
            p_hospitalized: 1.0,
            ..Params::default()
        };
        let case = Case::sample(&mut rng, &params, 0, origin(0.0, 0.0));
        assert_eq!(case.kind, CaseKind::Subclinical);
        assert!((case.base_r - 1.5).abs() < 1e-12);
        assert!(case.isolation.is_none());
        assert!(case.hospitalization.is_none());
        assert!(!case.is_isolated_at(100.0));
    }

    #[test]
    fn exposures_are_sorted_and_within_disease_duration() {
        let mut rng = SmallRng::seed_from_u64(3);
        let params = Params {
            r_clinical: 8.0,
            ..Params::default()
        };
        for serial in 0..200 {
            let case = Case::sample(&mut rng, &params, serial, origin(1.0, 1.0));
            assert!(case.exposures.windows(2).all(|w| w[0] <= w[1]));
            assert!(case
                .exposures
                .iter()
                .all(|t| *t >= case.t0 && *t < case.recovery));
        }
    }

    #[test]
    fn burn_in_cases_drop_past_exposures() {
        let params = Params {
            r_clinical: 10.0,
            ..Params::default()
        };
        let mut full_rng = SmallRng::seed_from_u64(5);
        let mut filtered_rng = SmallRng::seed_from_u64(5);
        for serial in 0..100 {
            let full = Case::sample(&mut full_rng, &params, serial, origin(-6.0, -6.0));
            let filtered = Case::sample(&mut filtered_rng, &params, serial, origin(-6.0, 0.0));
            let expected: Vec<f64> = full.exposures.into_iter().filter(|t| *t >= 0.0).collect();
            assert_eq!(filtered.exposures, expected);
        }
    }

    #[test]
    fn dispersion_varies_r() {
        let mut rng = SmallRng::seed_from_u64(9);
        let params = Params {
            p_clinical: 1.0,
            r_dispersion: Some(0.5),
            ..Params::default()
        };
        let rs: Vec<f64> = (0..2000)
            .map(|serial| Case::sample(&mut rng, &params, serial, origin(0.0, 0.0)).base_r)
            .collect();
        let mean = rs.iter().sum::<f64>() / 2000.0;
        assert!((mean - 3.0).abs() < 0.4, "mean R {mean}");
        assert!(rs.iter().any(|r| (r - rs[0]).abs() > 1e-9));
    }

    #[test]
    fn isolation_reduces_infectiousness() {
        let mut rng = SmallRng::seed_from_u64(1);
        let params = Params {
            p_clinical: 1.0,
            ..Params::default()
        };
        let case = Case::sample(&mut rng, &params, 0, origin(0.0, 0.0));
        let isolation = case.isolation.unwrap();
        assert!((case.infectiousness_at(isolation - 0.1, 0.65) - 1.0).abs() < 1e-12);
        assert!((case.infectiousness_at(isolation, 0.65) - 0.35).abs() < 1e-12);
    }

    #[test]
    fn arena_recycles_slots() {
        let mut rng = SmallRng::seed_from_u64(1);
        let params = Params::default();
        let mut arena = CaseArena::new();
        let a = arena.insert(Case::sample(&mut rng, &params, 0, origin(0.0, 0.0)));
        let b = arena.insert(Case::sample(&mut rng, &params, 1, origin(0.0, 0.0)));
        assert_eq!(arena.live(), 2);

        let removed = arena.remove(a).unwrap();
        assert_eq!(removed.serial, 0);
        assert!(arena.get(a).is_none());
        assert!(arena.remove(a).is_none());
        assert_eq!(arena.live(), 1);

        let c = arena.insert(Case::sample(&mut rng, &params, 2, origin(0.0, 0.0)));
        assert_eq!(c, a);
        assert_eq!(arena.get(c).unwrap().serial, 2);
        assert_eq!(arena.get(b).unwrap().serial, 1);
        let serials: Vec<u64> = arena.iter().map(|(_, case)| case.serial).collect();
        assert_eq!(serials, vec![2, 1]);
    }
}
