//! Locales: the regions of the network, their populations and daily counters.
use std::collections::VecDeque;
use std::fmt::{Display, Formatter};

use serde_derive::Serialize;

use crate::case::CaseKind;

/// Index of a locale in its network. Stable for the whole run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LocaleId(pub usize);

impl Display for LocaleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fixed-length window over the most recent daily values.
#[derive(Clone, Debug, PartialEq)]
pub struct RollingWindow {
    values: VecDeque<u64>,
    capacity: usize,
    total: u64,
}

impl RollingWindow {
    #[must_use]
    pub fn new(capacity: usize) -> RollingWindow {
        RollingWindow {
            values: VecDeque::with_capacity(capacity),
            capacity,
            total: 0,
        }
    }

    /// Appends a day's value, dropping the oldest once the window is full.
    pub fn push(&mut self, value: u64) {
        if self.values.len() == self.capacity {
            if let Some(oldest) = self.values.pop_front() {
                self.total -= oldest;
            }
        }
        self.values.push_back(value);
        self.total += value;
    }

    #[must_use]
    pub fn sum(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Case counters for one locale. `new_*` fields cover the current day only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaseCounts {
    /// Clinical cases.
    pub cumulative_cases: u64,
    /// All cases, clinical and subclinical, including arrivals.
    pub cumulative_infected: u64,
    pub cumulative_recovered: u64,
    /// Cases imported from outside the network.
    pub arrivals: u64,
    pub new_cases: u64,
    pub new_infected: u64,
    pub new_recovered: u64,
    /// Clinical cases whose symptoms began today.
    pub new_onsets: u64,
    pub new_tests: u64,
    pub new_positives: u64,
}

impl CaseCounts {
    pub fn record_infection(&mut self, kind: CaseKind) {
        self.cumulative_infected += 1;
        self.new_infected += 1;
        if kind == CaseKind::Clinical {
            self.cumulative_cases += 1;
            self.new_cases += 1;
        }
    }

    pub fn record_recovery(&mut self) {
        self.cumulative_recovered += 1;
        self.new_recovered += 1;
    }

    /// Clears the daily counters.
    pub fn start_day(&mut self) {
        self.new_cases = 0;
        self.new_infected = 0;
        self.new_recovered = 0;
        self.new_onsets = 0;
        self.new_tests = 0;
        self.new_positives = 0;
    }
}

#[derive(Clone, Debug)]
pub struct Locale {
    pub id: LocaleId,
    pub name: String,
    pub pop0: u64,
    pub susceptible: u64,
    pub x: f64,
    pub y: f64,
    pub counts: CaseCounts,
    pub tests: RollingWindow,
    pub positives: RollingWindow,
    pub alert_level: u8,
    /// Multiplier on the acceptance probability of exposures from this locale.
    pub control: f64,
    /// Probability that an accepted exposure is redirected out of this locale.
    pub flow_rate: f64,
    pub alert_changes: u32,
}

impl Locale {
    /// A fully susceptible locale at alert level 1 with no controls.
    #[must_use]
    pub fn new(id: LocaleId, name: String, population: u64, x: f64, y: f64) -> Locale {
        Locale {
            id,
            name,
            pop0: population,
            susceptible: population,
            x,
            y,
            counts: CaseCounts::default(),
            tests: RollingWindow::new(1),
            positives: RollingWindow::new(1),
            alert_level: 1,
            control: 1.0,
            flow_rate: 0.0,
            alert_changes: 0,
        }
    }

    /// Resizes the test windows, discarding their history.
    pub fn set_positivity_window(&mut self, days: usize) {
        self.tests = RollingWindow::new(days);
        self.positives = RollingWindow::new(days);
    }

    /// Records the day's tests and positives into the rolling windows.
    pub fn record_tests(&mut self, tests: u64, positives: u64) {
        self.counts.new_tests = tests;
        self.counts.new_positives = positives;
        self.tests.push(tests);
        self.positives.push(positives);
    }

    /// Positive tests over tests in the window. An empty window reads as 1.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn positivity_rate(&self) -> f64 {
        let tests = self.tests.sum();
        if tests == 0 {
            1.0
        } else {
            self.positives.sum() as f64 / tests as f64
        }
    }

    /// Cases infected here and not yet recovered.
    #[must_use]
    pub fn active_infections(&self) -> u64 {
        self.counts.cumulative_infected - self.counts.cumulative_recovered
    }

    /// Every person is susceptible, currently infected, or recovered, with arrivals
    /// counted on top of the initial population.
    #[must_use]
    pub fn is_conserved(&self) -> bool {
        self.susceptible + self.active_infections() + self.counts.cumulative_recovered
            == self.pop0 + self.counts.arrivals
    }

    /// Fraction of the initial population still susceptible.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn susceptible_fraction(&self) -> f64 {
        if self.pop0 == 0 {
            0.0
        } else {
            self.susceptible as f64 / self.pop0 as f64
        }
    }

    #[must_use]
    pub fn distance_to(&self, other: &Locale) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn locale(population: u64) -> Locale {
        Locale::new(LocaleId(0), "a".to_string(), population, 0.0, 0.0)
    }

    #[test]
    fn rolling_window_drops_oldest() {
        let mut window = RollingWindow::new(3);
        for value in [1, 2, 3, 4] {
            window.push(value);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.sum(), 9);
    }

    #[test]
    fn empty_window_is_maximal_positivity() {
        let mut locale = locale(100);
        locale.set_positivity_window(7);
        assert_approx_eq!(locale.positivity_rate(), 1.0);
        locale.record_tests(0, 0);
        assert_approx_eq!(locale.positivity_rate(), 1.0);
    }

    #[test]
    fn positivity_sums_over_window() {
        let mut locale = locale(100);
        locale.set_positivity_window(2);
        locale.record_tests(10, 5);
        locale.record_tests(30, 1);
        assert_approx_eq!(locale.positivity_rate(), 6.0 / 40.0);
        // Day one falls out of the window
        locale.record_tests(10, 0);
        assert_approx_eq!(locale.positivity_rate(), 1.0 / 40.0);
        assert_eq!(locale.counts.new_tests, 10);
    }

    #[test]
    fn counters_track_kinds_and_days() {
        let mut counts = CaseCounts::default();
        counts.record_infection(CaseKind::Clinical);
        counts.record_infection(CaseKind::Subclinical);
        counts.record_recovery();
        assert_eq!(counts.cumulative_cases, 1);
        assert_eq!(counts.cumulative_infected, 2);
        assert_eq!(counts.new_recovered, 1);
        counts.start_day();
        assert_eq!(counts.new_infected, 0);
        assert_eq!(counts.cumulative_infected, 2);
    }

    #[test]
    fn conservation_with_arrivals() {
        let mut locale = locale(10);
        locale.susceptible -= 1;
        locale.counts.record_infection(CaseKind::Clinical);
        assert!(locale.is_conserved());
        // An arrival adds a case without using up a susceptible
        locale.counts.record_infection(CaseKind::Subclinical);
        assert!(!locale.is_conserved());
        locale.counts.arrivals += 1;
        assert!(locale.is_conserved());
        locale.counts.record_recovery();
        assert!(locale.is_conserved());
    }

    #[test]
    fn distance() {
        let a = Locale::new(LocaleId(0), "a".to_string(), 1, 0.0, 0.0);
        let b = Locale::new(LocaleId(1), "b".to_string(), 1, 3.0, 4.0);
        assert_approx_eq!(a.distance_to(&b), 5.0);
    }
}
