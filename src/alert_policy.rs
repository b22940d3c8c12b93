//! Alert-level control.
//!
//! Each locale sits at an integer alert level from the level table in `Params`.
//! A level maps to a control multiplier, which scales the acceptance probability
//! of exposures originating in the locale, and to a flow multiplier, which scales
//! the base flow rate used for redirection to neighboring locales.
//!
//! Data-driven policies map a positivity rate through the ordered trigger
//! thresholds to a target level. Moving up jumps straight to the target; moving
//! down only ever takes one step per evaluation.
use rand::Rng;

use crate::locale::LocaleId;
use crate::log::info;
use crate::network::Network;
use crate::parameters::{AlertPolicyKind, Params};

/// A level change decided by an evaluation, not yet applied.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LevelChange {
    pub locale: LocaleId,
    pub from: u8,
    pub to: u8,
}

/// The level a positivity rate calls for: one level above `lo` for every
/// threshold at or below `rate`, capped at `hi`.
#[must_use]
pub fn target_level(rate: f64, thresholds: &[f64], lo: u8, hi: u8) -> u8 {
    let crossed = thresholds
        .iter()
        .take_while(|threshold| **threshold <= rate)
        .count();
    let crossed = u8::try_from(crossed).unwrap_or(u8::MAX);
    lo.saturating_add(crossed).min(hi)
}

/// Jump up to `target`, or step down by one toward it.
#[must_use]
pub fn transition(current: u8, target: u8) -> u8 {
    if target < current {
        current - 1
    } else {
        target
    }
}

/// Highest positivity rate over all locales.
#[must_use]
pub fn max_positivity(network: &Network) -> f64 {
    network
        .locales()
        .iter()
        .map(crate::locale::Locale::positivity_rate)
        .fold(0.0, f64::max)
}

/// Positivity rate averaged over locales, weighted by initial population.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_positivity(network: &Network) -> f64 {
    let total = network.total_population();
    if total == 0 {
        return 1.0;
    }
    network
        .locales()
        .iter()
        .map(|locale| locale.positivity_rate() * locale.pop0 as f64)
        .sum::<f64>()
        / total as f64
}

/// Decides the level changes of one evaluation. Static and scripted policies
/// never change levels here.
pub fn evaluate<R: Rng + ?Sized>(
    rng: &mut R,
    params: &Params,
    network: &Network,
) -> Vec<LevelChange> {
    let (lo, hi) = params.level_range();
    let thresholds = &params.trigger_thresholds;
    let from_rate =
        |rate: f64, current: u8| transition(current, target_level(rate, thresholds, lo, hi));

    let targets: Vec<(LocaleId, u8, u8)> = match params.alert_policy {
        AlertPolicyKind::Static | AlertPolicyKind::Scripted => Vec::new(),
        AlertPolicyKind::LocalRandom => network
            .locales()
            .iter()
            .map(|locale| {
                let step: i16 = rng.random_range(-1..=1);
                let next = (i16::from(locale.alert_level) + step)
                    .clamp(i16::from(lo), i16::from(hi));
                let next = u8::try_from(next).unwrap_or(lo);
                (locale.id, locale.alert_level, next)
            })
            .collect(),
        AlertPolicyKind::Local => network
            .locales()
            .iter()
            .map(|locale| {
                let next = from_rate(locale.positivity_rate(), locale.alert_level);
                (locale.id, locale.alert_level, next)
            })
            .collect(),
        AlertPolicyKind::GlobalMax | AlertPolicyKind::GlobalMean => {
            let rate = if params.alert_policy == AlertPolicyKind::GlobalMax {
                max_positivity(network)
            } else {
                mean_positivity(network)
            };
            network
                .locales()
                .iter()
                .map(|locale| {
                    let next = from_rate(rate, locale.alert_level);
                    (locale.id, locale.alert_level, next)
                })
                .collect()
        }
    };

    targets
        .into_iter()
        .filter(|(_, from, to)| from != to)
        .map(|(locale, from, to)| LevelChange { locale, from, to })
        .collect()
}

/// Moves a locale to `level`, updating its control multiplier and the flow rate of
/// every connection touching it. Returns false if the locale was already there.
pub fn apply_level(network: &mut Network, params: &Params, locale: LocaleId, level: u8) -> bool {
    let current = network.locale(locale).alert_level;
    if current == level {
        return false;
    }
    let spec = params.level_spec(level);
    let target = network.locale_mut(locale);
    target.alert_level = level;
    target.control = spec.control;
    target.alert_changes += 1;
    info!(
        "locale {} alert level {current} -> {level} (control {})",
        target.name, spec.control
    );
    network.set_flow_rate(locale, params.base_flow_rate * spec.flow);
    true
}

/// Applies the changes of one evaluation in order.
pub fn apply_changes(network: &mut Network, params: &Params, changes: &[LevelChange]) {
    for change in changes {
        apply_level(network, params, change.locale, change.to);
    }
}

/// Puts every locale at the initial alert level without counting a change.
pub fn initialize_levels(network: &mut Network, params: &Params) {
    let level = params.initial_alert_level;
    let spec = *params.level_spec(level);
    for id in 0..network.len() {
        let locale = network.locale_mut(LocaleId(id));
        locale.alert_level = level;
        locale.control = spec.control;
        network.set_flow_rate(LocaleId(id), params.base_flow_rate * spec.flow);
    }
}

/// When the next evaluation is due. The first falls at `alert_start`, then one
/// every `alert_period` days.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EvaluationClock {
    next: f64,
    period: f64,
}

impl EvaluationClock {
    #[must_use]
    pub fn new(params: &Params) -> EvaluationClock {
        EvaluationClock {
            next: params.alert_start,
            period: params.alert_period,
        }
    }

    /// True if an evaluation is due at `time`, in which case the clock advances
    /// past `time`.
    pub fn is_due(&mut self, time: f64) -> bool {
        if time < self.next {
            return false;
        }
        while self.next <= time {
            self.next += self.period;
        }
        true
    }
}
