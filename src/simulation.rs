//! Model assembly and the daily step.
//!
//! `init` builds the locale network from the installed parameters, seeds the
//! initial cases, schedules importations and scripted alert changes, and plans
//! the first daily step at `t = 0`. Each daily step covers the day
//! `[t, t + 1)`:
//!
//! 1. flush the exposure queue to `t + 1`, repeating until nothing is due
//! 2. recover cases and discard their queued exposures
//! 3. run the day's tests
//! 4. evaluate the alert policy, if an evaluation is due
//! 5. write one detail row per locale
//! 6. stop if the day took too long, the outbreak is extinct, or `max_time`
//!    is reached; otherwise plan the next day
//!
//! Importations and scripted alert changes run in the `First` phase, so the
//! daily step at the same time sees them.
use std::cell::{Ref, RefCell};
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

use crate::alert_policy::{
    apply_changes, apply_level, evaluate, initialize_levels, EvaluationClock,
};
use crate::context::{Context, ExecutionPhase};
use crate::define_data_plugin;
use crate::error::BranchingError;
use crate::locale::LocaleId;
use crate::log::{debug, error, info};
use crate::network::Network;
use crate::parameters::{AlertPolicyKind, ContextParametersExt, Params};
use crate::random::{define_rng, ContextRandomExt};
use crate::report::ContextReportExt;
use crate::reports::{CaseRecord, LocaleDayRecord};
use crate::testing::run_daily_tests;
use crate::transmission::Outbreak;

define_rng!(NetworkRng);
define_rng!(SeedingRng);
define_rng!(TransmissionRng);
define_rng!(TestingRng);
define_rng!(AlertRng);

/// How a run ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum RunStatus {
    /// Still executing, or never started.
    #[default]
    Running,
    /// No live cases, no queued exposures and no importations to come.
    Extinct,
    /// `max_time` days were simulated.
    TimeLimit,
    /// A simulated day took longer than `max_wall_time_per_day`.
    Aborted,
}

impl Display for RunStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStatus::Running => "running",
            RunStatus::Extinct => "extinct",
            RunStatus::TimeLimit => "time limit",
            RunStatus::Aborted => "aborted",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub status: RunStatus,
    /// Days simulated.
    pub days: u64,
    /// Cases of either kind, arrivals included.
    pub total_infected: u64,
    /// Clinical cases.
    pub total_cases: u64,
    pub peak_alert_level: u8,
}

/// Network-wide totals for one simulated day.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DaySummary {
    pub day: u64,
    pub new_infected: u64,
    pub cumulative_infected: u64,
    pub live_cases: usize,
    pub pending_exposures: usize,
}

#[derive(Default)]
struct ModelState {
    network: Network,
    outbreak: Outbreak,
    clock: Option<EvaluationClock>,
    pending_importations: usize,
    summary: RunSummary,
    history: Vec<DaySummary>,
}

define_data_plugin!(
    ModelPlugin,
    RefCell<ModelState>,
    RefCell::new(ModelState::default())
);

/// Builds the model from the installed parameters and plans the first day.
///
/// # Errors
///
/// Returns a `BranchingError` if the network cannot be built or the parameters
/// name a locale the network does not have.
pub fn init(context: &mut Context, seed: u64) -> Result<(), BranchingError> {
    context.init_random(seed);
    let params = context.get_params().clone();

    let mut network = context.sample(NetworkRng, |rng| Network::build(rng, &params.network))?;
    params.check_locale_names(|name| network.locale_id(name).is_some())?;
    for locale in network.locales_mut() {
        locale.set_positivity_window(params.positivity_window);
    }
    initialize_levels(&mut network, &params);

    let mut outbreak = Outbreak::new();
    context.sample(SeedingRng, |rng| {
        outbreak.seed(
            rng,
            &params,
            &mut network,
            params.initial_cases,
            params.seed_burn_in,
            0.0,
        )
    });

    let mut importations = 0;
    for importation in &params.importations {
        let Some(locale) = network.locale_id(&importation.locale) else {
            continue;
        };
        importations += 1;
        let time = importation.time;
        let count = importation.count;
        context.add_plan_with_phase(
            time.floor(),
            move |context| import_cases(context, locale, time, count),
            ExecutionPhase::First,
        );
    }

    if params.alert_policy == AlertPolicyKind::Scripted {
        for scheduled in &params.alert_schedule {
            let target = scheduled
                .locale
                .as_deref()
                .and_then(|name| network.locale_id(name));
            let level = scheduled.level;
            context.add_plan_with_phase(
                scheduled.time,
                move |context| {
                    let params = context.get_params();
                    let mut model = context.get_data(ModelPlugin).borrow_mut();
                    set_level(&mut model.network, params, target, level);
                },
                ExecutionPhase::First,
            );
        }
    }

    info!(
        "model initialized: {} locales, {} people, {} initial cases, seed {seed}",
        network.len(),
        network.total_population(),
        outbreak.live_cases()
    );
    {
        let mut model = context.get_data(ModelPlugin).borrow_mut();
        *model = ModelState {
            network,
            outbreak,
            clock: Some(EvaluationClock::new(&params)),
            pending_importations: importations,
            summary: RunSummary {
                peak_alert_level: params.initial_alert_level,
                ..RunSummary::default()
            },
            history: Vec::new(),
        };
    }
    context.add_plan(0.0, daily_step);
    Ok(())
}

/// Moves one locale, or every locale when `target` is `None`, to `level`.
fn set_level(network: &mut Network, params: &Params, target: Option<LocaleId>, level: u8) {
    match target {
        Some(id) => {
            apply_level(network, params, id, level);
        }
        None => {
            for id in 0..network.len() {
                apply_level(network, params, LocaleId(id), level);
            }
        }
    }
}

fn import_cases(context: &mut Context, locale: LocaleId, time: f64, count: u32) {
    let params = context.get_params();
    let mut model = context.get_data(ModelPlugin).borrow_mut();
    let model = &mut *model;
    context.sample(SeedingRng, |rng| {
        for _ in 0..count {
            model
                .outbreak
                .import(rng, params, &mut model.network, locale, time);
        }
    });
    model.pending_importations -= 1;
    debug!("imported {count} cases at locale {locale} at {time}");
}

enum DayOutcome {
    Continue,
    Finished(RunStatus),
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn run_day(context: &Context, day_start: f64, started: Instant) -> DayOutcome {
    let params = context.get_params();
    let boundary = day_start + 1.0;
    let budget = Duration::from_secs_f64(params.max_wall_time_per_day);
    let mut model = context.get_data(ModelPlugin).borrow_mut();
    let model = &mut *model;

    let flush = context.sample(TransmissionRng, |rng| {
        model.outbreak.flush(
            rng,
            params,
            &mut model.network,
            boundary,
            Some(started + budget),
        )
    });

    let recovered = model.outbreak.progress(&mut model.network, day_start, boundary);
    if context.has_report::<CaseRecord>() {
        for case in &recovered {
            context.send_report(CaseRecord::from(case));
        }
    }

    context.sample(TestingRng, |rng| {
        run_daily_tests(rng, params, &mut model.network);
    });

    if model.clock.as_mut().is_some_and(|clock| clock.is_due(day_start)) {
        let changes = context.sample(AlertRng, |rng| evaluate(rng, params, &model.network));
        apply_changes(&mut model.network, params, &changes);
    }

    let day = day_start as u64;
    let mut totals = DaySummary {
        day,
        live_cases: model.outbreak.live_cases(),
        pending_exposures: model.outbreak.pending_exposures(),
        ..DaySummary::default()
    };
    let reporting = context.has_report::<LocaleDayRecord>();
    for locale in model.network.locales() {
        if reporting {
            context.send_report(LocaleDayRecord::new(day, locale));
        }
        totals.new_infected += locale.counts.new_infected;
        totals.cumulative_infected += locale.counts.cumulative_infected;
        model.summary.total_cases += locale.counts.new_cases;
        model.summary.peak_alert_level = model.summary.peak_alert_level.max(locale.alert_level);
    }
    for locale in model.network.locales_mut() {
        locale.counts.start_day();
    }
    model.summary.days = day + 1;
    model.summary.total_infected = totals.cumulative_infected;
    model.history.push(totals);

    let elapsed = started.elapsed();
    debug!(
        "day {day}: {} new infections, {} live cases, {} queued exposures, {} waves in {}",
        totals.new_infected,
        totals.live_cases,
        totals.pending_exposures,
        flush.waves,
        humantime::format_duration(elapsed)
    );

    if flush.timed_out || elapsed > budget {
        error!(
            "day {day} took {} (limit {}s) with {} live cases and {} queued exposures; aborting run",
            humantime::format_duration(elapsed),
            params.max_wall_time_per_day,
            totals.live_cases,
            totals.pending_exposures
        );
        return DayOutcome::Finished(RunStatus::Aborted);
    }
    if model.outbreak.is_extinct() && model.pending_importations == 0 {
        return DayOutcome::Finished(RunStatus::Extinct);
    }
    if boundary >= params.max_time {
        return DayOutcome::Finished(RunStatus::TimeLimit);
    }
    DayOutcome::Continue
}

fn daily_step(context: &mut Context) {
    let day_start = context.get_current_time();
    match run_day(context, day_start, Instant::now()) {
        DayOutcome::Continue => {
            context.add_plan(day_start + 1.0, daily_step);
        }
        DayOutcome::Finished(status) => finish(context, status),
    }
}

fn finish(context: &mut Context, status: RunStatus) {
    {
        let mut model = context.get_data(ModelPlugin).borrow_mut();
        model.summary.status = status;
        let summary = &model.summary;
        info!(
            "run finished ({status}) after {} days: {} infected, {} clinical cases, peak alert level {}",
            summary.days, summary.total_infected, summary.total_cases, summary.peak_alert_level
        );
    }
    if let Err(e) = context.flush_reports() {
        error!("failed to flush reports: {e}");
    }
    context.shutdown();
}

pub trait ContextSimulationExt {
    /// The locale network of the running model.
    fn network(&self) -> Ref<'_, Network>;

    /// Totals so far, and the final status once the run has ended.
    fn run_summary(&self) -> RunSummary;

    /// Network-wide totals of every simulated day, in order.
    fn day_history(&self) -> Vec<DaySummary>;

    /// Live cases in the running model.
    fn live_cases(&self) -> usize;

    /// Moves a locale, or every locale when `locale` is `None`, to `level`
    /// immediately, whatever the alert policy.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the locale is unknown or the level is not in the
    /// alert level table.
    fn override_alert_level(&mut self, locale: Option<&str>, level: u8)
        -> Result<(), BranchingError>;
}

impl ContextSimulationExt for Context {
    fn network(&self) -> Ref<'_, Network> {
        Ref::map(self.get_data(ModelPlugin).borrow(), |model| &model.network)
    }

    fn run_summary(&self) -> RunSummary {
        self.get_data(ModelPlugin).borrow().summary.clone()
    }

    fn day_history(&self) -> Vec<DaySummary> {
        self.get_data(ModelPlugin).borrow().history.clone()
    }

    fn live_cases(&self) -> usize {
        self.get_data(ModelPlugin).borrow().outbreak.live_cases()
    }

    fn override_alert_level(
        &mut self,
        locale: Option<&str>,
        level: u8,
    ) -> Result<(), BranchingError> {
        let params = self.get_params();
        let (lo, hi) = params.level_range();
        if !(lo..=hi).contains(&level) {
            return Err(BranchingError::ConfigError(format!(
                "alert level {level} is outside [{lo}, {hi}]"
            )));
        }
        let mut model = self.get_data(ModelPlugin).borrow_mut();
        let target = match locale {
            Some(name) => Some(
                model
                    .network
                    .locale_id(name)
                    .ok_or_else(|| BranchingError::ConfigError(format!("unknown locale {name}")))?,
            ),
            None => None,
        };
        set_level(&mut model.network, params, target, level);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{Importation, NetworkSetup, ScheduledAlert};
    use std::rc::Rc;

    fn isolated(population: u64) -> NetworkSetup {
        NetworkSetup::Isolated {
            name: "home".to_string(),
            population,
        }
    }

    fn small_network() -> NetworkSetup {
        NetworkSetup::Random {
            locales: 5,
            total_population: 20_000,
            population_cv: 0.5,
            edges_per_locale: 2.0,
            extent: 50.0,
        }
    }

    fn run(params: Params, seed: u64) -> Context {
        let mut context = Context::new();
        context.set_parameters(params).unwrap();
        init(&mut context, seed).unwrap();
        context.execute();
        context
    }

    #[test]
    fn conservation_holds_every_day() {
        let params = Params {
            network: small_network(),
            max_time: 40.0,
            importations: vec![Importation {
                time: 3.5,
                locale: "L2".to_string(),
                count: 4,
            }],
            ..Params::default()
        };
        let mut context = Context::new();
        context.set_parameters(params).unwrap();
        init(&mut context, 11).unwrap();

        let violations = Rc::new(RefCell::new(Vec::new()));
        for day in 0..40 {
            let violations = Rc::clone(&violations);
            context.add_plan_with_phase(
                f64::from(day),
                move |context| {
                    for locale in context.network().locales() {
                        if !locale.is_conserved() {
                            violations.borrow_mut().push((day, locale.id));
                        }
                    }
                },
                ExecutionPhase::Last,
            );
        }
        context.execute();
        assert!(violations.borrow().is_empty(), "{:?}", violations.borrow());
        let arrivals: u64 = context
            .network()
            .locales()
            .iter()
            .map(|locale| locale.counts.arrivals)
            .sum();
        assert_eq!(arrivals, 4);
    }

    #[test]
    fn isolated_uncontrolled_outbreak_grows() {
        let params = Params {
            network: isolated(100_000),
            r_clinical: 3.0,
            p_clinical: 1.0,
            alert_policy: AlertPolicyKind::Static,
            initial_cases: 20,
            max_time: 30.0,
            ..Params::default()
        };
        let context = run(params, 3);
        let history = context.day_history();
        assert_eq!(history.len(), 30);
        assert!(history
            .windows(2)
            .all(|pair| pair[0].cumulative_infected <= pair[1].cumulative_infected));
        let summary = context.run_summary();
        assert_eq!(summary.status, RunStatus::TimeLimit);
        assert!(summary.total_infected > 20);
        assert_eq!(summary.total_cases, summary.total_infected);

        let network = context.network();
        assert_eq!(network.len(), 1);
        let home = &network.locales()[0];
        assert_eq!(home.counts.arrivals, 0);
        assert_eq!(home.susceptible + summary.total_infected, home.pop0);
        assert_eq!(home.alert_level, 1);
    }

    #[test]
    fn fixed_seed_is_reproducible() {
        let params = Params {
            network: small_network(),
            max_time: 50.0,
            ..Params::default()
        };
        let first = run(params.clone(), 21);
        let second = run(params, 21);
        assert_eq!(first.day_history(), second.day_history());
        assert_eq!(first.run_summary(), second.run_summary());
        let levels = |context: &Context| -> Vec<u8> {
            context
                .network()
                .locales()
                .iter()
                .map(|locale| locale.alert_level)
                .collect()
        };
        assert_eq!(levels(&first), levels(&second));
    }

    #[test]
    fn outbreak_without_transmission_goes_extinct() {
        let params = Params {
            network: isolated(1000),
            r_clinical: 0.0,
            initial_cases: 5,
            max_time: 100.0,
            ..Params::default()
        };
        let context = run(params, 1);
        let summary = context.run_summary();
        assert_eq!(summary.status, RunStatus::Extinct);
        assert_eq!(summary.total_infected, 5);
        assert!(summary.days < 100);
        assert_eq!(context.live_cases(), 0);
    }

    #[test]
    fn pending_importation_prevents_extinction() {
        let params = Params {
            network: isolated(1000),
            r_clinical: 0.0,
            initial_cases: 0,
            importations: vec![Importation {
                time: 50.0,
                locale: "home".to_string(),
                count: 1,
            }],
            max_time: 200.0,
            ..Params::default()
        };
        let context = run(params, 1);
        let summary = context.run_summary();
        assert_eq!(summary.status, RunStatus::Extinct);
        assert_eq!(summary.total_infected, 1);
        assert!(summary.days > 50);
    }

    #[test]
    fn static_policy_keeps_levels() {
        let params = Params {
            network: small_network(),
            alert_policy: AlertPolicyKind::Static,
            initial_alert_level: 2,
            alert_start: 0.0,
            alert_period: 1.0,
            max_time: 60.0,
            ..Params::default()
        };
        let context = run(params, 5);
        for locale in context.network().locales() {
            assert_eq!(locale.alert_level, 2);
            assert_eq!(locale.alert_changes, 0);
        }
        assert_eq!(context.run_summary().peak_alert_level, 2);
    }

    #[test]
    fn scripted_schedule_sets_levels() {
        let params = Params {
            network: small_network(),
            alert_policy: AlertPolicyKind::Scripted,
            alert_schedule: vec![
                ScheduledAlert {
                    time: 2.0,
                    locale: None,
                    level: 3,
                },
                ScheduledAlert {
                    time: 4.0,
                    locale: Some("L0".to_string()),
                    level: 4,
                },
            ],
            max_time: 10.0,
            ..Params::default()
        };
        let context = run(params, 2);
        let network = context.network();
        assert_eq!(network.locales()[0].alert_level, 4);
        assert!(network.locales()[1..]
            .iter()
            .all(|locale| locale.alert_level == 3));
    }

    #[test]
    fn unknown_importation_locale_fails_init() {
        let params = Params {
            network: isolated(1000),
            importations: vec![Importation {
                time: 1.0,
                locale: "elsewhere".to_string(),
                count: 1,
            }],
            ..Params::default()
        };
        let mut context = Context::new();
        context.set_parameters(params).unwrap();
        assert!(matches!(
            init(&mut context, 0),
            Err(BranchingError::ConfigError(_))
        ));
    }

    #[test]
    fn override_moves_level_and_rejects_bad_input() {
        let params = Params {
            network: small_network(),
            ..Params::default()
        };
        let mut context = Context::new();
        context.set_parameters(params).unwrap();
        init(&mut context, 9).unwrap();

        context.override_alert_level(Some("L1"), 3).unwrap();
        assert_eq!(context.network().locales()[1].alert_level, 3);
        assert_eq!(context.network().locales()[0].alert_level, 1);
        assert!(context.override_alert_level(Some("nowhere"), 2).is_err());
        assert!(context.override_alert_level(None, 9).is_err());
        context.override_alert_level(None, 2).unwrap();
        assert!(context
            .network()
            .locales()
            .iter()
            .all(|locale| locale.alert_level == 2));
    }

    #[test]
    fn runaway_day_aborts() {
        let params = Params {
            network: isolated(5_000_000),
            r_clinical: 6.0,
            p_clinical: 1.0,
            initial_cases: 1000,
            alert_policy: AlertPolicyKind::Static,
            max_wall_time_per_day: 1e-9,
            max_time: 100.0,
            ..Params::default()
        };
        let context = run(params, 4);
        let summary = context.run_summary();
        assert_eq!(summary.status, RunStatus::Aborted);
        assert_eq!(summary.days, 1);
    }
}
