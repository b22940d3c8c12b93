//! Model parameters.
//!
//! A run is configured by a single `Params` value, loaded from JSON with
//! `ContextParametersExt::init_parameters` or built in code and installed with
//! `set_parameters`. Every field has a default, so a config file only needs the
//! fields it changes:
//!
//! ```json
//! {
//!   "max_time": 120.0,
//!   "network": { "kind": "random", "locales": 10, "total_population": 200000 },
//!   "alert_policy": "global_max"
//! }
//! ```
use std::fs;
use std::path::{Path, PathBuf};

use serde_derive::{Deserialize, Serialize};

use crate::context::Context;
use crate::define_data_plugin;
use crate::error::BranchingError;
use crate::log::{debug, trace};

/// How the locale network is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum NetworkSetup {
    /// A single locale with no connections. Nothing is ever redirected.
    Isolated { name: String, population: u64 },
    /// Locales placed uniformly at random in a square, with Gamma-distributed
    /// populations and nearest-non-neighbor links.
    Random {
        locales: usize,
        total_population: u64,
        /// Coefficient of variation of locale populations.
        #[serde(default = "default_population_cv")]
        population_cv: f64,
        /// Target number of undirected links per locale.
        #[serde(default = "default_edges_per_locale")]
        edges_per_locale: f64,
        /// Side length of the square locales are placed in.
        #[serde(default = "default_extent")]
        extent: f64,
    },
    /// Locales (`name,population,x,y`) and optionally links (`from,to,distance`)
    /// read from CSV files. Without a links file every pair is linked at its
    /// Euclidean distance. Links longer than `max_distance` are pruned.
    Table {
        locales_file: PathBuf,
        #[serde(default)]
        edges_file: Option<PathBuf>,
        #[serde(default)]
        max_distance: Option<f64>,
    },
}

fn default_population_cv() -> f64 {
    1.0
}

fn default_edges_per_locale() -> f64 {
    3.0
}

fn default_extent() -> f64 {
    100.0
}

impl Default for NetworkSetup {
    fn default() -> Self {
        NetworkSetup::Random {
            locales: 20,
            total_population: 1_000_000,
            population_cv: default_population_cv(),
            edges_per_locale: default_edges_per_locale(),
            extent: default_extent(),
        }
    }
}

/// Which connection weight drives redirection of new infections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Inverse distance (`w`).
    Distance,
    /// Population product over squared distance (`gw`).
    #[default]
    Gravity,
}

/// The rule that moves alert levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPolicyKind {
    /// Levels change only through explicit overrides.
    Static,
    /// Each locale moves by -1, 0 or +1 uniformly at random.
    LocalRandom,
    /// Each locale follows its own positivity rate.
    #[default]
    Local,
    /// Every locale follows the highest positivity rate.
    GlobalMax,
    /// Every locale follows the population-weighted mean positivity rate.
    GlobalMean,
    /// Levels follow `alert_schedule`.
    Scripted,
}

/// One row of the alert level table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertLevelSpec {
    pub level: u8,
    /// Multiplier on the probability that an exposure becomes a case.
    pub control: f64,
    /// Multiplier on the base flow rate between locales.
    pub flow: f64,
}

/// A scripted alert level change. `locale: None` applies to every locale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduledAlert {
    pub time: f64,
    #[serde(default)]
    pub locale: Option<String>,
    pub level: u8,
}

/// External cases arriving at a locale. They do not draw down its susceptibles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Importation {
    pub time: f64,
    pub locale: String,
    #[serde(default = "default_importation_count")]
    pub count: u32,
}

fn default_importation_count() -> u32 {
    1
}

#[must_use]
pub fn default_alert_levels() -> Vec<AlertLevelSpec> {
    vec![
        AlertLevelSpec {
            level: 1,
            control: 1.0,
            flow: 1.0,
        },
        AlertLevelSpec {
            level: 2,
            control: 0.75,
            flow: 0.5,
        },
        AlertLevelSpec {
            level: 3,
            control: 0.45,
            flow: 0.2,
        },
        AlertLevelSpec {
            level: 4,
            control: 0.2,
            flow: 0.05,
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Params {
    // Run control
    pub seed: u64,
    /// Days simulated before the run stops with `TimeLimit`.
    pub max_time: f64,
    /// Wall-clock seconds a single simulated day may take before the run is aborted.
    pub max_wall_time_per_day: f64,

    // Network
    pub network: NetworkSetup,
    pub weighting: Weighting,
    /// Probability that an accepted exposure leaves its locale at alert level flow 1.
    pub base_flow_rate: f64,

    // Case lifecycle
    pub p_clinical: f64,
    pub r_clinical: f64,
    pub subclinical_r_fraction: f64,
    /// Gamma shape for inter-case variation in R. `None` gives every case the mean.
    pub r_dispersion: Option<f64>,
    pub onset_shape: f64,
    pub onset_scale: f64,
    pub detection_delay_mean: f64,
    pub p_hospitalized: f64,
    pub hospital_delay_mean: f64,
    pub hospital_stay_mean: f64,
    /// Days from exposure to recovery for every case.
    pub disease_duration: f64,
    pub generation_shape: f64,
    pub generation_scale: f64,
    /// Fractional reduction in transmission from an isolated clinical case.
    pub isolation_effect: f64,

    // Seeding
    pub initial_cases: u32,
    /// Seed exposure times are drawn from `[-seed_burn_in, 0]`.
    pub seed_burn_in: f64,
    pub importations: Vec<Importation>,

    // Testing
    pub p_symptomatic_tested: f64,
    /// Daily screening tests per susceptible person.
    pub screening_rate: f64,
    pub false_negative_rate: f64,
    /// Days of tests summed into the positivity rate.
    pub positivity_window: usize,

    // Alert control
    pub alert_policy: AlertPolicyKind,
    pub alert_levels: Vec<AlertLevelSpec>,
    /// Positivity rates at which the target level steps up, in increasing order.
    pub trigger_thresholds: Vec<f64>,
    pub initial_alert_level: u8,
    pub alert_start: f64,
    pub alert_period: f64,
    pub alert_schedule: Vec<ScheduledAlert>,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            seed: 0,
            max_time: 180.0,
            max_wall_time_per_day: 10.0,

            network: NetworkSetup::default(),
            weighting: Weighting::default(),
            base_flow_rate: 0.05,

            p_clinical: 0.667,
            r_clinical: 3.0,
            subclinical_r_fraction: 0.5,
            r_dispersion: None,
            onset_shape: 5.8,
            onset_scale: 0.95,
            detection_delay_mean: 2.0,
            p_hospitalized: 0.05,
            hospital_delay_mean: 3.0,
            hospital_stay_mean: 10.0,
            disease_duration: 30.0,
            generation_shape: 2.83,
            generation_scale: 5.67,
            isolation_effect: 0.65,

            initial_cases: 10,
            seed_burn_in: 7.0,
            importations: Vec::new(),

            p_symptomatic_tested: 0.8,
            screening_rate: 0.001,
            false_negative_rate: 0.1,
            positivity_window: 7,

            alert_policy: AlertPolicyKind::default(),
            alert_levels: default_alert_levels(),
            trigger_thresholds: vec![0.01, 0.05, 0.1],
            initial_alert_level: 1,
            alert_start: 14.0,
            alert_period: 7.0,
            alert_schedule: Vec::new(),
        }
    }
}

fn check_probability(name: &str, value: f64) -> Result<(), BranchingError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(BranchingError::ConfigError(format!(
            "{name} must be a probability in [0, 1], got {value}"
        )))
    }
}

fn check_positive(name: &str, value: f64) -> Result<(), BranchingError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(BranchingError::ConfigError(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<(), BranchingError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(BranchingError::ConfigError(format!(
            "{name} must be non-negative and finite, got {value}"
        )))
    }
}

impl Params {
    /// Checks ranges and cross-field consistency.
    ///
    /// Locale names used by importations and scripted alerts are checked once the
    /// network exists; see `check_locale_names`.
    ///
    /// # Errors
    ///
    /// Returns `BranchingError::ConfigError` describing the first violation.
    pub fn validate(&self) -> Result<(), BranchingError> {
        check_positive("max_time", self.max_time)?;
        check_positive("max_wall_time_per_day", self.max_wall_time_per_day)?;
        check_probability("base_flow_rate", self.base_flow_rate)?;

        match &self.network {
            NetworkSetup::Isolated { population, .. } => {
                if *population == 0 {
                    return Err("isolated locale population must be positive".into());
                }
            }
            NetworkSetup::Random {
                locales,
                total_population,
                population_cv,
                edges_per_locale,
                extent,
            } => {
                if *locales < 2 {
                    return Err("a random network needs at least two locales".into());
                }
                if *total_population < *locales as u64 {
                    return Err(
                        "total_population must give every locale at least one person".into(),
                    );
                }
                check_positive("population_cv", *population_cv)?;
                check_positive("edges_per_locale", *edges_per_locale)?;
                check_positive("extent", *extent)?;
            }
            NetworkSetup::Table { max_distance, .. } => {
                if let Some(max_distance) = max_distance {
                    check_positive("max_distance", *max_distance)?;
                }
            }
        }

        check_probability("p_clinical", self.p_clinical)?;
        check_non_negative("r_clinical", self.r_clinical)?;
        check_probability("subclinical_r_fraction", self.subclinical_r_fraction)?;
        if let Some(k) = self.r_dispersion {
            check_positive("r_dispersion", k)?;
        }
        check_positive("onset_shape", self.onset_shape)?;
        check_positive("onset_scale", self.onset_scale)?;
        check_non_negative("detection_delay_mean", self.detection_delay_mean)?;
        check_probability("p_hospitalized", self.p_hospitalized)?;
        check_non_negative("hospital_delay_mean", self.hospital_delay_mean)?;
        check_non_negative("hospital_stay_mean", self.hospital_stay_mean)?;
        check_positive("disease_duration", self.disease_duration)?;
        check_positive("generation_shape", self.generation_shape)?;
        check_positive("generation_scale", self.generation_scale)?;
        check_probability("isolation_effect", self.isolation_effect)?;

        check_non_negative("seed_burn_in", self.seed_burn_in)?;
        for importation in &self.importations {
            check_non_negative("importation time", importation.time)?;
        }

        check_probability("p_symptomatic_tested", self.p_symptomatic_tested)?;
        check_non_negative("screening_rate", self.screening_rate)?;
        check_probability("false_negative_rate", self.false_negative_rate)?;
        if self.positivity_window == 0 {
            return Err("positivity_window must be at least one day".into());
        }

        self.validate_alert_levels()?;
        check_non_negative("alert_start", self.alert_start)?;
        check_positive("alert_period", self.alert_period)?;
        for scheduled in &self.alert_schedule {
            check_non_negative("alert_schedule time", scheduled.time)?;
            self.check_level("alert_schedule level", scheduled.level)?;
        }
        Ok(())
    }

    fn validate_alert_levels(&self) -> Result<(), BranchingError> {
        let levels = &self.alert_levels;
        let Some(first) = levels.first() else {
            return Err("alert_levels must not be empty".into());
        };
        for (i, spec) in levels.iter().enumerate() {
            if usize::from(spec.level) != usize::from(first.level) + i {
                return Err(BranchingError::ConfigError(format!(
                    "alert_levels must list consecutive levels, found {} after {}",
                    spec.level,
                    usize::from(first.level) + i - 1
                )));
            }
            check_probability(&format!("control of level {}", spec.level), spec.control)?;
            check_probability(&format!("flow of level {}", spec.level), spec.flow)?;
        }
        if self.trigger_thresholds.len() >= levels.len() {
            return Err(BranchingError::ConfigError(format!(
                "{} trigger thresholds cannot map onto {} alert levels",
                self.trigger_thresholds.len(),
                levels.len()
            )));
        }
        if self
            .trigger_thresholds
            .windows(2)
            .any(|pair| pair[0] >= pair[1])
        {
            return Err("trigger_thresholds must be strictly increasing".into());
        }
        for threshold in &self.trigger_thresholds {
            check_non_negative("trigger threshold", *threshold)?;
        }
        self.check_level("initial_alert_level", self.initial_alert_level)
    }

    fn check_level(&self, name: &str, level: u8) -> Result<(), BranchingError> {
        let (lo, hi) = self.level_range();
        if (lo..=hi).contains(&level) {
            Ok(())
        } else {
            Err(BranchingError::ConfigError(format!(
                "{name} {level} is outside the alert level table [{lo}, {hi}]"
            )))
        }
    }

    /// The closed range of alert levels in the level table.
    #[must_use]
    pub fn level_range(&self) -> (u8, u8) {
        let lo = self.alert_levels.first().map_or(1, |spec| spec.level);
        let hi = self.alert_levels.last().map_or(1, |spec| spec.level);
        (lo, hi)
    }

    /// The level table row for `level`.
    ///
    /// # Panics
    ///
    /// Panics if `level` is outside the validated table.
    #[must_use]
    pub fn level_spec(&self, level: u8) -> &AlertLevelSpec {
        let (lo, _) = self.level_range();
        &self.alert_levels[usize::from(level - lo)]
    }

    /// Verifies that every locale named by importations and the alert schedule exists.
    ///
    /// # Errors
    ///
    /// Returns `BranchingError::ConfigError` naming the first unknown locale.
    pub fn check_locale_names(
        &self,
        mut known: impl FnMut(&str) -> bool,
    ) -> Result<(), BranchingError> {
        let named = self
            .importations
            .iter()
            .map(|importation| importation.locale.as_str())
            .chain(
                self.alert_schedule
                    .iter()
                    .filter_map(|scheduled| scheduled.locale.as_deref()),
            );
        for name in named {
            if !known(name) {
                return Err(BranchingError::ConfigError(format!("unknown locale {name}")));
            }
        }
        Ok(())
    }

    /// Makes relative table paths relative to `base` (the config file's directory).
    fn resolve_paths(&mut self, base: &Path) {
        if let NetworkSetup::Table {
            locales_file,
            edges_file,
            ..
        } = &mut self.network
        {
            if locales_file.is_relative() {
                *locales_file = base.join(&*locales_file);
            }
            if let Some(edges_file) = edges_file {
                if edges_file.is_relative() {
                    *edges_file = base.join(&*edges_file);
                }
            }
        }
    }

    /// Reads and validates parameters from a JSON file. Table paths inside the file
    /// are resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns a `BranchingError` if the file cannot be read or parsed, or fails validation.
    pub fn from_json_file(path: &Path) -> Result<Params, BranchingError> {
        trace!("reading parameters from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let mut params: Params = serde_json::from_str(&contents)?;
        if let Some(base) = path.parent() {
            params.resolve_paths(base);
        }
        params.validate()?;
        Ok(params)
    }
}

define_data_plugin!(ParametersPlugin, Params, Params::default());

pub trait ContextParametersExt {
    /// Loads parameters from a JSON file and installs them.
    ///
    /// # Errors
    ///
    /// Returns a `BranchingError` if the file cannot be read or the parameters are invalid.
    fn init_parameters(&mut self, path: &Path) -> Result<(), BranchingError>;

    /// Validates and installs parameters built in code.
    ///
    /// # Errors
    ///
    /// Returns `BranchingError::ConfigError` if validation fails.
    fn set_parameters(&mut self, params: Params) -> Result<(), BranchingError>;

    /// The installed parameters, or the defaults if none were installed.
    fn get_params(&self) -> &Params;
}

impl ContextParametersExt for Context {
    fn init_parameters(&mut self, path: &Path) -> Result<(), BranchingError> {
        let params = Params::from_json_file(path)?;
        *self.get_data_mut(ParametersPlugin) = params;
        Ok(())
    }

    fn set_parameters(&mut self, params: Params) -> Result<(), BranchingError> {
        params.validate()?;
        debug!("parameters installed: {params:?}");
        *self.get_data_mut(ParametersPlugin) = params;
        Ok(())
    }

    fn get_params(&self) -> &Params {
        self.get_data(ParametersPlugin)
    }
}
