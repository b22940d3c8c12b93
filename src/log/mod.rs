//! Diagnostic logging. Model output goes through reports (`crate::reports`); this module only
//! carries messages about what a run is doing.
//!
//! The five `log` macros are re-exported here, and the rest of the crate logs through them:
//! `trace!` for every realized exposure, `debug!` for daily summaries, `info!` for alert level
//! changes and run completion, `warn!` for dropped infections and `error!` for aborted runs.
//!
//! Nothing is printed until a level is set. The runner sets levels from `--log-level` and `-v`;
//! code can do the same:
//!
//! ```rust
//! use ixa_branching::log::{set_log_level, set_module_filter, LevelFilter};
//!
//! set_log_level(LevelFilter::Info);
//! // Show every realized exposure.
//! set_module_filter("ixa_branching::transmission", LevelFilter::Trace);
//! ```
//!
//! Some modules are noisy enough at `trace` that they are capped below the global level unless
//! given an explicit filter.
#[cfg(feature = "logging")]
mod standard_logger;

#[cfg(all(feature = "logging", feature = "progress_bar"))]
mod progress_bar_encoder;

#[cfg(not(feature = "logging"))]
mod null_logger;

pub use log::{debug, error, info, trace, warn, LevelFilter};

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Modules whose level never exceeds the cap without an explicit filter. The plan scheduler
/// logs a line for every plan it adds.
const CAPPED_MODULES: [(&str, LevelFilter); 1] = [("ixa_branching::context", LevelFilter::Info)];

/// The process-wide logging settings. Loggers are global, so there is exactly one.
#[derive(Debug)]
pub(in crate::log) struct LogSettings {
    /// Level for modules without a filter. `Off` silences them.
    pub(in crate::log) level: LevelFilter,
    /// Explicit per-module filters, keyed by module path.
    filters: BTreeMap<String, LevelFilter>,

    #[cfg(feature = "logging")]
    handle: Option<log4rs::Handle>,
}

static SETTINGS: Mutex<LogSettings> = Mutex::new(LogSettings::new());

impl LogSettings {
    const fn new() -> LogSettings {
        LogSettings {
            level: LevelFilter::Off,
            filters: BTreeMap::new(),
            #[cfg(feature = "logging")]
            handle: None,
        }
    }

    /// Every module filter in effect: the caps, lowered to the global level, then the explicit
    /// filters on top.
    pub(in crate::log) fn module_levels(&self) -> BTreeMap<String, LevelFilter> {
        let mut levels: BTreeMap<String, LevelFilter> = CAPPED_MODULES
            .iter()
            .map(|(module, cap)| ((*module).to_string(), Ord::min(*cap, self.level)))
            .collect();
        levels.extend(
            self.filters
                .iter()
                .map(|(module, level)| (module.clone(), *level)),
        );
        levels
    }
}

fn settings() -> MutexGuard<'static, LogSettings> {
    SETTINGS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sets the level for modules without a filter. `LevelFilter::Off` disables them.
pub fn set_log_level(level: LevelFilter) {
    let mut settings = settings();
    settings.level = level;
    settings.apply();
}

/// Shows everything. Same as `set_log_level(LevelFilter::Trace)`.
pub fn enable_logging() {
    set_log_level(LevelFilter::Trace);
}

/// Same as `set_log_level(LevelFilter::Off)`. Module filters stay in place.
pub fn disable_logging() {
    set_log_level(LevelFilter::Off);
}

/// Sets the level for one module path and everything below it.
pub fn set_module_filter(module: &str, level: LevelFilter) {
    set_module_filters(&[(module, level)]);
}

/// Sets several module filters, reconfiguring the logger once.
pub fn set_module_filters(filters: &[(&str, LevelFilter)]) {
    let mut settings = settings();
    let mut changed = false;
    for (module, level) in filters {
        changed |= settings.filters.insert((*module).to_string(), *level) != Some(*level);
    }
    if changed {
        settings.apply();
    }
}

/// Removes the filter for a module path, which then follows the global level.
pub fn remove_module_filter(module: &str) {
    let mut settings = settings();
    if settings.filters.remove(module).is_some() {
        settings.apply();
    }
}

/// The level for modules without a filter.
#[must_use]
pub fn log_level() -> LevelFilter {
    settings().level
}

/// The level in effect for a module path with its own filter or cap, if it has one.
#[must_use]
pub fn module_level(module: &str) -> Option<LevelFilter> {
    settings().module_levels().get(module).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::LazyLock;

    // Settings are global; tests that change them take turns.
    static SERIAL: LazyLock<Mutex<()>> = LazyLock::new(Mutex::default);

    const CONTEXT: &str = "ixa_branching::context";
    const TRANSMISSION: &str = "ixa_branching::transmission";

    #[test]
    fn global_level() {
        let _serial = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
        set_log_level(LevelFilter::Warn);
        assert_eq!(log_level(), LevelFilter::Warn);
        enable_logging();
        assert_eq!(log_level(), LevelFilter::Trace);
        trace!("logging enabled in test");
        disable_logging();
        assert_eq!(log_level(), LevelFilter::Off);
    }

    #[test]
    fn capped_module_follows_global_level_up_to_cap() {
        let _serial = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
        remove_module_filter(CONTEXT);
        set_log_level(LevelFilter::Off);
        assert_eq!(module_level(CONTEXT), Some(LevelFilter::Off));
        set_log_level(LevelFilter::Debug);
        assert_eq!(module_level(CONTEXT), Some(LevelFilter::Info));
        set_log_level(LevelFilter::Warn);
        assert_eq!(module_level(CONTEXT), Some(LevelFilter::Warn));
        disable_logging();
    }

    #[test]
    fn explicit_filters_override_and_can_be_removed() {
        let _serial = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
        set_log_level(LevelFilter::Error);
        set_module_filters(&[(CONTEXT, LevelFilter::Trace), (TRANSMISSION, LevelFilter::Debug)]);
        assert_eq!(module_level(CONTEXT), Some(LevelFilter::Trace));
        assert_eq!(module_level(TRANSMISSION), Some(LevelFilter::Debug));

        remove_module_filter(TRANSMISSION);
        assert_eq!(module_level(TRANSMISSION), None);
        remove_module_filter(CONTEXT);
        assert_eq!(module_level(CONTEXT), Some(LevelFilter::Error));
        disable_logging();
    }
}
