//! A branching-process model of epidemic spread across a network of locales
//!
//! Each infected individual is a case that, when created, draws its whole
//! future: clinical or subclinical course, symptom onset, isolation,
//! hospitalization, recovery, and the times of every exposure it will cause.
//! Exposures wait in a time-ordered queue and are realized one simulated day at
//! a time. Whether an exposure becomes a new case depends on the state of its
//! source's locale when it fires: the fraction of the locale still susceptible
//! and the control multiplier of the locale's current alert level. Accepted
//! exposures may be redirected to a neighboring locale along the weighted
//! connections of the network.
//!
//! Alert levels respond to test positivity according to a selectable policy,
//! closing the loop between observed data and transmission.
//!
//! The simulation runs on a small discrete-event kernel:
//! * `Context` keeps simulated time, a queue of plans, and typed data plugins
//! * `random` provides named, independently seeded random streams
//! * `report` writes CSV reports
//!
//! The model itself is assembled in `simulation`, and `runner` provides the
//! command line.
pub mod context;
pub mod plan;
pub mod random;
pub mod report;

pub mod error;
pub mod log;
#[cfg(feature = "progress_bar")]
pub mod progress;

pub mod alert_policy;
pub mod case;
pub mod locale;
pub mod network;
pub mod parameters;
pub mod reports;
pub mod simulation;
pub mod testing;
pub mod transmission;

pub mod execution_stats;
pub mod runner;

pub mod hashing;
pub mod macros;
pub mod numeric;

// Re-exported for use in macros
pub use csv;
pub use paste;
pub use rand;

pub use hashing::{HashMap, HashMapExt, HashSet, HashSetExt};
