//! A console progress bar for the simulated timeline.
//!
//! The bar is keyed to simulated days: `init_timeline_progress_bar(max_time)` sets its length
//! and `Context::execute` advances it as plans fire. Only one bar can be active per process, so
//! runners executing several replicates on worker threads leave it off.

use crate::log::{trace, warn};
use progress_bar::{
    finalize_progress_bar, init_progress_bar, set_progress_bar_action, set_progress_bar_progress,
    Color, Style,
};
use std::sync::OnceLock;

/// We want to store the original `f64` max value, not the `usize` we initialized the progress
/// bar with.
pub(crate) static MAX_TIME: OnceLock<f64> = OnceLock::new();

/// Initialize the progress bar with the maximum time until the simulation ends.
///
/// Calling this a second time in the same process leaves the first bar in place.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn init_timeline_progress_bar(max_time: f64) {
    trace!("initializing timeline progress bar with max time {max_time}");
    if MAX_TIME.set(max_time).is_err() {
        warn!("timeline progress bar already initialized");
        return;
    }
    init_progress_bar(max_time.round() as usize);
    set_progress_bar_action("Day", Color::Blue, Style::Bold);
}

/// Updates the timeline progress bar with the current time.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn update_timeline_progress(mut current_time: f64) {
    if let Some(max_time) = MAX_TIME.get() {
        if current_time >= *max_time {
            current_time = *max_time;
        }
        set_progress_bar_progress(current_time.round() as usize);
        // It's possible that `progress.round() == max_time.round()` but `progress < max_time`.
        // We only finalize if they are equal as floats.
        #[allow(clippy::float_cmp)]
        if current_time == *max_time {
            finalize_progress_bar();
        }
    }
}
