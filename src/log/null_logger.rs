//! Without the `logging` feature no logger is installed; the settings only set the `log` crate's
//! maximum level so that disabled macros stay cheap.

use crate::log::LogSettings;

impl LogSettings {
    pub(in crate::log) fn apply(&mut self) {
        let max = self
            .module_levels()
            .into_values()
            .fold(self.level, Ord::max);
        log::set_max_level(max);
    }
}
