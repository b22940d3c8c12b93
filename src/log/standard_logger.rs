use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::encode::Encode;
use log4rs::Config;

#[cfg(feature = "progress_bar")]
use super::progress_bar_encoder::PBWrapperEncoder;
use crate::log::LogSettings;

const APPENDER: &str = "stderr";

// UTC timestamp, colored level, module path
const LOG_PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%SZ)} {h({l})} {t} - {m}{n}";

impl LogSettings {
    /// Installs a log4rs configuration matching these settings. Output goes to stderr so that
    /// stdout holds only run summaries.
    pub(in crate::log) fn apply(&mut self) {
        let encoder: Box<dyn Encode> = Box::new(PatternEncoder::new(LOG_PATTERN));
        #[cfg(feature = "progress_bar")]
        let encoder: Box<dyn Encode> = Box::new(PBWrapperEncoder::new(encoder));
        let stderr = ConsoleAppender::builder()
            .target(Target::Stderr)
            .encoder(encoder)
            .build();

        let loggers = self
            .module_levels()
            .into_iter()
            .map(|(module, level)| Logger::builder().build(module, level));
        let config = Config::builder()
            .appender(Appender::builder().build(APPENDER, Box::new(stderr)))
            .loggers(loggers)
            .build(Root::builder().appender(APPENDER).build(self.level));
        let config = match config {
            Ok(config) => config,
            Err(e) => panic!("failed to build log config: {e}"),
        };

        match &self.handle {
            Some(handle) => handle.set_config(config),
            None => match log4rs::init_config(config) {
                Ok(handle) => self.handle = Some(handle),
                // Some other logger owns the process
                Err(_) => log::set_max_level(self.level),
            },
        }
    }
}
