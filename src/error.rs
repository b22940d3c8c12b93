use std::fmt::{self, Display};
use std::io;

/// Provides `BranchingError` and maps to other errors to
/// convert to a `BranchingError`
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum BranchingError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CsvError(csv::Error),
    /// A parameter value is out of range or inconsistent with another.
    ConfigError(String),
    /// The locale network cannot be built as configured.
    NetworkError(String),
    ReportError(String),
}

impl From<io::Error> for BranchingError {
    fn from(error: io::Error) -> Self {
        BranchingError::IoError(error)
    }
}

impl From<serde_json::Error> for BranchingError {
    fn from(error: serde_json::Error) -> Self {
        BranchingError::JsonError(error)
    }
}

impl From<csv::Error> for BranchingError {
    fn from(error: csv::Error) -> Self {
        BranchingError::CsvError(error)
    }
}

impl From<String> for BranchingError {
    fn from(error: String) -> Self {
        BranchingError::ConfigError(error)
    }
}

impl From<&str> for BranchingError {
    fn from(error: &str) -> Self {
        BranchingError::ConfigError(error.to_string())
    }
}

impl std::error::Error for BranchingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BranchingError::IoError(error) => Some(error),
            BranchingError::JsonError(error) => Some(error),
            BranchingError::CsvError(error) => Some(error),
            _ => None,
        }
    }
}

impl Display for BranchingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BranchingError::IoError(error) => write!(f, "I/O error: {error}"),
            BranchingError::JsonError(error) => write!(f, "invalid JSON: {error}"),
            BranchingError::CsvError(error) => write!(f, "CSV error: {error}"),
            BranchingError::ConfigError(message) => write!(f, "invalid configuration: {message}"),
            BranchingError::NetworkError(message) => write!(f, "network error: {message}"),
            BranchingError::ReportError(message) => write!(f, "report error: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_conversions_are_config_errors() {
        let error: BranchingError = "bad value".into();
        assert!(matches!(error, BranchingError::ConfigError(ref m) if m == "bad value"));
        assert_eq!(error.to_string(), "invalid configuration: bad value");
    }

    #[test]
    fn io_errors_keep_their_source() {
        let error: BranchingError = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        assert!(std::error::Error::source(&error).is_some());
        assert!(error.to_string().contains("missing"));
    }
}
