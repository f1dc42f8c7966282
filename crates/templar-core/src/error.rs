//! Error type shared by the builder, the matcher and the experiment driver.

/// Errors raised by profiling, matching and experiment orchestration.
///
/// Every variant is a caller-side contract violation. Nothing here is retried
/// and no partial result accompanies an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplarError {
    /// Non-positive trace count or trace length, empty hypothesis space, or an
    /// otherwise unusable configuration value.
    InvalidConfiguration(String),
    /// A trace (or trace set) whose shape disagrees with what was expected.
    InvalidInput {
        /// What went wrong, e.g. `"trace length"`.
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// The matcher was handed a store with no templates.
    EmptyTemplateStore,
    /// Reading or writing a config/report file failed.
    Io(String),
    /// A config/report file was not valid JSON for the expected type.
    Json(String),
}

impl TemplarError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub(crate) fn length(expected: usize, actual: usize) -> Self {
        Self::InvalidInput {
            what: "trace length",
            expected,
            actual,
        }
    }
}

impl std::fmt::Display for TemplarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfiguration(msg) => write!(f, "invalid configuration: {msg}"),
            Self::InvalidInput {
                what,
                expected,
                actual,
            } => write!(f, "invalid input: {what} is {actual}, expected {expected}"),
            Self::EmptyTemplateStore => write!(f, "template store is empty"),
            Self::Io(msg) => write!(f, "i/o error: {msg}"),
            Self::Json(msg) => write!(f, "json error: {msg}"),
        }
    }
}

impl std::error::Error for TemplarError {}

impl From<std::io::Error> for TemplarError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for TemplarError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TemplarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            TemplarError::config("num_samples must be >= 1").to_string(),
            "invalid configuration: num_samples must be >= 1"
        );
        assert_eq!(
            TemplarError::length(2, 3).to_string(),
            "invalid input: trace length is 3, expected 2"
        );
        assert_eq!(
            TemplarError::EmptyTemplateStore.to_string(),
            "template store is empty"
        );
    }

    #[test]
    fn io_error_converts() {
        let e: TemplarError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(e, TemplarError::Io(ref m) if m.contains("gone")));
    }
}
