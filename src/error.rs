use thiserror::Error;

/// Application level error type used throughout the crate.
#[derive(Error, Debug)]
pub enum AlarmError {
    /// I/O related failure
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error while parsing YAML configuration files
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Rule expression failed to parse or evaluate
    #[error("rule '{rule}': {reason}")]
    Eval { rule: String, reason: String },

    /// Outbound message could not be delivered
    #[error("Delivery error: {0}")]
    Delivery(String),
}

impl AlarmError {
    pub(crate) fn eval(rule: &str, reason: impl Into<String>) -> Self {
        AlarmError::Eval {
            rule: rule.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenient alias over [`Result`] using [`AlarmError`]
pub type Result<T> = std::result::Result<T, AlarmError>;
