// src/config.rs - Configuration structures for the alarm engine

use crate::error::{AlarmError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// MAIN CONFIGURATION
// ============================================================================

/// Top level alarm engine configuration.
///
/// Global fields supply the defaults that every alarm's transition blocks
/// fall back to; see [`TransitionOverride`] for the per-transition layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Unit system the host converts snapshots into before delivery
    #[serde(default)]
    pub unit_system: UnitSystem,

    /// Mail relay as host or host:port
    #[serde(default = "default_server")]
    pub server: String,

    /// Relay username; credentials are used only when both user and
    /// password are present
    #[serde(default)]
    pub user: Option<String>,

    /// Relay password
    #[serde(default)]
    pub password: Option<String>,

    /// Apparent sender of notification messages
    pub sender: String,

    /// Default notification recipients
    #[serde(default)]
    pub recipients: Vec<String>,

    /// Display value for the SET state
    #[serde(default = "default_text_set")]
    pub text_set: String,

    /// Display value for the CLEAR state
    #[serde(default = "default_text_clear")]
    pub text_clear: String,

    /// States whose very first observation after startup is notified
    #[serde(default)]
    pub notify_first: Vec<FirstState>,

    /// Default subject format string
    #[serde(default = "default_subject")]
    pub subject: String,

    /// Default prefix to all subject lines
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,

    /// Default body format string
    #[serde(default)]
    pub body: String,

    /// Default prefix to all bodies
    #[serde(default = "default_body_prefix")]
    pub body_prefix: String,

    /// Alarm definitions
    #[serde(default)]
    pub alarms: Vec<AlarmDefinition>,
}

/// Unit system the host's snapshot adapter normalizes into. The engine
/// never converts values itself; this setting is carried so the host and
/// the operator agree on what the numbers in a notification mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UnitSystem {
    /// US customary units
    #[serde(rename = "US")]
    Us,
    /// Metric units
    #[default]
    #[serde(rename = "METRIC")]
    Metric,
    /// Metric with weather conventions (mm rain, m/s wind)
    #[serde(rename = "METRICWX")]
    MetricWx,
}

/// A state name usable in `notify_first`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirstState {
    /// Notify when the first observed state is SET
    Set,
    /// Notify when the first observed state is CLEAR
    Clear,
}

// ============================================================================
// ALARM DEFINITIONS
// ============================================================================

/// One named rule plus its notification configuration.
///
/// A direction with no transition block configured still changes state
/// but sends nothing in that direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmDefinition {
    /// Unique user-facing name, available to templates as `{_NAME}`
    pub name: String,

    /// Rule expression, evaluated against each snapshot
    #[serde(default)]
    pub rule: String,

    /// Overrides applied on the false-to-true transition
    #[serde(default)]
    pub on_set: Option<TransitionOverride>,

    /// Overrides applied on the true-to-false transition
    #[serde(default)]
    pub on_clear: Option<TransitionOverride>,
}

/// Per-transition overrides. Every field is optional; anything omitted
/// falls through to the global default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionOverride {
    /// Replaces (never merges with) the global recipient list
    #[serde(default)]
    pub recipients: Option<Vec<String>>,

    /// Display value for the SET state
    #[serde(default)]
    pub text_set: Option<String>,

    /// Display value for the CLEAR state
    #[serde(default)]
    pub text_clear: Option<String>,

    /// Suppress the first-run notification for this direction. When
    /// absent, derived from the global `notify_first` policy.
    #[serde(default)]
    pub suppress_first: Option<bool>,

    /// Subject format string
    #[serde(default)]
    pub subject: Option<String>,

    /// Prefix to the subject line
    #[serde(default)]
    pub subject_prefix: Option<String>,

    /// Body format string
    #[serde(default)]
    pub body: Option<String>,

    /// Prefix to the body
    #[serde(default)]
    pub body_prefix: Option<String>,
}

// ============================================================================
// DEFAULTS
// ============================================================================

fn default_server() -> String {
    "localhost".to_string()
}

fn default_text_set() -> String {
    "SET".to_string()
}

fn default_text_clear() -> String {
    "CLR".to_string()
}

fn default_subject() -> String {
    "{_NAME}".to_string()
}

fn default_subject_prefix() -> String {
    "Alarm [{_STATE}] ".to_string()
}

fn default_body_prefix() -> String {
    "Alarm:\t{_NAME}\nState:\t{_STATE}\nRule:\t{_RULE}\nTime:\t{_TIME}\n".to_string()
}

// ============================================================================
// LOADING AND VALIDATION
// ============================================================================

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check global invariants. Per-alarm problems are not fatal here;
    /// the engine reports and skips bad definitions at registration.
    pub fn validate(&self) -> Result<()> {
        if self.sender.trim().is_empty() {
            return Err(AlarmError::Config("sender must not be empty".into()));
        }
        if self.server.trim().is_empty() {
            return Err(AlarmError::Config("server must not be empty".into()));
        }
        Ok(())
    }
}

impl AlarmDefinition {
    /// Structural check for one alarm definition.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AlarmError::Config("alarm name must not be empty".into()));
        }
        if self.rule.trim().is_empty() {
            return Err(AlarmError::Config(format!(
                "alarm '{}' has no rule",
                self.name
            )));
        }
        Ok(())
    }
}
