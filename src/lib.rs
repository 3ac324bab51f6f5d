//! VIGIL - edge-triggered condition monitoring and alert notification
//!
//! An alarm evaluation engine: user-defined boolean rules are assessed
//! against a periodic stream of measurement snapshots, and notifications
//! go out exactly on state transitions (becoming true, or becoming
//! false again). Remaining in a state never re-fires, which is what keeps
//! a persistent condition from turning into a notification storm.
//!
//! The host supplies a unit-normalized [`Snapshot`] once per report
//! cycle and drives [`Engine::process`] synchronously. Rule evaluation,
//! edge detection, override resolution, template rendering, and dispatch
//! all happen inside that call.
//!
//! # Examples
//!
//! ```rust,no_run
//! use vigil::{Config, Engine, Snapshot};
//! use chrono::Utc;
//!
//! let config = Config::from_file("alarms.yaml")?;
//! let mut engine = Engine::with_smtp(config)?;
//!
//! // host report loop, once per cycle:
//! let mut snapshot = Snapshot::new(Utc::now());
//! snapshot.set("outTemp", 31.2);
//! let outcome = engine.process(&snapshot);
//! println!("{} notifications", outcome.notifications);
//! # Ok::<(), vigil::AlarmError>(())
//! ```

#![warn(missing_docs)]

/// Error handling with structured error types
pub mod error;

/// Scalar value type for snapshot fields
pub mod value;

/// Per-cycle observation map plus timestamp
pub mod snapshot;

/// Allow-listed rule expression evaluator
pub mod rule;

/// Configuration structures with YAML support and validation
pub mod config;

/// Override resolution: transition block over global defaults
pub mod resolve;

/// Placeholder substitution for subjects and bodies
pub mod template;

/// Per-alarm state machine with edge detection
pub mod alarm;

/// Notification dispatch and SMTP delivery
pub mod notify;

/// One-cycle orchestration across all configured alarms
pub mod engine;

pub use alarm::{Alarm, AlarmState, Direction, Transition};
pub use config::{AlarmDefinition, Config, FirstState, TransitionOverride, UnitSystem};
pub use engine::{CycleOutcome, Engine, EngineStats};
pub use error::{AlarmError, Result};
pub use notify::{Dispatcher, MailTransport, OutboundMessage, SmtpRelay, TransitionEvent};
pub use resolve::EffectiveSettings;
pub use snapshot::Snapshot;
pub use template::{render, Rendered, SpecialVars};
pub use value::Value;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
