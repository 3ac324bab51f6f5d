// src/alarm.rs - Per-alarm state machine with edge detection

use crate::config::{AlarmDefinition, TransitionOverride};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Lifecycle state of one alarm.
///
/// `Unknown` exists only before the first successful evaluation; once
/// left it is never re-entered. Alarm state is not persisted, so a
/// process restart starts every alarm back at `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmState {
    /// Not yet evaluated
    Unknown,
    /// Rule last evaluated false
    Clear,
    /// Rule last evaluated true
    Set,
}

/// Direction of a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// false-to-true
    ToSet,
    /// true-to-false
    ToClear,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ToSet => write!(f, "to_set"),
            Direction::ToClear => write!(f, "to_clear"),
        }
    }
}

/// An edge produced by [`Alarm::observe`]. `first` marks the
/// UNKNOWN-to-state observation at startup, which is subject to the
/// first-run notification policy rather than unconditional dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Which way the state moved
    pub direction: Direction,
    /// True for the UNKNOWN-to-state observation
    pub first: bool,
}

/// One configured alarm: its definition plus runtime state.
#[derive(Debug)]
pub struct Alarm {
    def: AlarmDefinition,
    state: AlarmState,
    last_evaluated: Option<DateTime<Utc>>,
}

impl Alarm {
    /// Build an alarm from its definition, rejecting structurally
    /// invalid ones (no name, no rule).
    pub fn new(def: AlarmDefinition) -> Result<Self> {
        def.validate()?;
        Ok(Self {
            def,
            state: AlarmState::Unknown,
            last_evaluated: None,
        })
    }

    /// User-facing alarm name.
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Rule expression text.
    pub fn rule(&self) -> &str {
        &self.def.rule
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AlarmState {
        self.state
    }

    /// Timestamp of the last snapshot this alarm was evaluated against,
    /// successful or not. Diagnostics only.
    pub fn last_evaluated(&self) -> Option<DateTime<Utc>> {
        self.last_evaluated
    }

    /// The configured override block for a direction, if any. A missing
    /// block means "no notification in that direction".
    pub fn override_for(&self, direction: Direction) -> Option<&TransitionOverride> {
        match direction {
            Direction::ToSet => self.def.on_set.as_ref(),
            Direction::ToClear => self.def.on_clear.as_ref(),
        }
    }

    /// Record that evaluation was attempted against a snapshot stamped
    /// `at`, without changing state. Used on rule failure.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.last_evaluated = Some(at);
    }

    /// Apply one evaluation result. Returns the edge, if any.
    ///
    /// Staying in the same state is always a no-op, no matter how many
    /// cycles pass; this is what re-arms the alarm after it clears.
    pub fn observe(&mut self, result: bool, at: DateTime<Utc>) -> Option<Transition> {
        self.last_evaluated = Some(at);

        let new_state = if result {
            AlarmState::Set
        } else {
            AlarmState::Clear
        };
        let direction = if result {
            Direction::ToSet
        } else {
            Direction::ToClear
        };

        match self.state {
            AlarmState::Unknown => {
                self.state = new_state;
                Some(Transition {
                    direction,
                    first: true,
                })
            }
            current if current == new_state => None,
            _ => {
                self.state = new_state;
                Some(Transition {
                    direction,
                    first: false,
                })
            }
        }
    }
}
