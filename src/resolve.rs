// src/resolve.rs - Override resolution: transition block over global defaults

use crate::alarm::Direction;
use crate::config::{Config, FirstState, TransitionOverride};

/// The fully resolved settings used to build one notification.
///
/// Resolution is a flat two-level lookup: the transition block for the
/// event's direction when the field is present there, else the global
/// default. Recipient lists replace wholesale, never merge.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveSettings {
    /// Final recipient list; empty means no message goes out
    pub recipients: Vec<String>,
    /// `{_STATE}` label for SET
    pub text_set: String,
    /// `{_STATE}` label for CLEAR
    pub text_clear: String,
    /// Whether the first-run notification is suppressed for this direction
    pub suppress_first: bool,
    /// Subject format string
    pub subject: String,
    /// Prefix prepended to the rendered subject
    pub subject_prefix: String,
    /// Body format string
    pub body: String,
    /// Prefix prepended to the rendered body
    pub body_prefix: String,
}

impl EffectiveSettings {
    /// Resolve settings for one transition.
    ///
    /// `suppress_first`, when not set in the block, derives from the
    /// global `notify_first` policy: a direction absent from that list
    /// is suppressed on first observation.
    pub fn resolve(
        global: &Config,
        block: Option<&TransitionOverride>,
        direction: Direction,
    ) -> Self {
        let first_state = match direction {
            Direction::ToSet => FirstState::Set,
            Direction::ToClear => FirstState::Clear,
        };
        let default_suppress = !global.notify_first.contains(&first_state);

        let Some(block) = block else {
            return Self {
                recipients: global.recipients.clone(),
                text_set: global.text_set.clone(),
                text_clear: global.text_clear.clone(),
                suppress_first: default_suppress,
                subject: global.subject.clone(),
                subject_prefix: global.subject_prefix.clone(),
                body: global.body.clone(),
                body_prefix: global.body_prefix.clone(),
            };
        };

        Self {
            recipients: block
                .recipients
                .clone()
                .unwrap_or_else(|| global.recipients.clone()),
            text_set: block
                .text_set
                .clone()
                .unwrap_or_else(|| global.text_set.clone()),
            text_clear: block
                .text_clear
                .clone()
                .unwrap_or_else(|| global.text_clear.clone()),
            suppress_first: block.suppress_first.unwrap_or(default_suppress),
            subject: block
                .subject
                .clone()
                .unwrap_or_else(|| global.subject.clone()),
            subject_prefix: block
                .subject_prefix
                .clone()
                .unwrap_or_else(|| global.subject_prefix.clone()),
            body: block.body.clone().unwrap_or_else(|| global.body.clone()),
            body_prefix: block
                .body_prefix
                .clone()
                .unwrap_or_else(|| global.body_prefix.clone()),
        }
    }

    /// The `{_STATE}` label for the given direction.
    pub fn state_text(&self, direction: Direction) -> &str {
        match direction {
            Direction::ToSet => &self.text_set,
            Direction::ToClear => &self.text_clear,
        }
    }
}
