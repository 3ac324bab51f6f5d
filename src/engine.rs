// src/engine.rs - One-cycle orchestration across all configured alarms

use crate::alarm::{Alarm, AlarmState};
use crate::config::Config;
use crate::error::{AlarmError, Result};
use crate::notify::{Dispatcher, MailTransport, SmtpRelay, TransitionEvent};
use crate::resolve::EffectiveSettings;
use crate::snapshot::Snapshot;
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Cumulative counters since engine construction.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EngineStats {
    /// Snapshots processed
    pub cycles: u64,
    /// Successful rule evaluations
    pub evaluations: u64,
    /// Failed rule evaluations (state untouched)
    pub eval_failures: u64,
    /// Messages accepted by the transport
    pub notifications_sent: u64,
    /// Messages the transport rejected
    pub delivery_failures: u64,
}

/// What one call to [`Engine::process`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Alarms whose rule evaluated successfully
    pub evaluated: usize,
    /// Alarms whose rule failed (state untouched)
    pub failures: usize,
    /// Messages handed to the transport
    pub notifications: usize,
}

/// The alarm evaluation engine.
///
/// Owns every alarm's runtime state for the life of the process. The
/// host drives it synchronously: one snapshot in, all alarms assessed to
/// completion, control returned. Multiple engines never share state, so
/// independent instances (e.g. in tests) cannot interfere.
pub struct Engine {
    config: Config,
    alarms: Vec<Alarm>,
    transport: Box<dyn MailTransport>,
    stats: EngineStats,
}

impl Engine {
    /// Build an engine over an explicit transport.
    ///
    /// Structurally invalid alarm definitions are skipped with a warning;
    /// one bad definition never blocks the rest. An empty registration is
    /// a configuration error: an engine with nothing to assess is a
    /// misconfiguration, not a quiet success.
    pub fn new(mut config: Config, transport: Box<dyn MailTransport>) -> Result<Self> {
        config.validate()?;

        let defs = std::mem::take(&mut config.alarms);
        let total = defs.len();
        let mut alarms = Vec::with_capacity(total);
        for def in defs {
            match Alarm::new(def) {
                Ok(alarm) => {
                    debug!("registered alarm '{}' rule='{}'", alarm.name(), alarm.rule());
                    alarms.push(alarm);
                }
                Err(e) => warn!("skipping alarm: {}", e),
            }
        }

        if alarms.is_empty() {
            return Err(AlarmError::Config("no valid alarms configured".into()));
        }

        info!(
            "engine started: {} alarms, {} skipped",
            alarms.len(),
            total - alarms.len()
        );

        Ok(Self {
            config,
            alarms,
            transport,
            stats: EngineStats::default(),
        })
    }

    /// Build an engine that delivers through the SMTP relay named in the
    /// configuration.
    pub fn with_smtp(config: Config) -> Result<Self> {
        let relay = SmtpRelay::new(
            &config.server,
            config.user.as_deref(),
            config.password.as_deref(),
        )?;
        Self::new(config, Box::new(relay))
    }

    /// Assess every alarm against one snapshot.
    ///
    /// Each alarm is isolated: a rule failure leaves its state untouched
    /// and moves on, and a delivery failure never rolls back the state
    /// change already committed.
    pub fn process(&mut self, snapshot: &Snapshot) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();
        let dispatcher = Dispatcher::new(&self.config.sender, self.transport.as_ref());
        let at = snapshot.timestamp();

        for alarm in &mut self.alarms {
            let result = match crate::rule::evaluate(alarm.rule(), snapshot) {
                Ok(r) => r,
                Err(e) => {
                    warn!("[{}] {}", alarm.name(), e);
                    alarm.touch(at);
                    outcome.failures += 1;
                    self.stats.eval_failures += 1;
                    continue;
                }
            };
            outcome.evaluated += 1;
            self.stats.evaluations += 1;

            let Some(transition) = alarm.observe(result, at) else {
                continue;
            };
            debug!(
                "[{}] transition {} (first: {})",
                alarm.name(),
                transition.direction,
                transition.first
            );

            // no block configured for this direction: state changes, no action
            let Some(block) = alarm.override_for(transition.direction) else {
                continue;
            };

            let settings = EffectiveSettings::resolve(&self.config, Some(block), transition.direction);
            if transition.first && settings.suppress_first {
                debug!("[{}] first-run notification suppressed", alarm.name());
                continue;
            }

            let event = TransitionEvent {
                alarm: alarm.name(),
                rule: alarm.rule(),
                direction: transition.direction,
                snapshot,
                state_text: settings.state_text(transition.direction),
            };
            match dispatcher.dispatch(&event, &settings) {
                Ok(true) => {
                    outcome.notifications += 1;
                    self.stats.notifications_sent += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    error!("[{}] {}", alarm.name(), e);
                    self.stats.delivery_failures += 1;
                }
            }
        }

        self.stats.cycles += 1;
        outcome
    }

    /// Number of registered alarms.
    pub fn alarm_count(&self) -> usize {
        self.alarms.len()
    }

    /// Current state of every alarm, for diagnostics.
    pub fn alarm_states(&self) -> Vec<(&str, AlarmState)> {
        self.alarms.iter().map(|a| (a.name(), a.state())).collect()
    }

    /// Cumulative counters since construction.
    pub fn stats(&self) -> EngineStats {
        self.stats
    }
}
