// src/notify.rs - Notification dispatch and SMTP delivery

use crate::alarm::Direction;
use crate::error::{AlarmError, Result};
use crate::resolve::EffectiveSettings;
use crate::snapshot::Snapshot;
use crate::template::{render, SpecialVars};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{debug, info, warn};

/// A committed state change, ready for notification. Ephemeral: built by
/// the engine on an edge, consumed immediately, then discarded with the
/// cycle's snapshot.
#[derive(Debug, Clone)]
pub struct TransitionEvent<'a> {
    /// Alarm name
    pub alarm: &'a str,
    /// Rule text
    pub rule: &'a str,
    /// Which way the state moved
    pub direction: Direction,
    /// The snapshot that triggered the transition
    pub snapshot: &'a Snapshot,
    /// Resolved text_set/text_clear label for this event
    pub state_text: &'a str,
}

/// One ready-to-send message.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// Apparent sender
    pub sender: String,
    /// Final recipient list, never empty
    pub recipients: Vec<String>,
    /// Rendered subject, prefix included
    pub subject: String,
    /// Rendered body, prefix included
    pub body: String,
}

/// Seam to the mail-sending capability. Production uses [`SmtpRelay`];
/// tests substitute a recording implementation.
pub trait MailTransport: Send + Sync {
    /// Deliver one message, synchronously. No retries are expected.
    fn send(&self, message: &OutboundMessage) -> Result<()>;
}

/// Blocking SMTP delivery through a relay host.
///
/// With no credentials configured this speaks plain SMTP to the relay,
/// the classic localhost-relay setup. When both user and password are
/// present it connects with TLS and authenticates.
pub struct SmtpRelay {
    host: String,
    port: Option<u16>,
    credentials: Option<Credentials>,
}

impl SmtpRelay {
    /// `server` is `host` or `host:port`.
    pub fn new(server: &str, user: Option<&str>, password: Option<&str>) -> Result<Self> {
        let (host, port) = match server.rsplit_once(':') {
            Some((h, p)) => {
                let port = p.parse::<u16>().map_err(|_| {
                    AlarmError::Config(format!("invalid relay port in '{}'", server))
                })?;
                (h.to_string(), Some(port))
            }
            None => (server.to_string(), None),
        };
        let credentials = match (user, password) {
            (Some(u), Some(p)) => Some(Credentials::new(u.to_string(), p.to_string())),
            _ => None,
        };
        Ok(Self {
            host,
            port,
            credentials,
        })
    }

    fn transport(&self) -> Result<SmtpTransport> {
        let mut builder = match &self.credentials {
            Some(creds) => SmtpTransport::relay(&self.host)
                .map_err(|e| AlarmError::Delivery(format!("invalid relay '{}': {}", self.host, e)))?
                .credentials(creds.clone()),
            None => SmtpTransport::builder_dangerous(&self.host),
        };
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        Ok(builder.build())
    }
}

impl MailTransport for SmtpRelay {
    fn send(&self, message: &OutboundMessage) -> Result<()> {
        let from: Mailbox = message
            .sender
            .parse()
            .map_err(|e| AlarmError::Delivery(format!("invalid sender '{}': {}", message.sender, e)))?;

        let mut builder = Message::builder().from(from).subject(&message.subject);
        for recipient in &message.recipients {
            let to: Mailbox = recipient.parse().map_err(|e| {
                AlarmError::Delivery(format!("invalid recipient '{}': {}", recipient, e))
            })?;
            builder = builder.to(to);
        }

        let email = builder
            .body(format!("{}\n", message.body))
            .map_err(|e| AlarmError::Delivery(format!("failed to build message: {}", e)))?;

        self.transport()?
            .send(&email)
            .map_err(|e| AlarmError::Delivery(format!("SMTP send failed: {}", e)))?;

        info!("sent: {}", message.subject);
        Ok(())
    }
}

/// Turns a transition event plus resolved settings into a final message
/// and hands it to the transport.
pub struct Dispatcher<'a> {
    sender: &'a str,
    transport: &'a dyn MailTransport,
}

impl<'a> Dispatcher<'a> {
    /// A dispatcher sending as `sender` through `transport`.
    pub fn new(sender: &'a str, transport: &'a dyn MailTransport) -> Self {
        Self { sender, transport }
    }

    /// Build and send the notification for one event. Returns whether a
    /// message went out; an empty recipient list is a quiet no-op.
    ///
    /// Rendering problems degrade the message but never drop it; the
    /// unresolved placeholders stay visible in the sent text.
    pub fn dispatch(&self, event: &TransitionEvent, settings: &EffectiveSettings) -> Result<bool> {
        if settings.recipients.is_empty() {
            debug!("[{}] no recipients, skipping notification", event.alarm);
            return Ok(false);
        }

        let special = SpecialVars {
            name: event.alarm,
            rule: event.rule,
            state: event.state_text,
            time: event.snapshot.format_time(),
        };

        // prefix and main part rendered independently, then concatenated
        let subject_prefix = render(&settings.subject_prefix, event.snapshot, &special);
        let subject = render(&settings.subject, event.snapshot, &special);
        let body_prefix = render(&settings.body_prefix, event.snapshot, &special);
        let body = render(&settings.body, event.snapshot, &special);

        for part in [&subject_prefix, &subject, &body_prefix, &body] {
            if !part.is_clean() {
                warn!(
                    "[{}] unresolved placeholders {:?}, sending degraded message",
                    event.alarm, part.unresolved
                );
            }
        }

        let message = OutboundMessage {
            sender: self.sender.to_string(),
            recipients: settings.recipients.clone(),
            subject: format!("{}{}", subject_prefix.text, subject.text),
            body: format!("{}{}", body_prefix.text, body.text),
        };

        self.transport.send(&message)?;
        Ok(true)
    }
}
