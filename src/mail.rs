use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Message priority understood by the host's messaging layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MailPriority {
    Normal,
    High,
}

/// A message handed to the host messaging collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub priority: MailPriority,
}

impl MailMessage {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            priority: MailPriority::Normal,
        }
    }
}

/// Narrow capability for broadcasting messages to users. The real delivery
/// mechanism belongs to the host; components receive an implementation at
/// construction.
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, message: MailMessage) -> anyhow::Result<()>;
}

/// In-memory `Broadcaster` that records every message. Used as the default
/// host stub and as a test double.
#[derive(Default)]
pub struct MailBuffer {
    messages: Mutex<Vec<MailMessage>>,
}

impl MailBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<MailMessage> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

impl Broadcaster for MailBuffer {
    fn broadcast(&self, message: MailMessage) -> anyhow::Result<()> {
        info!(
            "Broadcasting message from {} to {}: {}",
            message.from, message.to, message.subject
        );
        self.messages.lock().push(message);
        Ok(())
    }
}
