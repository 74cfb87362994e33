//! Subscription options and identifiers.

use crate::types::{Message, Sequence};
use std::fmt;
use std::sync::Arc;

/// Callback invoked once per delivered message, one message at a time.
pub type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

/// Unique identifier for a subscription within a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Where a new (non-resumed) subscription starts reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StartPosition {
    /// Replay all retained history, then stream live messages.
    #[default]
    AllAvailable,
    /// Only messages published after the subscription is created.
    NewOnly,
    /// Start at the given sequence (inclusive).
    AtSequence(Sequence),
}

/// Options for [`Transport::subscribe`](super::Transport::subscribe).
#[derive(Clone, Debug, Default)]
pub struct SubscribeOptions {
    /// Starting point when no durable position exists.
    pub start: StartPosition,

    /// Durable consumer name. When set, the transport remembers the last
    /// acknowledged message across close/subscribe cycles.
    pub durable_name: Option<String>,
}

impl SubscribeOptions {
    /// Replay everything retained, then go live.
    pub fn deliver_all_available() -> Self {
        Self {
            start: StartPosition::AllAvailable,
            durable_name: None,
        }
    }

    /// Register the subscription under a durable name.
    pub fn durable(mut self, name: impl Into<String>) -> Self {
        self.durable_name = Some(name.into());
        self
    }
}
