use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Leading character of a channel name.
pub const CHANNEL_SIGIL: char = '#';

/// Monotonic id of a constructed session. Bumped on every replacement so
/// events from a superseded connection can be told apart.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

/// How a connection ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseKind {
    /// The server ended the stream (QUIT acknowledged, ERROR line, EOF).
    Clean,
    /// The transport failed (connect error, reset, ping timeout).
    Transport { reason: String },
}

/// Protocol-agnostic inbound events produced by a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    Registered,
    Joined {
        channel: String,
        nick: String,
    },
    Message {
        target: String,
        nick: String,
        text: String,
        received_at: DateTime<Utc>,
    },
    ProtocolError {
        message: String,
    },
    Closed(CloseKind),
}

/// An inbound event tagged with the session that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionEvent {
    pub generation: Generation,
    pub event: InboundEvent,
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

pub fn is_channel_name(target: &str) -> bool {
    target.starts_with(CHANNEL_SIGIL)
}
