use async_trait::async_trait;

use crate::{
    config::Config,
    domain::{EventSender, Generation},
    records::Record,
    relay::{RelayPost, RelayReceipt},
    Result,
};

/// Outbound surface of one live IRC connection.
///
/// Sends are non-blocking: implementations queue the line on the connection
/// and return. A handle whose connection is gone returns `Error::NotConnected`.
pub trait IrcSession: Send + Sync {
    fn is_connected(&self) -> bool;

    fn say(&self, target: &str, text: &str) -> Result<()>;
    fn join(&self, channel: &str) -> Result<()>;
    fn part(&self, channel: &str, message: &str) -> Result<()>;
    fn raw(&self, line: &str) -> Result<()>;
    fn quit(&self, message: &str) -> Result<()>;
}

/// Builds sessions.
///
/// `connect` must return immediately; the connection is driven in the
/// background and reports through `events`, every event tagged with
/// `generation`. Each session reports exactly one `Closed` event. Library-level
/// automatic reconnection must stay disabled: retry policy belongs to the
/// controller.
pub trait SessionConnector: Send + Sync {
    fn connect(
        &self,
        cfg: &Config,
        generation: Generation,
        events: EventSender,
    ) -> Box<dyn IrcSession>;
}

/// External posting service for relayed messages.
#[async_trait]
pub trait RelayPort: Send + Sync {
    async fn post(&self, post: &RelayPost) -> Result<RelayReceipt>;
}

/// Destination of the structured record stream.
pub trait RecordSink: Send + Sync {
    fn emit(&self, record: Record);
}
