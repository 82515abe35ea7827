//! IRC adapter (`irc` crate).
//!
//! This crate implements the `clawirc-core` SessionConnector over a real IRC
//! connection. Each session owns one background task that drives the client
//! stream and forwards translated events to the controller.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, OnceLock,
};

use anyhow::Context;
use chrono::Utc;
use futures::StreamExt;
use irc::client::prelude::{Client, Command, Config as IrcConfig, Message, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use clawirc_core::{
    config::Config,
    domain::{CloseKind, EventSender, Generation, InboundEvent, SessionEvent},
    errors::Error,
    ports::{IrcSession, SessionConnector},
    Result,
};

pub mod translate;

pub use translate::translate;

/// Library settings for one connection. Channels stay empty: the controller
/// joins them after registration.
pub fn irc_config(cfg: &Config) -> IrcConfig {
    IrcConfig {
        nickname: Some(cfg.nick.clone()),
        username: Some(cfg.nick.clone()),
        realname: Some(cfg.realname.clone()),
        server: Some(cfg.host.clone()),
        port: Some(cfg.port),
        use_tls: Some(cfg.use_tls()),
        channels: Vec::new(),
        ..IrcConfig::default()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IrcConnector;

impl IrcConnector {
    pub fn new() -> Self {
        Self
    }
}

impl SessionConnector for IrcConnector {
    fn connect(
        &self,
        cfg: &Config,
        generation: Generation,
        events: EventSender,
    ) -> Box<dyn IrcSession> {
        let link = Arc::new(Link::default());
        let irc_cfg = irc_config(cfg);
        let task = tokio::spawn(drive(irc_cfg, link.clone(), generation, events));
        Box::new(IrcSessionHandle { link, task })
    }
}

/// State shared between a session handle and its drive task.
#[derive(Default)]
struct Link {
    sender: OnceLock<Sender>,
    connected: AtomicBool,
}

pub struct IrcSessionHandle {
    link: Arc<Link>,
    task: JoinHandle<()>,
}

impl IrcSessionHandle {
    fn send(&self, command: Command) -> Result<()> {
        let sender = self.sender()?;
        sender
            .send(command)
            .map_err(|e| Error::Protocol(format!("send failed: {e}")))
    }

    fn sender(&self) -> Result<&Sender> {
        if !self.link.connected.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        self.link.sender.get().ok_or(Error::NotConnected)
    }
}

impl Drop for IrcSessionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl IrcSession for IrcSessionHandle {
    fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::SeqCst)
    }

    fn say(&self, target: &str, text: &str) -> Result<()> {
        self.send(Command::PRIVMSG(target.to_string(), text.to_string()))
    }

    fn join(&self, channel: &str) -> Result<()> {
        self.send(Command::JOIN(channel.to_string(), None, None))
    }

    fn part(&self, channel: &str, message: &str) -> Result<()> {
        self.send(Command::PART(channel.to_string(), Some(message.to_string())))
    }

    fn raw(&self, line: &str) -> Result<()> {
        let message: Message = line
            .parse()
            .map_err(|e| Error::Protocol(format!("unparseable raw line: {e}")))?;
        self.sender()?
            .send(message)
            .map_err(|e| Error::Protocol(format!("send failed: {e}")))
    }

    fn quit(&self, message: &str) -> Result<()> {
        self.send(Command::QUIT(Some(message.to_string())))
    }
}

async fn drive(irc_cfg: IrcConfig, link: Arc<Link>, generation: Generation, events: EventSender) {
    let result = run_connection(irc_cfg, &link, generation, &events).await;
    link.connected.store(false, Ordering::SeqCst);

    let kind = match result {
        Ok(()) => {
            info!("connection closed (session {:?})", generation);
            CloseKind::Clean
        }
        Err(e) => {
            warn!("connection failed (session {:?}): {e:#}", generation);
            CloseKind::Transport {
                reason: format!("{e:#}"),
            }
        }
    };
    let _ = events.send(SessionEvent {
        generation,
        event: InboundEvent::Closed(kind),
    });
}

async fn run_connection(
    irc_cfg: IrcConfig,
    link: &Link,
    generation: Generation,
    events: &EventSender,
) -> anyhow::Result<()> {
    let mut client = Client::from_config(irc_cfg)
        .await
        .context("connect to server")?;
    client.identify().context("send registration")?;
    let mut stream = client.stream().context("open message stream")?;
    let _ = link.sender.set(client.sender());

    while let Some(message) = stream.next().await.transpose().context("read from server")? {
        let Some(event) = translate(&message, Utc::now()) else {
            continue;
        };
        if matches!(event, InboundEvent::Registered) {
            link.connected.store(true, Ordering::SeqCst);
        }
        if events.send(SessionEvent { generation, event }).is_err() {
            debug!("controller gone, dropping session {:?}", generation);
            break;
        }
    }
    Ok(())
}
