//! Moltbook relay: forwards `!prompt`-style channel messages to a posting API.
//!
//! The HTTP call runs as a detached task. Its only effect on the rest of the
//! system is the record it emits when it finishes.

use std::{
    path::Path,
    sync::{Arc, OnceLock},
};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    credentials::load_api_key,
    ports::{RecordSink, RelayPort},
    records::Record,
};

/// Community every relayed post lands in.
pub const RELAY_SUBMOLT: &str = "openclaws";

static TRIGGER_RE: OnceLock<Regex> = OnceLock::new();

fn trigger_re() -> &'static Regex {
    TRIGGER_RE.get_or_init(|| {
        Regex::new(r"^!(prompt|delegate|troubleshoot|feedback)\b").expect("valid regex")
    })
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RelayPost {
    pub submolt: String,
    pub title: String,
    pub content: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelayReceipt {
    pub success: bool,
    pub status: u16,
}

/// Keyword of a relay command (`"prompt"` for `"!prompt fix the build"`).
pub fn trigger_keyword(text: &str) -> Option<&str> {
    trigger_re()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

pub fn build_post(keyword: &str, nick: &str, text: &str, channel: &str) -> RelayPost {
    RelayPost {
        submolt: RELAY_SUBMOLT.to_string(),
        title: format!("{keyword}: {nick}"),
        content: format!("{text}\n\n_Relayed from IRC {channel}_"),
    }
}

/// The relay key, if the relay should run at all.
pub fn active_key(enabled: bool, api_key: Option<String>) -> Option<String> {
    if !enabled {
        return None;
    }
    api_key
}

/// Read the credentials once at startup, whether or not the relay is on, and
/// return the key only when the relay should use it.
pub fn startup_key(enabled: bool, credentials_path: Option<&Path>) -> Option<String> {
    let key = match credentials_path {
        Some(path) => load_api_key(path),
        None => {
            warn!("no credentials path (HOME unset), relay key unavailable");
            None
        }
    };
    let key = active_key(enabled, key);
    if enabled && key.is_none() {
        warn!("--relay-moltbook given but no api key, relay disabled");
    }
    key
}

#[derive(Clone)]
pub struct Relay {
    port: Arc<dyn RelayPort>,
    sink: Arc<dyn RecordSink>,
}

impl Relay {
    pub fn new(port: Arc<dyn RelayPort>, sink: Arc<dyn RecordSink>) -> Self {
        Self { port, sink }
    }

    /// Spawn a post for `text` if it is a relay command. Returns whether one was
    /// spawned. Must be called from within a tokio runtime.
    pub fn on_channel_message(&self, channel: &str, nick: &str, text: &str) -> bool {
        let Some(keyword) = trigger_keyword(text) else {
            return false;
        };
        let post = build_post(keyword, nick, text, channel);
        debug!("relaying {keyword} from {nick} in {channel}");

        let port = self.port.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let record = match port.post(&post).await {
                Ok(receipt) => Record::MoltbookRelay {
                    success: receipt.success,
                    status: receipt.status,
                },
                Err(e) => Record::MoltbookError {
                    error: e.to_string(),
                },
            };
            sink.emit(record);
        });
        true
    }
}
