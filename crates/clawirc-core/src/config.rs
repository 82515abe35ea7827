use std::{env, path::PathBuf, time::Duration};

use clap::Parser;

use crate::{
    credentials::default_credentials_path,
    errors::Error,
    reconnect::{ReconnectPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS},
    records::ReadyConfig,
    Result,
};

/// Conventional IRC-over-TLS port. Connecting to it implies TLS.
pub const SECURE_PORT: u16 = 6697;

pub const DEFAULT_REALNAME: &str = "OpenClaw AI Agent https://openclaw.ai";
pub const DEFAULT_QUIT_MESSAGE: &str = "OpenClaw signing off 👁️";
pub const DEFAULT_PART_MESSAGE: &str = "Leaving";

/// Command-line surface. Every flag is optional.
#[derive(Parser, Debug, Clone)]
#[command(name = "clawirc")]
#[command(about = "IRC session manager driven by JSON lines on stdin")]
#[command(version)]
pub struct Args {
    /// Server host
    #[arg(long, env = "CLAWIRC_SERVER", default_value = "irc.libera.chat")]
    pub server: String,

    /// Server port (6697 implies TLS)
    #[arg(
        long,
        env = "CLAWIRC_PORT",
        default_value_t = SECURE_PORT,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub port: u16,

    /// Force TLS regardless of port
    #[arg(long)]
    pub secure: bool,

    /// Nickname (also used as username)
    #[arg(long, env = "CLAWIRC_NICK", default_value = "OpenClawBot")]
    pub nick: String,

    /// Comma-separated channels to join after registration
    #[arg(long, env = "CLAWIRC_CHANNELS", default_value = "#openclaw")]
    pub channels: String,

    /// Forward !prompt/!delegate/!troubleshoot/!feedback messages to Moltbook
    #[arg(long = "relay-moltbook")]
    pub relay_moltbook: bool,

    /// Real name sent at registration
    #[arg(long, default_value = DEFAULT_REALNAME)]
    pub realname: String,

    /// Base reconnect delay; attempt n waits n times this
    #[arg(long, default_value_t = DEFAULT_BASE_DELAY.as_millis() as u64)]
    pub reconnect_delay_ms: u64,

    /// Consecutive failed reconnects before giving up
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_reconnect_attempts: u32,

    /// Moltbook credentials file (default: ~/.config/moltbook/credentials.json)
    #[arg(long, env = "MOLTBOOK_CREDENTIALS")]
    pub credentials: Option<PathBuf>,
}

/// Immutable session configuration, fixed at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub nick: String,
    pub realname: String,
    /// Ordered; duplicates are kept. Never empty.
    pub channels: Vec<String>,
    /// Explicit `--secure`. See [`Config::use_tls`].
    pub secure: bool,
    pub relay_enabled: bool,

    pub reconnect: ReconnectPolicy,
    pub credentials_path: Option<PathBuf>,

    pub quit_message: String,
    pub part_message: String,
    /// Delay between a quit command and process exit.
    pub quit_grace: Duration,
    /// Delay between a termination signal and process exit.
    pub signal_grace: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self> {
        let channels = parse_channels(&args.channels);
        if channels.is_empty() {
            return Err(Error::Config(
                "at least one channel is required (--channels)".to_string(),
            ));
        }
        if args.port == 0 {
            return Err(Error::Config("port must be positive".to_string()));
        }
        if args.nick.trim().is_empty() {
            return Err(Error::Config("nickname must not be empty".to_string()));
        }

        let credentials_path = args.credentials.or_else(default_credentials_path);

        Ok(Self {
            host: args.server,
            port: args.port,
            nick: args.nick,
            realname: args.realname,
            channels,
            secure: args.secure,
            relay_enabled: args.relay_moltbook,
            reconnect: ReconnectPolicy {
                base_delay: Duration::from_millis(args.reconnect_delay_ms),
                max_attempts: args.max_reconnect_attempts,
            },
            credentials_path,
            quit_message: DEFAULT_QUIT_MESSAGE.to_string(),
            part_message: DEFAULT_PART_MESSAGE.to_string(),
            quit_grace: Duration::from_millis(1_000),
            signal_grace: Duration::from_millis(2_000),
        })
    }

    pub fn use_tls(&self) -> bool {
        self.secure || self.port == SECURE_PORT
    }

    /// Target of a `say` without an explicit one.
    pub fn default_target(&self) -> &str {
        // `from_args` guarantees at least one channel.
        self.channels.first().map(String::as_str).unwrap_or_default()
    }

    pub fn ready_summary(&self) -> ReadyConfig {
        ReadyConfig {
            host: self.host.clone(),
            port: self.port,
            nick: self.nick.clone(),
            channels: self.channels.clone(),
            relay_moltbook: self.relay_enabled,
            secure: self.use_tls(),
        }
    }
}

fn parse_channels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

pub(crate) fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}

#[cfg(test)]
pub(crate) fn test_config(channels: &[&str]) -> Config {
    let joined = channels.join(",");
    let args = Args::try_parse_from([
        "clawirc",
        "--server",
        "irc.example.net",
        "--nick",
        "TestBot",
        "--channels",
        joined.as_str(),
        "--credentials",
        "/nonexistent/credentials.json",
    ])
    .unwrap();
    Config::from_args(args).unwrap()
}
