//! Stdin command protocol.
//!
//! One JSON object per line with an `action` discriminator. Lines that are not
//! JSON objects are dropped without output; objects with an unrecognized or
//! ill-typed action are echoed back as `unknown-cmd`.

use std::{sync::Arc, time::Duration};

use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    config::Config,
    ports::{IrcSession, RecordSink},
    records::Record,
    session::SessionHolder,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    Say {
        target: Option<String>,
        msg: Option<String>,
    },
    Join {
        channel: Option<String>,
    },
    Part {
        channel: Option<String>,
        msg: Option<String>,
    },
    Quit {
        msg: Option<String>,
    },
    Raw {
        data: Option<String>,
    },
    Status,
    Unknown(Value),
}

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum Action {
    Say {
        target: Option<String>,
        msg: Option<String>,
    },
    Join {
        channel: Option<String>,
    },
    Part {
        channel: Option<String>,
        msg: Option<String>,
    },
    Quit {
        msg: Option<String>,
    },
    Raw {
        data: Option<String>,
    },
    Status,
}

/// Parse one input line. `None` means the line is discarded silently.
pub fn parse_command(line: &str) -> Option<ControlCommand> {
    let value: Value = serde_json::from_str(line.trim()).ok()?;
    if !value.is_object() {
        return None;
    }

    let action = match serde_json::from_value::<Action>(value.clone()) {
        Ok(a) => a,
        Err(_) => return Some(ControlCommand::Unknown(value)),
    };

    // Empty strings count as absent.
    let present = |v: Option<String>| v.filter(|s| !s.is_empty());

    Some(match action {
        Action::Say { target, msg } => ControlCommand::Say {
            target: present(target),
            msg: present(msg),
        },
        Action::Join { channel } => ControlCommand::Join {
            channel: present(channel),
        },
        Action::Part { channel, msg } => ControlCommand::Part {
            channel: present(channel),
            msg: present(msg),
        },
        Action::Quit { msg } => ControlCommand::Quit { msg: present(msg) },
        Action::Raw { data } => ControlCommand::Raw {
            data: present(data),
        },
        Action::Status => ControlCommand::Status,
    })
}

/// What the controller must do after a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatched {
    Continue,
    /// Deliberate shutdown: exit with status 0 after the grace delay.
    Exit { after: Duration },
}

/// Maps commands onto the currently held session.
pub struct Dispatcher {
    cfg: Arc<Config>,
    sink: Arc<dyn RecordSink>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(cfg: Arc<Config>, sink: Arc<dyn RecordSink>, shutdown: CancellationToken) -> Self {
        Self {
            cfg,
            sink,
            shutdown,
        }
    }

    pub fn dispatch_line(
        &self,
        line: &str,
        sessions: &SessionHolder,
        attempts: u32,
    ) -> Dispatched {
        match parse_command(line) {
            Some(cmd) => self.dispatch(cmd, sessions, attempts),
            None => {
                debug!("ignoring non-command input line");
                Dispatched::Continue
            }
        }
    }

    pub fn dispatch(
        &self,
        cmd: ControlCommand,
        sessions: &SessionHolder,
        attempts: u32,
    ) -> Dispatched {
        match cmd {
            ControlCommand::Say { target, msg } => {
                let Some(msg) = msg else {
                    return Dispatched::Continue;
                };
                let target = target.unwrap_or_else(|| self.cfg.default_target().to_string());
                self.act(
                    "say",
                    sessions,
                    |s| s.say(&target, &msg),
                    Record::Sent {
                        target: target.clone(),
                        msg: msg.clone(),
                    },
                );
            }
            ControlCommand::Join { channel } => {
                let Some(channel) = channel else {
                    return Dispatched::Continue;
                };
                self.act(
                    "join",
                    sessions,
                    |s| s.join(&channel),
                    Record::Joining {
                        channel: channel.clone(),
                    },
                );
            }
            ControlCommand::Part { channel, msg } => {
                let Some(channel) = channel else {
                    return Dispatched::Continue;
                };
                let msg = msg.unwrap_or_else(|| self.cfg.part_message.clone());
                self.act(
                    "part",
                    sessions,
                    |s| s.part(&channel, &msg),
                    Record::Parting {
                        channel: channel.clone(),
                    },
                );
            }
            ControlCommand::Quit { msg } => {
                let msg = msg.unwrap_or_else(|| self.cfg.quit_message.clone());
                self.shutdown.cancel();
                if let Some(session) = sessions.get() {
                    if let Err(e) = session.quit(&msg) {
                        debug!("quit notice not sent: {e}");
                    }
                }
                self.sink.emit(Record::Quitting { msg });
                return Dispatched::Exit {
                    after: self.cfg.quit_grace,
                };
            }
            ControlCommand::Raw { data } => {
                let Some(data) = data else {
                    return Dispatched::Continue;
                };
                match sessions.get().map(|s| s.raw(&data)) {
                    Some(Ok(())) => {}
                    Some(Err(e)) => self.fail("raw", &e.to_string()),
                    None => self.fail("raw", "no active session"),
                }
            }
            ControlCommand::Status => {
                self.sink.emit(Record::Status {
                    connected: sessions.is_connected(),
                    nick: self.cfg.nick.clone(),
                    channels: self.cfg.channels.clone(),
                    reconnect_attempts: attempts,
                });
            }
            ControlCommand::Unknown(cmd) => {
                self.sink.emit(Record::UnknownCmd { cmd });
            }
        }
        Dispatched::Continue
    }

    /// Run `op` on the active session and acknowledge with `ack` on success.
    /// Without a usable session the command becomes an `error` record.
    fn act<F>(&self, action: &str, sessions: &SessionHolder, op: F, ack: Record)
    where
        F: FnOnce(&dyn IrcSession) -> Result<()>,
    {
        let Some(session) = sessions.get() else {
            self.fail(action, "no active session");
            return;
        };
        match op(session) {
            Ok(()) => self.sink.emit(ack),
            Err(e) => self.fail(action, &e.to_string()),
        }
    }

    fn fail(&self, action: &str, reason: &str) {
        self.sink.emit(Record::Error {
            error: format!("{action} dropped: {reason}"),
        });
    }
}
