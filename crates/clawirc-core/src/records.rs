//! Structured output records.
//!
//! One JSON object per line. The `type` field is the discriminator supervising
//! processes switch on; field names are part of the wire contract.

use std::io::Write;

use serde::Serialize;

use crate::ports::RecordSink;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Record {
    Ready {
        config: ReadyConfig,
    },
    Connected {
        nick: String,
        server: String,
        port: u16,
        channels: Vec<String>,
    },
    Joined {
        channel: String,
        nick: String,
    },
    Message {
        channel: String,
        nick: String,
        msg: String,
        time: String,
    },
    Dm {
        target: String,
        nick: String,
        msg: String,
        time: String,
    },
    Error {
        error: String,
    },
    Disconnected,
    Reconnecting {
        attempt: u32,
        #[serde(rename = "delayMs")]
        delay_ms: u64,
    },
    Fatal {
        error: String,
    },
    Sent {
        target: String,
        msg: String,
    },
    Joining {
        channel: String,
    },
    Parting {
        channel: String,
    },
    Quitting {
        msg: String,
    },
    Status {
        connected: bool,
        nick: String,
        channels: Vec<String>,
        #[serde(rename = "reconnectAttempts")]
        reconnect_attempts: u32,
    },
    UnknownCmd {
        cmd: serde_json::Value,
    },
    Shutdown {
        signal: String,
    },
    MoltbookRelay {
        success: bool,
        status: u16,
    },
    MoltbookError {
        error: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReadyConfig {
    pub host: String,
    pub port: u16,
    pub nick: String,
    pub channels: Vec<String>,
    #[serde(rename = "relayMoltbook")]
    pub relay_moltbook: bool,
    pub secure: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl Record {
    /// Failures go to stderr, everything else to stdout.
    pub fn stream(&self) -> OutputStream {
        match self {
            Record::Error { .. } | Record::Fatal { .. } | Record::MoltbookError { .. } => {
                OutputStream::Stderr
            }
            _ => OutputStream::Stdout,
        }
    }

    pub fn to_line(&self) -> String {
        // Every field is a string, number, bool or JSON value: serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","error":"record serialization failed"}"#.to_string()
        })
    }
}

/// Writes records to stdout/stderr, one line each, flushed immediately.
#[derive(Default)]
pub struct StdioSink;

impl RecordSink for StdioSink {
    fn emit(&self, record: Record) {
        let line = record.to_line();
        // A closed pipe on either stream must not take the process down.
        match record.stream() {
            OutputStream::Stdout => {
                let mut out = std::io::stdout().lock();
                let _ = writeln!(out, "{line}");
                let _ = out.flush();
            }
            OutputStream::Stderr => {
                let mut err = std::io::stderr().lock();
                let _ = writeln!(err, "{line}");
                let _ = err.flush();
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_value(r: &Record) -> serde_json::Value {
        serde_json::from_str(&r.to_line()).unwrap()
    }

    #[test]
    fn reconnecting_uses_camel_case_delay() {
        let r = Record::Reconnecting {
            attempt: 2,
            delay_ms: 10_000,
        };
        assert_eq!(
            to_value(&r),
            json!({"type": "reconnecting", "attempt": 2, "delayMs": 10000})
        );
    }

    #[test]
    fn multi_word_types_are_kebab_case() {
        let r = Record::UnknownCmd {
            cmd: json!({"action": "dance"}),
        };
        assert_eq!(
            to_value(&r),
            json!({"type": "unknown-cmd", "cmd": {"action": "dance"}})
        );
        let r = Record::MoltbookRelay {
            success: true,
            status: 201,
        };
        assert_eq!(to_value(&r)["type"], "moltbook-relay");
    }

    #[test]
    fn unit_records_only_carry_the_type() {
        assert_eq!(
            to_value(&Record::Disconnected),
            json!({"type": "disconnected"})
        );
    }

    #[test]
    fn status_reports_attempts_in_camel_case() {
        let r = Record::Status {
            connected: false,
            nick: "bot".to_string(),
            channels: vec!["#a".to_string()],
            reconnect_attempts: 3,
        };
        let v = to_value(&r);
        assert_eq!(v["reconnectAttempts"], 3);
        assert_eq!(v["connected"], false);
    }

    #[test]
    fn failures_route_to_stderr() {
        assert_eq!(
            Record::Fatal {
                error: "x".to_string()
            }
            .stream(),
            OutputStream::Stderr
        );
        assert_eq!(
            Record::MoltbookError {
                error: "x".to_string()
            }
            .stream(),
            OutputStream::Stderr
        );
        assert_eq!(Record::Disconnected.stream(), OutputStream::Stdout);
    }
}
