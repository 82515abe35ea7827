//! Lifecycle controller.
//!
//! Owns the active session, the reconnect supervisor and the shutdown flag, and
//! multiplexes network events, stdin commands, signals and timers on a single
//! `select!` loop. Nothing here runs in parallel: every state change happens in
//! one of the `handle_*` methods, in arrival order.

use std::{sync::Arc, time::Duration};

use chrono::SecondsFormat;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc,
    time::{sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    commands::{Dispatched, Dispatcher},
    config::Config,
    domain::{
        is_channel_name, CloseKind, EventReceiver, EventSender, Generation, InboundEvent,
        SessionEvent,
    },
    ports::{RecordSink, RelayPort, SessionConnector},
    reconnect::{Decision, Supervisor},
    records::Record,
    relay::Relay,
    session::SessionHolder,
};

pub const EXIT_OK: i32 = 0;
pub const EXIT_GAVE_UP: i32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Continue,
    Exit(i32),
}

pub struct Controller {
    cfg: Arc<Config>,
    connector: Arc<dyn SessionConnector>,
    sink: Arc<dyn RecordSink>,
    relay: Option<Relay>,
    dispatcher: Dispatcher,

    sessions: SessionHolder,
    supervisor: Supervisor,
    shutdown: CancellationToken,

    events_tx: EventSender,
    events_rx: EventReceiver,

    reconnect_at: Option<Instant>,
    exit_at: Option<Instant>,
}

impl Controller {
    pub fn new(
        cfg: Arc<Config>,
        connector: Arc<dyn SessionConnector>,
        sink: Arc<dyn RecordSink>,
        relay_port: Option<Arc<dyn RelayPort>>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let relay = relay_port.map(|port| Relay::new(port, sink.clone()));
        let dispatcher = Dispatcher::new(cfg.clone(), sink.clone(), shutdown.clone());

        Self {
            supervisor: Supervisor::new(cfg.reconnect),
            cfg,
            connector,
            sink,
            relay,
            dispatcher,
            sessions: SessionHolder::new(),
            shutdown,
            events_tx,
            events_rx,
            reconnect_at: None,
            exit_at: None,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn attempts(&self) -> u32 {
        self.supervisor.attempts()
    }

    pub fn sessions(&self) -> &SessionHolder {
        &self.sessions
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_at.is_some()
    }

    /// Construct the first session and announce the effective configuration.
    pub fn start(&mut self) -> Generation {
        let generation = self.connect_session();
        self.sink.emit(Record::Ready {
            config: self.cfg.ready_summary(),
        });
        info!(
            "connecting to {}:{} as {} (tls: {})",
            self.cfg.host,
            self.cfg.port,
            self.cfg.nick,
            self.cfg.use_tls()
        );
        generation
    }

    /// Drive the controller until a deliberate exit or reconnect exhaustion.
    /// Returns the process exit code.
    pub async fn run<R>(mut self, input: R, mut signals: mpsc::UnboundedReceiver<String>) -> i32
    where
        R: AsyncBufRead + Unpin,
    {
        self.start();

        let mut lines = input.lines();
        let mut input_open = true;

        loop {
            let reconnect_at = self.reconnect_at;
            let exit_at = self.exit_at;

            let step = tokio::select! {
                Some(ev) = self.events_rx.recv() => self.handle_event(ev),
                line = lines.next_line(), if input_open => match line {
                    Ok(Some(line)) => self.handle_line(&line),
                    Ok(None) => {
                        debug!("stdin closed, command intake stopped");
                        input_open = false;
                        Step::Continue
                    }
                    Err(e) => {
                        warn!("stdin read failed, command intake stopped: {e}");
                        input_open = false;
                        Step::Continue
                    }
                },
                Some(signal) = signals.recv() => self.handle_signal(&signal),
                _ = sleep_until_opt(reconnect_at), if reconnect_at.is_some() => self.fire_reconnect(),
                _ = sleep_until_opt(exit_at), if exit_at.is_some() => Step::Exit(EXIT_OK),
            };

            if let Step::Exit(code) = step {
                self.sessions.clear();
                return code;
            }
        }
    }

    /// Single entry point for everything a session reports.
    pub fn handle_event(&mut self, ev: SessionEvent) -> Step {
        if !self.sessions.is_current(ev.generation) {
            debug!("dropping event from superseded session {:?}", ev.generation);
            return Step::Continue;
        }

        match ev.event {
            InboundEvent::Registered => {
                self.supervisor.on_registered();
                self.sink.emit(Record::Connected {
                    nick: self.cfg.nick.clone(),
                    server: self.cfg.host.clone(),
                    port: self.cfg.port,
                    channels: self.cfg.channels.clone(),
                });
                if let Some(session) = self.sessions.get() {
                    for channel in &self.cfg.channels {
                        if let Err(e) = session.join(channel) {
                            warn!("join {channel} failed: {e}");
                        }
                    }
                }
            }
            InboundEvent::Joined { channel, nick } => {
                self.sink.emit(Record::Joined { channel, nick });
            }
            InboundEvent::Message {
                target,
                nick,
                text,
                received_at,
            } => {
                let time = received_at.to_rfc3339_opts(SecondsFormat::Millis, true);
                if is_channel_name(&target) {
                    if let Some(relay) = &self.relay {
                        relay.on_channel_message(&target, &nick, &text);
                    }
                    self.sink.emit(Record::Message {
                        channel: target,
                        nick,
                        msg: text,
                        time,
                    });
                } else {
                    self.sink.emit(Record::Dm {
                        target,
                        nick,
                        msg: text,
                        time,
                    });
                }
            }
            InboundEvent::ProtocolError { message } => {
                self.sink.emit(Record::Error { error: message });
            }
            InboundEvent::Closed(kind) => return self.on_closed(kind),
        }
        Step::Continue
    }

    fn on_closed(&mut self, kind: CloseKind) -> Step {
        match kind {
            CloseKind::Clean => self.sink.emit(Record::Disconnected),
            CloseKind::Transport { reason } => warn!("connection lost: {reason}"),
        }

        if self.shutdown.is_cancelled() {
            debug!("close during shutdown, not reconnecting");
            return Step::Continue;
        }
        if self.reconnect_at.is_some() {
            return Step::Continue;
        }

        match self.supervisor.on_close() {
            Decision::Retry { attempt, delay } => {
                self.sink.emit(Record::Reconnecting {
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                });
                self.reconnect_at = Some(Instant::now() + delay);
                Step::Continue
            }
            Decision::GiveUp { .. } => {
                self.sink.emit(Record::Fatal {
                    error: format!(
                        "Max reconnect attempts reached ({})",
                        self.supervisor.policy().max_attempts
                    ),
                });
                Step::Exit(EXIT_GAVE_UP)
            }
        }
    }

    /// The backoff delay elapsed.
    pub fn fire_reconnect(&mut self) -> Step {
        self.reconnect_at = None;
        if self.shutdown.is_cancelled() {
            return Step::Continue;
        }
        let generation = self.connect_session();
        info!(
            "reconnect attempt {} started (session {:?})",
            self.supervisor.attempts(),
            generation
        );
        Step::Continue
    }

    pub fn handle_line(&mut self, line: &str) -> Step {
        let attempts = self.supervisor.attempts();
        match self.dispatcher.dispatch_line(line, &self.sessions, attempts) {
            Dispatched::Continue => {}
            Dispatched::Exit { after } => {
                self.reconnect_at = None;
                self.schedule_exit(after);
            }
        }
        Step::Continue
    }

    /// SIGINT / SIGTERM: best-effort QUIT, then exit after the grace delay no
    /// matter what the server does.
    pub fn handle_signal(&mut self, signal: &str) -> Step {
        self.shutdown.cancel();
        self.reconnect_at = None;
        if let Some(session) = self.sessions.get() {
            let _ = session.quit(&format!("OpenClaw shutdown ({signal})"));
        }
        self.sink.emit(Record::Shutdown {
            signal: signal.to_string(),
        });
        self.schedule_exit(self.cfg.signal_grace);
        Step::Continue
    }

    fn schedule_exit(&mut self, after: Duration) {
        let at = Instant::now() + after;
        self.exit_at = Some(match self.exit_at {
            Some(existing) => existing.min(at),
            None => at,
        });
    }

    fn connect_session(&mut self) -> Generation {
        let cfg = self.cfg.clone();
        let connector = self.connector.clone();
        let events = self.events_tx.clone();
        self.sessions
            .replace_with(|generation| connector.connect(&cfg, generation, events))
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::test_config,
        reconnect::ReconnectPolicy,
        records::testing::MemorySink,
        relay::testing::FakeRelay,
        session::testing::{Call, FakeConnector},
    };
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::Ordering;

    struct Harness {
        connector: Arc<FakeConnector>,
        sink: Arc<MemorySink>,
        relay: Arc<FakeRelay>,
        controller: Controller,
    }

    fn harness_with(cfg: Config, connector: FakeConnector, relay_on: bool) -> Harness {
        let connector = Arc::new(connector);
        let sink = Arc::new(MemorySink::default());
        let relay = Arc::new(FakeRelay::default());
        let relay_port: Option<Arc<dyn RelayPort>> = if relay_on {
            Some(relay.clone() as Arc<dyn RelayPort>)
        } else {
            None
        };
        let controller = Controller::new(Arc::new(cfg), connector.clone(), sink.clone(), relay_port);
        Harness {
            connector,
            sink,
            relay,
            controller,
        }
    }

    fn started(channels: &[&str]) -> Harness {
        let mut h = harness_with(test_config(channels), FakeConnector::new(), false);
        h.controller.start();
        h.sink.take();
        h
    }

    impl Harness {
        fn current(&self) -> Generation {
            self.controller.sessions().generation()
        }

        fn event(&mut self, event: InboundEvent) -> Step {
            let generation = self.current();
            self.controller.handle_event(SessionEvent { generation, event })
        }

        fn transport_close(&mut self) -> Step {
            self.event(InboundEvent::Closed(CloseKind::Transport {
                reason: "reset".to_string(),
            }))
        }
    }

    fn reconnect_delays(records: &[Record]) -> Vec<u64> {
        records
            .iter()
            .filter_map(|r| match r {
                Record::Reconnecting { delay_ms, .. } => Some(*delay_ms),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn start_connects_and_announces_ready() {
        let mut h = harness_with(test_config(&["#a"]), FakeConnector::new(), false);
        let g = h.controller.start();
        assert_eq!(g, Generation(1));
        assert_eq!(h.connector.connect_count(), 1);
        assert!(matches!(h.sink.take().as_slice(), [Record::Ready { .. }]));
    }

    #[test]
    fn registration_joins_channels_in_order() {
        let mut h = started(&["#a", "#b"]);
        h.event(InboundEvent::Registered);

        assert_eq!(
            h.connector.calls(),
            vec![Call::Join("#a".to_string()), Call::Join("#b".to_string())]
        );
        assert_eq!(
            h.sink.take(),
            vec![Record::Connected {
                nick: "TestBot".to_string(),
                server: "irc.example.net".to_string(),
                port: 6697,
                channels: vec!["#a".to_string(), "#b".to_string()],
            }]
        );
    }

    #[test]
    fn three_disconnects_back_off_linearly() {
        let mut h = started(&["#a"]);
        for _ in 0..3 {
            assert_eq!(h.transport_close(), Step::Continue);
            assert!(h.controller.reconnect_pending());
            h.controller.fire_reconnect();
        }

        assert_eq!(reconnect_delays(&h.sink.take()), vec![5_000, 10_000, 15_000]);
        assert_eq!(h.controller.attempts(), 3);
        assert_eq!(h.connector.connect_count(), 4);
    }

    #[test]
    fn registration_resets_attempts_after_failures() {
        let mut h = started(&["#a"]);
        for _ in 0..5 {
            h.transport_close();
            h.controller.fire_reconnect();
        }
        assert_eq!(h.controller.attempts(), 5);

        h.event(InboundEvent::Registered);
        assert_eq!(h.controller.attempts(), 0);

        h.sink.take();
        h.transport_close();
        assert_eq!(reconnect_delays(&h.sink.take()), vec![5_000]);
    }

    #[test]
    fn exhaustion_is_fatal_exactly_once() {
        let mut cfg = test_config(&["#a"]);
        cfg.reconnect = ReconnectPolicy {
            base_delay: Duration::from_millis(10),
            max_attempts: 2,
        };
        let mut h = harness_with(cfg, FakeConnector::new(), false);
        h.controller.start();

        for _ in 0..2 {
            assert_eq!(h.transport_close(), Step::Continue);
            h.controller.fire_reconnect();
        }
        assert_eq!(h.transport_close(), Step::Exit(EXIT_GAVE_UP));
        assert!(!h.controller.reconnect_pending());

        let fatals: Vec<_> = h
            .sink
            .take()
            .into_iter()
            .filter(|r| matches!(r, Record::Fatal { .. }))
            .collect();
        assert_eq!(
            fatals,
            vec![Record::Fatal {
                error: "Max reconnect attempts reached (2)".to_string()
            }]
        );
        assert_eq!(h.connector.connect_count(), 3);
    }

    #[test]
    fn clean_close_reports_disconnected_then_retries() {
        let mut h = started(&["#a"]);
        h.event(InboundEvent::Closed(CloseKind::Clean));
        assert_eq!(
            h.sink.take(),
            vec![
                Record::Disconnected,
                Record::Reconnecting {
                    attempt: 1,
                    delay_ms: 5_000
                }
            ]
        );
    }

    #[test]
    fn transport_close_emits_only_the_retry() {
        let mut h = started(&["#a"]);
        h.transport_close();
        assert_eq!(reconnect_delays(&h.sink.snapshot()).len(), 1);
        assert_eq!(h.sink.take().len(), 1);
    }

    #[test]
    fn close_after_quit_never_reconnects() {
        let mut h = started(&["#a"]);
        h.controller.handle_line(r#"{"action":"quit"}"#);
        h.sink.take();

        h.event(InboundEvent::Closed(CloseKind::Clean));
        assert_eq!(h.sink.take(), vec![Record::Disconnected]);
        assert!(!h.controller.reconnect_pending());
        assert_eq!(h.controller.attempts(), 0);
        assert_eq!(
            h.connector.calls(),
            vec![Call::Quit("OpenClaw signing off 👁️".to_string())]
        );
    }

    #[test]
    fn pending_reconnect_is_dropped_by_shutdown() {
        let mut h = started(&["#a"]);
        h.transport_close();
        assert!(h.controller.reconnect_pending());

        h.controller.handle_signal("SIGINT");
        assert!(!h.controller.reconnect_pending());
        // A timer that already fired still checks the flag.
        h.controller.fire_reconnect();
        assert_eq!(h.connector.connect_count(), 1);
    }

    #[test]
    fn quit_command_drops_pending_reconnect() {
        let mut h = started(&["#a"]);
        h.transport_close();
        assert!(h.controller.reconnect_pending());

        assert_eq!(h.controller.handle_line(r#"{"action":"quit"}"#), Step::Continue);
        assert!(!h.controller.reconnect_pending());
        assert!(h.controller.shutdown_token().is_cancelled());

        h.controller.fire_reconnect();
        assert_eq!(h.connector.connect_count(), 1);
        assert_eq!(h.controller.attempts(), 1);
    }

    #[test]
    fn signal_quits_and_reports_shutdown() {
        let mut h = started(&["#a"]);
        h.controller.handle_signal("SIGTERM");

        assert!(h.controller.shutdown_token().is_cancelled());
        assert_eq!(
            h.connector.calls(),
            vec![Call::Quit("OpenClaw shutdown (SIGTERM)".to_string())]
        );
        assert_eq!(
            h.sink.take(),
            vec![Record::Shutdown {
                signal: "SIGTERM".to_string()
            }]
        );
    }

    #[test]
    fn signal_with_dead_connection_still_reports_shutdown() {
        let mut h = started(&["#a"]);
        h.connector.connected.store(false, Ordering::SeqCst);
        h.controller.handle_signal("SIGINT");
        assert!(h.connector.calls().is_empty());
        assert!(matches!(h.sink.take().as_slice(), [Record::Shutdown { .. }]));
    }

    #[test]
    fn events_from_superseded_sessions_are_ignored() {
        let mut h = started(&["#a"]);
        let old = h.current();
        h.transport_close();
        h.controller.fire_reconnect();
        h.sink.take();

        h.controller.handle_event(SessionEvent {
            generation: old,
            event: InboundEvent::Closed(CloseKind::Clean),
        });
        h.controller.handle_event(SessionEvent {
            generation: old,
            event: InboundEvent::Registered,
        });
        assert!(h.sink.snapshot().is_empty());
        assert_eq!(h.controller.attempts(), 1);
    }

    #[test]
    fn duplicate_close_does_not_double_count() {
        let mut h = started(&["#a"]);
        h.transport_close();
        h.transport_close();
        assert_eq!(h.controller.attempts(), 1);
    }

    #[test]
    fn channel_and_direct_messages_are_told_apart() {
        let mut h = started(&["#a"]);
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        h.event(InboundEvent::Message {
            target: "#a".to_string(),
            nick: "alice".to_string(),
            text: "hello".to_string(),
            received_at: at,
        });
        h.event(InboundEvent::Message {
            target: "TestBot".to_string(),
            nick: "bob".to_string(),
            text: "psst".to_string(),
            received_at: at,
        });

        assert_eq!(
            h.sink.take(),
            vec![
                Record::Message {
                    channel: "#a".to_string(),
                    nick: "alice".to_string(),
                    msg: "hello".to_string(),
                    time: "2026-01-02T03:04:05.000Z".to_string(),
                },
                Record::Dm {
                    target: "TestBot".to_string(),
                    nick: "bob".to_string(),
                    msg: "psst".to_string(),
                    time: "2026-01-02T03:04:05.000Z".to_string(),
                },
            ]
        );
    }

    #[test]
    fn joins_and_protocol_errors_become_records() {
        let mut h = started(&["#a"]);
        h.event(InboundEvent::Joined {
            channel: "#a".to_string(),
            nick: "carol".to_string(),
        });
        let step = h.event(InboundEvent::ProtocolError {
            message: "ERR_NICKNAMEINUSE: Nickname is already in use".to_string(),
        });

        assert_eq!(step, Step::Continue);
        assert_eq!(
            h.sink.take(),
            vec![
                Record::Joined {
                    channel: "#a".to_string(),
                    nick: "carol".to_string()
                },
                Record::Error {
                    error: "ERR_NICKNAMEINUSE: Nickname is already in use".to_string()
                },
            ]
        );
        assert!(!h.controller.reconnect_pending());
    }

    #[tokio::test]
    async fn disabled_relay_never_posts() {
        let mut h = harness_with(test_config(&["#a"]), FakeConnector::new(), false);
        h.controller.start();
        h.event(InboundEvent::Message {
            target: "#a".to_string(),
            nick: "alice".to_string(),
            text: "!prompt do the thing".to_string(),
            received_at: Utc::now(),
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.relay.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn enabled_relay_posts_channel_commands_only() {
        let mut h = harness_with(test_config(&["#a"]), FakeConnector::new(), true);
        h.controller.start();
        h.event(InboundEvent::Message {
            target: "#a".to_string(),
            nick: "alice".to_string(),
            text: "!delegate fix ci".to_string(),
            received_at: Utc::now(),
        });
        h.event(InboundEvent::Message {
            target: "TestBot".to_string(),
            nick: "bob".to_string(),
            text: "!prompt in private".to_string(),
            received_at: Utc::now(),
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let posts = h.relay.posts.lock().unwrap().clone();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "delegate: alice");
        assert_eq!(
            posts[0].content,
            "!delegate fix ci\n\n_Relayed from IRC #a_"
        );
        assert!(h
            .sink
            .snapshot()
            .iter()
            .any(|r| matches!(r, Record::MoltbookRelay { success: true, status: 201 })));
    }

    #[tokio::test]
    async fn run_exits_with_failure_when_reconnects_run_out() {
        let mut cfg = test_config(&["#a"]);
        cfg.reconnect = ReconnectPolicy {
            base_delay: Duration::from_millis(1),
            max_attempts: 2,
        };
        let h = harness_with(cfg, FakeConnector::failing(), false);
        let (_signals_tx, signals_rx) = mpsc::unbounded_channel();

        let code = h.controller.run(&b""[..], signals_rx).await;

        assert_eq!(code, EXIT_GAVE_UP);
        let records = h.sink.take();
        assert_eq!(reconnect_delays(&records), vec![1, 2]);
        assert!(matches!(records.last(), Some(Record::Fatal { .. })));
        assert_eq!(h.connector.connect_count(), 3);
    }

    #[tokio::test]
    async fn run_exits_cleanly_after_quit_command() {
        let mut cfg = test_config(&["#a"]);
        cfg.quit_grace = Duration::from_millis(10);
        let h = harness_with(cfg, FakeConnector::new(), false);
        let (_signals_tx, signals_rx) = mpsc::unbounded_channel();
        let input = b"garbage\n{\"action\":\"quit\",\"msg\":\"later\"}\n";

        let code = h.controller.run(&input[..], signals_rx).await;

        assert_eq!(code, EXIT_OK);
        assert_eq!(h.connector.calls(), vec![Call::Quit("later".to_string())]);
        let records = h.sink.take();
        assert!(matches!(records.first(), Some(Record::Ready { .. })));
        assert_eq!(
            records.last(),
            Some(&Record::Quitting {
                msg: "later".to_string()
            })
        );
    }

    #[tokio::test]
    async fn run_exits_cleanly_after_signal() {
        let mut cfg = test_config(&["#a"]);
        cfg.signal_grace = Duration::from_millis(10);
        let h = harness_with(cfg, FakeConnector::new(), false);
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        signals_tx.send("SIGINT".to_string()).unwrap();

        let code = h.controller.run(&b""[..], signals_rx).await;

        assert_eq!(code, EXIT_OK);
        assert!(h.sink.take().contains(&Record::Shutdown {
            signal: "SIGINT".to_string()
        }));
    }
}
