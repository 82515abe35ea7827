use std::sync::Arc;

use tokio::{io::BufReader, sync::mpsc};
use tracing::{info, warn};

use clawirc_core::{
    config::Config, controller::Controller, ports::RelayPort, records::StdioSink, relay,
};
use clawirc_irc::IrcConnector;
use clawirc_moltbook::MoltbookClient;

const EXIT_BAD_CONFIG: i32 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = clawirc_core::logging::init("clawirc") {
        eprintln!("{e}");
    }

    let cfg = match Config::load() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            eprintln!("clawirc: {e}");
            std::process::exit(EXIT_BAD_CONFIG);
        }
    };

    let relay_port = build_relay(&cfg);
    let controller = Controller::new(
        cfg,
        Arc::new(IrcConnector::new()),
        Arc::new(StdioSink),
        relay_port,
    );

    let (sig_tx, sig_rx) = mpsc::unbounded_channel();
    spawn_signal_forwarder(sig_tx);

    let code = controller
        .run(BufReader::new(tokio::io::stdin()), sig_rx)
        .await;
    info!("exiting with status {code}");
    std::process::exit(code);
}

/// Credentials are always read so their state is logged; the relay only runs
/// when asked for and a usable key is on disk.
fn build_relay(cfg: &Config) -> Option<Arc<dyn RelayPort>> {
    let key = relay::startup_key(cfg.relay_enabled, cfg.credentials_path.as_deref())?;
    match MoltbookClient::new(key) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!("moltbook relay disabled: {e}");
            None
        }
    }
}

fn spawn_signal_forwarder(tx: mpsc::UnboundedSender<String>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let (mut int, mut term) = match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(int), Ok(term)) => (int, term),
            (Err(e), _) | (_, Err(e)) => {
                warn!("signal handlers not installed: {e}");
                return;
            }
        };
        loop {
            let name = tokio::select! {
                _ = int.recv() => "SIGINT",
                _ = term.recv() => "SIGTERM",
            };
            if tx.send(name.to_string()).is_err() {
                return;
            }
        }
    });
}
