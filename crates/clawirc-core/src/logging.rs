use crate::{Error, Result};

/// Initialize tracing for the connector.
///
/// Logs always go to stderr: stdout carries the JSON record stream and must
/// stay machine-readable.
pub fn init(service_name: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    // Default: info for our crates. Can be overridden with `RUST_LOG`.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,clawirc_core=info,clawirc_irc=info,clawirc_moltbook=info,{service_name}=info"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .try_init()
        .map_err(|e| Error::External(format!("logging init failed: {e}")))
}
