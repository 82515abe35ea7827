/// Core error type for the connector.
///
/// Adapter crates map their library errors into this type so the controller
/// can turn every failure into a record instead of a crash.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no active session")]
    NotConnected,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
