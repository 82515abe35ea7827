//! Moltbook credential loading.
//!
//! A missing or broken credentials file only disables the relay; it never stops
//! the connector.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tracing::{info, warn};

use crate::{config::home_dir, Result};

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    api_key: Option<String>,
}

/// `$HOME/.config/moltbook/credentials.json`
pub fn default_credentials_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".config").join("moltbook").join("credentials.json"))
}

/// Read the relay API key once. Absence is logged, not returned as an error.
pub fn load_api_key(path: &Path) -> Option<String> {
    match read_api_key(path) {
        Ok(Some(key)) => {
            info!("moltbook credentials loaded from {}", path.display());
            Some(key)
        }
        Ok(None) => {
            warn!(
                "moltbook credentials at {} have no api_key, relay disabled",
                path.display()
            );
            None
        }
        Err(e) => {
            warn!(
                "moltbook credentials not usable at {} ({e}), relay disabled",
                path.display()
            );
            None
        }
    }
}

fn read_api_key(path: &Path) -> Result<Option<String>> {
    let contents = fs::read_to_string(path)?;
    let creds: CredentialsFile = serde_json::from_str(&contents)?;
    Ok(creds.api_key.filter(|k| !k.trim().is_empty()))
}
