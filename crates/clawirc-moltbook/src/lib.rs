//! Moltbook adapter.
//!
//! Implements the `clawirc-core` RelayPort over the Moltbook posts API.

use std::time::Duration;

use async_trait::async_trait;

use clawirc_core::{
    errors::Error,
    ports::RelayPort,
    relay::{RelayPost, RelayReceipt},
    Result,
};

pub const DEFAULT_ENDPOINT: &str = "https://moltbook.com/api/v1/posts";

#[derive(Clone, Debug)]
pub struct MoltbookClient {
    api_key: String,
    endpoint: String,
    http: reqwest::Client,
}

impl MoltbookClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_endpoint(api_key, DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(api_key: impl Into<String>, endpoint: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::External(format!("moltbook client build error: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RelayPort for MoltbookClient {
    /// A non-2xx answer is still a receipt; only transport failures are errors.
    async fn post(&self, post: &RelayPost) -> Result<RelayReceipt> {
        let resp = self
            .http
            .post(&self.endpoint)
            .header("X-API-Key", &self.api_key)
            .json(post)
            .send()
            .await
            .map_err(|e| Error::External(format!("moltbook request error: {e}")))?;

        let status = resp.status();
        Ok(RelayReceipt {
            success: status.is_success(),
            status: status.as_u16(),
        })
    }
}
