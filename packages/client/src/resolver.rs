//! Channel-to-partition resolution.
//!
//! A channel can be hosted on any of several partition servers. Before a
//! connection can be opened, the client asks the service's config endpoint
//! which servers carry the channel and picks one. Resolution is a single
//! HTTP GET with no retry; a failed lookup fails the whole connect attempt
//! and is reported upward.

use serde::Deserialize;
use thiserror::Error;

/// Base URL of the public service.
pub const DEFAULT_BASE_URL: &str = "https://cytu.be";

/// The server list returned by the socketconfig endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SocketConfig {
    pub servers: Vec<PartitionServer>,
}

/// One candidate server for a channel.
#[derive(Debug, Clone, Deserialize)]
pub struct PartitionServer {
    pub url: String,
    pub secure: bool,
}

/// The endpoint a transport session connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub secure: bool,
}

/// Why a partition lookup failed.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("partition lookup failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("partition config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no partition servers listed for channel '{0}'")]
    NoServers(String),
}

/// Resolves channel names to partition endpoints.
pub struct PartitionResolver {
    http: reqwest::Client,
    base_url: String,
}

impl PartitionResolver {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Look up the partition responsible for `channel`.
    ///
    /// Prefers the first server marked secure, falling back to the first
    /// listed server when none is.
    pub async fn resolve(&self, channel: &str) -> Result<Endpoint, ResolveError> {
        let url = format!("{}/socketconfig/{}.json", self.base_url, channel);
        tracing::debug!("resolving partition for '{}' via {}", channel, url);

        let body = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let config: SocketConfig = serde_json::from_str(&body)?;

        let endpoint = choose_endpoint(channel, &config)?;
        tracing::info!(
            "channel '{}' is hosted on {} (secure: {})",
            channel,
            endpoint.url,
            endpoint.secure
        );
        Ok(endpoint)
    }
}

/// Pick the endpoint to connect to from a server list.
pub(crate) fn choose_endpoint(
    channel: &str,
    config: &SocketConfig,
) -> Result<Endpoint, ResolveError> {
    let chosen = config
        .servers
        .iter()
        .find(|server| server.secure)
        .or_else(|| config.servers.first())
        .ok_or_else(|| ResolveError::NoServers(channel.to_string()))?;

    Ok(Endpoint {
        url: chosen.url.clone(),
        secure: chosen.secure,
    })
}
