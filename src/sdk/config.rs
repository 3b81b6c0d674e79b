use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::MemStore;
use crate::model::ConfigError;
use crate::sdk::{Client, Session};
use crate::Result;

/// Base URL of the Edge value service.
pub const ENDPOINT_ENV: &str = "EDGE_API_ENDPOINT";
pub const API_KEY_ID_ENV: &str = "EDGE_API_KEY_ID";
pub const API_KEY_ENV: &str = "EDGE_API_KEY";
/// Request timeout in whole seconds.
pub const TIMEOUT_ENV: &str = "EDGE_API_TIMEOUT_SECS";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for the HTTP [`Client`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub endpoint: String,
    pub api_key_id: Option<String>,
    pub api_key: Option<String>,
    pub user_agent: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key_id: None,
            api_key: None,
            user_agent: format!("edge-value/{}", env!("CARGO_PKG_VERSION")),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_credentials(mut self, api_key_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.api_key_id = Some(api_key_id.into());
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reads the configuration from the environment.
    ///
    /// Returns `Ok(None)` when [`ENDPOINT_ENV`] is unset or empty.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let Some(endpoint) = set(ENDPOINT_ENV) else {
            return Ok(None);
        };
        let mut config = ClientConfig::new(endpoint);
        config.api_key_id = set(API_KEY_ID_ENV);
        config.api_key = set(API_KEY_ENV);
        if let Some(raw) = set(TIMEOUT_ENV) {
            let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidSetting {
                name: TIMEOUT_ENV.to_string(),
                value: raw.clone(),
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(Some(config))
    }
}

/// Initializes a [`Session`] based on the environment.
///
/// `new` detects whether to talk to a remote service or keep values in memory:
///
/// 1. If `EDGE_API_ENDPOINT` is set, it builds an HTTP [`Client`] for that endpoint
///    using `EDGE_API_KEY_ID`, `EDGE_API_KEY` and `EDGE_API_TIMEOUT_SECS`.
/// 2. Otherwise, it falls back to an embedded [`MemStore`].
///
/// # Examples
///
/// ```no_run
/// use edge_value::sdk;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let session = sdk::new()?;
///     let value = session.read("checkout").await?;
///     println!("{} has {} variants", value.id, value.variants.len());
///     Ok(())
/// }
/// ```
pub fn new() -> Result<Session> {
    match ClientConfig::from_env()? {
        Some(config) => {
            log::info!("Using Edge value service at {}", config.endpoint);
            Ok(Session::new(Arc::new(Client::new(config)?)))
        }
        None => {
            log::warn!("{} is not set, values are kept in memory only", ENDPOINT_ENV);
            Ok(Session::new(Arc::new(MemStore::default())))
        }
    }
}
