use std::time::Duration;

use crate::config::RemoteEndpoint;

use super::error::{RestError, RestResult};

/// Per-request timeout applied when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime configuration describing how to reach the REST data service.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Service root; `/rest/v1/{table}` is appended per request.
    pub base_url: String,
    /// Service key sent with every request, if any.
    pub api_key: Option<String>,
    /// Whole-request timeout, connect to last body byte.
    pub timeout: Duration,
}

impl RestConfig {
    /// Construct a configuration from an explicit base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Attach the service key sent as `apikey` and bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Fail requests that take longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a configuration from the application's remote endpoint settings.
    pub fn from_endpoint(endpoint: &RemoteEndpoint) -> RestResult<Self> {
        let base_url = endpoint
            .base_url
            .clone()
            .ok_or(RestError::MissingBaseUrl)?;

        let mut config = Self::new(base_url);
        if let Some(api_key) = endpoint.api_key.clone() {
            config = config.with_api_key(api_key);
        }

        Ok(config)
    }
}
