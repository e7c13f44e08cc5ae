//! Application-level configuration loading: remote endpoint, cache and sync timings.

use std::{
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "ARENA_SYNC_CONFIG_PATH";
/// Environment variable overriding `remote.base_url`.
const REMOTE_URL_ENV: &str = "ARENA_REMOTE_URL";
/// Environment variable overriding `remote.api_key`.
const REMOTE_KEY_ENV: &str = "ARENA_REMOTE_KEY";

const DEFAULT_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_DEBOUNCE_WINDOW_MS: u64 = 2_000;
const DEFAULT_LIVE_POLL_INTERVAL_SECS: u64 = 15;
const DEFAULT_FLAGS_PATH: &str = "data/flags.json";
const DEFAULT_FLAGS_WATCH_INTERVAL_MS: u64 = 1_000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Remote data service endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteEndpoint {
    /// Root URL of the remote service; `None` selects the in-memory source.
    pub base_url: Option<String>,
    /// Service key sent with every request.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    remote: RemoteEndpoint,
    cache_ttl: Duration,
    debounce_window: Duration,
    live_poll_interval: Duration,
    flags_path: PathBuf,
    flags_watch_interval: Duration,
    request_timeout: Duration,
}

impl AppConfig {
    /// Load the configuration from disk and the environment, falling back to defaults.
    pub fn load() -> Self {
        let mut config = Self::load_from(&resolve_config_path());
        config.apply_env_overrides();
        config
    }

    /// Load the configuration file at `path` without looking at the environment.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        remote = app_config.remote.base_url.is_some(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env(REMOTE_URL_ENV) {
            self.remote.base_url = Some(url);
        }
        if let Some(key) = non_empty_env(REMOTE_KEY_ENV) {
            self.remote.api_key = Some(key);
        }
    }

    /// Remote data service endpoint.
    pub fn remote(&self) -> &RemoteEndpoint {
        &self.remote
    }

    /// How long a cached collection counts as fresh.
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Quiet period of the push-triggered refetch debounce.
    pub fn debounce_window(&self) -> Duration {
        self.debounce_window
    }

    /// Period of the live-session poller.
    pub fn live_poll_interval(&self) -> Duration {
        self.live_poll_interval
    }

    /// Location of the persisted flags record.
    pub fn flags_path(&self) -> &Path {
        &self.flags_path
    }

    /// Period of the persisted flags watcher.
    pub fn flags_watch_interval(&self) -> Duration {
        self.flags_watch_interval
    }

    /// Upper bound on a single remote read, including background revalidations.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Store the persisted flags at `path` instead.
    pub fn with_flags_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.flags_path = path.into();
        self
    }

    /// Override the cache freshness window.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Override the refetch debounce window.
    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    /// Override the live-session poll period.
    pub fn with_live_poll_interval(mut self, interval: Duration) -> Self {
        self.live_poll_interval = interval;
        self
    }

    /// Override the remote request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    remote: RawRemote,
    cache_ttl_secs: Option<u64>,
    debounce_window_ms: Option<u64>,
    live_poll_interval_secs: Option<u64>,
    flags_path: Option<PathBuf>,
    flags_watch_interval_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRemote {
    base_url: Option<String>,
    api_key: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            remote: RemoteEndpoint {
                base_url: value.remote.base_url.filter(|url| !url.trim().is_empty()),
                api_key: value.remote.api_key.filter(|key| !key.is_empty()),
            },
            cache_ttl: Duration::from_secs(value.cache_ttl_secs.unwrap_or(DEFAULT_CACHE_TTL_SECS)),
            debounce_window: Duration::from_millis(
                value.debounce_window_ms.unwrap_or(DEFAULT_DEBOUNCE_WINDOW_MS),
            ),
            // A zero period would make the poller spin.
            live_poll_interval: Duration::from_secs(
                value
                    .live_poll_interval_secs
                    .unwrap_or(DEFAULT_LIVE_POLL_INTERVAL_SECS)
                    .max(1),
            ),
            flags_path: value
                .flags_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FLAGS_PATH)),
            flags_watch_interval: Duration::from_millis(
                value
                    .flags_watch_interval_ms
                    .unwrap_or(DEFAULT_FLAGS_WATCH_INTERVAL_MS)
                    .max(1),
            ),
            request_timeout: Duration::from_secs(
                value
                    .request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
                    .max(1),
            ),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn non_empty_env(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.json"));
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.debounce_window(), Duration::from_millis(2000));
        assert_eq!(config.live_poll_interval(), Duration::from_secs(15));
        assert_eq!(config.flags_path(), Path::new("data/flags.json"));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.remote(), &RemoteEndpoint::default());
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.json");
        fs::write(
            &path,
            r#"{ "remote": { "base_url": "https://db.example.org" }, "debounce_window_ms": 500 }"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.remote().base_url.as_deref(), Some("https://db.example.org"));
        assert_eq!(config.remote().api_key, None);
        assert_eq!(config.debounce_window(), Duration::from_millis(500));
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.json");
        fs::write(&path, "{ cache_ttl_secs: ").unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let raw: RawConfig =
            serde_json::from_str(
                r#"{ "live_poll_interval_secs": 0, "flags_watch_interval_ms": 0, "request_timeout_secs": 0 }"#,
            )
            .unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.request_timeout(), Duration::from_secs(1));
        assert_eq!(config.live_poll_interval(), Duration::from_secs(1));
        assert_eq!(config.flags_watch_interval(), Duration::from_millis(1));
    }
}
