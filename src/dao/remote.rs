use std::error::Error;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::dao::models::{Competition, LiveSessions, Settings, SettingsPatch, Team, Variant};

/// Result alias for remote data service operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Error raised by remote data sources regardless of the underlying transport.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The service could not be reached or answered with an error.
    #[error("remote unavailable: {message}")]
    Unavailable {
        /// Human readable summary.
        message: String,
        /// Backend failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The settings row (or another singleton row) does not exist.
    #[error("remote row missing: {0}")]
    MissingRow(&'static str),
}

impl RemoteError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        RemoteError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Read/write contract of the remote data service the sync core depends on.
pub trait RemoteSource: Send + Sync {
    /// Read the teams table in the given projection.
    fn fetch_teams(&self, variant: Variant) -> BoxFuture<'static, RemoteResult<Vec<Team>>>;
    /// Read the competitions table in the given projection.
    fn fetch_competitions(
        &self,
        variant: Variant,
    ) -> BoxFuture<'static, RemoteResult<Vec<Competition>>>;
    /// Read the whole live-session feed.
    fn fetch_live_sessions(&self) -> BoxFuture<'static, RemoteResult<LiveSessions>>;
    /// Read the singleton settings row.
    fn read_settings(&self) -> BoxFuture<'static, RemoteResult<Settings>>;
    /// Apply `patch` to the singleton settings row.
    fn write_settings(&self, patch: SettingsPatch) -> BoxFuture<'static, RemoteResult<()>>;
}
