use std::sync::Arc;

use tracing::{debug, warn};

use crate::dao::{
    models::{Settings, SettingsPatch},
    remote::{RemoteResult, RemoteSource},
};

/// Remote settings collaborator: reads the settings row, writes patches upstream.
#[derive(Clone)]
pub struct SettingsSync {
    source: Arc<dyn RemoteSource>,
}

impl SettingsSync {
    /// Read and write settings through `source`.
    pub fn new(source: Arc<dyn RemoteSource>) -> Self {
        Self { source }
    }

    /// Fetch the current event-day flags.
    pub async fn read_settings(&self) -> RemoteResult<Settings> {
        self.source.read_settings().await
    }

    /// Push `patch` upstream. Failures are logged and reported as `false`.
    pub async fn write_settings(&self, patch: SettingsPatch) -> bool {
        if patch.is_empty() {
            return true;
        }

        match self.source.write_settings(patch).await {
            Ok(()) => {
                debug!(?patch, "settings written upstream");
                true
            }
            Err(err) => {
                warn!(
                    ?patch,
                    error = %err,
                    cause = ?std::error::Error::source(&err),
                    "failed to write settings upstream; keeping local state"
                );
                false
            }
        }
    }
}
