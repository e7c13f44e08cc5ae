//! Small persisted record holding the event-day flags across restarts.
//!
//! The record only serves the first paint before the remote settings sync
//! completes. Several processes (tabs) may share the same file; the watcher
//! turns changes written by another process into [`StorageChange`] events.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::dao::models::Settings;

/// Persisted copy of the two settings flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedFlags {
    /// Event day has been opened by an administrator.
    pub event_day_started: bool,
    /// Team profiles can no longer be edited.
    pub profiles_locked: bool,
}

impl From<Settings> for PersistedFlags {
    fn from(value: Settings) -> Self {
        Self {
            event_day_started: value.event_day_started,
            profiles_locked: value.profiles_locked,
        }
    }
}

/// Notification that the persisted record was changed outside this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageChange {
    /// Flags now on disk.
    pub flags: PersistedFlags,
}

/// File-backed flags record with change notification.
pub struct FlagsStore {
    path: PathBuf,
    last_known: Mutex<Option<PersistedFlags>>,
    changes: broadcast::Sender<StorageChange>,
}

impl FlagsStore {
    /// Open the record at `path`, loading whatever is currently stored.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = read_flags(&path);
        let (changes, _rx) = broadcast::channel(16);
        Self {
            path,
            last_known: Mutex::new(current),
            changes,
        }
    }

    /// Location of the record on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last flags read or written by this process, `None` when nothing is stored.
    pub fn load(&self) -> Option<PersistedFlags> {
        *self.last_known.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist `flags`. Returns `false` when the stored record was already identical.
    pub fn save(&self, flags: PersistedFlags) -> io::Result<bool> {
        let mut guard = self.last_known.lock().unwrap_or_else(PoisonError::into_inner);
        if *guard == Some(flags) {
            return Ok(false);
        }

        let bytes = serde_json::to_vec_pretty(&flags)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)?;

        *guard = Some(flags);
        debug!(path = %self.path.display(), ?flags, "persisted flags written");
        Ok(true)
    }

    /// Subscribe to changes made by other processes.
    pub fn changes(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }

    /// Re-read the record and emit a [`StorageChange`] if it differs from the last known value.
    ///
    /// The file is read under the same lock `save` writes under, so a
    /// concurrent local write is never mistaken for an external one.
    pub fn poll_external_change(&self) -> Option<StorageChange> {
        let mut guard = self.last_known.lock().unwrap_or_else(PoisonError::into_inner);
        let on_disk = read_flags(&self.path)?;
        if *guard == Some(on_disk) {
            return None;
        }

        *guard = Some(on_disk);
        drop(guard);

        let change = StorageChange { flags: on_disk };
        info!(path = %self.path.display(), flags = ?on_disk, "persisted flags changed externally");
        let _ = self.changes.send(change);
        Some(change)
    }

    /// Poll the record on `every` tick until the returned task is aborted.
    pub fn spawn_watcher(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.poll_external_change();
            }
        })
    }
}

/// Read the record, treating a missing or malformed file as "no flags".
///
/// A malformed file is removed so the next write starts clean.
fn read_flags(path: &Path) -> Option<PersistedFlags> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read persisted flags");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(flags) => Some(flags),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "malformed persisted flags; clearing");
            if let Err(err) = fs::remove_file(path) {
                debug!(path = %path.display(), error = %err, "could not remove malformed flags");
            }
            None
        }
    }
}
