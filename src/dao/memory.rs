//! In-process remote source used when no REST endpoint is configured and by tests.

use std::{
    io,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use futures::future::BoxFuture;

use crate::dao::{
    models::{Competition, LiveSessions, Settings, SettingsPatch, Team, Variant},
    remote::{RemoteError, RemoteResult, RemoteSource},
};

#[derive(Default)]
struct MemoryData {
    teams: Vec<Team>,
    competitions: Vec<Competition>,
    live_sessions: LiveSessions,
    settings: Settings,
}

#[derive(Default)]
struct Counters {
    teams: AtomicUsize,
    competitions: AtomicUsize,
    live_sessions: AtomicUsize,
    settings_writes: AtomicUsize,
}

/// Remote source backed by plain memory. Cloning shares the same data.
#[derive(Clone, Default)]
pub struct MemoryRemoteSource {
    data: Arc<RwLock<MemoryData>>,
    offline: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl MemoryRemoteSource {
    /// Empty source: no rows, default settings, online.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the teams table.
    pub fn set_teams(&self, teams: Vec<Team>) {
        self.write(|data| data.teams = teams);
    }

    /// Replace the competitions table.
    pub fn set_competitions(&self, competitions: Vec<Competition>) {
        self.write(|data| data.competitions = competitions);
    }

    /// Replace the live-session feed.
    pub fn set_live_sessions(&self, sessions: LiveSessions) {
        self.write(|data| data.live_sessions = sessions);
    }

    /// Replace the settings row.
    pub fn set_settings(&self, settings: Settings) {
        self.write(|data| data.settings = settings);
    }

    /// Current remote settings row.
    pub fn settings(&self) -> Settings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .settings
    }

    /// Simulate a network outage: every call fails while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of network reads served for `teams`.
    pub fn team_fetches(&self) -> usize {
        self.counters.teams.load(Ordering::SeqCst)
    }

    /// Number of network reads served for `competitions`.
    pub fn competition_fetches(&self) -> usize {
        self.counters.competitions.load(Ordering::SeqCst)
    }

    /// Number of network reads served for the live-session feed.
    pub fn live_session_fetches(&self) -> usize {
        self.counters.live_sessions.load(Ordering::SeqCst)
    }

    /// Number of accepted settings writes.
    pub fn settings_writes(&self) -> usize {
        self.counters.settings_writes.load(Ordering::SeqCst)
    }

    fn write(&self, apply: impl FnOnce(&mut MemoryData)) {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut guard);
    }

    fn read<T>(&self, table: &str, select: impl FnOnce(&MemoryData) -> T) -> RemoteResult<T> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::unavailable(
                format!("`{table}` unreachable"),
                io::Error::new(io::ErrorKind::NotConnected, "memory source offline"),
            ));
        }
        let guard = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(select(&guard))
    }
}

impl RemoteSource for MemoryRemoteSource {
    fn fetch_teams(&self, variant: Variant) -> BoxFuture<'static, RemoteResult<Vec<Team>>> {
        let source = self.clone();
        Box::pin(async move {
            let mut teams = source.read("teams", |data| data.teams.clone())?;
            source.counters.teams.fetch_add(1, Ordering::SeqCst);
            if variant == Variant::Minimal {
                teams.iter_mut().for_each(|team| team.members.clear());
            }
            Ok(teams)
        })
    }

    fn fetch_competitions(
        &self,
        variant: Variant,
    ) -> BoxFuture<'static, RemoteResult<Vec<Competition>>> {
        let source = self.clone();
        Box::pin(async move {
            let mut competitions =
                source.read("competitions", |data| data.competitions.clone())?;
            source.counters.competitions.fetch_add(1, Ordering::SeqCst);
            if variant == Variant::Minimal {
                competitions
                    .iter_mut()
                    .for_each(|competition| competition.description = None);
            }
            Ok(competitions)
        })
    }

    fn fetch_live_sessions(&self) -> BoxFuture<'static, RemoteResult<LiveSessions>> {
        let source = self.clone();
        Box::pin(async move {
            let sessions = source.read("live_sessions", |data| data.live_sessions.clone())?;
            source.counters.live_sessions.fetch_add(1, Ordering::SeqCst);
            Ok(sessions)
        })
    }

    fn read_settings(&self) -> BoxFuture<'static, RemoteResult<Settings>> {
        let source = self.clone();
        Box::pin(async move { source.read("settings", |data| data.settings) })
    }

    fn write_settings(&self, patch: SettingsPatch) -> BoxFuture<'static, RemoteResult<()>> {
        let source = self.clone();
        Box::pin(async move {
            source.read("settings", |_| ())?;
            source.write(|data| patch.apply_to(&mut data.settings));
            source.counters.settings_writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}
