use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Identifier of a live session inside the remote feed.
pub type SessionKey = String;

/// Complete live-session snapshot as pulled from the remote feed.
pub type LiveSessions = IndexMap<SessionKey, LiveSession>;

/// Remote collections cached by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// Registered teams.
    Teams,
    /// Competition categories.
    Competitions,
}

impl Resource {
    /// Tag used in cache keys and topic names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Teams => "teams",
            Resource::Competitions => "competitions",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Projection of a remote collection. Each variant is cached independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Identifying columns only.
    #[default]
    Minimal,
    /// Every column.
    Full,
}

impl Variant {
    /// Every projection, in refresh order.
    pub const ALL: [Variant; 2] = [Variant::Minimal, Variant::Full];

    /// Qualifier used in cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Minimal => "minimal",
            Variant::Full => "full",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Team registered for the competition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Team {
    /// Primary key.
    pub id: i64,
    /// Display name; placeholder names look like `TEAM-<n>`.
    pub name: String,
    /// Club or school the team comes from.
    #[serde(default)]
    pub club: Option<String>,
    /// Competition slug or display name, as entered at registration.
    #[serde(default)]
    pub competition: Option<String>,
    /// Member names. Empty in the minimal projection.
    #[serde(default)]
    pub members: Vec<String>,
}

/// Competition category (e.g. `line_follower`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Competition {
    /// Primary key.
    pub id: i64,
    /// Machine name used in links and filters.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Free-text rules summary.
    #[serde(default)]
    pub description: Option<String>,
}

/// Phase of a run on an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Robot is being set up on the arena.
    Warmup,
    /// Timed run in progress.
    Run,
    /// Judges are reviewing the run.
    Review,
    /// Any phase this build does not know about.
    #[serde(other)]
    Unknown,
}

/// Row of the live-session feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LiveSession {
    /// Team on the arena.
    pub team_id: i64,
    /// Where the run stands.
    pub phase: SessionPhase,
    /// Timestamp as sent by the remote service.
    pub started_at: String,
    /// Arena the session runs on.
    pub arena_id: i64,
}

/// Event-day flags stored in the remote settings row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Settings {
    /// Event day has been opened by an administrator.
    pub event_day_started: bool,
    /// Team profiles can no longer be edited.
    pub profiles_locked: bool,
}

/// Partial update of the remote settings row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    /// New `event_day_started` value, if changing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_day_started: Option<bool>,
    /// New `profiles_locked` value, if changing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profiles_locked: Option<bool>,
}

impl SettingsPatch {
    /// True when the patch carries no field.
    pub fn is_empty(&self) -> bool {
        self.event_day_started.is_none() && self.profiles_locked.is_none()
    }

    /// Apply the patch on top of `settings`.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(value) = self.event_day_started {
            settings.event_day_started = value;
        }
        if let Some(value) = self.profiles_locked {
            settings.profiles_locked = value;
        }
    }
}
