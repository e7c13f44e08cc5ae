use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::dao::{
    models::{
        Competition, LiveSession, LiveSessions, SessionPhase, Settings, SettingsPatch, Team,
        Variant,
    },
    remote::{RemoteResult, RemoteSource},
};

use super::{
    config::RestConfig,
    error::{RestError, RestResult},
};

const TEAMS: &str = "teams";
const COMPETITIONS: &str = "competitions";
const LIVE_SESSIONS: &str = "live_sessions";
const SETTINGS: &str = "settings";
/// The settings table holds a single row with this primary key.
const SETTINGS_ROW: &str = "eq.1";

/// Row shape of the live-session feed; the key is flattened into the map.
#[derive(Debug, Deserialize)]
struct LiveSessionRow {
    session_key: String,
    team_id: i64,
    phase: SessionPhase,
    started_at: String,
    arena_id: i64,
}

impl From<LiveSessionRow> for (String, LiveSession) {
    fn from(row: LiveSessionRow) -> Self {
        (
            row.session_key,
            LiveSession {
                team_id: row.team_id,
                phase: row.phase,
                started_at: row.started_at,
                arena_id: row.arena_id,
            },
        )
    }
}

/// Remote source speaking to a PostgREST-style endpoint (`/rest/v1/{table}`).
#[derive(Clone)]
pub struct RestRemoteSource {
    client: Client,
    base_url: Arc<str>,
    api_key: Option<Arc<str>>,
}

impl RestRemoteSource {
    /// Build the HTTP client. No request is sent until the first fetch.
    pub fn new(config: RestConfig) -> RestResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|source| RestError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::<str>::from(config.base_url.trim_end_matches('/')),
            api_key: config.api_key.map(Arc::<str>::from),
        })
    }

    fn request(&self, method: Method, table: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        let builder = self.client.request(method, url);
        if let Some(ref key) = self.api_key {
            builder.header("apikey", key.as_ref()).bearer_auth(key.as_ref())
        } else {
            builder
        }
    }

    async fn select<T>(&self, table: &str, columns: &str, filters: &[(&str, &str)]) -> RestResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, table)
            .query(&[("select", columns)])
            .query(filters)
            .send()
            .await
            .map_err(|source| RestError::RequestSend {
                path: table.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(RestError::RequestStatus {
                path: table.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|source| RestError::DecodeResponse {
                path: table.to_string(),
                source,
            })
    }

    async fn update<T>(&self, table: &str, filters: &[(&str, &str)], body: &T) -> RestResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PATCH, table)
            .query(filters)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await
            .map_err(|source| RestError::RequestSend {
                path: table.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(RestError::RequestStatus {
                path: table.to_string(),
                status: response.status(),
            })
        }
    }
}

fn team_columns(variant: Variant) -> &'static str {
    match variant {
        Variant::Minimal => "id,name,club,competition",
        Variant::Full => "*",
    }
}

fn competition_columns(variant: Variant) -> &'static str {
    match variant {
        Variant::Minimal => "id,slug,name",
        Variant::Full => "*",
    }
}

impl RemoteSource for RestRemoteSource {
    fn fetch_teams(&self, variant: Variant) -> BoxFuture<'static, RemoteResult<Vec<Team>>> {
        let source = self.clone();
        Box::pin(async move {
            source
                .select(TEAMS, team_columns(variant), &[("order", "id.asc")])
                .await
                .map_err(Into::into)
        })
    }

    fn fetch_competitions(
        &self,
        variant: Variant,
    ) -> BoxFuture<'static, RemoteResult<Vec<Competition>>> {
        let source = self.clone();
        Box::pin(async move {
            source
                .select(
                    COMPETITIONS,
                    competition_columns(variant),
                    &[("order", "id.asc")],
                )
                .await
                .map_err(Into::into)
        })
    }

    fn fetch_live_sessions(&self) -> BoxFuture<'static, RemoteResult<LiveSessions>> {
        let source = self.clone();
        Box::pin(async move {
            let rows = source
                .select::<LiveSessionRow>(
                    LIVE_SESSIONS,
                    "session_key,team_id,phase,started_at,arena_id",
                    &[("order", "started_at.asc")],
                )
                .await?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
    }

    fn read_settings(&self) -> BoxFuture<'static, RemoteResult<Settings>> {
        let source = self.clone();
        Box::pin(async move {
            let rows = source
                .select::<Settings>(
                    SETTINGS,
                    "event_day_started,profiles_locked",
                    &[("id", SETTINGS_ROW)],
                )
                .await?;
            rows.into_iter()
                .next()
                .ok_or(RestError::MissingRow { table: SETTINGS }.into())
        })
    }

    fn write_settings(&self, patch: SettingsPatch) -> BoxFuture<'static, RemoteResult<()>> {
        let source = self.clone();
        Box::pin(async move {
            source
                .update(SETTINGS, &[("id", SETTINGS_ROW)], &patch)
                .await
                .map_err(Into::into)
        })
    }
}
