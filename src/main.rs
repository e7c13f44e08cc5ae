//! Arena Sync binary entrypoint wiring the remote source, the sync core and the REST/SSE layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arena_sync::{
    config::AppConfig,
    dao::{memory::MemoryRemoteSource, remote::RemoteSource},
    routes,
    services::sync_service,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let source = remote_source(&config)?;
    let app_state = AppState::new(config, source);

    let sync = sync_service::start(&app_state).await;
    // Build the HTTP router once the shared state is hydrated.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    sync.stop();
    Ok(())
}

/// Pick the REST remote source when an endpoint is configured, the in-memory one otherwise.
#[cfg(feature = "rest-remote")]
fn remote_source(config: &AppConfig) -> anyhow::Result<Arc<dyn RemoteSource>> {
    use arena_sync::dao::rest::{RestConfig, RestError, RestRemoteSource};

    match RestConfig::from_endpoint(config.remote())
        .map(|rest| rest.with_timeout(config.request_timeout()))
    {
        Ok(rest) => {
            let base_url = rest.base_url.clone();
            let source = RestRemoteSource::new(rest).context("building REST remote source")?;
            info!(%base_url, "using REST remote source");
            Ok(Arc::new(source))
        }
        Err(RestError::MissingBaseUrl) => Ok(memory_source()),
        Err(err) => Err(err).context("configuring REST remote source"),
    }
}

#[cfg(not(feature = "rest-remote"))]
fn remote_source(_config: &AppConfig) -> anyhow::Result<Arc<dyn RemoteSource>> {
    Ok(memory_source())
}

fn memory_source() -> Arc<dyn RemoteSource> {
    warn!("no remote endpoint configured; serving from an empty in-memory source");
    Arc::new(MemoryRemoteSource::new())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
