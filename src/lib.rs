//! Library crate for arena-sync, exposing modules for binaries and integration tests.

/// Configuration file and environment loading.
pub mod config;
/// Remote data sources and the persisted flags record.
pub mod dao;
/// HTTP request and response bodies.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// Axum routers.
pub mod routes;
/// Sync core services and HTTP-facing service functions.
pub mod services;
/// Process-wide state: bus, cache and competition store.
pub mod state;
