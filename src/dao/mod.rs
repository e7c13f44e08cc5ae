/// Persisted event-day flags shared between processes.
pub mod flags;
/// In-memory remote source.
pub mod memory;
/// Rows exchanged with the remote data service.
pub mod models;
/// Remote data service abstraction.
pub mod remote;
/// PostgREST-style remote source.
#[cfg(feature = "rest-remote")]
pub mod rest;
