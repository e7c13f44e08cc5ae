/// Trailing-edge debounce for bursty refetch triggers.
pub mod debounce;
/// OpenAPI documentation generation.
pub mod documentation;
/// Bus and multi-tab bridges into the refetch and merge paths.
pub mod event_bridge;
/// Cache-backed remote reads.
pub mod fetchers;
/// Health check service.
pub mod health_service;
/// Per-table push subscriptions and the in-process push transport.
pub mod realtime;
/// Team and competition listings with competition filtering.
pub mod roster;
/// Remote settings collaborator.
pub mod settings;
/// Server-Sent Events streaming of bus topics to tabs.
pub mod sse_service;
/// Competition state reads and settings updates.
pub mod state_service;
/// Refresh paths and start-up wiring.
pub mod sync_service;
