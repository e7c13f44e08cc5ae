use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Health check body.
pub mod health;
/// Push webhook bodies.
pub mod realtime;
/// Team and competition listing queries.
pub mod roster;
/// Competition state bodies.
pub mod state;

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
