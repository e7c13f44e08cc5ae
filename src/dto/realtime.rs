use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::services::realtime::{ChangeKind, RowChange};

/// Row-level change posted by the remote data service's database webhook.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RowChangePayload {
    /// Operation, sent as `type` (`INSERT`, `UPDATE` or `DELETE`).
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    /// Row after the change; absent for deletes.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub record: Option<Value>,
    /// Row before the change, when the table replicates it.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub old_record: Option<Value>,
}

impl RowChangePayload {
    /// Attach the table name taken from the route.
    pub fn into_change(self, table: &str) -> RowChange {
        RowChange {
            table: table.to_string(),
            kind: self.kind,
            row: self.record.unwrap_or_else(|| Value::Object(Default::default())),
            old_row: self.old_record,
        }
    }
}

/// Acknowledgement of a pushed change.
#[derive(Debug, Serialize, ToSchema)]
pub struct PushAccepted {
    /// Number of open subscriptions the change was handed to.
    pub delivered: usize,
}
