//! Maps raw report rows onto the normalized event shape expected by the
//! ingestion endpoint.

use serde::{Deserialize, Serialize};

/// Report rows with this `type` value describe internal service traffic and
/// are excluded from forwarding.
pub const SERVICE_RECORD_TYPE: &str = "service";

/// Column positions of the event fields within a report row.
///
/// The remote report format is positional with no header-driven lookup; if
/// the provider reorders columns, this table is the only place to touch.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    pub to: usize,
    pub from: usize,
    pub channel: usize,
    pub message_id: usize,
    pub timestamp: usize,
    pub kind: usize,
    pub status: usize,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            to: 5,
            from: 4,
            channel: 8,
            message_id: 1,
            timestamp: 14,
            kind: 11,
            status: 16,
        }
    }
}

/// One forwarded event, serialized with the ingestion endpoint's wire keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub to: String,
    pub from: String,
    pub channel: String,
    #[serde(rename = "message_uuid")]
    pub message_id: String,
    #[serde(rename = "dateString")]
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
}

/// Produces a normalized event from a report row, or `None` for service
/// records.
///
/// Rows shorter than the highest mapped index yield empty-string fields with
/// no validation; the report format does not guarantee column counts and the
/// ingestion endpoint tolerates empty values.
pub fn normalize_row(columns: &ColumnMap, row: &[String]) -> Option<NormalizedEvent> {
    if field(row, columns.kind) == SERVICE_RECORD_TYPE {
        return None;
    }

    Some(NormalizedEvent {
        to: field(row, columns.to),
        from: field(row, columns.from),
        channel: field(row, columns.channel),
        message_id: field(row, columns.message_id),
        timestamp: field(row, columns.timestamp),
        kind: field(row, columns.kind),
        status: field(row, columns.status),
    })
}

fn field(row: &[String], index: usize) -> String {
    row.get(index).cloned().unwrap_or_default()
}
