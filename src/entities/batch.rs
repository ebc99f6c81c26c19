// 📦 Batch Entity - one submitted fixed-width file
//
// (batch_code, file_name) is the idempotence key. Storage enforces it as a
// unique constraint, the ingest lookup is only an early exit.

use super::status::StatusRef;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Assigned on first save; carried over when a batch is reprocessed
    pub id: Option<Uuid>,

    pub file_name: String,
    pub file_date: NaiveDate,
    pub batch_code: String,
    pub expected_records: i32,

    /// Unset until the batch is finalized
    pub processed_records: Option<i32>,
    pub processing_date: Option<DateTime<Utc>>,

    pub status: Option<StatusRef>,
}

impl Batch {
    /// Draft built from a header line, not yet persisted
    pub fn new(
        file_name: String,
        file_date: NaiveDate,
        batch_code: String,
        expected_records: i32,
    ) -> Self {
        Batch {
            id: None,
            file_name,
            file_date,
            batch_code,
            expected_records,
            processed_records: None,
            processing_date: None,
            status: None,
        }
    }

    pub fn status_name(&self) -> Option<&str> {
        self.status.as_ref().map(|s| s.name.as_str())
    }

    pub fn has_status(&self, status: &StatusRef) -> bool {
        self.status.as_ref().is_some_and(|s| s.is(status))
    }
}
