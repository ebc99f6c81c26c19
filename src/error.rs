// ⚠️ Error taxonomy
// Structural and format errors abort an ingestion; per-record problems never reach here.

use crate::entities::StatusKind;
use thiserror::Error;

/// Fatal outcomes of a batch ingestion call.
///
/// Malformed data rows, invalid card numbers, and duplicate hashes are
/// absorbed by the ingest loop and only show up in the report counters.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Header line missing or shorter than the fixed header width
    #[error("Invalid header line.")]
    InvalidHeader,

    #[error("invalid expected record count '{value}' in header")]
    InvalidRecordCount {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("invalid file date '{value}' in header (expected yyyyMMdd)")]
    InvalidFileDate { value: String },

    /// Reference data row missing from storage
    #[error("{kind} status '{name}' is not configured")]
    MissingStatus { kind: StatusKind, name: String },

    #[error("failed to read batch stream")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl IngestError {
    /// True for errors caused by the submitted file itself rather than the environment
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            IngestError::InvalidHeader
                | IngestError::InvalidRecordCount { .. }
                | IngestError::InvalidFileDate { .. }
        )
    }
}

/// Failures of the single-card operations.
#[derive(Debug, Error)]
pub enum CardError {
    #[error("Card number is invalid.")]
    InvalidCardNumber,

    #[error("{kind} status '{name}' is not configured")]
    MissingStatus { kind: StatusKind, name: String },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
