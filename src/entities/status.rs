// 🏷️ Status reference data
//
// Statuses live in storage as rows with stable ids. The enums below only name
// them; the id a batch or card points at always comes from a lookup.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which reference table a status name belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusKind {
    Batch,
    Card,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusKind::Batch => write!(f, "batch"),
            StatusKind::Card => write!(f, "card"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    Received,
    Processed,
    PartiallyProcessed,
    /// Assigned outside the ingest engine after an aborted attempt
    Failed,
}

impl BatchStatus {
    pub const ALL: [BatchStatus; 4] = [
        BatchStatus::Received,
        BatchStatus::Processed,
        BatchStatus::PartiallyProcessed,
        BatchStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Received => "RECEIVED",
            BatchStatus::Processed => "PROCESSED",
            BatchStatus::PartiallyProcessed => "PARTIALLY_PROCESSED",
            BatchStatus::Failed => "FAILED",
        }
    }

    /// Id the seed data assigns to this status
    pub fn seed_id(&self) -> i64 {
        match self {
            BatchStatus::Received => 1,
            BatchStatus::Processed => 2,
            BatchStatus::PartiallyProcessed => 3,
            BatchStatus::Failed => 4,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardStatus {
    Valid,
    Invalid,
    Expired,
}

impl CardStatus {
    pub const ALL: [CardStatus; 3] = [CardStatus::Valid, CardStatus::Invalid, CardStatus::Expired];

    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Valid => "VALID",
            CardStatus::Invalid => "INVALID",
            CardStatus::Expired => "EXPIRED",
        }
    }

    pub fn seed_id(&self) -> i64 {
        match self {
            CardStatus::Valid => 1,
            CardStatus::Invalid => 2,
            CardStatus::Expired => 3,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

/// A status row as stored: storage-assigned id plus its name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRef {
    pub id: i64,
    pub name: String,
}

impl StatusRef {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        StatusRef {
            id,
            name: name.into(),
        }
    }

    /// Same stored row (identity comparison, names are informational)
    pub fn is(&self, other: &StatusRef) -> bool {
        self.id == other.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_status_names_round_trip() {
        for status in BatchStatus::ALL {
            assert_eq!(BatchStatus::from_name(status.as_str()), Some(status));
        }
        assert_eq!(BatchStatus::from_name("partially_processed"), None);
    }

    #[test]
    fn test_seed_ids_are_stable() {
        assert_eq!(BatchStatus::Received.seed_id(), 1);
        assert_eq!(BatchStatus::Failed.seed_id(), 4);
        assert_eq!(CardStatus::Valid.seed_id(), 1);
        assert_eq!(CardStatus::Expired.seed_id(), 3);
    }

    #[test]
    fn test_status_ref_compares_by_id() {
        let a = StatusRef::new(2, "PROCESSED");
        let b = StatusRef::new(2, "processed");
        let c = StatusRef::new(3, "PROCESSED");

        assert!(a.is(&b));
        assert!(!a.is(&c));
    }
}
