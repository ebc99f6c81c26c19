// 💳 Card Entity - tokenized account number
//
// The clear PAN is never stored: only the salted hash (dedup key) and the
// last four digits for display.

use super::status::StatusRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: Option<Uuid>,

    /// Owning batch; None for cards registered one at a time
    pub batch_id: Option<Uuid>,
    pub batch_sequence_number: Option<String>,

    pub card_hash: String,
    pub card_last4: String,

    pub status: Option<StatusRef>,

    /// Set by storage on insert
    pub created_date: Option<DateTime<Utc>>,
}

impl Card {
    pub fn new(card_hash: String, card_last4: String, status: StatusRef) -> Self {
        Card {
            id: None,
            batch_id: None,
            batch_sequence_number: None,
            card_hash,
            card_last4,
            status: Some(status),
            created_date: None,
        }
    }

    /// Builder: record the sequence number from the source line
    pub fn with_sequence_number(mut self, sequence: String) -> Self {
        self.batch_sequence_number = Some(sequence);
        self
    }
}
