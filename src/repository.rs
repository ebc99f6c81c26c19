// 🔌 Persistence ports
//
// The ingest engine only talks to storage through these traits. `db::SqliteStore`
// implements all of them; tests use the in-memory store below.

use crate::entities::{Batch, Card, StatusKind, StatusRef};
use anyhow::Result;
use uuid::Uuid;

pub trait BatchRepository {
    fn find_by_code_and_file_name(&self, batch_code: &str, file_name: &str)
        -> Result<Option<Batch>>;

    /// Insert when `batch.id` is None, otherwise update the row with that id
    fn save_batch(&self, batch: Batch) -> Result<Batch>;
}

pub trait CardRepository {
    fn find_by_hash(&self, card_hash: &str) -> Result<Option<Card>>;

    /// Insert a new card; assigns id and creation time
    fn save_card(&self, card: Card) -> Result<Card>;

    /// Reverse lookup of the cards a batch created
    fn find_by_batch(&self, batch_id: Uuid) -> Result<Vec<Card>>;
}

pub trait StatusRepository {
    /// Reference-data lookup; None means the status table is misconfigured
    fn find_status_by_name(&self, kind: StatusKind, name: &str) -> Result<Option<StatusRef>>;
}
