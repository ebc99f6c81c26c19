use crate::entities::{Batch, BatchStatus, Card, CardStatus, StatusKind, StatusRef};
use crate::error::IngestError;
use crate::hasher::CardHasher;
use crate::ingest::{BatchIngestService, IngestOutcome, TextEncoding};
use crate::repository::{BatchRepository, CardRepository, StatusRepository};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Reference data
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS batch_status (
            batch_status_id INTEGER PRIMARY KEY,
            batch_status_name TEXT UNIQUE NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS card_status (
            card_status_id INTEGER PRIMARY KEY,
            card_status_name TEXT UNIQUE NOT NULL
        )",
        [],
    )?;

    for status in BatchStatus::ALL {
        conn.execute(
            "INSERT OR IGNORE INTO batch_status (batch_status_id, batch_status_name) VALUES (?1, ?2)",
            params![status.seed_id(), status.as_str()],
        )?;
    }

    for status in CardStatus::ALL {
        conn.execute(
            "INSERT OR IGNORE INTO card_status (card_status_id, card_status_name) VALUES (?1, ?2)",
            params![status.seed_id(), status.as_str()],
        )?;
    }

    // ==========================================================================
    // Batches - (batch_code, file_name) is the re-submission key
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS batches (
            batch_id TEXT PRIMARY KEY,
            file_name TEXT NOT NULL,
            file_date TEXT,
            batch_code TEXT NOT NULL,
            expected_records INTEGER,
            processed_records INTEGER,
            processing_date TEXT,
            batch_status_id INTEGER REFERENCES batch_status(batch_status_id),
            CONSTRAINT uk_batches_batch_code_file_name UNIQUE (batch_code, file_name)
        )",
        [],
    )?;

    // ==========================================================================
    // Cards - card_hash is the dedup key
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cards (
            card_id TEXT PRIMARY KEY,
            batch_id TEXT REFERENCES batches(batch_id),
            batch_sequence_number TEXT,
            card_hash TEXT UNIQUE NOT NULL,
            card_last4 TEXT NOT NULL,
            card_status_id INTEGER REFERENCES card_status(card_status_id),
            created_date TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cards_batch_id ON cards(batch_id)",
        [],
    )?;

    Ok(())
}

/// Open (or create) the database file and make sure the schema exists
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// Every persistence port over one connection (or open transaction)
pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        SqliteStore { conn }
    }
}

const BATCH_COLUMNS: &str = "b.batch_id, b.file_name, b.file_date, b.batch_code,
    b.expected_records, b.processed_records, b.processing_date,
    s.batch_status_id, s.batch_status_name";

const CARD_COLUMNS: &str = "c.card_id, c.batch_id, c.batch_sequence_number, c.card_hash,
    c.card_last4, c.created_date, s.card_status_id, s.card_status_name";

impl BatchRepository for SqliteStore<'_> {
    fn find_by_code_and_file_name(
        &self,
        batch_code: &str,
        file_name: &str,
    ) -> Result<Option<Batch>> {
        let sql = format!(
            "SELECT {} FROM batches b
             LEFT JOIN batch_status s ON s.batch_status_id = b.batch_status_id
             WHERE b.batch_code = ?1 AND b.file_name = ?2",
            BATCH_COLUMNS
        );

        let batch = self
            .conn
            .query_row(&sql, params![batch_code, file_name], batch_from_row)
            .optional()
            .context("Failed to look up batch")?;

        Ok(batch)
    }

    fn save_batch(&self, mut batch: Batch) -> Result<Batch> {
        let id = *batch.id.get_or_insert_with(Uuid::new_v4);

        self.conn
            .execute(
                "INSERT INTO batches (
                    batch_id, file_name, file_date, batch_code, expected_records,
                    processed_records, processing_date, batch_status_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(batch_id) DO UPDATE SET
                    file_name = excluded.file_name,
                    file_date = excluded.file_date,
                    batch_code = excluded.batch_code,
                    expected_records = excluded.expected_records,
                    processed_records = excluded.processed_records,
                    processing_date = excluded.processing_date,
                    batch_status_id = excluded.batch_status_id",
                params![
                    id.to_string(),
                    batch.file_name,
                    batch.file_date.format(DATE_FORMAT).to_string(),
                    batch.batch_code,
                    batch.expected_records,
                    batch.processed_records,
                    batch.processing_date.map(|dt| dt.to_rfc3339()),
                    batch.status.as_ref().map(|s| s.id),
                ],
            )
            .with_context(|| format!("Failed to save batch {}", batch.batch_code))?;

        Ok(batch)
    }
}

impl CardRepository for SqliteStore<'_> {
    fn find_by_hash(&self, card_hash: &str) -> Result<Option<Card>> {
        let sql = format!(
            "SELECT {} FROM cards c
             LEFT JOIN card_status s ON s.card_status_id = c.card_status_id
             WHERE c.card_hash = ?1",
            CARD_COLUMNS
        );

        let card = self
            .conn
            .query_row(&sql, [card_hash], card_from_row)
            .optional()
            .context("Failed to look up card")?;

        Ok(card)
    }

    fn save_card(&self, mut card: Card) -> Result<Card> {
        let id = Uuid::new_v4();
        let created = Utc::now();

        self.conn
            .execute(
                "INSERT INTO cards (
                    card_id, batch_id, batch_sequence_number, card_hash,
                    card_last4, card_status_id, created_date
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.to_string(),
                    card.batch_id.map(|b| b.to_string()),
                    card.batch_sequence_number,
                    card.card_hash,
                    card.card_last4,
                    card.status.as_ref().map(|s| s.id),
                    created.to_rfc3339(),
                ],
            )
            .context("Failed to save card")?;

        card.id = Some(id);
        card.created_date = Some(created);
        Ok(card)
    }

    fn find_by_batch(&self, batch_id: Uuid) -> Result<Vec<Card>> {
        let sql = format!(
            "SELECT {} FROM cards c
             LEFT JOIN card_status s ON s.card_status_id = c.card_status_id
             WHERE c.batch_id = ?1
             ORDER BY c.rowid",
            CARD_COLUMNS
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let cards = stmt
            .query_map([batch_id.to_string()], card_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(cards)
    }
}

impl StatusRepository for SqliteStore<'_> {
    fn find_status_by_name(&self, kind: StatusKind, name: &str) -> Result<Option<StatusRef>> {
        let sql = match kind {
            StatusKind::Batch => {
                "SELECT batch_status_id, batch_status_name FROM batch_status WHERE batch_status_name = ?1"
            }
            StatusKind::Card => {
                "SELECT card_status_id, card_status_name FROM card_status WHERE card_status_name = ?1"
            }
        };

        let status = self
            .conn
            .query_row(sql, [name], |row| Ok(StatusRef::new(row.get(0)?, row.get::<_, String>(1)?)))
            .optional()
            .with_context(|| format!("Failed to look up {} status {}", kind, name))?;

        Ok(status)
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_uuid(idx: usize, value: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&value).map_err(|e| conversion_error(idx, e))
}

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn status_from_row(row: &Row, id_idx: usize) -> rusqlite::Result<Option<StatusRef>> {
    let id: Option<i64> = row.get(id_idx)?;
    let name: Option<String> = row.get(id_idx + 1)?;
    Ok(id.zip(name).map(|(id, name)| StatusRef::new(id, name)))
}

fn batch_from_row(row: &Row) -> rusqlite::Result<Batch> {
    let file_date: String = row.get(2)?;
    let processing_date: Option<String> = row.get(6)?;

    Ok(Batch {
        id: Some(parse_uuid(0, row.get(0)?)?),
        file_name: row.get(1)?,
        file_date: NaiveDate::parse_from_str(&file_date, DATE_FORMAT)
            .map_err(|e| conversion_error(2, e))?,
        batch_code: row.get(3)?,
        expected_records: row.get(4)?,
        processed_records: row.get(5)?,
        processing_date: processing_date.map(|s| parse_timestamp(6, s)).transpose()?,
        status: status_from_row(row, 7)?,
    })
}

fn card_from_row(row: &Row) -> rusqlite::Result<Card> {
    let batch_id: Option<String> = row.get(1)?;

    Ok(Card {
        id: Some(parse_uuid(0, row.get(0)?)?),
        batch_id: batch_id.map(|s| parse_uuid(1, s)).transpose()?,
        batch_sequence_number: row.get(2)?,
        card_hash: row.get(3)?,
        card_last4: row.get(4)?,
        created_date: Some(parse_timestamp(5, row.get(5)?)?),
        status: status_from_row(row, 6)?,
    })
}

// ============================================================================
// TRANSACTIONAL INGEST
// ============================================================================

/// Run one ingestion inside a single SQLite transaction
///
/// Commits on success (including the already-ingested no-op). Any error drops
/// the transaction, which rolls back the RECEIVED checkpoint and every card.
pub fn ingest_in_transaction<R: Read>(
    conn: &mut Connection,
    hasher: &CardHasher,
    input: R,
    encoding: TextEncoding,
) -> Result<IngestOutcome, IngestError> {
    let tx = conn.transaction().context("Failed to begin transaction")?;

    let outcome = {
        let store = SqliteStore::new(&tx);
        BatchIngestService::with_store(hasher.clone(), &store).ingest(input, encoding)?
    };

    tx.commit().context("Failed to commit batch")?;
    Ok(outcome)
}

/// Ingest a batch file from disk
pub fn import_file(
    conn: &mut Connection,
    hasher: &CardHasher,
    path: &Path,
    encoding: TextEncoding,
) -> Result<IngestOutcome, IngestError> {
    let file = File::open(path)?;
    ingest_in_transaction(conn, hasher, file, encoding)
}

// ============================================================================
// QUERIES
// ============================================================================

pub fn get_all_batches(conn: &Connection) -> Result<Vec<Batch>> {
    let sql = format!(
        "SELECT {} FROM batches b
         LEFT JOIN batch_status s ON s.batch_status_id = b.batch_status_id
         ORDER BY b.file_date DESC, b.batch_code",
        BATCH_COLUMNS
    );

    let mut stmt = conn.prepare(&sql)?;
    let batches = stmt
        .query_map([], batch_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(batches)
}

pub fn count_cards(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SALT: &str = "db-test-salt";

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn header(code: &str, expected: u32) -> String {
        format!("DESAFIO-HYPERATIVA           20180524{:<8}{:06}", code, expected)
    }

    fn card_line(sequence: &str, card_number: &str) -> String {
        format!("C{:<6}{:<19}{:<25}", sequence, card_number, "")
    }

    fn batch_file(code: &str, expected: u32, cards: &[&str]) -> Vec<u8> {
        let mut lines = vec![header(code, expected)];
        for (i, pan) in cards.iter().enumerate() {
            lines.push(card_line(&(i + 1).to_string(), pan));
        }
        lines.push(format!("{}{:06}", code, cards.len()));
        (lines.join("\n") + "\n").into_bytes()
    }

    fn draft(code: &str) -> Batch {
        Batch::new(
            "DESAFIO-HYPERATIVA".to_string(),
            NaiveDate::from_ymd_opt(2018, 5, 24).unwrap(),
            code.to_string(),
            2,
        )
    }

    fn status(store: &SqliteStore, kind: StatusKind, name: &str) -> StatusRef {
        store.find_status_by_name(kind, name).unwrap().unwrap()
    }

    #[test]
    fn test_setup_is_idempotent_and_seeds_statuses() {
        let conn = setup();
        setup_database(&conn).unwrap();
        let store = SqliteStore::new(&conn);

        for s in BatchStatus::ALL {
            let found = status(&store, StatusKind::Batch, s.as_str());
            assert_eq!(found, StatusRef::new(s.seed_id(), s.as_str()));
        }
        for s in CardStatus::ALL {
            let found = status(&store, StatusKind::Card, s.as_str());
            assert_eq!(found.id, s.seed_id());
        }

        assert_eq!(store.find_status_by_name(StatusKind::Card, "RECEIVED").unwrap(), None);
    }

    #[test]
    fn test_save_batch_inserts_then_updates_same_row() {
        let conn = setup();
        let store = SqliteStore::new(&conn);

        let mut batch = draft("LOTE0001");
        batch.status = Some(status(&store, StatusKind::Batch, "RECEIVED"));
        let mut batch = store.save_batch(batch).unwrap();
        let id = batch.id;
        assert!(id.is_some());

        batch.processed_records = Some(2);
        batch.processing_date = Some(Utc::now());
        batch.status = Some(status(&store, StatusKind::Batch, "PROCESSED"));
        store.save_batch(batch).unwrap();

        let found = store
            .find_by_code_and_file_name("LOTE0001", "DESAFIO-HYPERATIVA")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.processed_records, Some(2));
        assert!(found.processing_date.is_some());
        assert_eq!(found.status_name(), Some("PROCESSED"));
        assert_eq!(found.file_date, NaiveDate::from_ymd_opt(2018, 5, 24).unwrap());
        assert_eq!(get_all_batches(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_batch_code_and_file_name_are_unique() {
        let conn = setup();
        let store = SqliteStore::new(&conn);

        store.save_batch(draft("LOTE0001")).unwrap();
        // A second identity for the same key is what a racing ingestion would write
        assert!(store.save_batch(draft("LOTE0001")).is_err());
        assert!(store.save_batch(draft("LOTE0002")).is_ok());
    }

    #[test]
    fn test_card_hash_is_unique() {
        let conn = setup();
        let store = SqliteStore::new(&conn);
        let valid = status(&store, StatusKind::Card, "VALID");

        let saved = store
            .save_card(Card::new("hash-1".to_string(), "1111".to_string(), valid.clone()))
            .unwrap();
        assert!(saved.id.is_some());
        assert!(saved.created_date.is_some());

        assert!(store
            .save_card(Card::new("hash-1".to_string(), "2222".to_string(), valid))
            .is_err());

        let found = store.find_by_hash("hash-1").unwrap().unwrap();
        assert_eq!(found.id, saved.id);
        assert_eq!(found.card_last4, "1111");
        assert_eq!(found.batch_id, None);
        assert_eq!(found.status.map(|s| s.name), Some("VALID".to_string()));
    }

    #[test]
    fn test_ingest_in_transaction_commits() {
        let mut conn = setup();
        let hasher = CardHasher::new(SALT);
        let input = batch_file("LOTE0001", 2, &["4456897922969999", "4456897999999999"]);

        let outcome =
            ingest_in_transaction(&mut conn, &hasher, input.as_slice(), TextEncoding::Utf8)
                .unwrap();

        let IngestOutcome::Completed(report) = outcome else {
            panic!("expected completed ingestion");
        };
        assert_eq!(report.status, "PROCESSED");
        assert_eq!(count_cards(&conn).unwrap(), 2);

        let store = SqliteStore::new(&conn);
        let cards = store.find_by_batch(report.batch_id.unwrap()).unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].batch_sequence_number.as_deref(), Some("1"));
        assert_eq!(cards[1].card_last4, "9999");
    }

    #[test]
    fn test_resubmission_is_a_noop() {
        let mut conn = setup();
        let hasher = CardHasher::new(SALT);
        let input = batch_file("LOTE0001", 2, &["4456897922969999", "4456897999999999"]);

        ingest_in_transaction(&mut conn, &hasher, input.as_slice(), TextEncoding::Utf8).unwrap();
        let before = get_all_batches(&conn).unwrap();

        let outcome =
            ingest_in_transaction(&mut conn, &hasher, input.as_slice(), TextEncoding::Utf8)
                .unwrap();

        assert!(matches!(outcome, IngestOutcome::AlreadyIngested { .. }));
        assert_eq!(get_all_batches(&conn).unwrap(), before);
        assert_eq!(count_cards(&conn).unwrap(), 2);
    }

    #[test]
    fn test_failed_ingest_rolls_back_everything() {
        let mut conn = setup();
        let hasher = CardHasher::new(SALT);

        let mut input = batch_file("LOTE0001", 2, &["4456897922969999"]);
        // Undecodable line after the first card
        let trailer_at = input.len() - "LOTE0001000001\n".len();
        input.splice(trailer_at..trailer_at, [0xff, 0xfe, b'\n']);

        let result = ingest_in_transaction(&mut conn, &hasher, input.as_slice(), TextEncoding::Utf8);

        assert!(matches!(result, Err(IngestError::Io(_))));
        assert!(get_all_batches(&conn).unwrap().is_empty());
        assert_eq!(count_cards(&conn).unwrap(), 0);
    }

    #[test]
    fn test_partially_processed_batch_is_reprocessed_in_place() {
        let mut conn = setup();
        let hasher = CardHasher::new(SALT);

        // Header promises 3, file carries 2
        let short = batch_file("LOTE0001", 3, &["4456897922969999", "4456897999999999"]);
        let IngestOutcome::Completed(first) =
            ingest_in_transaction(&mut conn, &hasher, short.as_slice(), TextEncoding::Utf8)
                .unwrap()
        else {
            panic!("expected completed ingestion");
        };
        assert_eq!(first.status, "PARTIALLY_PROCESSED");

        let full = batch_file(
            "LOTE0001",
            3,
            &["4456897922969999", "4456897999999999", "5555666677778888"],
        );
        let IngestOutcome::Completed(second) =
            ingest_in_transaction(&mut conn, &hasher, full.as_slice(), TextEncoding::Utf8)
                .unwrap()
        else {
            panic!("expected completed ingestion");
        };

        assert!(second.reprocessed);
        assert_eq!(second.batch_id, first.batch_id);
        assert_eq!(second.status, "PROCESSED");
        assert_eq!(second.new_cards, 1);
        assert_eq!(second.duplicate_cards, 2);
        assert_eq!(get_all_batches(&conn).unwrap().len(), 1);
        assert_eq!(count_cards(&conn).unwrap(), 3);
    }

    #[test]
    fn test_import_file_from_disk() {
        let mut conn = setup();
        let hasher = CardHasher::new(SALT);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&batch_file("LOTE0007", 1, &["4111111111111111"]))
            .unwrap();
        file.flush().unwrap();

        let outcome = import_file(&mut conn, &hasher, file.path(), TextEncoding::Utf8).unwrap();

        assert!(matches!(outcome, IngestOutcome::Completed(_)));
        let store = SqliteStore::new(&conn);
        assert!(store
            .find_by_hash(&hasher.hash("4111111111111111"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_import_missing_file_is_io_error() {
        let mut conn = setup();
        let hasher = CardHasher::new(SALT);

        let result = import_file(
            &mut conn,
            &hasher,
            Path::new("/definitely/not/here.txt"),
            TextEncoding::Utf8,
        );
        assert!(matches!(result, Err(IngestError::Io(_))));
    }
}
