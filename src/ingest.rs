// 📥 Batch Ingestion - header check, idempotence, card streaming, finalize
//
// Lifecycle driven by one call over one stream:
//   header → lookup (code, file name)
//     existing RECEIVED / PROCESSED        → no-op
//     existing FAILED / PARTIALLY_PROCESSED → reprocess under the same id
//     none                                 → new batch
//   save RECEIVED → card lines until trailer/EOF → save PROCESSED | PARTIALLY_PROCESSED
//
// FAILED is never written here. It is assigned outside the engine after an
// aborted attempt, and is what makes a batch eligible for reprocessing.
// The lookup-then-write check is not atomic across concurrent calls; the
// storage unique constraint on (batch_code, file_name) is the backstop.

use crate::entities::{Batch, BatchStatus, CardStatus, StatusKind, StatusRef};
use crate::error::IngestError;
use crate::hasher::CardHasher;
use crate::parser::{is_trailer, BatchParser};
use crate::repository::{BatchRepository, CardRepository, StatusRepository};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, BufReader, Read};
use tracing::{debug, info, warn};
use uuid::Uuid;

const READ_BUFFER_SIZE: usize = 64 * 1024;

// ============================================================================
// TEXT ENCODING
// ============================================================================

/// Declared encoding of an incoming batch file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextEncoding {
    /// Strict: malformed sequences fail the ingestion
    #[default]
    Utf8,
    /// ISO-8859-1, every byte maps to the code point of the same value
    Latin1,
}

impl TextEncoding {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(TextEncoding::Utf8),
            "latin1" | "latin-1" | "iso-8859-1" | "iso8859-1" => Some(TextEncoding::Latin1),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Latin1 => "iso-8859-1",
        }
    }

    fn decode(&self, bytes: Vec<u8>) -> io::Result<String> {
        match self {
            TextEncoding::Utf8 => {
                String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            }
            TextEncoding::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
        }
    }
}

/// Reads and decodes one line at a time, so nothing past the last line
/// requested is ever decoded
struct LineReader<R> {
    reader: R,
    encoding: TextEncoding,
}

impl<R: BufRead> LineReader<R> {
    fn new(reader: R, encoding: TextEncoding) -> Self {
        LineReader { reader, encoding }
    }

    /// Next line without its `\n` / `\r\n` terminator; None at end of stream
    fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = Vec::new();
        if self.reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }

        self.encoding.decode(buf).map(Some)
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

/// Counters and final state of a completed ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub batch_id: Option<Uuid>,
    pub batch_code: String,
    pub file_name: String,
    pub status: String,
    pub expected_records: i32,
    pub processed_records: i32,
    /// Cards written by this call
    pub new_cards: usize,
    /// Valid lines whose hash was already stored (counted as processed)
    pub duplicate_cards: usize,
    /// Malformed lines and invalid card numbers (not counted)
    pub skipped_lines: usize,
    pub reprocessed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// Batch already RECEIVED or PROCESSED; nothing past the header was read
    AlreadyIngested { batch: Batch },
    Completed(IngestReport),
}

impl IngestOutcome {
    pub fn summary(&self) -> String {
        match self {
            IngestOutcome::AlreadyIngested { batch } => format!(
                "Batch {} ({}) already {}, nothing to do",
                batch.batch_code,
                batch.file_name,
                batch.status_name().unwrap_or("UNKNOWN")
            ),
            IngestOutcome::Completed(report) => format!(
                "Batch {} ({}) {}: {}/{} records, {} new cards, {} duplicates, {} skipped lines",
                report.batch_code,
                report.file_name,
                report.status,
                report.processed_records,
                report.expected_records,
                report.new_cards,
                report.duplicate_cards,
                report.skipped_lines
            ),
        }
    }
}

// ============================================================================
// INGEST SERVICE
// ============================================================================

/// Resolved batch status rows for one ingestion
struct BatchStatuses {
    received: StatusRef,
    processed: StatusRef,
    partially_processed: StatusRef,
    failed: StatusRef,
}

pub struct BatchIngestService<'a> {
    parser: BatchParser<'a>,
    batches: &'a dyn BatchRepository,
    cards: &'a dyn CardRepository,
    statuses: &'a dyn StatusRepository,
}

impl<'a> BatchIngestService<'a> {
    pub fn new(
        parser: BatchParser<'a>,
        batches: &'a dyn BatchRepository,
        cards: &'a dyn CardRepository,
        statuses: &'a dyn StatusRepository,
    ) -> Self {
        BatchIngestService {
            parser,
            batches,
            cards,
            statuses,
        }
    }

    /// Wire every port to one store
    pub fn with_store<S>(hasher: CardHasher, store: &'a S) -> Self
    where
        S: BatchRepository + CardRepository + StatusRepository,
    {
        Self::new(BatchParser::new(hasher, store), store, store, store)
    }

    /// Ingest one batch file
    ///
    /// Returns `AlreadyIngested` when the batch needs no work. Header errors,
    /// read/decode failures, and storage failures are returned as errors; any
    /// writes already made are left for the caller's transaction to roll back.
    pub fn ingest<R: Read>(
        &self,
        input: R,
        encoding: TextEncoding,
    ) -> Result<IngestOutcome, IngestError> {
        // The reader is owned here and dropped on every return path
        let mut lines = LineReader::new(BufReader::with_capacity(READ_BUFFER_SIZE, input), encoding);

        let header = lines.next_line()?;
        let mut batch = self.parser.parse_header(header.as_deref())?;

        let statuses = self.resolve_batch_statuses()?;
        let valid = self.resolve_status(StatusKind::Card, CardStatus::Valid.as_str())?;

        let existing = self
            .batches
            .find_by_code_and_file_name(&batch.batch_code, &batch.file_name)?;

        let reprocessed = match existing {
            Some(existing)
                if !existing.has_status(&statuses.failed)
                    && !existing.has_status(&statuses.partially_processed) =>
            {
                info!(
                    batch_code = %existing.batch_code,
                    file_name = %existing.file_name,
                    status = existing.status_name().unwrap_or("UNKNOWN"),
                    "Batch already ingested, skipping"
                );
                return Ok(IngestOutcome::AlreadyIngested { batch: existing });
            }
            Some(existing) => {
                info!(
                    batch_code = %existing.batch_code,
                    file_name = %existing.file_name,
                    status = existing.status_name().unwrap_or("UNKNOWN"),
                    "Reprocessing batch"
                );
                batch.id = existing.id;
                true
            }
            None => {
                info!(batch_code = %batch.batch_code, file_name = %batch.file_name, "New batch");
                false
            }
        };

        // Durable checkpoint before any card is touched
        batch.status = Some(statuses.received.clone());
        let mut batch = self.batches.save_batch(batch)?;

        let mut processed_records: i32 = 0;
        let mut new_cards = 0;
        let mut duplicate_cards = 0;
        let mut skipped_lines = 0;

        while let Some(line) = lines.next_line()? {
            if line.trim().is_empty() {
                continue;
            }

            if is_trailer(&line, &batch.batch_code) {
                debug!(batch_code = %batch.batch_code, "Trailer reached");
                break;
            }

            let Some(mut card) = self.parser.parse_card_line(line.as_str())? else {
                skipped_lines += 1;
                continue;
            };

            if self.cards.find_by_hash(&card.card_hash)?.is_none() {
                card.batch_id = batch.id;
                card.status = Some(valid.clone());
                self.cards.save_card(card)?;
                new_cards += 1;
            } else {
                debug!(
                    sequence = card.batch_sequence_number.as_deref().unwrap_or(""),
                    last4 = %card.card_last4,
                    "Card already stored"
                );
                duplicate_cards += 1;
            }

            processed_records += 1;
        }

        batch.processing_date = Some(Utc::now());
        batch.processed_records = Some(processed_records);
        batch.status = Some(if batch.expected_records == processed_records {
            statuses.processed.clone()
        } else {
            statuses.partially_processed.clone()
        });

        let batch = self.batches.save_batch(batch)?;

        let report = IngestReport {
            batch_id: batch.id,
            batch_code: batch.batch_code.clone(),
            file_name: batch.file_name.clone(),
            status: batch.status_name().unwrap_or_default().to_string(),
            expected_records: batch.expected_records,
            processed_records,
            new_cards,
            duplicate_cards,
            skipped_lines,
            reprocessed,
        };

        if batch.has_status(&statuses.partially_processed) {
            warn!(
                batch_code = %report.batch_code,
                expected = report.expected_records,
                processed = report.processed_records,
                "Batch partially processed"
            );
        } else {
            info!(
                batch_code = %report.batch_code,
                processed = report.processed_records,
                new_cards = report.new_cards,
                "Batch processed"
            );
        }

        Ok(IngestOutcome::Completed(report))
    }

    fn resolve_batch_statuses(&self) -> Result<BatchStatuses, IngestError> {
        Ok(BatchStatuses {
            received: self.resolve_status(StatusKind::Batch, BatchStatus::Received.as_str())?,
            processed: self.resolve_status(StatusKind::Batch, BatchStatus::Processed.as_str())?,
            partially_processed: self
                .resolve_status(StatusKind::Batch, BatchStatus::PartiallyProcessed.as_str())?,
            failed: self.resolve_status(StatusKind::Batch, BatchStatus::Failed.as_str())?,
        })
    }

    fn resolve_status(&self, kind: StatusKind, name: &str) -> Result<StatusRef, IngestError> {
        self.statuses
            .find_status_by_name(kind, name)?
            .ok_or_else(|| IngestError::MissingStatus {
                kind,
                name: name.to_string(),
            })
    }
}

// ============================================================================
// TESTS
// ============================================================================
