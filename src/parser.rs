// 🏗️ Batch Record Parser - fixed-width header and card lines
//
// Header (>= 51 chars):  [0:29] file name | [29:37] yyyyMMdd | [37:45] batch code | [45:51] record count
// Card line (>= 51 chars): [1:7] sequence number | [7:26] card number
//
// Offsets are character positions, end-exclusive.

use crate::entities::{Batch, Card, CardStatus, StatusKind};
use crate::error::IngestError;
use crate::hasher::CardHasher;
use crate::pan::is_valid_pan;
use crate::repository::StatusRepository;
use chrono::NaiveDate;
use tracing::debug;

/// Minimum width of both header and card lines
pub const MIN_LINE_LENGTH: usize = 51;

const FILE_NAME: (usize, usize) = (0, 29);
const FILE_DATE: (usize, usize) = (29, 37);
const BATCH_CODE: (usize, usize) = (37, 45);
const RECORD_COUNT: (usize, usize) = (45, 51);

const SEQUENCE_NUMBER: (usize, usize) = (1, 7);
const CARD_NUMBER: (usize, usize) = (7, 26);

/// Width of the batch code, and of the trailer prefix compared against it
pub const BATCH_CODE_WIDTH: usize = BATCH_CODE.1 - BATCH_CODE.0;

pub struct BatchParser<'s> {
    hasher: CardHasher,
    statuses: &'s dyn StatusRepository,
}

impl<'s> BatchParser<'s> {
    pub fn new(hasher: CardHasher, statuses: &'s dyn StatusRepository) -> Self {
        BatchParser { hasher, statuses }
    }

    pub fn hasher(&self) -> &CardHasher {
        &self.hasher
    }

    /// Decode the header line into an unsaved Batch draft
    ///
    /// Too short (or missing) is a structural error; a bad record count or
    /// date is a format error. The record count is checked first.
    pub fn parse_header<'a>(&self, line: impl Into<Option<&'a str>>) -> Result<Batch, IngestError> {
        let line = match line.into() {
            Some(line) if char_len(line) >= MIN_LINE_LENGTH => line,
            _ => return Err(IngestError::InvalidHeader),
        };

        let file_name = field(line, FILE_NAME).trim().to_string();
        let date_str = field(line, FILE_DATE);
        let batch_code = field(line, BATCH_CODE).trim().to_string();
        let record_count_str = field(line, RECORD_COUNT).trim();

        let expected_records: i32 =
            record_count_str
                .parse()
                .map_err(|source| IngestError::InvalidRecordCount {
                    value: record_count_str.to_string(),
                    source,
                })?;

        let file_date = parse_file_date(date_str)?;

        Ok(Batch::new(file_name, file_date, batch_code, expected_records))
    }

    /// Decode one card line into a VALID card candidate
    ///
    /// Returns Ok(None) for lines that are too short or whose card number is
    /// structurally invalid. Err only comes from the status lookup.
    pub fn parse_card_line<'a>(
        &self,
        line: impl Into<Option<&'a str>>,
    ) -> Result<Option<Card>, IngestError> {
        let line = match line.into() {
            Some(line) if char_len(line) >= MIN_LINE_LENGTH => line,
            _ => {
                debug!("Invalid card line.");
                return Ok(None);
            }
        };

        let sequence_number = field(line, SEQUENCE_NUMBER).trim();
        let card_number = field(line, CARD_NUMBER).trim();

        if !is_valid_pan(card_number) {
            debug!(sequence = sequence_number, "Invalid card number.");
            return Ok(None);
        }

        let card_hash = self.hasher.hash(card_number);
        let card_last4 = self.hasher.last4(card_number).unwrap_or_default().to_string();

        let valid = self
            .statuses
            .find_status_by_name(StatusKind::Card, CardStatus::Valid.as_str())?
            .ok_or_else(|| IngestError::MissingStatus {
                kind: StatusKind::Card,
                name: CardStatus::Valid.as_str().to_string(),
            })?;

        let card = Card::new(card_hash, card_last4, valid)
            .with_sequence_number(sequence_number.to_string());

        Ok(Some(card))
    }
}

/// True when the first 8 characters of `line` equal the batch code
pub fn is_trailer(line: &str, batch_code: &str) -> bool {
    char_len(line) >= BATCH_CODE_WIDTH && field(line, (0, BATCH_CODE_WIDTH)) == batch_code
}

fn parse_file_date(raw: &str) -> Result<NaiveDate, IngestError> {
    let invalid = || IngestError::InvalidFileDate {
        value: raw.to_string(),
    };

    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    NaiveDate::parse_from_str(raw, "%Y%m%d").map_err(|_| invalid())
}

fn char_len(line: &str) -> usize {
    line.chars().count()
}

/// Slice `line` by character positions; callers check the line is long enough
fn field(line: &str, (start, end): (usize, usize)) -> &str {
    let mut boundaries = line
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(line.len()));

    let from = boundaries.nth(start).unwrap_or(line.len());
    let to = boundaries.nth(end - start - 1).unwrap_or(line.len());
    &line[from..to]
}

// ============================================================================
// TESTS
// ============================================================================
