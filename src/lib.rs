// Card Vault - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod cards;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod hasher;
pub mod ingest;
pub mod pan;
pub mod parser;
pub mod repository;

// Re-export commonly used types
pub use cards::{find_card, register_card, CardRegistration};
pub use config::AppConfig;
pub use db::{
    count_cards, get_all_batches, import_file, ingest_in_transaction, open_database,
    setup_database, SqliteStore,
};
pub use entities::{Batch, BatchStatus, Card, CardStatus, StatusKind, StatusRef};
pub use error::{CardError, IngestError};
pub use hasher::CardHasher;
pub use ingest::{BatchIngestService, IngestOutcome, IngestReport, TextEncoding};
pub use pan::is_valid_pan;
pub use parser::BatchParser;
pub use repository::{BatchRepository, CardRepository, StatusRepository};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
