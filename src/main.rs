// Card Vault - command line interface
//
// Every subcommand opens the configured SQLite database, runs one library
// operation, and prints the result.

use anyhow::{anyhow, bail, Result};
use card_vault::{
    find_card, get_all_batches, import_file, open_database, register_card, AppConfig,
    BatchRepository, CardHasher, CardRegistration, CardRepository, IngestOutcome, SqliteStore,
    TextEncoding,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "card-vault", version, about = "Tokenized card storage with fixed-width batch import")]
struct Cli {
    /// SQLite database file (overrides DATABASE_PATH)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a fixed-width batch file
    Import {
        file: PathBuf,
        /// utf-8 or iso-8859-1 (defaults to BATCH_ENCODING)
        #[arg(long)]
        encoding: Option<String>,
    },
    /// Register a single card number
    Add { card_number: String },
    /// Look up the stored card for a card number
    Lookup { card_number: String },
    /// List persisted batches
    Batches,
    /// List the cards ingested from one batch
    Cards { batch_code: String, file_name: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(path) = cli.database {
        config.database_path = path;
    }

    let hasher = CardHasher::new(config.hash_salt.clone());
    let mut conn = open_database(&config.database_path)?;

    match cli.command {
        Command::Import { file, encoding } => {
            let encoding = match encoding {
                Some(label) => TextEncoding::from_label(&label)
                    .ok_or_else(|| anyhow!("Unsupported encoding: {}", label))?,
                None => config.batch_encoding,
            };

            println!("📂 Importing {} ({})", file.display(), encoding.label());
            let outcome = import_file(&mut conn, &hasher, &file, encoding)?;

            match &outcome {
                IngestOutcome::AlreadyIngested { .. } => println!("⏭️  {}", outcome.summary()),
                IngestOutcome::Completed(_) => println!("✓ {}", outcome.summary()),
            }
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Add { card_number } => {
            let store = SqliteStore::new(&conn);
            match register_card(&card_number, &hasher, &store, &store)? {
                CardRegistration::Created(card) => {
                    println!("✓ Card stored (****{})", card.card_last4);
                    println!("{}", serde_json::to_string_pretty(&card)?);
                }
                CardRegistration::AlreadyExists(card) => {
                    println!("⏭️  Card already stored (****{})", card.card_last4);
                    println!("{}", serde_json::to_string_pretty(&card)?);
                }
            }
        }
        Command::Lookup { card_number } => {
            let store = SqliteStore::new(&conn);
            match find_card(&card_number, &hasher, &store)? {
                Some(card) => match card.id {
                    Some(id) => println!("{}", id),
                    None => bail!("Stored card has no id"),
                },
                None => println!("not found"),
            }
        }
        Command::Batches => {
            let batches = get_all_batches(&conn)?;
            println!("{}", serde_json::to_string_pretty(&batches)?);
        }
        Command::Cards {
            batch_code,
            file_name,
        } => {
            let store = SqliteStore::new(&conn);
            let batch = store
                .find_by_code_and_file_name(&batch_code, &file_name)?
                .ok_or_else(|| anyhow!("Batch not found: {} ({})", batch_code, file_name))?;
            let batch_id = batch
                .id
                .ok_or_else(|| anyhow!("Stored batch has no id"))?;

            let cards = store.find_by_batch(batch_id)?;
            println!("{}", serde_json::to_string_pretty(&cards)?);
        }
    }

    Ok(())
}
