use crate::ingest::TextEncoding;
use anyhow::{anyhow, Context, Result};
use dotenv::dotenv;
use std::env;
use std::path::PathBuf;

const DEFAULT_DATABASE_PATH: &str = "cards.db";
const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:3000";

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Per-deployment salt mixed into every card hash
    pub hash_salt: String,
    /// SQLite database file
    pub database_path: PathBuf,
    /// Bind address for the API server
    pub server_addr: String,
    /// Encoding assumed for batch files
    pub batch_encoding: TextEncoding,
}

impl AppConfig {
    /// Load configuration from environment variables (and `.env`)
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let hash_salt = lookup("CARD_HASH_SALT")
            .filter(|s| !s.is_empty())
            .context("CARD_HASH_SALT must be set")?;

        let database_path = lookup("DATABASE_PATH")
            .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string())
            .into();

        let server_addr =
            lookup("SERVER_ADDR").unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string());

        let batch_encoding = match lookup("BATCH_ENCODING") {
            Some(label) => TextEncoding::from_label(&label)
                .ok_or_else(|| anyhow!("Unsupported BATCH_ENCODING: {}", label))?,
            None => TextEncoding::default(),
        };

        Ok(Self {
            hash_salt,
            database_path,
            server_addr,
            batch_encoding,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[("CARD_HASH_SALT", "pepper")])).unwrap();

        assert_eq!(config.hash_salt, "pepper");
        assert_eq!(config.database_path, PathBuf::from("cards.db"));
        assert_eq!(config.server_addr, "0.0.0.0:3000");
        assert_eq!(config.batch_encoding, TextEncoding::Utf8);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("CARD_HASH_SALT", "pepper"),
            ("DATABASE_PATH", "/tmp/vault.db"),
            ("SERVER_ADDR", "127.0.0.1:8080"),
            ("BATCH_ENCODING", "latin1"),
        ]))
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/vault.db"));
        assert_eq!(config.server_addr, "127.0.0.1:8080");
        assert_eq!(config.batch_encoding, TextEncoding::Latin1);
    }

    #[test]
    fn test_salt_is_required() {
        assert!(AppConfig::from_lookup(lookup_from(&[])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("CARD_HASH_SALT", "")])).is_err());
    }

    #[test]
    fn test_rejects_unknown_encoding() {
        let result = AppConfig::from_lookup(lookup_from(&[
            ("CARD_HASH_SALT", "pepper"),
            ("BATCH_ENCODING", "ebcdic"),
        ]));
        assert!(result.is_err());
    }
}
