// 🔐 Card Hasher - salted SHA-256 tokenization
//
// hash = hex(SHA-256(trim(card_number) + salt))
// Only surrounding whitespace is trimmed: "4111 1111..." and "41111111..."
// are different tokens.

use sha2::{Digest, Sha256};

#[derive(Clone)]
pub struct CardHasher {
    salt: String,
}

impl CardHasher {
    pub fn new(salt: impl Into<String>) -> Self {
        CardHasher { salt: salt.into() }
    }

    /// Deterministic 64-char lowercase hex token for a card number
    pub fn hash(&self, card_number: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(card_number.trim().as_bytes());
        hasher.update(self.salt.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Last four characters, for display only
    ///
    /// Inputs shorter than four characters (and absent input) come back unchanged.
    pub fn last4<'a>(&self, card_number: impl Into<Option<&'a str>>) -> Option<&'a str> {
        let card_number = card_number.into()?;
        let len = card_number.chars().count();
        if len < 4 {
            return Some(card_number);
        }

        let start = card_number
            .char_indices()
            .nth(len - 4)
            .map(|(i, _)| i)
            .unwrap_or(0);
        Some(&card_number[start..])
    }
}

// The salt is deployment secret material
impl std::fmt::Debug for CardHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardHasher").field("salt", &"<redacted>").finish()
    }
}
