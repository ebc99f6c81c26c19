// 💳 Single-card registration and lookup
//
// Cards registered here carry no batch reference and no sequence number.

use crate::entities::{Card, CardStatus, StatusKind};
use crate::error::CardError;
use crate::hasher::CardHasher;
use crate::pan::is_valid_pan;
use crate::repository::{CardRepository, StatusRepository};
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub enum CardRegistration {
    Created(Card),
    AlreadyExists(Card),
}

impl CardRegistration {
    pub fn card(&self) -> &Card {
        match self {
            CardRegistration::Created(card) | CardRegistration::AlreadyExists(card) => card,
        }
    }
}

/// Store a card number unless its token is already known
pub fn register_card(
    card_number: &str,
    hasher: &CardHasher,
    cards: &dyn CardRepository,
    statuses: &dyn StatusRepository,
) -> Result<CardRegistration, CardError> {
    if !is_valid_pan(card_number) {
        return Err(CardError::InvalidCardNumber);
    }

    let card_hash = hasher.hash(card_number);
    if let Some(existing) = cards.find_by_hash(&card_hash)? {
        return Ok(CardRegistration::AlreadyExists(existing));
    }

    let valid = statuses
        .find_status_by_name(StatusKind::Card, CardStatus::Valid.as_str())?
        .ok_or_else(|| CardError::MissingStatus {
            kind: StatusKind::Card,
            name: CardStatus::Valid.as_str().to_string(),
        })?;

    let last4 = hasher.last4(card_number).unwrap_or_default().to_string();
    let card = cards.save_card(Card::new(card_hash, last4, valid))?;
    info!(last4 = %card.card_last4, "Card registered");

    Ok(CardRegistration::Created(card))
}

/// Find the stored card for a card number
pub fn find_card(
    card_number: &str,
    hasher: &CardHasher,
    cards: &dyn CardRepository,
) -> Result<Option<Card>, CardError> {
    if !is_valid_pan(card_number) {
        return Err(CardError::InvalidCardNumber);
    }

    Ok(cards.find_by_hash(&hasher.hash(card_number))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::MemoryStore;

    #[test]
    fn test_register_creates_card_without_batch() {
        let store = MemoryStore::new();
        let hasher = CardHasher::new("salt");

        let result = register_card("4111111111111111", &hasher, &store, &store).unwrap();

        let CardRegistration::Created(card) = result else {
            panic!("expected a new card");
        };
        assert!(card.id.is_some());
        assert!(card.created_date.is_some());
        assert_eq!(card.batch_id, None);
        assert_eq!(card.batch_sequence_number, None);
        assert_eq!(card.card_last4, "1111");
        assert_eq!(card.card_hash, hasher.hash("4111111111111111"));
    }

    #[test]
    fn test_register_twice_returns_existing() {
        let store = MemoryStore::new();
        let hasher = CardHasher::new("salt");

        let first = register_card("4111111111111111", &hasher, &store, &store).unwrap();
        let second = register_card("4111111111111111", &hasher, &store, &store).unwrap();

        assert!(matches!(second, CardRegistration::AlreadyExists(_)));
        assert_eq!(first.card(), second.card());
        assert_eq!(store.cards.borrow().len(), 1);
    }

    #[test]
    fn test_register_rejects_invalid_number() {
        let store = MemoryStore::new();
        let hasher = CardHasher::new("salt");

        let err = register_card("0000000000000", &hasher, &store, &store).unwrap_err();

        assert!(matches!(err, CardError::InvalidCardNumber));
        assert!(store.cards.borrow().is_empty());
    }

    #[test]
    fn test_find_card() {
        let store = MemoryStore::new();
        let hasher = CardHasher::new("salt");
        register_card("4111111111111111", &hasher, &store, &store).unwrap();

        let found = find_card("4111111111111111", &hasher, &store).unwrap();
        assert!(found.is_some());

        let missing = find_card("4222222222222", &hasher, &store).unwrap();
        assert_eq!(missing, None);

        assert!(matches!(
            find_card("4111a", &hasher, &store),
            Err(CardError::InvalidCardNumber)
        ));
    }
}
