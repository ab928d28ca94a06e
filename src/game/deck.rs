//! Deck Engine
//!
//! Deterministic shuffle from a combined seed, front-of-deck dealing and
//! blackjack hand scoring. The shuffle is a pure function of the seed so a
//! verifier can rebuild the exact deck a round was played with.

use serde::{Deserialize, Serialize};

use crate::core::hash::HashValue;
use crate::core::rng::DeterministicRng;
use crate::game::card::{Card, Rank, Suit};

/// Cards in a standard deck.
pub const DECK_SIZE: usize = 52;

/// Blackjack target total.
pub const BLACKJACK: u32 = 21;

/// Deck errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeckError {
    /// Not enough cards left to satisfy a deal.
    #[error("Deck exhausted: requested {requested}, remaining {remaining}")]
    Exhausted {
        /// Cards requested.
        requested: usize,
        /// Cards left.
        remaining: usize,
    },
}

/// An ordered deck with a deal position.
///
/// Cards before `position` have been dealt; the rest remain in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deck {
    cards: Vec<Card>,
    position: usize,
}

impl Deck {
    /// Unshuffled deck: suits ♠ ♥ ♦ ♣, ranks A..K within each suit.
    pub fn standard() -> Self {
        let mut cards = Vec::with_capacity(DECK_SIZE);
        for suit in Suit::ALL {
            for rank in Rank::ALL {
                cards.push(Card::new(rank, suit));
            }
        }
        Self { cards, position: 0 }
    }

    /// Shuffled deck for a combined seed.
    pub fn shuffled(seed: &HashValue) -> Self {
        shuffle(seed)
    }

    /// Rebuild the deck for `seed` with the first `dealt` cards already drawn.
    pub fn resume(seed: &HashValue, dealt: usize) -> Result<Self, DeckError> {
        let mut deck = shuffle(seed);
        if dealt > DECK_SIZE {
            return Err(DeckError::Exhausted { requested: dealt, remaining: DECK_SIZE });
        }
        deck.position = dealt;
        Ok(deck)
    }

    /// Remove `count` cards from the front.
    pub fn deal(&mut self, count: usize) -> Result<Vec<Card>, DeckError> {
        let remaining = self.remaining();
        if count > remaining {
            return Err(DeckError::Exhausted { requested: count, remaining });
        }
        let cards = self.cards[self.position..self.position + count].to_vec();
        self.position += count;
        Ok(cards)
    }

    /// Remove one card from the front.
    pub fn draw(&mut self) -> Result<Card, DeckError> {
        let card = *self.cards.get(self.position).ok_or(DeckError::Exhausted {
            requested: 1,
            remaining: 0,
        })?;
        self.position += 1;
        Ok(card)
    }

    /// Cards left to deal.
    pub fn remaining(&self) -> usize {
        self.cards.len() - self.position
    }

    /// Cards dealt so far.
    pub fn dealt(&self) -> usize {
        self.position
    }

    /// Full deck order, including dealt cards.
    pub fn order(&self) -> &[Card] {
        &self.cards
    }

    /// Deck with a fixed top-down order (for scripted hands).
    #[cfg(test)]
    pub(crate) fn stacked(cards: Vec<Card>) -> Self {
        Self { cards, position: 0 }
    }
}

/// Build the 52-card deck and apply a seeded Fisher-Yates permutation.
pub fn shuffle(seed: &HashValue) -> Deck {
    let mut deck = Deck::standard();
    let mut rng = DeterministicRng::from_seed_bytes(seed);
    rng.shuffle(&mut deck.cards);
    deck
}

/// Blackjack score of a set of cards.
///
/// Aces count 11; while the total exceeds 21 and an ace still counts 11,
/// one such ace is re-counted as 1.
pub fn score(cards: &[Card]) -> u32 {
    score_detail(cards).0
}

/// Score plus whether an ace is still counted as 11 (soft hand).
pub fn score_detail(cards: &[Card]) -> (u32, bool) {
    let mut total: u32 = cards.iter().map(Card::value).sum();
    let mut high_aces = cards.iter().filter(|c| c.is_ace()).count();

    while total > BLACKJACK && high_aces > 0 {
        total -= 10;
        high_aces -= 1;
    }

    (total, high_aces > 0)
}

/// An ordered hand of cards. The score is always derived from the cards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hand {
    cards: Vec<Card>,
}

impl Hand {
    /// Empty hand.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand holding the given cards.
    pub fn from_cards(cards: Vec<Card>) -> Self {
        Self { cards }
    }

    /// Add a card.
    pub fn push(&mut self, card: Card) {
        self.cards.push(card);
    }

    /// Cards in deal order.
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Number of cards.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// No cards dealt yet?
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Current score.
    pub fn score(&self) -> u32 {
        score(&self.cards)
    }

    /// Is an ace counted as 11?
    pub fn is_soft(&self) -> bool {
        score_detail(&self.cards).1
    }

    /// Over 21?
    pub fn is_bust(&self) -> bool {
        self.score() > BLACKJACK
    }

    /// Two-card 21.
    pub fn is_natural(&self) -> bool {
        self.cards.len() == 2 && self.score() == BLACKJACK
    }

    /// Drop all cards.
    pub fn clear(&mut self) {
        self.cards.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================
