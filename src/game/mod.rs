//! Game Logic Module
//!
//! Cards, the seeded deck and the blackjack rules. 100% deterministic
//! given the deck order.
//!
//! ## Module Structure
//!
//! - `card`: Ranks, suits, card values
//! - `deck`: Seeded shuffle, dealing, hand scoring
//! - `blackjack`: Betting, player actions, dealer policy, payouts

pub mod blackjack;
pub mod card;
pub mod deck;

// Re-export key types
pub use blackjack::{
    BetLimits, BlackjackGame, Draw, GameAction, GameError, GameStage, HandResult, Seat,
    DEALER_STAND_THRESHOLD, DEFAULT_STARTING_CHIPS,
};
pub use card::{Card, Rank, Suit};
pub use deck::{score, shuffle, Deck, DeckError, Hand, BLACKJACK, DECK_SIZE};
