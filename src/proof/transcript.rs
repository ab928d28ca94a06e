//! Round Transcript
//!
//! Everything an outside party needs to re-check a finished round: both
//! commitment chains, both secrets, the cut, the claimed seed, the
//! ordered draw log and the player's moves. Serialized with bincode for storage and published as
//! JSON over the wire.

use serde::{Deserialize, Serialize};

use crate::core::hash::{hex_bytes, ChainHasher, HashValue, Secret};
use crate::game::blackjack::{Draw, GameAction, HandResult, Seat};
use crate::game::card::Card;

/// Current transcript version.
pub const TRANSCRIPT_VERSION: u8 = 1;

/// Domain separator for the transcript digest.
const TRANSCRIPT_DOMAIN: &[u8] = b"FAIR_BLACKJACK_TRANSCRIPT_V1";

/// Published record of one round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundTranscript {
    /// Version for forward compatibility.
    pub version: u8,

    /// Round identifier (UUID bytes).
    #[serde(with = "hex_bytes")]
    pub round_id: [u8; 16],

    /// House commitment `cv`.
    #[serde(with = "hex_bytes")]
    pub house_cv: HashValue,

    /// Player commitment `cv`.
    #[serde(with = "hex_bytes")]
    pub player_cv: HashValue,

    /// Revealed house secret.
    pub house_secret: Secret,

    /// Revealed player secret.
    pub player_secret: Secret,

    /// Cut submitted by the player.
    pub cut: u32,

    /// Seed the deck was shuffled with.
    #[serde(with = "hex_bytes")]
    pub seed: HashValue,

    /// Every card dealt, in order.
    pub draws: Vec<Draw>,

    /// Player moves after the initial deal, in order.
    pub moves: Vec<GameAction>,

    /// Final player hand.
    pub player_cards: Vec<Card>,

    /// Final dealer hand.
    pub dealer_cards: Vec<Card>,

    /// Final stake.
    pub bet: u64,

    /// Outcome, if the hand finished.
    pub result: Option<HandResult>,

    /// Chips credited at resolution.
    pub payout: u64,
}

impl RoundTranscript {
    /// Draws that went to one seat, in order.
    pub fn draws_for(&self, seat: Seat) -> Vec<Card> {
        self.draws
            .iter()
            .filter(|d| d.seat == seat)
            .map(|d| d.card)
            .collect()
    }

    /// Digest over every field, for publishing a compact fingerprint.
    pub fn digest(&self) -> HashValue {
        let mut hasher = ChainHasher::with_domain(TRANSCRIPT_DOMAIN);
        hasher.update_u8(self.version);
        hasher.update_bytes(&self.round_id);
        hasher.update_bytes(&self.house_cv);
        hasher.update_bytes(&self.player_cv);
        hasher.update_bytes(self.house_secret.as_bytes());
        hasher.update_bytes(self.player_secret.as_bytes());
        hasher.update_u32(self.cut);
        hasher.update_bytes(&self.seed);

        hasher.update_u32(self.draws.len() as u32);
        for draw in &self.draws {
            hasher.update_u8(seat_tag(draw.seat));
            hasher.update_u8(draw.card.index());
        }
        hasher.update_u32(self.moves.len() as u32);
        for action in &self.moves {
            hasher.update_u8(move_tag(*action));
        }
        for cards in [&self.player_cards, &self.dealer_cards] {
            hasher.update_u32(cards.len() as u32);
            for card in cards {
                hasher.update_u8(card.index());
            }
        }

        hasher.update_u64(self.bet);
        hasher.update_u8(match self.result {
            None => 0,
            Some(HandResult::Win) => 1,
            Some(HandResult::Lose) => 2,
            Some(HandResult::Push) => 3,
            Some(HandResult::Blackjack) => 4,
        });
        hasher.update_u64(self.payout);
        hasher.finalize()
    }

    /// Serialize to bytes using bincode.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TranscriptError> {
        bincode::serialize(self).map_err(|e| TranscriptError::Encode(e.to_string()))
    }

    /// Deserialize from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, TranscriptError> {
        bincode::deserialize(data).map_err(|e| TranscriptError::Decode(e.to_string()))
    }
}

fn seat_tag(seat: Seat) -> u8 {
    match seat {
        Seat::Player => 0,
        Seat::Dealer => 1,
    }
}

fn move_tag(action: GameAction) -> u8 {
    match action {
        GameAction::PlaceBet => 0,
        GameAction::Hit => 1,
        GameAction::Stand => 2,
        GameAction::DoubleDown => 3,
        GameAction::NewGame => 4,
    }
}

/// Transcript encoding errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranscriptError {
    /// Encoding failed.
    #[error("Transcript encoding failed: {0}")]
    Encode(String),

    /// Decoding failed.
    #[error("Transcript decoding failed: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::card::{Rank, Suit};

    fn sample() -> RoundTranscript {
        let house = Secret::from_bytes([1; 32]);
        let player = Secret::from_bytes([2; 32]);
        let p = Card::new(Rank::Ten, Suit::Clubs);
        let d = Card::new(Rank::Five, Suit::Hearts);
        RoundTranscript {
            version: TRANSCRIPT_VERSION,
            round_id: [7; 16],
            house_cv: house.commit().cv,
            player_cv: player.commit().cv,
            house_secret: house,
            player_secret: player,
            cut: 4,
            seed: [0; 32],
            draws: vec![
                Draw { seat: Seat::Player, card: p },
                Draw { seat: Seat::Dealer, card: d },
            ],
            moves: vec![GameAction::Stand],
            player_cards: vec![p],
            dealer_cards: vec![d],
            bet: 10,
            result: None,
            payout: 0,
        }
    }

    #[test]
    fn test_draws_for_seat() {
        let t = sample();
        assert_eq!(t.draws_for(Seat::Player), t.player_cards);
        assert_eq!(t.draws_for(Seat::Dealer), t.dealer_cards);
    }

    #[test]
    fn test_digest_changes_with_any_card() {
        let t = sample();
        let mut altered = t.clone();
        altered.draws[1].card = Card::new(Rank::Six, Suit::Hearts);
        assert_eq!(t.digest(), sample().digest());
        assert_ne!(t.digest(), altered.digest());

        let mut replayed = t.clone();
        replayed.moves = vec![GameAction::Hit];
        assert_ne!(t.digest(), replayed.digest());
    }

    #[test]
    fn test_json_hex_fields() {
        let t = sample();
        let value = serde_json::to_value(&t).unwrap();
        assert_eq!(value["house_secret"], "01".repeat(32));
        assert_eq!(value["house_cv"], hex::encode(t.house_cv));
        assert_eq!(value["round_id"], "07".repeat(16));
        assert_eq!(serde_json::from_value::<RoundTranscript>(value).unwrap(), t);
    }

    #[test]
    fn test_bytes_roundtrip() {
        let t = sample();
        let bytes = t.to_bytes().unwrap();
        assert_eq!(RoundTranscript::from_bytes(&bytes).unwrap(), t);
        assert!(matches!(
            RoundTranscript::from_bytes(&bytes[..3]),
            Err(TranscriptError::Decode(_))
        ));
    }
}
