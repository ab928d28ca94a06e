//! Verification Engine
//!
//! Re-derives the deck from the revealed secrets and the logged cut, checks
//! the recorded play against it card by card, then replays the hand with the
//! rules engine. The player's logged moves are the only free input; seats,
//! dealer draws, stake, result and payout must all come out identical. Any
//! discrepancy is a `Tampered` verdict.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::hash::{self, hex_bytes, HashValue};
use crate::core::rng::derive_combined_seed;
use crate::game::blackjack::{
    BetLimits, BlackjackGame, GameAction, GameError, HandResult, Seat,
};
use crate::game::card::Card;
use crate::game::deck::{shuffle, Deck, DECK_SIZE};
use crate::proof::commitment::Party;
use crate::proof::transcript::{RoundTranscript, TRANSCRIPT_VERSION};

/// Outcome of verifying a round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Recorded play matches the committed randomness.
    Verified,
    /// Recorded play deviates; carries the first discrepancy found.
    Tampered(TamperEvidence),
}

impl Verdict {
    /// Did the round verify?
    pub fn is_verified(&self) -> bool {
        matches!(self, Verdict::Verified)
    }
}

/// First discrepancy found during verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TamperEvidence {
    /// Unknown transcript version.
    VersionMismatch {
        /// Supported version.
        expected: u8,
        /// Transcript version.
        got: u8,
    },

    /// A revealed secret does not open its commitment.
    ChainBroken {
        /// Party whose chain fails.
        party: Party,
    },

    /// Recorded seed differs from the one derived from the reveals and cut.
    SeedMismatch {
        /// Derived seed.
        #[serde(with = "hex_bytes")]
        expected: HashValue,
        /// Recorded seed.
        #[serde(with = "hex_bytes")]
        recorded: HashValue,
    },

    /// More draws than the deck holds.
    TooManyDraws {
        /// Recorded draw count.
        recorded: usize,
    },

    /// A recorded card is not the card at that deck position.
    DrawMismatch {
        /// Deck position.
        index: usize,
        /// Card the shuffle puts there.
        expected: Card,
        /// Card that was recorded.
        recorded: Card,
    },

    /// A draw went to the wrong seat.
    SeatMismatch {
        /// Draw position.
        index: usize,
        /// Seat the deal order gives it to.
        expected: Seat,
        /// Seat that was recorded.
        recorded: Seat,
    },

    /// The rules engine rejects a logged step. Step 0 is the opening deal,
    /// step `n` is the `n`-th logged move.
    IllegalMove {
        /// Step in the replay.
        step: usize,
        /// Rejected action.
        action: GameAction,
    },

    /// Draw count differs from what the dealer policy and the logged moves
    /// produce, e.g. an extra dealer hit on 17.
    PolicyViolation {
        /// Draws the replay makes.
        expected: usize,
        /// Draws recorded.
        recorded: usize,
    },

    /// A final hand is not exactly its seat's draws.
    HandMismatch {
        /// Seat whose hand differs.
        seat: Seat,
    },

    /// Recorded stake differs from the replayed stake.
    BetMismatch {
        /// Replayed stake.
        expected: u64,
        /// Recorded stake.
        recorded: u64,
    },

    /// Recorded result or payout differs from the replayed settlement.
    OutcomeMismatch {
        /// Replayed result.
        expected: Option<HandResult>,
        /// Recorded result.
        recorded: Option<HandResult>,
        /// Replayed payout.
        expected_payout: u64,
        /// Recorded payout.
        recorded_payout: u64,
    },
}

impl fmt::Display for TamperEvidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VersionMismatch { expected, got } => {
                write!(f, "Version mismatch: expected {}, got {}", expected, got)
            }
            Self::ChainBroken { party } => {
                write!(f, "{} secret does not open its commitment", party)
            }
            Self::SeedMismatch { .. } => write!(f, "Combined seed mismatch"),
            Self::TooManyDraws { recorded } => {
                write!(f, "{} draws recorded from a {}-card deck", recorded, DECK_SIZE)
            }
            Self::DrawMismatch { index, expected, recorded } => write!(
                f,
                "Draw {} mismatch: expected {}, recorded {}",
                index, expected, recorded
            ),
            Self::SeatMismatch { index, expected, recorded } => write!(
                f,
                "Draw {} dealt to {:?}, deal order gives it to {:?}",
                index, recorded, expected
            ),
            Self::IllegalMove { step, action } => {
                write!(f, "Step {} ({}) rejected by the rules", step, action)
            }
            Self::PolicyViolation { expected, recorded } => write!(
                f,
                "{} draws recorded, rules produce {}",
                recorded, expected
            ),
            Self::HandMismatch { seat } => write!(f, "{:?} hand does not match draw log", seat),
            Self::BetMismatch { expected, recorded } => {
                write!(f, "Stake {} recorded, replay stakes {}", recorded, expected)
            }
            Self::OutcomeMismatch {
                expected,
                recorded,
                expected_payout,
                recorded_payout,
            } => write!(
                f,
                "Outcome {:?}/{} recorded, replay settles {:?}/{}",
                recorded, recorded_payout, expected, expected_payout
            ),
        }
    }
}

/// Verify a round transcript by re-deriving its deck.
pub fn verify_round(transcript: &RoundTranscript) -> Verdict {
    match check(transcript) {
        Ok(()) => Verdict::Verified,
        Err(evidence) => Verdict::Tampered(evidence),
    }
}

fn check(t: &RoundTranscript) -> Result<(), TamperEvidence> {
    if t.version != TRANSCRIPT_VERSION {
        return Err(TamperEvidence::VersionMismatch {
            expected: TRANSCRIPT_VERSION,
            got: t.version,
        });
    }

    // 1. Both chains open
    if !hash::verify(&t.house_secret, &t.house_cv) {
        return Err(TamperEvidence::ChainBroken { party: Party::House });
    }
    if !hash::verify(&t.player_secret, &t.player_cv) {
        return Err(TamperEvidence::ChainBroken { party: Party::Player });
    }

    // 2. Seed re-derives
    let expected = derive_combined_seed(&t.house_secret, &t.player_secret, t.cut);
    if expected != t.seed {
        return Err(TamperEvidence::SeedMismatch { expected, recorded: t.seed });
    }

    // 3. Every draw is the next card of the re-shuffled deck
    if t.draws.len() > DECK_SIZE {
        return Err(TamperEvidence::TooManyDraws { recorded: t.draws.len() });
    }
    let deck = shuffle(&expected);
    for (index, (draw, card)) in t.draws.iter().zip(deck.order()).enumerate() {
        if draw.card != *card {
            return Err(TamperEvidence::DrawMismatch {
                index,
                expected: *card,
                recorded: draw.card,
            });
        }
    }

    // 4. The rules, fed only the logged moves, deal the same seats
    let game = replay(t, deck)?;
    for (index, (draw, replayed)) in t.draws.iter().zip(game.draws()).enumerate() {
        if draw.seat != replayed.seat {
            return Err(TamperEvidence::SeatMismatch {
                index,
                expected: replayed.seat,
                recorded: draw.seat,
            });
        }
    }
    if t.draws.len() != game.draws().len() {
        return Err(TamperEvidence::PolicyViolation {
            expected: game.draws().len(),
            recorded: t.draws.len(),
        });
    }

    // 5. Hands are the draws
    if t.player_cards != game.player().cards() {
        return Err(TamperEvidence::HandMismatch { seat: Seat::Player });
    }
    if t.dealer_cards != game.dealer().cards() {
        return Err(TamperEvidence::HandMismatch { seat: Seat::Dealer });
    }

    // 6. Settlement
    if t.bet != game.bet() {
        return Err(TamperEvidence::BetMismatch {
            expected: game.bet(),
            recorded: t.bet,
        });
    }
    if t.result != game.result() || t.payout != game.payout() {
        return Err(TamperEvidence::OutcomeMismatch {
            expected: game.result(),
            recorded: t.result,
            expected_payout: game.payout(),
            recorded_payout: t.payout,
        });
    }

    Ok(())
}

/// Play the logged moves on the re-derived deck.
///
/// The opening stake is the recorded one, halved when the log holds a
/// double down; the seat gets exactly enough chips to afford both.
fn replay(t: &RoundTranscript, mut deck: Deck) -> Result<BlackjackGame, TamperEvidence> {
    let opening = if t.moves.contains(&GameAction::DoubleDown) {
        t.bet / 2
    } else {
        t.bet
    };
    let mut game = BlackjackGame::new(opening.saturating_mul(2));
    game.place_bet(opening, &BetLimits::new(opening, opening), &mut deck)
        .map_err(|_| TamperEvidence::IllegalMove {
            step: 0,
            action: GameAction::PlaceBet,
        })?;

    for (i, action) in t.moves.iter().enumerate() {
        let applied = match action {
            GameAction::Hit => game.hit(&mut deck),
            GameAction::Stand => game.stand(&mut deck),
            GameAction::DoubleDown => game.double_down(&mut deck),
            GameAction::PlaceBet | GameAction::NewGame => Err(GameError::PhaseViolation {
                action: *action,
                stage: game.stage(),
            }),
        };
        applied.map_err(|_| TamperEvidence::IllegalMove {
            step: i + 1,
            action: *action,
        })?;
    }
    Ok(game)
}

// =============================================================================
// TESTS
// =============================================================================
