//! Commit-Reveal Coordinator
//!
//! Two-party randomness exchange for one round:
//!
//! ```text
//! Idle ──commit×2──▶ Committed ──reveal1×2──▶ Revealed1
//!      ──reveal2 (house, then player)──▶ Revealed2 ──cut (player)──▶ Seeded
//! ```
//!
//! Out-of-state calls are rejected with `PhaseViolation` and leave the
//! coordinator untouched. Chain failures (`CommitmentMismatch`,
//! `InvalidReveal`) are fatal for the round.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::hash::{self, short_hex, HashValue, Secret};
use crate::core::rng::derive_combined_seed;

/// Default upper bound for the cut (inclusive).
pub const DEFAULT_MAX_CUT: u32 = 51;

/// One side of the exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    /// The dealing authority.
    House,
    /// The client at the table.
    Player,
}

impl Party {
    /// Both parties, house first.
    pub const BOTH: [Party; 2] = [Party::House, Party::Player];
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::House => f.write_str("house"),
            Party::Player => f.write_str("player"),
        }
    }
}

/// Coordinator state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolState {
    /// Waiting for commitments.
    Idle,
    /// Both `cv` published; waiting for `co`.
    Committed,
    /// Both `co` published; waiting for secrets.
    Revealed1,
    /// Both secrets known; waiting for the cut.
    Revealed2,
    /// Combined seed available.
    Seeded,
}

/// Protocol step, for error reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolStep {
    /// Publish `cv`.
    Commit,
    /// Publish `co`.
    Reveal1,
    /// Publish the secret.
    Reveal2,
    /// Submit the cut.
    Cut,
}

impl fmt::Display for ProtocolStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolStep::Commit => "commit",
            ProtocolStep::Reveal1 => "reveal1",
            ProtocolStep::Reveal2 => "reveal2",
            ProtocolStep::Cut => "cut",
        };
        f.write_str(name)
    }
}

/// Commit-reveal errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Step not legal in the current state.
    #[error("{step} by {party} not allowed in state {state:?}")]
    PhaseViolation {
        /// Attempted step.
        step: ProtocolStep,
        /// Calling party.
        party: Party,
        /// State at the time.
        state: ProtocolState,
    },

    /// `H(co) != cv` at reveal1.
    #[error("Commitment mismatch for {party}: H(co) does not match cv")]
    CommitmentMismatch {
        /// Offending party.
        party: Party,
    },

    /// The secret does not open the published chain.
    #[error("Invalid reveal for {party}: secret does not open the commitment")]
    InvalidReveal {
        /// Offending party.
        party: Party,
    },

    /// Cut outside `[0, max]`.
    #[error("Cut {cut} outside [0, {max}]")]
    CutOutOfRange {
        /// Submitted cut.
        cut: u32,
        /// Largest allowed cut.
        max: u32,
    },

    /// This party is not the one designated for the step.
    #[error("{party} is not allowed to {step} now")]
    WrongParty {
        /// Attempted step.
        step: ProtocolStep,
        /// Calling party.
        party: Party,
    },
}

impl ProtocolError {
    /// Does this error break the round's commitments?
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::CommitmentMismatch { .. } | ProtocolError::InvalidReveal { .. }
        )
    }
}

/// What one party has published so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyCommitment {
    /// `H(H(s))`, published at commit.
    pub cv: Option<HashValue>,
    /// `H(s)`, published at reveal1.
    pub co: Option<HashValue>,
    /// The secret, published at reveal2.
    pub secret: Option<Secret>,
}

/// Per-round commit-reveal state machine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinator {
    state: ProtocolState,
    house: PartyCommitment,
    player: PartyCommitment,
    max_cut: u32,
    cut: Option<u32>,
    seed: Option<HashValue>,
}

impl Coordinator {
    /// Fresh coordinator accepting cuts in `[0, max_cut]`.
    pub fn new(max_cut: u32) -> Self {
        Self {
            state: ProtocolState::Idle,
            house: PartyCommitment::default(),
            player: PartyCommitment::default(),
            max_cut,
            cut: None,
            seed: None,
        }
    }

    /// Publish `cv`. Once per party.
    pub fn commit(&mut self, party: Party, cv: HashValue) -> Result<(), ProtocolError> {
        self.require(ProtocolStep::Commit, party, ProtocolState::Idle)?;
        if self.slot(party).cv.is_some() {
            return Err(self.violation(ProtocolStep::Commit, party));
        }

        self.slot_mut(party).cv = Some(cv);
        debug!(%party, cv = %short_hex(&cv), "Commitment published");

        if self.house.cv.is_some() && self.player.cv.is_some() {
            self.advance(ProtocolState::Committed);
        }
        Ok(())
    }

    /// Publish `co`; checked immediately against `cv`.
    pub fn reveal1(&mut self, party: Party, co: HashValue) -> Result<(), ProtocolError> {
        self.require(ProtocolStep::Reveal1, party, ProtocolState::Committed)?;
        let slot = self.slot(party);
        if slot.co.is_some() {
            return Err(self.violation(ProtocolStep::Reveal1, party));
        }
        let cv = slot.cv.ok_or(self.violation(ProtocolStep::Reveal1, party))?;
        if !hash::verify_hash(&co, &cv) {
            return Err(ProtocolError::CommitmentMismatch { party });
        }

        self.slot_mut(party).co = Some(co);
        debug!(%party, co = %short_hex(&co), "Reveal1 accepted");

        if self.house.co.is_some() && self.player.co.is_some() {
            self.advance(ProtocolState::Revealed1);
        }
        Ok(())
    }

    /// Publish the secret. The house reveals first, the player second.
    pub fn reveal2(&mut self, party: Party, secret: Secret) -> Result<(), ProtocolError> {
        self.require(ProtocolStep::Reveal2, party, ProtocolState::Revealed1)?;
        if self.slot(party).secret.is_some() {
            return Err(self.violation(ProtocolStep::Reveal2, party));
        }
        if party == Party::Player && self.house.secret.is_none() {
            return Err(ProtocolError::WrongParty { step: ProtocolStep::Reveal2, party });
        }

        let slot = self.slot(party);
        let chain = secret.commit();
        if Some(chain.co) != slot.co || Some(chain.cv) != slot.cv {
            return Err(ProtocolError::InvalidReveal { party });
        }

        self.slot_mut(party).secret = Some(secret);
        debug!(%party, "Secret revealed");

        if self.house.secret.is_some() && self.player.secret.is_some() {
            self.advance(ProtocolState::Revealed2);
        }
        Ok(())
    }

    /// Submit the cut and derive the combined seed. Player only.
    pub fn submit_cut(&mut self, party: Party, cut: u32) -> Result<HashValue, ProtocolError> {
        self.require(ProtocolStep::Cut, party, ProtocolState::Revealed2)?;
        if party != Self::cutter() {
            return Err(ProtocolError::WrongParty { step: ProtocolStep::Cut, party });
        }
        if cut > self.max_cut {
            return Err(ProtocolError::CutOutOfRange { cut, max: self.max_cut });
        }
        let (house, player) = match (self.house.secret, self.player.secret) {
            (Some(house), Some(player)) => (house, player),
            _ => return Err(self.violation(ProtocolStep::Cut, party)),
        };

        let seed = derive_combined_seed(&house, &player, cut);
        self.cut = Some(cut);
        self.seed = Some(seed);
        debug!(cut, seed = %short_hex(&seed), "Cut submitted");
        self.advance(ProtocolState::Seeded);
        Ok(seed)
    }

    /// The party designated to submit the cut.
    pub const fn cutter() -> Party {
        Party::Player
    }

    /// Parties that still owe an action in the current state.
    pub fn awaiting(&self) -> Vec<Party> {
        match self.state {
            ProtocolState::Idle => self.missing(|p| p.cv.is_some()),
            ProtocolState::Committed => self.missing(|p| p.co.is_some()),
            ProtocolState::Revealed1 => {
                if self.house.secret.is_none() {
                    vec![Party::House]
                } else {
                    vec![Party::Player]
                }
            }
            ProtocolState::Revealed2 => vec![Self::cutter()],
            ProtocolState::Seeded => Vec::new(),
        }
    }

    fn missing(&self, done: impl Fn(&PartyCommitment) -> bool) -> Vec<Party> {
        Party::BOTH
            .into_iter()
            .filter(|p| !done(self.slot(*p)))
            .collect()
    }

    fn advance(&mut self, next: ProtocolState) {
        debug!(from = ?self.state, to = ?next, "Protocol advanced");
        self.state = next;
    }

    fn require(
        &self,
        step: ProtocolStep,
        party: Party,
        state: ProtocolState,
    ) -> Result<(), ProtocolError> {
        if self.state == state {
            Ok(())
        } else {
            Err(self.violation(step, party))
        }
    }

    fn violation(&self, step: ProtocolStep, party: Party) -> ProtocolError {
        ProtocolError::PhaseViolation { step, party, state: self.state }
    }

    fn slot(&self, party: Party) -> &PartyCommitment {
        match party {
            Party::House => &self.house,
            Party::Player => &self.player,
        }
    }

    fn slot_mut(&mut self, party: Party) -> &mut PartyCommitment {
        match party {
            Party::House => &mut self.house,
            Party::Player => &mut self.player,
        }
    }

    /// Current state.
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// What a party has published.
    pub fn published(&self, party: Party) -> &PartyCommitment {
        self.slot(party)
    }

    /// Largest accepted cut.
    pub fn max_cut(&self) -> u32 {
        self.max_cut
    }

    /// Cut, once submitted.
    pub fn cut(&self) -> Option<u32> {
        self.cut
    }

    /// Combined seed, once seeded.
    pub fn seed(&self) -> Option<HashValue> {
        self.seed
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CUT)
    }
}

// =============================================================================
// TESTS
// =============================================================================
