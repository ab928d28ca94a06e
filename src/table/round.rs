//! Round Phase State Machine
//!
//! A round is one stake, one commit-reveal exchange and one hand:
//!
//! ```text
//! SETUP  Betting → RngCommit → RngReveal1 → RngReveal2 → Cut
//!   │                                                    │ seed + initial deal
//!   ▼                                                    ▼
//! GAME   PlayerTurn → DealerTurn ──────────────────▶ VERIFY
//! ```
//!
//! The phase is derived from the rules engine stage and the coordinator
//! state, never stored separately. A round may also be flagged `Abandoned`
//! or `Faulted`; flagged rounds reject every mutating action.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::core::clock::Millis;
use crate::core::hash::{HashValue, Secret};
use crate::game::blackjack::{BetLimits, BlackjackGame, GameError, GameStage, HandResult};
use crate::game::card::Card;
use crate::game::deck::{Deck, DeckError};
use crate::proof::commitment::{Coordinator, Party, ProtocolError, ProtocolState};
use crate::proof::transcript::{RoundTranscript, TRANSCRIPT_VERSION};
use crate::proof::verify::{verify_round, Verdict};
use crate::table::config::{StageTimeouts, TableConfig, TableId};

/// Unique round identifier (UUID bytes).
pub type RoundId = [u8; 16];

/// Player identity at the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub [u8; 16]);

impl PlayerId {
    /// Wrap raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Fresh random identity.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().into_bytes())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..4]))
    }
}

/// Top-level round phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Stake and randomness exchange.
    Setup,
    /// Hand in play.
    Game,
    /// Hand finished; open for verification.
    Verify,
}

/// Sub-stage of `Phase::Setup`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupStage {
    /// Waiting for the stake.
    Betting,
    /// Waiting for commitments.
    RngCommit,
    /// Waiting for `co` values.
    RngReveal1,
    /// Waiting for secrets.
    RngReveal2,
    /// Waiting for the player's cut.
    Cut,
}

/// Why a round was abandoned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonCause {
    /// A counterpart action was overdue.
    Timeout(SetupStage),
    /// The player left.
    Left,
}

/// Terminal flag on a round that did not complete normally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Round stopped before completion.
    Abandoned {
        /// What stopped it.
        cause: AbandonCause,
        /// Locked stake eligible for refund by the ledger.
        refundable: u64,
    },
    /// Integrity failure; settlement is blocked.
    Faulted {
        /// Description of the failure.
        cause: String,
    },
}

/// Round-level actions, for error reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundAction {
    /// Stake.
    PlaceBet,
    /// Publish `cv`.
    CommitRandomness,
    /// Publish `co`.
    RevealHash,
    /// Publish the secret.
    RevealSecret,
    /// Submit the cut.
    SubmitCut,
    /// Take a card.
    Hit,
    /// End the player turn.
    Stand,
    /// Double down.
    DoubleDown,
    /// Start the next round.
    NewGame,
    /// Verify the finished round.
    Verify,
}

impl fmt::Display for RoundAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundAction::PlaceBet => "place_bet",
            RoundAction::CommitRandomness => "commit_randomness",
            RoundAction::RevealHash => "reveal_hash",
            RoundAction::RevealSecret => "reveal_secret",
            RoundAction::SubmitCut => "submit_cut",
            RoundAction::Hit => "hit",
            RoundAction::Stand => "stand",
            RoundAction::DoubleDown => "double_down",
            RoundAction::NewGame => "new_game",
            RoundAction::Verify => "verify",
        };
        f.write_str(name)
    }
}

/// Round errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoundError {
    /// Action not legal in the round's phase, or the round is flagged.
    #[error("{action} not allowed in {phase:?} phase{}", terminated_suffix(.terminated))]
    PhaseViolation {
        /// Attempted action.
        action: RoundAction,
        /// Phase at the time.
        phase: Phase,
        /// Round carries a terminal flag.
        terminated: bool,
    },

    /// Rules engine rejection.
    #[error(transparent)]
    Game(#[from] GameError),

    /// Commit-reveal rejection.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Deck could not be rebuilt.
    #[error(transparent)]
    Deck(#[from] DeckError),
}

fn terminated_suffix(terminated: &bool) -> &'static str {
    if *terminated {
        " (round terminated)"
    } else {
        ""
    }
}

impl RoundError {
    /// Is the round now faulted?
    pub fn is_fatal(&self) -> bool {
        matches!(self, RoundError::Protocol(e) if e.is_fatal())
    }
}

/// Persisted state of one round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    id: RoundId,
    table_id: TableId,
    player_id: PlayerId,
    limits: BetLimits,
    timeouts: StageTimeouts,
    game: BlackjackGame,
    protocol: Coordinator,
    created_at: Millis,
    last_action_at: Millis,
    termination: Option<Termination>,
    verdict: Option<Verdict>,
}

impl Round {
    /// Fresh round in `Setup/Betting` holding `chips`.
    pub fn new(id: RoundId, player_id: PlayerId, table: &TableConfig, chips: u64, now: Millis) -> Self {
        let game = BlackjackGame::with_chips(chips, table.starting_chips);
        Self {
            id,
            table_id: table.id,
            player_id,
            limits: table.limits,
            timeouts: table.timeouts,
            game,
            protocol: Coordinator::new(table.max_cut),
            created_at: now,
            last_action_at: now,
            termination: None,
            verdict: None,
        }
    }

    /// Successor round carrying this round's chips. Only from `Verify`.
    pub fn next(&self, id: RoundId, now: Millis) -> Result<Round, RoundError> {
        self.require(RoundAction::NewGame, Phase::Verify)?;
        let mut game = self.game.clone();
        game.new_game()?;
        Ok(Self {
            id,
            table_id: self.table_id,
            player_id: self.player_id,
            limits: self.limits,
            timeouts: self.timeouts,
            game,
            protocol: Coordinator::new(self.protocol.max_cut()),
            created_at: now,
            last_action_at: now,
            termination: None,
            verdict: None,
        })
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Lock the stake.
    pub fn place_bet(&mut self, amount: u64, now: Millis) -> Result<(), RoundError> {
        self.require_setup(RoundAction::PlaceBet, SetupStage::Betting)?;
        self.game.stake(amount, &self.limits)?;
        self.last_action_at = now;
        Ok(())
    }

    /// Publish a party's `cv`.
    pub fn commit_randomness(&mut self, party: Party, cv: HashValue, now: Millis) -> Result<(), RoundError> {
        self.require_staked(RoundAction::CommitRandomness)?;
        let result = self.protocol.commit(party, cv);
        self.settle(result, now)
    }

    /// Publish a party's `co`.
    pub fn reveal_hash(&mut self, party: Party, co: HashValue, now: Millis) -> Result<(), RoundError> {
        self.require_staked(RoundAction::RevealHash)?;
        let result = self.protocol.reveal1(party, co);
        self.settle(result, now)
    }

    /// Publish a party's secret.
    pub fn reveal_secret(&mut self, party: Party, secret: Secret, now: Millis) -> Result<(), RoundError> {
        self.require_staked(RoundAction::RevealSecret)?;
        let result = self.protocol.reveal2(party, secret);
        self.settle(result, now)
    }

    /// Submit the cut, seed the deck and deal the initial hands.
    pub fn submit_cut(&mut self, party: Party, cut: u32, now: Millis) -> Result<(), RoundError> {
        self.require_staked(RoundAction::SubmitCut)?;

        // Check the deal on a copy so a failure leaves the round untouched
        let mut protocol = self.protocol.clone();
        let seed = protocol.submit_cut(party, cut)?;
        let mut game = self.game.clone();
        let mut deck = Deck::shuffled(&seed);
        game.deal_initial(&mut deck)?;

        self.protocol = protocol;
        self.game = game;
        self.last_action_at = now;
        info!(
            round = %hex::encode(&self.id[..4]),
            player_score = self.game.player().score(),
            phase = ?self.phase(),
            "Deck seeded, hands dealt"
        );
        Ok(())
    }

    fn settle(&mut self, result: Result<(), ProtocolError>, now: Millis) -> Result<(), RoundError> {
        match result {
            Ok(()) => {
                self.last_action_at = now;
                Ok(())
            }
            Err(e) => {
                if e.is_fatal() {
                    self.fault(e.to_string());
                }
                Err(e.into())
            }
        }
    }

    // =========================================================================
    // Game
    // =========================================================================

    /// Player takes a card.
    pub fn hit(&mut self, now: Millis) -> Result<(), RoundError> {
        self.play(RoundAction::Hit, now, |game, deck| game.hit(deck))
    }

    /// Player stands; dealer plays out.
    pub fn stand(&mut self, now: Millis) -> Result<(), RoundError> {
        self.play(RoundAction::Stand, now, |game, deck| game.stand(deck))
    }

    /// Player doubles down.
    pub fn double_down(&mut self, now: Millis) -> Result<(), RoundError> {
        self.play(RoundAction::DoubleDown, now, |game, deck| game.double_down(deck))
    }

    fn play<F>(&mut self, action: RoundAction, now: Millis, apply: F) -> Result<(), RoundError>
    where
        F: FnOnce(&mut BlackjackGame, &mut Deck) -> Result<(), GameError>,
    {
        self.require(action, Phase::Game)?;
        let mut deck = self.deck(action)?;
        let mut game = self.game.clone();
        apply(&mut game, &mut deck)?;
        self.game = game;
        self.last_action_at = now;

        if let Some(result) = self.game.result() {
            info!(
                round = %hex::encode(&self.id[..4]),
                ?result,
                payout = self.game.payout(),
                chips = self.game.chips(),
                "Round finished"
            );
        }
        Ok(())
    }

    /// Deck as it stands after the recorded draws.
    fn deck(&self, action: RoundAction) -> Result<Deck, RoundError> {
        let seed = self.protocol.seed().ok_or(RoundError::PhaseViolation {
            action,
            phase: self.phase(),
            terminated: self.termination.is_some(),
        })?;
        Ok(Deck::resume(&seed, self.game.draws().len())?)
    }

    // =========================================================================
    // Verify
    // =========================================================================

    /// Published record of the round. Available once seeded.
    pub fn transcript(&self) -> Option<RoundTranscript> {
        let house = self.protocol.published(Party::House);
        let player = self.protocol.published(Party::Player);
        Some(RoundTranscript {
            version: TRANSCRIPT_VERSION,
            round_id: self.id,
            house_cv: house.cv?,
            player_cv: player.cv?,
            house_secret: house.secret?,
            player_secret: player.secret?,
            cut: self.protocol.cut()?,
            seed: self.protocol.seed()?,
            draws: self.game.draws().to_vec(),
            moves: self.game.moves().to_vec(),
            player_cards: self.game.player().cards().to_vec(),
            dealer_cards: self.game.dealer().cards().to_vec(),
            bet: self.game.bet(),
            result: self.game.result(),
            payout: self.game.payout(),
        })
    }

    /// Verify the finished round. A `Tampered` verdict faults it.
    pub fn verify(&mut self) -> Result<Verdict, RoundError> {
        if let Some(verdict) = &self.verdict {
            return Ok(verdict.clone());
        }
        self.require(RoundAction::Verify, Phase::Verify)?;
        let transcript = self.transcript().ok_or(RoundError::PhaseViolation {
            action: RoundAction::Verify,
            phase: self.phase(),
            terminated: false,
        })?;

        let verdict = verify_round(&transcript);
        if let Verdict::Tampered(evidence) = &verdict {
            self.fault(format!("Verification failed: {}", evidence));
        } else {
            info!(round = %hex::encode(&self.id[..4]), "Round verified");
        }
        self.verdict = Some(verdict.clone());
        Ok(verdict)
    }

    // =========================================================================
    // Termination
    // =========================================================================

    /// Setup stage that has waited past its limit, if any.
    pub fn overdue_stage(&self, now: Millis) -> Option<SetupStage> {
        if self.termination.is_some() {
            return None;
        }
        let stage = self.setup_stage()?;
        let limit = self.timeouts.for_stage(stage);
        (now.saturating_sub(self.last_action_at) > limit).then_some(stage)
    }

    /// Abandon the round if the current setup stage has waited too long.
    pub fn expire(&mut self, now: Millis) -> bool {
        let Some(stage) = self.overdue_stage(now) else {
            return false;
        };
        self.abandon(AbandonCause::Timeout(stage), self.game.bet());
        true
    }

    /// Player leaves. A stake locked during setup is refundable; a hand in
    /// play is forfeited. Finished or flagged rounds are unchanged.
    pub fn leave(&mut self) {
        if !self.is_active() {
            return;
        }
        let refundable = match self.phase() {
            Phase::Setup => self.game.bet(),
            _ => 0,
        };
        self.abandon(AbandonCause::Left, refundable);
    }

    fn abandon(&mut self, cause: AbandonCause, refundable: u64) {
        warn!(
            round = %hex::encode(&self.id[..4]),
            ?cause,
            refundable,
            "Round abandoned"
        );
        self.termination = Some(Termination::Abandoned { cause, refundable });
    }

    fn fault(&mut self, cause: String) {
        error!(round = %hex::encode(&self.id[..4]), %cause, "Round faulted");
        self.termination = Some(Termination::Faulted { cause });
    }

    // =========================================================================
    // Guards
    // =========================================================================

    fn require(&self, action: RoundAction, phase: Phase) -> Result<(), RoundError> {
        let current = self.phase();
        if self.termination.is_some() || current != phase {
            return Err(RoundError::PhaseViolation {
                action,
                phase: current,
                terminated: self.termination.is_some(),
            });
        }
        Ok(())
    }

    fn require_setup(&self, action: RoundAction, stage: SetupStage) -> Result<(), RoundError> {
        self.require(action, Phase::Setup)?;
        if self.setup_stage() != Some(stage) {
            return Err(RoundError::PhaseViolation {
                action,
                phase: Phase::Setup,
                terminated: false,
            });
        }
        Ok(())
    }

    /// Setup past betting; the coordinator checks its own state.
    fn require_staked(&self, action: RoundAction) -> Result<(), RoundError> {
        self.require(action, Phase::Setup)?;
        if self.setup_stage() == Some(SetupStage::Betting) {
            return Err(RoundError::PhaseViolation {
                action,
                phase: Phase::Setup,
                terminated: false,
            });
        }
        Ok(())
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Current phase.
    pub fn phase(&self) -> Phase {
        if self.protocol.state() != ProtocolState::Seeded {
            Phase::Setup
        } else if self.game.stage() != GameStage::Finished {
            Phase::Game
        } else {
            Phase::Verify
        }
    }

    /// Setup sub-stage, while in `Setup`.
    pub fn setup_stage(&self) -> Option<SetupStage> {
        if self.phase() != Phase::Setup {
            return None;
        }
        if self.game.bet() == 0 {
            return Some(SetupStage::Betting);
        }
        Some(match self.protocol.state() {
            ProtocolState::Idle => SetupStage::RngCommit,
            ProtocolState::Committed => SetupStage::RngReveal1,
            ProtocolState::Revealed1 => SetupStage::RngReveal2,
            ProtocolState::Revealed2 | ProtocolState::Seeded => SetupStage::Cut,
        })
    }

    /// Counts toward the player's single active round.
    pub fn is_active(&self) -> bool {
        self.termination.is_none() && self.game.stage() != GameStage::Finished
    }

    /// Round identifier.
    pub fn id(&self) -> RoundId {
        self.id
    }

    /// Owning table.
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    /// Owning player.
    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Rules engine state.
    pub fn game(&self) -> &BlackjackGame {
        &self.game
    }

    /// Commit-reveal state.
    pub fn protocol(&self) -> &Coordinator {
        &self.protocol
    }

    /// Terminal flag, if any.
    pub fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    /// Verification verdict, if verified.
    pub fn verdict(&self) -> Option<&Verdict> {
        self.verdict.as_ref()
    }

    /// Creation time.
    pub fn created_at(&self) -> Millis {
        self.created_at
    }

    /// Phase snapshot.
    pub fn phase_view(&self) -> PhaseView {
        PhaseView {
            round_id: self.id,
            table_id: self.table_id,
            phase: self.phase(),
            setup_stage: self.setup_stage(),
            game_stage: self.game.stage(),
            protocol_state: self.protocol.state(),
            awaiting: match self.setup_stage() {
                Some(SetupStage::Betting) | None => Vec::new(),
                Some(_) => self.protocol.awaiting(),
            },
            termination: self.termination.clone(),
            verdict: self.verdict.clone(),
        }
    }

    /// Player-visible hands; the dealer hole card is hidden until resolution.
    pub fn hands_view(&self) -> HandsView {
        let game = &self.game;
        HandsView {
            player: game.player().cards().to_vec(),
            player_score: game.player().score(),
            dealer: game.visible_dealer_cards().to_vec(),
            dealer_score: game.visible_dealer_score(),
            dealer_hidden: game.dealer_hidden() && !game.dealer().is_empty(),
            bet: game.bet(),
            chips: game.chips(),
            can_double_down: game.can_double_down(),
            result: game.result(),
            payout: game.payout(),
        }
    }
}

/// Read-only phase snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseView {
    /// Round identifier.
    pub round_id: RoundId,
    /// Table the round is played at.
    pub table_id: TableId,
    /// Top-level phase.
    pub phase: Phase,
    /// Setup sub-stage, while in setup.
    pub setup_stage: Option<SetupStage>,
    /// Rules engine stage.
    pub game_stage: GameStage,
    /// Coordinator state.
    pub protocol_state: ProtocolState,
    /// Parties that owe the next protocol step.
    pub awaiting: Vec<Party>,
    /// Terminal flag.
    pub termination: Option<Termination>,
    /// Verification verdict.
    pub verdict: Option<Verdict>,
}

impl PhaseView {
    /// Flagged or finished and verified; nothing more will happen.
    pub fn is_settled(&self) -> bool {
        self.termination.is_some() || self.verdict.is_some()
    }
}

/// Player-visible hands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandsView {
    /// Player cards.
    pub player: Vec<Card>,
    /// Player score.
    pub player_score: u32,
    /// Dealer cards (up card only while hidden).
    pub dealer: Vec<Card>,
    /// Score of the visible dealer cards.
    pub dealer_score: u32,
    /// Is the hole card hidden?
    pub dealer_hidden: bool,
    /// Current stake.
    pub bet: u64,
    /// Chips not staked.
    pub chips: u64,
    /// Double down available?
    pub can_double_down: bool,
    /// Outcome once finished.
    pub result: Option<HandResult>,
    /// Chips credited at resolution.
    pub payout: u64,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::game::blackjack::GameAction;
    use crate::proof::verify::TamperEvidence;

    pub(crate) fn table() -> TableConfig {
        TableConfig::new(1, "Test", 4, BetLimits::new(10, 1000))
            .with_timeouts(StageTimeouts::uniform(1_000))
    }

    fn round() -> Round {
        Round::new([1; 16], PlayerId::new([9; 16]), &table(), 1000, 0)
    }

    /// Drive a round through setup with fixed secrets.
    fn seeded(cut: u32) -> Round {
        let house = Secret::from_bytes([0xA1; 32]);
        let player = Secret::from_bytes([0xB2; 32]);
        let mut r = round();
        r.place_bet(100, 1).unwrap();
        r.commit_randomness(Party::House, house.commit().cv, 2).unwrap();
        r.commit_randomness(Party::Player, player.commit().cv, 3).unwrap();
        r.reveal_hash(Party::House, house.commit().co, 4).unwrap();
        r.reveal_hash(Party::Player, player.commit().co, 5).unwrap();
        r.reveal_secret(Party::House, house, 6).unwrap();
        r.reveal_secret(Party::Player, player, 7).unwrap();
        r.submit_cut(Party::Player, cut, 8).unwrap();
        r
    }

    /// First cut whose initial deal leaves the player a turn.
    fn in_play() -> Round {
        (0..=51)
            .map(seeded)
            .find(|r| r.phase() == Phase::Game)
            .unwrap()
    }

    /// Play to completion by standing (if the hand is still open).
    fn finished(cut: u32) -> Round {
        let mut r = seeded(cut);
        if r.phase() == Phase::Game {
            r.stand(9).unwrap();
        }
        r
    }

    #[test]
    fn test_setup_stages_in_order() {
        let house = Secret::from_bytes([1; 32]);
        let player = Secret::from_bytes([2; 32]);
        let mut r = round();
        assert_eq!(r.phase(), Phase::Setup);
        assert_eq!(r.setup_stage(), Some(SetupStage::Betting));

        r.place_bet(100, 1).unwrap();
        assert_eq!(r.setup_stage(), Some(SetupStage::RngCommit));
        assert_eq!(r.game().chips(), 900);

        r.commit_randomness(Party::House, house.commit().cv, 2).unwrap();
        r.commit_randomness(Party::Player, player.commit().cv, 2).unwrap();
        assert_eq!(r.setup_stage(), Some(SetupStage::RngReveal1));

        r.reveal_hash(Party::House, house.commit().co, 3).unwrap();
        r.reveal_hash(Party::Player, player.commit().co, 3).unwrap();
        assert_eq!(r.setup_stage(), Some(SetupStage::RngReveal2));
        assert_eq!(r.phase_view().awaiting, vec![Party::House]);

        r.reveal_secret(Party::House, house, 4).unwrap();
        r.reveal_secret(Party::Player, player, 4).unwrap();
        assert_eq!(r.setup_stage(), Some(SetupStage::Cut));

        r.submit_cut(Party::Player, 7, 5).unwrap();
        assert_ne!(r.phase(), Phase::Setup);
        assert_eq!(r.setup_stage(), None);
        assert_eq!(r.game().draws().len(), 4);
    }

    #[test]
    fn test_commit_requires_stake() {
        let mut r = round();
        let err = r
            .commit_randomness(Party::House, [0; 32], 1)
            .unwrap_err();
        assert_eq!(
            err,
            RoundError::PhaseViolation {
                action: RoundAction::CommitRandomness,
                phase: Phase::Setup,
                terminated: false,
            }
        );
    }

    #[test]
    fn test_game_actions_rejected_in_setup() {
        let mut r = round();
        r.place_bet(100, 1).unwrap();
        let before = r.clone();
        assert!(matches!(r.hit(2), Err(RoundError::PhaseViolation { phase: Phase::Setup, .. })));
        assert!(matches!(
            r.place_bet(100, 2),
            Err(RoundError::PhaseViolation { .. })
        ));
        assert_eq!(r, before);
    }

    #[test]
    fn test_bet_errors_pass_through() {
        let mut r = round();
        assert!(matches!(
            r.place_bet(5000, 1),
            Err(RoundError::Game(GameError::InsufficientFunds { .. }))
        ));
        assert!(matches!(
            r.place_bet(5, 1),
            Err(RoundError::Game(GameError::BetOutOfRange { .. }))
        ));
    }

    #[test]
    fn test_fatal_reveal_faults_round() {
        let house = Secret::from_bytes([1; 32]);
        let player = Secret::from_bytes([2; 32]);
        let mut r = round();
        r.place_bet(100, 1).unwrap();
        r.commit_randomness(Party::House, house.commit().cv, 2).unwrap();
        r.commit_randomness(Party::Player, player.commit().cv, 2).unwrap();

        let err = r.reveal_hash(Party::House, [0; 32], 3).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(r.termination(), Some(Termination::Faulted { .. })));
        assert!(!r.is_active());

        // Flagged rounds reject everything
        assert!(matches!(
            r.reveal_hash(Party::Player, player.commit().co, 4),
            Err(RoundError::PhaseViolation { terminated: true, .. })
        ));
    }

    #[test]
    fn test_game_actions_replay_deck() {
        let mut r = in_play();
        let order = Deck::shuffled(&r.protocol().seed().unwrap()).order().to_vec();
        r.hit(10).unwrap();
        assert_eq!(r.game().draws()[4].card, order[4]);
        assert!(matches!(
            r.double_down(11),
            Err(RoundError::Game(GameError::PhaseViolation { action: GameAction::DoubleDown, .. }))
                | Err(RoundError::PhaseViolation { .. })
        ));
    }

    #[test]
    fn test_finished_round_verifies() {
        let mut r = finished(3);
        assert_eq!(r.phase(), Phase::Verify);
        assert!(!r.is_active());
        assert_eq!(r.verify().unwrap(), Verdict::Verified);
        assert_eq!(r.verdict(), Some(&Verdict::Verified));
        assert!(r.phase_view().is_settled());
    }

    #[test]
    fn test_verify_requires_finished_hand() {
        let mut r = round();
        assert!(matches!(r.verify(), Err(RoundError::PhaseViolation { .. })));
        assert!(r.transcript().is_none());
    }

    #[test]
    fn test_tampered_record_faults() {
        let mut r = finished(3);
        // Swap the first card for one that is not at that deck position
        let seed = r.protocol().seed().unwrap();
        let wrong = Deck::shuffled(&seed).order()[51];
        r.game = tampered_game(&r.game, wrong);

        match r.verify().unwrap() {
            Verdict::Tampered(TamperEvidence::DrawMismatch { index: 0, .. }) => {}
            other => panic!("unexpected verdict {:?}", other),
        }
        assert!(matches!(r.termination(), Some(Termination::Faulted { .. })));
    }

    fn tampered_game(game: &BlackjackGame, card: Card) -> BlackjackGame {
        let mut json = serde_json::to_value(game).unwrap();
        json["draws"][0]["card"] = serde_json::to_value(card).unwrap();
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_expire_abandons_overdue_stage() {
        let mut r = round();
        r.place_bet(100, 0).unwrap();
        assert!(!r.expire(1_000));
        assert_eq!(r.overdue_stage(1_000), None);
        assert_eq!(r.overdue_stage(1_001), Some(SetupStage::RngCommit));
        assert!(r.expire(1_001));
        assert_eq!(
            r.termination(),
            Some(&Termination::Abandoned {
                cause: AbandonCause::Timeout(SetupStage::RngCommit),
                refundable: 100,
            })
        );
        assert!(!r.expire(5_000));
    }

    #[test]
    fn test_expire_ignores_game_phase() {
        let mut r = seeded(7);
        assert!(!r.expire(1_000_000));
    }

    #[test]
    fn test_leave_refunds_only_during_setup() {
        let mut r = round();
        r.place_bet(50, 0).unwrap();
        r.leave();
        assert_eq!(
            r.termination(),
            Some(&Termination::Abandoned { cause: AbandonCause::Left, refundable: 50 })
        );

        let mut done = finished(3);
        done.leave();
        assert!(done.termination().is_none());
    }

    #[test]
    fn test_next_round_carries_chips() {
        let r = finished(3);
        let next = r.next([2; 16], 100).unwrap();
        assert_eq!(next.phase(), Phase::Setup);
        assert_eq!(next.setup_stage(), Some(SetupStage::Betting));
        assert_eq!(next.game().chips(), r.game().chips());
        assert!(next.game().draws().is_empty());

        assert!(matches!(round().next([3; 16], 0), Err(RoundError::PhaseViolation { .. })));
    }

    #[test]
    fn test_hands_view_hides_hole_card() {
        let mut r = in_play();
        let view = r.hands_view();
        assert!(view.dealer_hidden);
        assert_eq!(view.dealer.len(), 1);
        assert_eq!(view.dealer[0], r.game().dealer().cards()[0]);
        assert_eq!(view.player.len(), 2);

        r.stand(20).unwrap();
        let view = r.hands_view();
        assert!(!view.dealer_hidden);
        assert_eq!(view.dealer, r.game().dealer().cards().to_vec());
    }

    #[test]
    fn test_round_bincode_roundtrip() {
        let r = finished(3);
        let bytes = bincode::serialize(&r).unwrap();
        let back: Round = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, r);
    }
}
