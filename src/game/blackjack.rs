//! Blackjack Rules Engine
//!
//! One player hand against the dealer, driven by a deck the fairness
//! protocol produced. Stages advance `Betting -> PlayerTurn -> DealerTurn
//! -> Finished`; every card drawn is appended to the draw log and every
//! accepted player move to the move log, so the round can later be replayed
//! against the re-derived deck.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::game::card::Card;
use crate::game::deck::{Deck, DeckError, Hand, BLACKJACK};

/// Dealer draws while below this total and stands on every 17, soft or hard.
pub const DEALER_STAND_THRESHOLD: u32 = 17;

/// Chips a fresh seat starts with, and the replenish level for broke players.
pub const DEFAULT_STARTING_CHIPS: u64 = 1000;

/// Cards needed for the initial deal.
const INITIAL_DEAL: usize = 4;

/// Rules engine stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStage {
    /// Waiting for a stake.
    Betting,
    /// Player may hit, stand or double down.
    PlayerTurn,
    /// Dealer is drawing.
    DealerTurn,
    /// Hand resolved.
    Finished,
}

/// Final outcome of a hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandResult {
    /// Player beat the dealer.
    Win,
    /// Dealer beat the player.
    Lose,
    /// Tie, stake returned.
    Push,
    /// Player natural paid 3:2.
    Blackjack,
}

/// Who received a card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    /// The player's hand.
    Player,
    /// The dealer's hand.
    Dealer,
}

/// One card leaving the deck.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draw {
    /// Recipient.
    pub seat: Seat,
    /// The card.
    pub card: Card,
}

/// Player actions, for error reporting and the move log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameAction {
    /// Stake and initial deal.
    PlaceBet,
    /// Take a card.
    Hit,
    /// End the player turn.
    Stand,
    /// Double the stake for exactly one card.
    DoubleDown,
    /// Reset a finished hand.
    NewGame,
}

impl fmt::Display for GameAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameAction::PlaceBet => "place_bet",
            GameAction::Hit => "hit",
            GameAction::Stand => "stand",
            GameAction::DoubleDown => "double_down",
            GameAction::NewGame => "new_game",
        };
        f.write_str(name)
    }
}

/// Table stake limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetLimits {
    /// Smallest accepted bet.
    pub min_bet: u64,
    /// Largest accepted bet.
    pub max_bet: u64,
}

impl BetLimits {
    /// Create limits.
    pub const fn new(min_bet: u64, max_bet: u64) -> Self {
        Self { min_bet, max_bet }
    }

    /// Is the amount inside `[min_bet, max_bet]`?
    pub fn contains(&self, amount: u64) -> bool {
        amount >= self.min_bet && amount <= self.max_bet
    }
}

/// Rules engine errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// Action not legal in the current stage.
    #[error("{action} not allowed while {stage:?}")]
    PhaseViolation {
        /// Attempted action.
        action: GameAction,
        /// Stage at the time.
        stage: GameStage,
    },

    /// Not enough chips.
    #[error("Insufficient chips: need {required}, have {available}")]
    InsufficientFunds {
        /// Chips needed.
        required: u64,
        /// Chips held.
        available: u64,
    },

    /// Bet outside table limits.
    #[error("Bet {amount} outside [{min}, {max}]")]
    BetOutOfRange {
        /// Requested bet.
        amount: u64,
        /// Table minimum.
        min: u64,
        /// Table maximum.
        max: u64,
    },

    /// Deck ran out.
    #[error(transparent)]
    Deck(#[from] DeckError),
}

/// Game state for one player hand against the dealer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackjackGame {
    stage: GameStage,
    chips: u64,
    starting_chips: u64,
    bet: u64,
    player: Hand,
    dealer: Hand,
    can_double_down: bool,
    dealer_hidden: bool,
    result: Option<HandResult>,
    payout: u64,
    draws: Vec<Draw>,
    moves: Vec<GameAction>,
}

impl BlackjackGame {
    /// New seat holding `chips`, which is also the replenish level.
    pub fn new(chips: u64) -> Self {
        Self::with_chips(chips, chips)
    }

    /// Seat holding `chips` that is replenished to `starting_chips` when broke.
    pub fn with_chips(chips: u64, starting_chips: u64) -> Self {
        Self {
            stage: GameStage::Betting,
            chips,
            starting_chips,
            bet: 0,
            player: Hand::new(),
            dealer: Hand::new(),
            can_double_down: false,
            dealer_hidden: true,
            result: None,
            payout: 0,
            draws: Vec::new(),
            moves: Vec::new(),
        }
    }

    /// Validate and lock a stake without dealing.
    pub fn stake(&mut self, amount: u64, limits: &BetLimits) -> Result<(), GameError> {
        if self.stage != GameStage::Betting || self.bet > 0 {
            return Err(self.violation(GameAction::PlaceBet));
        }
        if amount > self.chips {
            return Err(GameError::InsufficientFunds {
                required: amount,
                available: self.chips,
            });
        }
        if !limits.contains(amount) {
            return Err(GameError::BetOutOfRange {
                amount,
                min: limits.min_bet,
                max: limits.max_bet,
            });
        }

        self.chips -= amount;
        self.bet = amount;
        debug!(bet = amount, chips = self.chips, "Stake locked");
        Ok(())
    }

    /// Deal two cards each (player, dealer, player, dealer) for the locked stake.
    ///
    /// A player natural resolves immediately without a player turn.
    pub fn deal_initial(&mut self, deck: &mut Deck) -> Result<(), GameError> {
        if self.stage != GameStage::Betting || self.bet == 0 {
            return Err(self.violation(GameAction::PlaceBet));
        }
        let cards = deck.deal(INITIAL_DEAL)?;
        for (i, card) in cards.into_iter().enumerate() {
            let seat = if i % 2 == 0 { Seat::Player } else { Seat::Dealer };
            self.give(seat, card);
        }
        self.dealer_hidden = true;

        if self.player.is_natural() {
            self.can_double_down = false;
            self.resolve();
        } else {
            self.stage = GameStage::PlayerTurn;
            self.can_double_down = true;
        }
        Ok(())
    }

    /// Stake and deal in one step.
    pub fn place_bet(
        &mut self,
        amount: u64,
        limits: &BetLimits,
        deck: &mut Deck,
    ) -> Result<(), GameError> {
        if deck.remaining() < INITIAL_DEAL {
            return Err(DeckError::Exhausted {
                requested: INITIAL_DEAL,
                remaining: deck.remaining(),
            }
            .into());
        }
        self.stake(amount, limits)?;
        self.deal_initial(deck)
    }

    /// Take one card. Busting loses the stake.
    pub fn hit(&mut self, deck: &mut Deck) -> Result<(), GameError> {
        self.require(GameAction::Hit, GameStage::PlayerTurn)?;
        let card = deck.draw()?;
        self.moves.push(GameAction::Hit);
        self.give(Seat::Player, card);
        self.can_double_down = false;

        if self.player.is_bust() {
            self.resolve();
        }
        Ok(())
    }

    /// End the player turn and let the dealer play.
    pub fn stand(&mut self, deck: &mut Deck) -> Result<(), GameError> {
        self.require(GameAction::Stand, GameStage::PlayerTurn)?;
        self.moves.push(GameAction::Stand);
        self.can_double_down = false;
        self.stage = GameStage::DealerTurn;
        self.dealer_play(deck)?;
        self.resolve();
        Ok(())
    }

    /// Double the stake, take exactly one card, then the dealer plays.
    pub fn double_down(&mut self, deck: &mut Deck) -> Result<(), GameError> {
        self.require(GameAction::DoubleDown, GameStage::PlayerTurn)?;
        if !self.can_double_down {
            return Err(self.violation(GameAction::DoubleDown));
        }
        if self.chips < self.bet {
            return Err(GameError::InsufficientFunds {
                required: self.bet,
                available: self.chips,
            });
        }

        let card = deck.draw()?;
        self.moves.push(GameAction::DoubleDown);
        self.chips -= self.bet;
        self.bet *= 2;
        self.can_double_down = false;
        self.give(Seat::Player, card);

        if !self.player.is_bust() {
            self.stage = GameStage::DealerTurn;
            self.dealer_play(deck)?;
        }
        self.resolve();
        Ok(())
    }

    /// Reset a finished hand for another bet; broke players are replenished.
    pub fn new_game(&mut self) -> Result<(), GameError> {
        self.require(GameAction::NewGame, GameStage::Finished)?;
        if self.chips == 0 {
            self.chips = self.starting_chips;
        }
        self.stage = GameStage::Betting;
        self.bet = 0;
        self.player.clear();
        self.dealer.clear();
        self.can_double_down = false;
        self.dealer_hidden = true;
        self.result = None;
        self.payout = 0;
        self.draws.clear();
        self.moves.clear();
        Ok(())
    }

    /// Draw dealer cards one at a time while below 17. Returns cards drawn.
    fn dealer_play(&mut self, deck: &mut Deck) -> Result<usize, GameError> {
        let mut drawn = 0;
        while self.dealer.score() < DEALER_STAND_THRESHOLD {
            let card = deck.draw()?;
            self.give(Seat::Dealer, card);
            drawn += 1;
        }
        Ok(drawn)
    }

    /// Settle the hand and credit the payout.
    fn resolve(&mut self) {
        let player = self.player.score();
        let dealer = self.dealer.score();

        let (result, payout) = if self.player.is_natural() {
            if self.dealer.is_natural() {
                (HandResult::Push, self.bet)
            } else {
                (HandResult::Blackjack, self.bet + self.bet * 3 / 2)
            }
        } else if player > BLACKJACK {
            (HandResult::Lose, 0)
        } else if dealer > BLACKJACK || player > dealer {
            (HandResult::Win, self.bet * 2)
        } else if player < dealer {
            (HandResult::Lose, 0)
        } else {
            (HandResult::Push, self.bet)
        };

        self.chips += payout;
        self.payout = payout;
        self.result = Some(result);
        self.stage = GameStage::Finished;
        self.dealer_hidden = false;
        self.can_double_down = false;

        debug!(
            ?result,
            player_score = player,
            dealer_score = dealer,
            payout,
            chips = self.chips,
            "Hand resolved"
        );
    }

    fn give(&mut self, seat: Seat, card: Card) {
        match seat {
            Seat::Player => self.player.push(card),
            Seat::Dealer => self.dealer.push(card),
        }
        self.draws.push(Draw { seat, card });
    }

    fn require(&self, action: GameAction, stage: GameStage) -> Result<(), GameError> {
        if self.stage == stage {
            Ok(())
        } else {
            Err(self.violation(action))
        }
    }

    fn violation(&self, action: GameAction) -> GameError {
        GameError::PhaseViolation { action, stage: self.stage }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Current stage.
    pub fn stage(&self) -> GameStage {
        self.stage
    }

    /// Chips not currently staked.
    pub fn chips(&self) -> u64 {
        self.chips
    }

    /// Current stake (already doubled after a double down).
    pub fn bet(&self) -> u64 {
        self.bet
    }

    /// Player hand.
    pub fn player(&self) -> &Hand {
        &self.player
    }

    /// Dealer hand, including the hole card.
    pub fn dealer(&self) -> &Hand {
        &self.dealer
    }

    /// Is double down still available?
    pub fn can_double_down(&self) -> bool {
        self.can_double_down
    }

    /// Is the dealer hole card hidden from the player view?
    pub fn dealer_hidden(&self) -> bool {
        self.dealer_hidden
    }

    /// Outcome once finished.
    pub fn result(&self) -> Option<HandResult> {
        self.result
    }

    /// Chips credited at resolution.
    pub fn payout(&self) -> u64 {
        self.payout
    }

    /// Every card drawn this hand, in order.
    pub fn draws(&self) -> &[Draw] {
        &self.draws
    }

    /// Accepted player moves this hand (`Hit`, `Stand`, `DoubleDown`), in order.
    pub fn moves(&self) -> &[GameAction] {
        &self.moves
    }

    /// Dealer cards the player may see.
    pub fn visible_dealer_cards(&self) -> &[Card] {
        let cards = self.dealer.cards();
        if self.dealer_hidden && !cards.is_empty() {
            &cards[..1]
        } else {
            cards
        }
    }

    /// Dealer score the player may see.
    pub fn visible_dealer_score(&self) -> u32 {
        crate::game::deck::score(self.visible_dealer_cards())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::card::{Rank, Suit};

    const LIMITS: BetLimits = BetLimits::new(10, 1000);

    fn c(rank: Rank) -> Card {
        Card::new(rank, Suit::Hearts)
    }

    /// Stack: player1, dealer1, player2, dealer2, then the rest in order.
    fn stacked(player: [Rank; 2], dealer: [Rank; 2], rest: &[Rank]) -> Deck {
        let mut cards = vec![c(player[0]), c(dealer[0]), c(player[1]), c(dealer[1])];
        cards.extend(rest.iter().map(|r| c(*r)));
        Deck::stacked(cards)
    }

    fn started(player: [Rank; 2], dealer: [Rank; 2], rest: &[Rank], bet: u64) -> (BlackjackGame, Deck) {
        let mut game = BlackjackGame::new(DEFAULT_STARTING_CHIPS);
        let mut deck = stacked(player, dealer, rest);
        game.place_bet(bet, &LIMITS, &mut deck).unwrap();
        (game, deck)
    }

    #[test]
    fn test_place_bet_debits_and_deals() {
        let (game, _) = started([Rank::Ten, Rank::Five], [Rank::Nine, Rank::Seven], &[], 100);

        assert_eq!(game.chips(), 900);
        assert_eq!(game.bet(), 100);
        assert_eq!(game.stage(), GameStage::PlayerTurn);
        assert_eq!(game.player().score(), 15);
        assert!(game.can_double_down());
        assert!(game.dealer_hidden());
        assert_eq!(game.visible_dealer_cards(), &[c(Rank::Nine)]);
        assert_eq!(game.visible_dealer_score(), 9);
        assert_eq!(game.draws().len(), 4);
        assert_eq!(game.draws()[1].seat, Seat::Dealer);
    }

    #[test]
    fn test_bet_validation() {
        let mut game = BlackjackGame::new(50);
        let mut deck = Deck::standard();

        assert_eq!(
            game.place_bet(100, &LIMITS, &mut deck),
            Err(GameError::InsufficientFunds { required: 100, available: 50 })
        );
        assert_eq!(
            game.place_bet(5, &LIMITS, &mut deck),
            Err(GameError::BetOutOfRange { amount: 5, min: 10, max: 1000 })
        );
        // Rejections leave the seat untouched
        assert_eq!(game.chips(), 50);
        assert_eq!(deck.dealt(), 0);
        assert_eq!(game.stage(), GameStage::Betting);
    }

    #[test]
    fn test_bet_above_max() {
        let mut game = BlackjackGame::new(5000);
        let mut deck = Deck::standard();
        assert!(matches!(
            game.place_bet(1001, &LIMITS, &mut deck),
            Err(GameError::BetOutOfRange { .. })
        ));
    }

    #[test]
    fn test_natural_pays_three_to_two() {
        let (game, _) = started([Rank::Ace, Rank::King], [Rank::Nine, Rank::Seven], &[], 15);

        assert_eq!(game.stage(), GameStage::Finished);
        assert_eq!(game.result(), Some(HandResult::Blackjack));
        // 15 + floor(22.5)
        assert_eq!(game.payout(), 37);
        assert_eq!(game.chips(), 1000 - 15 + 37);
        assert!(!game.dealer_hidden());
    }

    #[test]
    fn test_natural_against_dealer_natural_pushes() {
        let (game, _) = started([Rank::Ace, Rank::Queen], [Rank::Ace, Rank::Jack], &[], 100);
        assert_eq!(game.result(), Some(HandResult::Push));
        assert_eq!(game.chips(), 1000);
    }

    #[test]
    fn test_hit_then_bust_loses() {
        let (mut game, mut deck) =
            started([Rank::Ten, Rank::Six], [Rank::Nine, Rank::Seven], &[Rank::King], 100);

        game.hit(&mut deck).unwrap();
        assert_eq!(game.stage(), GameStage::Finished);
        assert_eq!(game.result(), Some(HandResult::Lose));
        assert_eq!(game.chips(), 900);
        assert_eq!(game.payout(), 0);
    }

    #[test]
    fn test_double_down_rejected_after_hit() {
        let (mut game, mut deck) =
            started([Rank::Two, Rank::Three], [Rank::Nine, Rank::Seven], &[Rank::Four, Rank::Five], 100);

        game.hit(&mut deck).unwrap();
        assert_eq!(game.stage(), GameStage::PlayerTurn);
        assert!(!game.can_double_down());
        assert_eq!(game.moves(), &[GameAction::Hit]);
        assert_eq!(
            game.double_down(&mut deck),
            Err(GameError::PhaseViolation {
                action: GameAction::DoubleDown,
                stage: GameStage::PlayerTurn,
            })
        );
    }

    #[test]
    fn test_stand_dealer_stops_at_eighteen() {
        // Player 20, dealer 10+6 draws a 2 -> 18
        let (mut game, mut deck) = started(
            [Rank::King, Rank::Queen],
            [Rank::Ten, Rank::Six],
            &[Rank::Two, Rank::Five],
            100,
        );

        game.stand(&mut deck).unwrap();
        assert_eq!(game.dealer().score(), 18);
        assert_eq!(game.dealer().len(), 3);
        assert_eq!(game.result(), Some(HandResult::Win));
        assert_eq!(game.payout(), 200);
        assert_eq!(game.chips(), 1100);
        // The 5 stays in the deck
        assert_eq!(deck.remaining(), 1);
    }

    #[test]
    fn test_dealer_stands_on_soft_seventeen() {
        let (mut game, mut deck) =
            started([Rank::Ten, Rank::Eight], [Rank::Ace, Rank::Six], &[Rank::Two], 100);

        game.stand(&mut deck).unwrap();
        assert_eq!(game.dealer().len(), 2);
        assert_eq!(game.result(), Some(HandResult::Win));
    }

    #[test]
    fn test_dealer_draw_loop_is_bounded() {
        // Player stands on 15, dealer 10+6 = 16 draws one card per iteration
        let (mut game, mut deck) = started(
            [Rank::Ten, Rank::Five],
            [Rank::Ten, Rank::Six],
            &[Rank::Three, Rank::King],
            100,
        );

        game.stand(&mut deck).unwrap();
        let extra = game.dealer().len() - 2;
        let bound = ((BLACKJACK - 16) / 2 + 1) as usize;
        assert_eq!(extra, 1);
        assert!(extra <= bound);
        assert_eq!(game.dealer().score(), 19);
        assert_eq!(game.result(), Some(HandResult::Lose));
        assert_eq!(game.chips(), 900);
    }

    #[test]
    fn test_dealer_draws_many_small_cards() {
        let (mut game, mut deck) = started(
            [Rank::Ten, Rank::Nine],
            [Rank::Two, Rank::Three],
            &[Rank::Two, Rank::Two, Rank::Three, Rank::Five],
            100,
        );

        game.stand(&mut deck).unwrap();
        // 2+3+2+2+3+5 = 17
        assert_eq!(game.dealer().score(), 17);
        assert_eq!(game.dealer().len(), 6);
        assert_eq!(game.result(), Some(HandResult::Win));
    }

    #[test]
    fn test_push_returns_stake() {
        let (mut game, mut deck) =
            started([Rank::Ten, Rank::Eight], [Rank::Ten, Rank::Eight], &[], 100);

        game.stand(&mut deck).unwrap();
        assert_eq!(game.result(), Some(HandResult::Push));
        assert_eq!(game.chips(), 1000);
    }

    #[test]
    fn test_dealer_bust_pays_double() {
        let (mut game, mut deck) =
            started([Rank::Ten, Rank::Two], [Rank::Ten, Rank::Six], &[Rank::King], 50);

        game.stand(&mut deck).unwrap();
        assert!(game.dealer().is_bust());
        assert_eq!(game.result(), Some(HandResult::Win));
        assert_eq!(game.chips(), 1050);
    }

    #[test]
    fn test_double_down_win_uses_doubled_bet_once() {
        let (mut game, mut deck) = started(
            [Rank::Five, Rank::Six],
            [Rank::Ten, Rank::Seven],
            &[Rank::Ten],
            100,
        );

        game.double_down(&mut deck).unwrap();
        assert_eq!(game.player().score(), 21);
        assert_eq!(game.bet(), 200);
        assert_eq!(game.result(), Some(HandResult::Win));
        assert_eq!(game.payout(), 400);
        assert_eq!(game.chips(), 1000 - 200 + 400);
        assert_eq!(game.player().len(), 3);
        assert_eq!(game.moves(), &[GameAction::DoubleDown]);
    }

    #[test]
    fn test_double_down_bust() {
        let (mut game, mut deck) = started(
            [Rank::Ten, Rank::Six],
            [Rank::Ten, Rank::Seven],
            &[Rank::Queen],
            100,
        );

        game.double_down(&mut deck).unwrap();
        assert_eq!(game.result(), Some(HandResult::Lose));
        assert_eq!(game.chips(), 800);
        // Dealer never drew
        assert_eq!(game.dealer().len(), 2);
    }

    #[test]
    fn test_double_down_needs_chips() {
        let mut game = BlackjackGame::new(150);
        let mut deck = stacked([Rank::Five, Rank::Six], [Rank::Ten, Rank::Seven], &[Rank::Ten]);
        game.place_bet(100, &LIMITS, &mut deck).unwrap();

        assert_eq!(
            game.double_down(&mut deck),
            Err(GameError::InsufficientFunds { required: 100, available: 50 })
        );
        assert_eq!(game.stage(), GameStage::PlayerTurn);
        assert_eq!(deck.dealt(), 4);
    }

    #[test]
    fn test_actions_rejected_outside_player_turn() {
        let mut game = BlackjackGame::new(1000);
        let mut deck = Deck::standard();

        assert!(matches!(game.hit(&mut deck), Err(GameError::PhaseViolation { .. })));
        assert!(matches!(game.stand(&mut deck), Err(GameError::PhaseViolation { .. })));
        assert!(matches!(game.new_game(), Err(GameError::PhaseViolation { .. })));
        assert_eq!(deck.dealt(), 0);
    }

    #[test]
    fn test_second_stake_rejected() {
        let mut game = BlackjackGame::new(1000);
        game.stake(100, &LIMITS).unwrap();
        assert!(matches!(
            game.stake(100, &LIMITS),
            Err(GameError::PhaseViolation { action: GameAction::PlaceBet, .. })
        ));
        assert_eq!(game.chips(), 900);
    }

    #[test]
    fn test_new_game_resets_and_replenishes() {
        let mut game = BlackjackGame::new(100);
        let mut deck = stacked([Rank::Ten, Rank::Six], [Rank::Ten, Rank::Seven], &[Rank::Nine]);
        game.place_bet(100, &LIMITS, &mut deck).unwrap();
        game.hit(&mut deck).unwrap();
        assert_eq!(game.chips(), 0);

        game.new_game().unwrap();
        assert_eq!(game.stage(), GameStage::Betting);
        assert_eq!(game.chips(), 100);
        assert_eq!(game.bet(), 0);
        assert!(game.player().is_empty());
        assert!(game.draws().is_empty());
        assert!(game.moves().is_empty());
        assert_eq!(game.result(), None);
    }
}
