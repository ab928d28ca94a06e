//! Table Service
//!
//! The party-facing action surface. Every mutating call loads the round,
//! applies one transition and commits it back with a version check, so
//! each round has a single effective writer. A player maps to at most one
//! active round.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::core::clock::{Clock, Millis, SystemClock};
use crate::core::hash::{HashValue, Secret};
use crate::proof::commitment::Party;
use crate::proof::transcript::RoundTranscript;
use crate::proof::verify::{TamperEvidence, Verdict};
use crate::table::config::{default_tables, TableConfig, TableId};
use crate::table::round::{HandsView, PhaseView, PlayerId, Round, RoundError, RoundId};
use crate::table::store::{MemoryRoundStore, RoundStore, RoundUpdate, StoreError};

/// Attempts at a version-checked write before giving up with `Conflict`.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Table service errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    /// The round rejected the action.
    #[error(transparent)]
    Round(#[from] RoundError),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Player already has an unfinished round.
    #[error("Player already has active round {}", hex::encode(.round))]
    AlreadyActive {
        /// The active round.
        round: RoundId,
    },

    /// No table with this id.
    #[error("Unknown table {0}")]
    UnknownTable(TableId),

    /// Table at capacity.
    #[error("Table {0} is full")]
    TableFull(TableId),

    /// Recorded play does not match the committed randomness.
    #[error("Round tampered: {0}")]
    Tampered(TamperEvidence),
}

impl TableError {
    /// Integrity failure that terminated the round?
    pub fn is_fatal(&self) -> bool {
        match self {
            TableError::Round(e) => e.is_fatal(),
            TableError::Tampered(_) => true,
            _ => false,
        }
    }
}

/// Table listing entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    /// Table configuration.
    pub config: TableConfig,
    /// Players with an active round at the table.
    pub players: usize,
}

/// Party-facing action surface over a round store.
pub struct TableService {
    tables: BTreeMap<TableId, TableConfig>,
    store: Arc<dyn RoundStore>,
    clock: Arc<dyn Clock>,
    /// Player to latest round mapping.
    player_rounds: RwLock<BTreeMap<PlayerId, RoundId>>,
}

impl TableService {
    /// Service over the given tables, store and clock.
    pub fn new(
        tables: Vec<TableConfig>,
        store: Arc<dyn RoundStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tables: tables.into_iter().map(|t| (t.id, t)).collect(),
            store,
            clock,
            player_rounds: RwLock::new(BTreeMap::new()),
        }
    }

    /// Default tables, in-memory store, wall clock.
    pub fn in_memory() -> Self {
        Self::new(
            default_tables(),
            Arc::new(MemoryRoundStore::new()),
            Arc::new(SystemClock),
        )
    }

    // =========================================================================
    // Seating
    // =========================================================================

    /// Seat a player and open a fresh round.
    #[instrument(skip(self, player), fields(player = %player))]
    pub async fn join(&self, player: PlayerId, table_id: TableId) -> Result<RoundId, TableError> {
        let table = self
            .tables
            .get(&table_id)
            .ok_or(TableError::UnknownTable(table_id))?;

        // Hold the map lock across check and insert
        let mut player_rounds = self.player_rounds.write().await;
        if let Some(current) = player_rounds.get(&player) {
            if self.store.load_round(current)?.record.is_active() {
                warn!(round = %hex::encode(&current[..4]), "Join rejected: round still active");
                return Err(TableError::AlreadyActive { round: *current });
            }
        }
        if self.count_players(&player_rounds, table_id)? >= table.max_players {
            return Err(TableError::TableFull(table_id));
        }

        let id = uuid::Uuid::new_v4().into_bytes();
        let round = Round::new(id, player, table, table.starting_chips, self.now());
        self.store.create_round(round)?;
        player_rounds.insert(player, id);

        info!(round = %hex::encode(&id[..4]), table = %table.name, "Player joined");
        Ok(id)
    }

    /// Leave the round. Setup stakes become refundable; a hand in play is forfeited.
    #[instrument(skip(self, round), fields(round = %hex::encode(&round[..4])))]
    pub async fn leave(&self, round: RoundId) -> Result<(), TableError> {
        let player = self
            .mutate(round, |r, _| {
                r.leave();
                Ok(r.player_id())
            })
            .await?;

        let mut player_rounds = self.player_rounds.write().await;
        if player_rounds.get(&player) == Some(&round) {
            player_rounds.remove(&player);
        }
        info!(player = %player, "Player left");
        Ok(())
    }

    /// Open the next round for a finished hand, carrying the chips over.
    #[instrument(skip(self, round), fields(round = %hex::encode(&round[..4])))]
    pub async fn new_game(&self, round: RoundId) -> Result<RoundId, TableError> {
        let previous = self.store.load_round(&round)?.record;
        let id = uuid::Uuid::new_v4().into_bytes();
        let next = previous.next(id, self.now())?;
        let player = next.player_id();
        let chips = next.game().chips();

        let mut player_rounds = self.player_rounds.write().await;
        if let Some(current) = player_rounds.get(&player) {
            if *current != round && self.store.load_round(current)?.record.is_active() {
                return Err(TableError::AlreadyActive { round: *current });
            }
        }
        self.store.create_round(next)?;
        player_rounds.insert(player, id);

        info!(next = %hex::encode(&id[..4]), chips, "New game");
        Ok(id)
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Lock the player's stake.
    pub async fn place_bet(&self, round: RoundId, amount: u64) -> Result<(), TableError> {
        self.mutate(round, |r, now| r.place_bet(amount, now)).await
    }

    /// Publish a party's `cv`.
    pub async fn commit_randomness(
        &self,
        round: RoundId,
        party: Party,
        cv: HashValue,
    ) -> Result<(), TableError> {
        self.mutate(round, |r, now| r.commit_randomness(party, cv, now)).await
    }

    /// Publish a party's `co`.
    pub async fn reveal_hash(
        &self,
        round: RoundId,
        party: Party,
        co: HashValue,
    ) -> Result<(), TableError> {
        self.mutate(round, |r, now| r.reveal_hash(party, co, now)).await
    }

    /// Publish a party's secret.
    pub async fn reveal_secret(
        &self,
        round: RoundId,
        party: Party,
        secret: Secret,
    ) -> Result<(), TableError> {
        self.mutate(round, |r, now| r.reveal_secret(party, secret, now)).await
    }

    /// Submit the cut; seeds the deck and deals.
    pub async fn submit_cut(&self, round: RoundId, party: Party, cut: u32) -> Result<(), TableError> {
        self.mutate(round, |r, now| r.submit_cut(party, cut, now)).await
    }

    // =========================================================================
    // Game
    // =========================================================================

    /// Player takes a card.
    pub async fn hit(&self, round: RoundId) -> Result<(), TableError> {
        self.mutate(round, |r, now| r.hit(now)).await
    }

    /// Player stands.
    pub async fn stand(&self, round: RoundId) -> Result<(), TableError> {
        self.mutate(round, |r, now| r.stand(now)).await
    }

    /// Player doubles down.
    pub async fn double_down(&self, round: RoundId) -> Result<(), TableError> {
        self.mutate(round, |r, now| r.double_down(now)).await
    }

    // =========================================================================
    // Verify
    // =========================================================================

    /// Verify a finished round. A tampered round is faulted and reported as
    /// `TableError::Tampered`.
    #[instrument(skip(self, round), fields(round = %hex::encode(&round[..4])))]
    pub async fn verify(&self, round: RoundId) -> Result<Verdict, TableError> {
        match self.mutate(round, |r, _| r.verify()).await? {
            Verdict::Tampered(evidence) => Err(TableError::Tampered(evidence)),
            verdict => Ok(verdict),
        }
    }

    /// Published transcript, once the round is seeded.
    pub async fn transcript(&self, round: RoundId) -> Result<Option<RoundTranscript>, TableError> {
        Ok(self.store.load_round(&round)?.record.transcript())
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Phase snapshot.
    pub async fn get_phase(&self, round: RoundId) -> Result<PhaseView, TableError> {
        Ok(self.store.load_round(&round)?.record.phase_view())
    }

    /// Player-visible hands.
    pub async fn get_hands(&self, round: RoundId) -> Result<HandsView, TableError> {
        Ok(self.store.load_round(&round)?.record.hands_view())
    }

    /// The player's latest round, if it is still active.
    pub async fn active_round(&self, player: &PlayerId) -> Option<RoundId> {
        let player_rounds = self.player_rounds.read().await;
        let id = player_rounds.get(player)?;
        let snapshot = self.store.load_round(id).ok()?;
        snapshot.record.is_active().then_some(*id)
    }

    /// The player's latest round, finished or not.
    pub async fn latest_round(&self, player: &PlayerId) -> Option<RoundId> {
        self.player_rounds.read().await.get(player).copied()
    }

    /// Table catalogue with active player counts.
    pub async fn tables(&self) -> Result<Vec<TableSummary>, TableError> {
        let player_rounds = self.player_rounds.read().await;
        self.tables
            .values()
            .map(|config| {
                Ok(TableSummary {
                    config: config.clone(),
                    players: self.count_players(&player_rounds, config.id)?,
                })
            })
            .collect()
    }

    /// Table configuration.
    pub fn table(&self, id: TableId) -> Option<&TableConfig> {
        self.tables.get(&id)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Abandon rounds whose current setup stage is overdue and free their
    /// players. Returns the abandoned rounds.
    pub async fn expire_stale(&self) -> Result<Vec<RoundId>, TableError> {
        let mut player_rounds = self.player_rounds.write().await;
        let mut expired = Vec::new();

        for (player, round) in player_rounds.iter() {
            match self.expire_one(*round) {
                Ok(true) => expired.push((*player, *round)),
                Ok(false) => {}
                Err(e) => warn!(round = %hex::encode(&round[..4]), error = %e, "Expiry check failed"),
            }
        }
        for (player, _) in &expired {
            player_rounds.remove(player);
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Expired stale rounds");
        }
        Ok(expired.into_iter().map(|(_, round)| round).collect())
    }

    /// Writes only when the round is actually overdue.
    fn expire_one(&self, round: RoundId) -> Result<bool, TableError> {
        let current = self.store.load_round(&round)?.record;
        if current.overdue_stage(self.now()).is_none() {
            return Ok(false);
        }
        self.mutate_sync(round, |r, now| Ok(r.expire(now)))
    }

    fn count_players(
        &self,
        player_rounds: &BTreeMap<PlayerId, RoundId>,
        table_id: TableId,
    ) -> Result<usize, TableError> {
        let mut count = 0;
        for round in player_rounds.values() {
            let record = self.store.load_round(round)?.record;
            if record.table_id() == table_id && record.is_active() {
                count += 1;
            }
        }
        Ok(count)
    }

    fn now(&self) -> Millis {
        self.clock.now_millis()
    }

    async fn mutate<T, F>(&self, round: RoundId, apply: F) -> Result<T, TableError>
    where
        F: FnMut(&mut Round, Millis) -> Result<T, RoundError>,
    {
        self.mutate_sync(round, apply)
    }

    /// Load, apply, compare-and-swap. Rejected actions leave the stored
    /// round untouched unless the error faulted it.
    fn mutate_sync<T, F>(&self, round: RoundId, mut apply: F) -> Result<T, TableError>
    where
        F: FnMut(&mut Round, Millis) -> Result<T, RoundError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let snapshot = self.store.load_round(&round)?;
            let mut record = snapshot.record;
            let outcome = apply(&mut record, self.now());

            if let Err(e) = &outcome {
                if !e.is_fatal() {
                    warn!(round = %hex::encode(&round[..4]), error = %e, "Action rejected");
                    return outcome.map_err(TableError::from);
                }
            }

            let update = RoundUpdate {
                expected_version: snapshot.version,
                record,
            };
            match self.store.commit_round_state(&round, update) {
                Ok(version) => {
                    debug!(round = %hex::encode(&round[..4]), version, "Round committed");
                    return outcome.map_err(TableError::from);
                }
                Err(StoreError::Conflict { .. }) if attempt < MAX_COMMIT_ATTEMPTS => {
                    debug!(round = %hex::encode(&round[..4]), attempt, "Write conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::game::blackjack::{BetLimits, GameStage};
    use crate::table::config::StageTimeouts;
    use crate::table::house::HouseAgent;
    use crate::table::round::{Phase, SetupStage, Termination};

    pub(crate) fn service_with(clock: Arc<ManualClock>) -> TableService {
        let tables = vec![
            TableConfig::new(1, "Test", 2, BetLimits::new(10, 1000))
                .with_timeouts(StageTimeouts::uniform(5_000)),
            TableConfig::new(2, "Solo", 1, BetLimits::new(10, 100)),
        ];
        TableService::new(tables, Arc::new(MemoryRoundStore::new()), clock)
    }

    fn service() -> TableService {
        service_with(Arc::new(ManualClock::new(0)))
    }

    /// Bet, run the exchange with the house agent and cut.
    pub(crate) async fn seat_and_seed(
        service: &TableService,
        house: &HouseAgent,
        player: PlayerId,
        cut: u32,
    ) -> RoundId {
        let round = service.join(player, 1).await.unwrap();
        let secret = Secret::generate();
        let chain = secret.commit();

        service.place_bet(round, 100).await.unwrap();
        house.drive(service, round).await.unwrap();
        service.commit_randomness(round, Party::Player, chain.cv).await.unwrap();
        house.drive(service, round).await.unwrap();
        service.reveal_hash(round, Party::Player, chain.co).await.unwrap();
        house.drive(service, round).await.unwrap();
        service.reveal_secret(round, Party::Player, secret).await.unwrap();
        service.submit_cut(round, Party::Player, cut).await.unwrap();
        round
    }

    #[tokio::test]
    async fn test_second_join_rejected() {
        let service = service();
        let player = PlayerId::new([1; 16]);

        let round = service.join(player, 1).await.unwrap();
        assert_eq!(
            service.join(player, 1).await,
            Err(TableError::AlreadyActive { round })
        );
        assert_eq!(
            service.join(player, 2).await,
            Err(TableError::AlreadyActive { round })
        );
        assert_eq!(service.active_round(&player).await, Some(round));
    }

    #[tokio::test]
    async fn test_unknown_and_full_tables() {
        let service = service();
        assert_eq!(
            service.join(PlayerId::new([1; 16]), 99).await,
            Err(TableError::UnknownTable(99))
        );

        service.join(PlayerId::new([1; 16]), 2).await.unwrap();
        assert_eq!(
            service.join(PlayerId::new([2; 16]), 2).await,
            Err(TableError::TableFull(2))
        );

        let tables = service.tables().await.unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1].players, 1);
        assert_eq!(tables[0].players, 0);
    }

    #[tokio::test]
    async fn test_full_round_verifies() {
        let service = service();
        let house = HouseAgent::new();
        let player = PlayerId::new([1; 16]);

        let round = seat_and_seed(&service, &house, player, 13).await;
        assert_eq!(house.pending().await, 1);

        let view = service.get_phase(round).await.unwrap();
        if view.phase == Phase::Game {
            assert!(service.get_hands(round).await.unwrap().dealer_hidden);
            service.stand(round).await.unwrap();
        }

        let view = service.get_phase(round).await.unwrap();
        assert_eq!(view.phase, Phase::Verify);
        assert_eq!(view.game_stage, GameStage::Finished);
        assert_eq!(service.verify(round).await, Ok(Verdict::Verified));

        // Finished rounds no longer block joining
        assert_eq!(service.active_round(&player).await, None);
        assert!(house.step(&service, round).await.unwrap().is_none());
        assert_eq!(house.pending().await, 0);
    }

    #[tokio::test]
    async fn test_new_game_carries_chips() {
        let service = service();
        let house = HouseAgent::new();
        let player = PlayerId::new([1; 16]);

        let round = seat_and_seed(&service, &house, player, 5).await;
        if service.get_phase(round).await.unwrap().phase == Phase::Game {
            service.stand(round).await.unwrap();
        }
        let chips = service.get_hands(round).await.unwrap().chips;

        let next = service.new_game(round).await.unwrap();
        assert_ne!(next, round);
        let hands = service.get_hands(next).await.unwrap();
        assert_eq!(hands.chips, chips);
        assert_eq!(hands.bet, 0);
        assert_eq!(service.active_round(&player).await, Some(next));

        // The old round cannot spawn a second successor while this one is open
        assert_eq!(
            service.new_game(round).await,
            Err(TableError::AlreadyActive { round: next })
        );
    }

    #[tokio::test]
    async fn test_fatal_reveal_is_persisted() {
        let service = service();
        let house = HouseAgent::new();
        let player = PlayerId::new([1; 16]);
        let round = service.join(player, 1).await.unwrap();
        let secret = Secret::generate();

        service.place_bet(round, 100).await.unwrap();
        house.drive(&service, round).await.unwrap();
        service
            .commit_randomness(round, Party::Player, secret.commit().cv)
            .await
            .unwrap();

        let err = service
            .reveal_hash(round, Party::Player, [0xEE; 32])
            .await
            .unwrap_err();
        assert!(err.is_fatal());

        let view = service.get_phase(round).await.unwrap();
        assert!(matches!(view.termination, Some(Termination::Faulted { .. })));
        assert!(service.join(player, 1).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_action_not_persisted() {
        let service = service();
        let round = service.join(PlayerId::new([1; 16]), 1).await.unwrap();

        assert!(service.hit(round).await.is_err());
        assert!(service.place_bet(round, 5).await.is_err());
        let view = service.get_phase(round).await.unwrap();
        assert_eq!(view.setup_stage, Some(SetupStage::Betting));
        assert_eq!(service.get_hands(round).await.unwrap().chips, 1000);
    }

    #[tokio::test]
    async fn test_expire_stale_frees_player() {
        let clock = Arc::new(ManualClock::new(0));
        let service = service_with(clock.clone());
        let player = PlayerId::new([1; 16]);
        let round = service.join(player, 1).await.unwrap();
        service.place_bet(round, 100).await.unwrap();

        clock.advance(5_000);
        let version = service.store.load_round(&round).unwrap().version;
        assert!(service.expire_stale().await.unwrap().is_empty());
        // A sweep that expires nothing leaves the record alone
        assert_eq!(service.store.load_round(&round).unwrap().version, version);

        clock.advance(1);
        assert_eq!(service.expire_stale().await.unwrap(), vec![round]);
        let view = service.get_phase(round).await.unwrap();
        assert!(matches!(
            view.termination,
            Some(Termination::Abandoned { refundable: 100, .. })
        ));
        assert_eq!(service.active_round(&player).await, None);
        assert!(service.join(player, 1).await.is_ok());
    }

    #[tokio::test]
    async fn test_expire_stale_survives_unloadable_round() {
        let clock = Arc::new(ManualClock::new(0));
        let service = service_with(clock.clone());
        let round = service.join(PlayerId::new([2; 16]), 1).await.unwrap();
        service
            .player_rounds
            .write()
            .await
            .insert(PlayerId::new([1; 16]), [9; 16]);

        clock.advance(5_001);
        assert_eq!(service.expire_stale().await.unwrap(), vec![round]);
    }

    #[tokio::test]
    async fn test_leave_frees_seat() {
        let service = service();
        let player = PlayerId::new([1; 16]);
        let round = service.join(player, 2).await.unwrap();

        service.leave(round).await.unwrap();
        assert_eq!(service.active_round(&player).await, None);
        assert_eq!(service.latest_round(&player).await, None);
        assert!(service.join(PlayerId::new([2; 16]), 2).await.is_ok());
        assert!(matches!(
            service.place_bet(round, 10).await,
            Err(TableError::Round(RoundError::PhaseViolation { terminated: true, .. }))
        ));
    }

    #[tokio::test]
    async fn test_missing_round() {
        let service = service();
        assert_eq!(
            service.get_phase([7; 16]).await,
            Err(TableError::Store(StoreError::NotFound([7; 16])))
        );
    }
}
