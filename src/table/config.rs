//! Table Configuration
//!
//! Static table catalogue and per-stage timeouts.

use serde::{Deserialize, Serialize};

use crate::core::clock::Millis;
use crate::game::blackjack::{BetLimits, DEFAULT_STARTING_CHIPS};
use crate::proof::commitment::DEFAULT_MAX_CUT;
use crate::table::round::SetupStage;

/// Table identifier.
pub type TableId = u32;

/// Default maximum wait for any counterpart action (120 seconds).
pub const DEFAULT_STAGE_TIMEOUT_MS: Millis = 120_000;

/// Maximum wait per setup stage before a round is abandoned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimeouts {
    /// Waiting for the stake.
    pub betting_ms: Millis,
    /// Waiting for both commitments.
    pub commit_ms: Millis,
    /// Waiting for both `co` values.
    pub reveal1_ms: Millis,
    /// Waiting for both secrets.
    pub reveal2_ms: Millis,
    /// Waiting for the cut.
    pub cut_ms: Millis,
}

impl StageTimeouts {
    /// Same limit for every stage.
    pub const fn uniform(ms: Millis) -> Self {
        Self {
            betting_ms: ms,
            commit_ms: ms,
            reveal1_ms: ms,
            reveal2_ms: ms,
            cut_ms: ms,
        }
    }

    /// Limit for a stage.
    pub fn for_stage(&self, stage: SetupStage) -> Millis {
        match stage {
            SetupStage::Betting => self.betting_ms,
            SetupStage::RngCommit => self.commit_ms,
            SetupStage::RngReveal1 => self.reveal1_ms,
            SetupStage::RngReveal2 => self.reveal2_ms,
            SetupStage::Cut => self.cut_ms,
        }
    }
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self::uniform(DEFAULT_STAGE_TIMEOUT_MS)
    }
}

/// Configuration for one table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Table identifier.
    pub id: TableId,
    /// Display name.
    pub name: String,
    /// Concurrent players allowed.
    pub max_players: usize,
    /// Stake limits.
    pub limits: BetLimits,
    /// Chips for a fresh seat.
    pub starting_chips: u64,
    /// Largest cut value (inclusive).
    pub max_cut: u32,
    /// Setup stage timeouts.
    pub timeouts: StageTimeouts,
}

impl TableConfig {
    /// Table with default chips, cut range and timeouts.
    pub fn new(id: TableId, name: impl Into<String>, max_players: usize, limits: BetLimits) -> Self {
        Self {
            id,
            name: name.into(),
            max_players,
            limits,
            starting_chips: DEFAULT_STARTING_CHIPS,
            max_cut: DEFAULT_MAX_CUT,
            timeouts: StageTimeouts::default(),
        }
    }

    /// Override the timeouts.
    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

/// The standard table catalogue.
pub fn default_tables() -> Vec<TableConfig> {
    vec![
        TableConfig::new(1, "Beginner Table", 6, BetLimits::new(10, 100)),
        TableConfig::new(2, "High Roller", 4, BetLimits::new(100, 1000)),
        TableConfig::new(3, "VIP Lounge", 3, BetLimits::new(500, 5000)),
    ]
}
