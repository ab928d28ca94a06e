//! Table Layer
//!
//! Rounds, their persistence boundary and the party-facing action surface.
//!
//! ## Module Structure
//!
//! - `config`: Table catalogue, stake limits, stage timeouts
//! - `round`: Phase state machine over one stake, exchange and hand
//! - `store`: Versioned round storage (trait + in-memory)
//! - `service`: Action surface, one active round per player
//! - `house`: Automated house party
//! - `wait`: Bounded polling waits

pub mod config;
pub mod house;
pub mod round;
pub mod service;
pub mod store;
pub mod wait;

// Re-export key types
pub use config::{default_tables, StageTimeouts, TableConfig, TableId};
pub use house::{HouseAgent, HouseError};
pub use round::{
    AbandonCause, HandsView, Phase, PhaseView, PlayerId, Round, RoundAction, RoundError, RoundId,
    SetupStage, Termination,
};
pub use service::{TableError, TableService, TableSummary};
pub use store::{MemoryRoundStore, RoundSnapshot, RoundStore, RoundUpdate, StoreError};
pub use wait::{wait_for_phase, wait_until, WaitConfig, WaitError};
