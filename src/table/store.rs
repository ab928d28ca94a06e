//! Round Persistence
//!
//! The durable store is an external collaborator; this module defines its
//! boundary and ships an in-memory implementation. Writes are
//! compare-and-swap on a per-round version, so two writers racing on the
//! same round cannot both succeed.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::table::round::{Round, RoundId};

/// Persistence errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No such round.
    #[error("Round {} not found", hex::encode(.0))]
    NotFound(RoundId),

    /// Round id already taken.
    #[error("Round {} already exists", hex::encode(.0))]
    AlreadyExists(RoundId),

    /// Another writer committed first.
    #[error("Version conflict: expected {expected}, found {actual}")]
    Conflict {
        /// Version the writer loaded.
        expected: u64,
        /// Version in the store.
        actual: u64,
    },

    /// Record could not be encoded or decoded.
    #[error("Record codec error: {0}")]
    Codec(String),
}

/// A loaded round and the version it was read at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundSnapshot {
    /// The round record.
    pub record: Round,
    /// Version to pass back on commit.
    pub version: u64,
}

/// A full-record write conditioned on the version it was derived from.
#[derive(Clone, Debug)]
pub struct RoundUpdate {
    /// Version the writer loaded.
    pub expected_version: u64,
    /// New record.
    pub record: Round,
}

/// Durable, atomic round storage.
pub trait RoundStore: Send + Sync {
    /// Persist a new round at version 0.
    fn create_round(&self, record: Round) -> Result<RoundId, StoreError>;

    /// Load the current record and version.
    fn load_round(&self, id: &RoundId) -> Result<RoundSnapshot, StoreError>;

    /// Replace the record if the version still matches. Returns the new version.
    fn commit_round_state(&self, id: &RoundId, update: RoundUpdate) -> Result<u64, StoreError>;
}

struct StoredRound {
    version: u64,
    bytes: Vec<u8>,
}

/// In-memory store keeping bincode-encoded records.
#[derive(Default)]
pub struct MemoryRoundStore {
    rounds: RwLock<BTreeMap<RoundId, StoredRound>>,
}

impl MemoryRoundStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rounds.
    pub fn len(&self) -> usize {
        self.rounds.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Store holds no rounds?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn encode(record: &Round) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(record).map_err(|e| StoreError::Codec(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Round, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Codec(e.to_string()))
}

impl RoundStore for MemoryRoundStore {
    fn create_round(&self, record: Round) -> Result<RoundId, StoreError> {
        let id = record.id();
        let bytes = encode(&record)?;
        let mut rounds = self.rounds.write().unwrap_or_else(PoisonError::into_inner);
        if rounds.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        rounds.insert(id, StoredRound { version: 0, bytes });
        debug!(round = %hex::encode(&id[..4]), "Round created");
        Ok(id)
    }

    fn load_round(&self, id: &RoundId) -> Result<RoundSnapshot, StoreError> {
        let rounds = self.rounds.read().unwrap_or_else(PoisonError::into_inner);
        let stored = rounds.get(id).ok_or(StoreError::NotFound(*id))?;
        Ok(RoundSnapshot {
            record: decode(&stored.bytes)?,
            version: stored.version,
        })
    }

    fn commit_round_state(&self, id: &RoundId, update: RoundUpdate) -> Result<u64, StoreError> {
        let bytes = encode(&update.record)?;
        let mut rounds = self.rounds.write().unwrap_or_else(PoisonError::into_inner);
        let stored = rounds.get_mut(id).ok_or(StoreError::NotFound(*id))?;
        if stored.version != update.expected_version {
            return Err(StoreError::Conflict {
                expected: update.expected_version,
                actual: stored.version,
            });
        }
        stored.version += 1;
        stored.bytes = bytes;
        Ok(stored.version)
    }
}
