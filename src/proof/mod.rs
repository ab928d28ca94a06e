//! Fairness Proof System
//!
//! Provides verifiable rounds through:
//! - A two-party commit-reveal exchange for the shuffle seed
//! - Round transcript recording
//! - Verification by re-deriving the deck
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PROOF SYSTEM                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  commitment.rs   - Commit / reveal1 / reveal2 / cut         │
//! │  transcript.rs   - Published round record                   │
//! │  verify.rs       - Verification by re-shuffle               │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod commitment;
pub mod transcript;
pub mod verify;

// Re-export key types
pub use commitment::{
    Coordinator, Party, PartyCommitment, ProtocolError, ProtocolState, ProtocolStep,
    DEFAULT_MAX_CUT,
};
pub use transcript::{RoundTranscript, TranscriptError, TRANSCRIPT_VERSION};
pub use verify::{verify_round, TamperEvidence, Verdict};
