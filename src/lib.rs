//! # Fair Blackjack
//!
//! Single-deck blackjack against a house whose shuffle is provably fair:
//! house and player each commit to a secret before either is revealed,
//! and anyone can re-derive the deck from the published transcript.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    FAIR BLACKJACK                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── hash.rs     - SHA-256 commitment chain                  │
//! │  ├── rng.rs      - Seed derivation, Xorshift128+ stream      │
//! │  └── clock.rs    - Injectable millisecond clock              │
//! │                                                              │
//! │  game/           - Rules (deterministic)                     │
//! │  ├── card.rs     - Ranks, suits, card values                 │
//! │  ├── deck.rs     - Seeded shuffle, hands, scoring            │
//! │  └── blackjack.rs- Betting, dealing, dealer play, payout     │
//! │                                                              │
//! │  proof/          - Fairness                                  │
//! │  ├── commitment.rs - Commit-reveal coordinator               │
//! │  ├── transcript.rs - Published round record                  │
//! │  └── verify.rs   - Verification by re-shuffle                │
//! │                                                              │
//! │  table/          - Rounds and persistence                    │
//! │  ├── round.rs    - Phase state machine                       │
//! │  ├── store.rs    - Versioned round store                     │
//! │  ├── service.rs  - Action surface                            │
//! │  ├── house.rs    - Automated house party                     │
//! │  └── wait.rs     - Bounded polling waits                     │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── server.rs   - WebSocket server                          │
//! │  └── protocol.rs - Message types                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! Given the two revealed secrets and the cut, the deck order is fixed:
//! - SHA-256 over a fixed byte layout for the seed
//! - Xorshift128+ with rejection sampling for every swap index
//! - No HashMap (uses BTreeMap for sorted iteration)
//!
//! A verifier on any platform reproduces every card dealt.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod proof;
pub mod table;

// Re-export commonly used types
pub use core::hash::{HashValue, Secret};
pub use core::rng::{derive_combined_seed, DeterministicRng};
pub use game::{BlackjackGame, Card, Deck};
pub use proof::{verify_round, Coordinator, Party, RoundTranscript, Verdict};
pub use table::{HouseAgent, PlayerId, Round, RoundId, TableService};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
