//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Messages are JSON; hashes, secrets and ids travel as hex strings, including
//! inside published transcripts.

use serde::{Deserialize, Serialize};

use crate::core::hash::{parse_hash_hex, HashValue, Secret};
use crate::game::blackjack::{GameError, GameStage};
use crate::proof::commitment::{Party, ProtocolError, ProtocolState};
use crate::proof::transcript::RoundTranscript;
use crate::proof::verify::Verdict;
use crate::table::config::TableId;
use crate::table::round::{
    HandsView, Phase, PhaseView, RoundAction, RoundError, RoundId, SetupStage, Termination,
};
use crate::table::service::{TableError, TableSummary};
use crate::table::store::StoreError;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// List tables with player counts.
    ListTables,

    /// Sit at a table and open a round.
    Join {
        /// Table to sit at.
        table_id: TableId,
    },

    /// Lock the stake.
    PlaceBet {
        /// Chips to stake.
        amount: u64,
    },

    /// Publish the commitment.
    CommitRandomness {
        /// `cv`, hex.
        cv: String,
    },

    /// Publish the first reveal.
    RevealHash {
        /// `co`, hex.
        co: String,
    },

    /// Publish the secret.
    RevealSecret {
        /// The secret, hex.
        secret: String,
    },

    /// Submit the cut.
    SubmitCut {
        /// Cut position.
        cut: u32,
    },

    /// Take a card.
    Hit,

    /// End the turn.
    Stand,

    /// Double down.
    DoubleDown,

    /// Start the next round with the current chips.
    NewGame,

    /// Leave the table.
    Leave,

    /// Request the phase snapshot.
    GetPhase,

    /// Request the visible hands.
    GetHands,

    /// Verify the finished round.
    Verify,

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

/// Decode a 32-byte hex field.
pub fn decode_hash(field: &str) -> Option<HashValue> {
    parse_hash_hex(field)
}

/// Decode a hex secret.
pub fn decode_secret(field: &str) -> Option<Secret> {
    parse_hash_hex(field).map(Secret::from_bytes)
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection accepted.
    Welcome {
        /// Identity assigned to this connection (hex).
        player_id: String,
        /// Server version.
        server_version: String,
    },

    /// Table catalogue.
    Tables {
        /// Every table with its player count.
        tables: Vec<TableInfo>,
    },

    /// Round opened.
    Joined {
        /// New round (hex).
        round_id: String,
        /// Table the round is at.
        table_id: TableId,
    },

    /// Phase snapshot.
    Phase(PhaseUpdate),

    /// Visible hands.
    Hands(HandsView),

    /// Verification outcome and the published transcript.
    Verification(VerificationInfo),

    /// Pong response.
    Pong {
        /// Client timestamp from the ping.
        timestamp: u64,
        /// Server time in milliseconds.
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

/// Table listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table id.
    pub id: TableId,
    /// Display name.
    pub name: String,
    /// Minimum bet.
    pub min_bet: u64,
    /// Maximum bet.
    pub max_bet: u64,
    /// Seats.
    pub max_players: usize,
    /// Seats taken.
    pub players: usize,
}

impl From<&TableSummary> for TableInfo {
    fn from(summary: &TableSummary) -> Self {
        Self {
            id: summary.config.id,
            name: summary.config.name.clone(),
            min_bet: summary.config.limits.min_bet,
            max_bet: summary.config.limits.max_bet,
            max_players: summary.config.max_players,
            players: summary.players,
        }
    }
}

/// Phase snapshot for the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseUpdate {
    /// Round id (hex).
    pub round_id: String,
    /// Table id.
    pub table_id: TableId,
    /// Top-level phase.
    pub phase: Phase,
    /// Setup sub-stage.
    pub setup_stage: Option<SetupStage>,
    /// Rules engine stage.
    pub game_stage: GameStage,
    /// Coordinator state.
    pub protocol_state: ProtocolState,
    /// Parties owing the next step.
    pub awaiting: Vec<Party>,
    /// Terminal flag.
    pub termination: Option<Termination>,
    /// Verification verdict.
    pub verdict: Option<Verdict>,
}

impl From<PhaseView> for PhaseUpdate {
    fn from(view: PhaseView) -> Self {
        Self {
            round_id: hex::encode(view.round_id),
            table_id: view.table_id,
            phase: view.phase,
            setup_stage: view.setup_stage,
            game_stage: view.game_stage,
            protocol_state: view.protocol_state,
            awaiting: view.awaiting,
            termination: view.termination,
            verdict: view.verdict,
        }
    }
}

/// Verification result for the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationInfo {
    /// Round id (hex).
    pub round_id: String,
    /// Outcome.
    pub verdict: Verdict,
    /// Transcript digest (hex).
    pub digest: Option<String>,
    /// Full transcript.
    pub transcript: Option<RoundTranscript>,
}

impl VerificationInfo {
    /// Build from a verdict and the round's transcript.
    pub fn new(round_id: RoundId, verdict: Verdict, transcript: Option<RoundTranscript>) -> Self {
        Self {
            round_id: hex::encode(round_id),
            verdict,
            digest: transcript.as_ref().map(|t| hex::encode(t.digest())),
            transcript,
        }
    }
}

/// Error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Create an error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl From<&TableError> for ServerError {
    fn from(err: &TableError) -> Self {
        Self::new(ErrorCode::from(err), err.to_string())
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed message or field.
    InvalidInput,
    /// No round for this connection.
    NotSeated,
    /// Action not legal in the current phase.
    PhaseViolation,
    /// Reveal1 does not match the commitment.
    CommitmentMismatch,
    /// Secret does not open the commitment.
    InvalidReveal,
    /// Cut out of range.
    CutOutOfRange,
    /// Step reserved for the other party.
    WrongParty,
    /// Not enough chips.
    InsufficientFunds,
    /// Bet outside table limits.
    BetOutOfRange,
    /// Already playing a round.
    AlreadyActive,
    /// No such table.
    UnknownTable,
    /// Table at capacity.
    TableFull,
    /// Round failed verification.
    Tampered,
    /// Concurrent update lost; retry.
    Conflict,
    /// Internal error.
    InternalError,
}

impl From<&TableError> for ErrorCode {
    fn from(err: &TableError) -> Self {
        match err {
            TableError::Round(RoundError::PhaseViolation { .. }) => ErrorCode::PhaseViolation,
            TableError::Round(RoundError::Game(e)) => match e {
                GameError::PhaseViolation { .. } => ErrorCode::PhaseViolation,
                GameError::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
                GameError::BetOutOfRange { .. } => ErrorCode::BetOutOfRange,
                GameError::Deck(_) => ErrorCode::InternalError,
            },
            TableError::Round(RoundError::Protocol(e)) => match e {
                ProtocolError::PhaseViolation { .. } => ErrorCode::PhaseViolation,
                ProtocolError::CommitmentMismatch { .. } => ErrorCode::CommitmentMismatch,
                ProtocolError::InvalidReveal { .. } => ErrorCode::InvalidReveal,
                ProtocolError::CutOutOfRange { .. } => ErrorCode::CutOutOfRange,
                ProtocolError::WrongParty { .. } => ErrorCode::WrongParty,
            },
            TableError::Round(RoundError::Deck(_)) => ErrorCode::InternalError,
            TableError::Store(StoreError::Conflict { .. }) => ErrorCode::Conflict,
            TableError::Store(StoreError::NotFound(_)) => ErrorCode::NotSeated,
            TableError::Store(_) => ErrorCode::InternalError,
            TableError::AlreadyActive { .. } => ErrorCode::AlreadyActive,
            TableError::UnknownTable(_) => ErrorCode::UnknownTable,
            TableError::TableFull(_) => ErrorCode::TableFull,
            TableError::Tampered(_) => ErrorCode::Tampered,
        }
    }
}

/// Action names echoed in acknowledgements and logs.
pub fn action_name(msg: &ClientMessage) -> Option<RoundAction> {
    match msg {
        ClientMessage::PlaceBet { .. } => Some(RoundAction::PlaceBet),
        ClientMessage::CommitRandomness { .. } => Some(RoundAction::CommitRandomness),
        ClientMessage::RevealHash { .. } => Some(RoundAction::RevealHash),
        ClientMessage::RevealSecret { .. } => Some(RoundAction::RevealSecret),
        ClientMessage::SubmitCut { .. } => Some(RoundAction::SubmitCut),
        ClientMessage::Hit => Some(RoundAction::Hit),
        ClientMessage::Stand => Some(RoundAction::Stand),
        ClientMessage::DoubleDown => Some(RoundAction::DoubleDown),
        ClientMessage::NewGame => Some(RoundAction::NewGame),
        ClientMessage::Verify => Some(RoundAction::Verify),
        _ => None,
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Error message for a table error.
    pub fn error(err: &TableError) -> Self {
        ServerMessage::Error(ServerError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::blackjack::GameAction;

    #[test]
    fn test_client_message_json_shape() {
        let msg = ClientMessage::from_json(r#"{"type":"place_bet","amount":100}"#).unwrap();
        assert_eq!(msg, ClientMessage::PlaceBet { amount: 100 });

        let msg = ClientMessage::from_json(r#"{"type":"double_down"}"#).unwrap();
        assert_eq!(msg, ClientMessage::DoubleDown);

        let json = ClientMessage::SubmitCut { cut: 7 }.to_json().unwrap();
        assert_eq!(json, r#"{"type":"submit_cut","cut":7}"#);

        assert!(ClientMessage::from_json(r#"{"type":"split"}"#).is_err());
    }

    #[test]
    fn test_hex_fields() {
        let secret = Secret::from_bytes([0x5A; 32]);
        let encoded = hex::encode(secret.as_bytes());
        assert_eq!(decode_secret(&encoded), Some(secret));
        assert_eq!(decode_hash(&format!("0x{}", encoded)), Some([0x5A; 32]));
        assert_eq!(decode_hash("not hex"), None);
    }

    #[test]
    fn test_server_message_roundtrip() {
        let msg = ServerMessage::Joined { round_id: "ab".into(), table_id: 2 };
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"joined""#));
        assert_eq!(ServerMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_verification_transcript_is_hex() {
        let house = Secret::from_bytes([1; 32]);
        let player = Secret::from_bytes([2; 32]);
        let transcript = RoundTranscript {
            version: crate::proof::TRANSCRIPT_VERSION,
            round_id: [3; 16],
            house_cv: house.commit().cv,
            player_cv: player.commit().cv,
            house_secret: house,
            player_secret: player,
            cut: 0,
            seed: [4; 32],
            draws: Vec::new(),
            moves: Vec::new(),
            player_cards: Vec::new(),
            dealer_cards: Vec::new(),
            bet: 10,
            result: None,
            payout: 0,
        };
        let msg = ServerMessage::Verification(VerificationInfo::new(
            [3; 16],
            Verdict::Verified,
            Some(transcript),
        ));

        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "verification");
        assert_eq!(value["transcript"]["player_secret"], "02".repeat(32));
        assert_eq!(value["transcript"]["seed"], "04".repeat(32));
        assert_eq!(ServerMessage::from_json(&msg.to_json().unwrap()).unwrap(), msg);
    }

    #[test]
    fn test_error_codes() {
        let err = TableError::Round(RoundError::Game(GameError::PhaseViolation {
            action: GameAction::Hit,
            stage: GameStage::Finished,
        }));
        assert_eq!(ErrorCode::from(&err), ErrorCode::PhaseViolation);

        let err = TableError::AlreadyActive { round: [1; 16] };
        let msg = ServerMessage::error(&err);
        match msg {
            ServerMessage::Error(e) => {
                assert_eq!(e.code, ErrorCode::AlreadyActive);
                assert!(e.message.contains("01010101"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let json = serde_json::to_string(&ErrorCode::CutOutOfRange).unwrap();
        assert_eq!(json, r#""cut_out_of_range""#);
    }
}
