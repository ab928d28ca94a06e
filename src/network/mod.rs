//! Network Layer
//!
//! WebSocket front end for the table service.
//! This layer is **non-deterministic**; all round logic runs through `table/`.

pub mod protocol;
pub mod server;

pub use protocol::{
    ClientMessage, ErrorCode, PhaseUpdate, ServerError, ServerMessage, TableInfo,
    VerificationInfo,
};
pub use server::{GameServer, GameServerError, ServerConfig};
