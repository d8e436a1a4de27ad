//! Network Layer
//!
//! WebSocket surface for players and operators. The seed never crosses
//! this boundary before the round crashes; all round logic runs through
//! `game/`.

pub mod protocol;
pub mod server;

pub use protocol::{AdminAction, ClientMessage, ErrorCode, ServerError, ServerMessage};
pub use server::{
    spawn_round_actor, RoundHandle, RoundServer, RoundServerError, RoundStatus, ServerConfig, Session,
};
