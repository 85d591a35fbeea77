//! Network Layer
//!
//! WebSocket server and JSON protocol in front of the play engine.
//! Nothing here decides an outcome; all play logic runs through `game/`.

pub mod auth;
pub mod protocol;
pub mod server;

pub use auth::{AuthConfig, TokenClaims, AuthError, validate_token};
pub use protocol::{ClientMessage, ServerMessage, ServerError, ErrorCode, AuthRequest, AuthResult};
pub use server::{GameServer, ServerConfig, GameServerError};
