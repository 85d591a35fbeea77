//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is one JSON object tagged by `type`.

use serde::{Serialize, Deserialize};

use crate::game::catalog::{Event, LeaderboardEntry, Quest};
use crate::game::engine::{MiniGamePlayRequest, PlayError, PlayReceipt, SlotPlayRequest};
use crate::game::profile::{NewProfile, PlayerId, Profile};
use crate::game::record::{StoredPlayResult, MAX_HISTORY};
use crate::network::auth::AuthError;

/// Leaderboard rows when the client does not ask for a number.
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

fn default_history_limit() -> usize {
    MAX_HISTORY
}

fn default_leaderboard_limit() -> usize {
    DEFAULT_LEADERBOARD_LIMIT
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate with a JWT.
    Auth(AuthRequest),

    /// Create a profile (returns the existing one if present).
    CreateProfile(NewProfile),

    /// Fetch a profile.
    GetProfile { user_id: PlayerId },

    /// Spin a slot machine.
    PlaySlot(SlotPlayRequest),

    /// Play a mini-game.
    PlayMiniGame(MiniGamePlayRequest),

    /// Recent plays, newest first.
    History {
        user_id: PlayerId,
        #[serde(default = "default_history_limit")]
        limit: usize,
    },

    /// Quests for a player.
    Quests { user_id: PlayerId },

    /// Running events.
    Events,

    /// Top players by coins.
    Leaderboard {
        #[serde(default = "default_leaderboard_limit")]
        limit: usize,
    },

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

impl ClientMessage {
    /// Player the request acts on, if any.
    pub fn target_player(&self) -> Option<&PlayerId> {
        match self {
            ClientMessage::CreateProfile(req) => Some(&req.user_id),
            ClientMessage::GetProfile { user_id }
            | ClientMessage::History { user_id, .. }
            | ClientMessage::Quests { user_id } => Some(user_id),
            ClientMessage::PlaySlot(req) => Some(&req.user_id),
            ClientMessage::PlayMiniGame(req) => Some(&req.user_id),
            ClientMessage::Auth(_)
            | ClientMessage::Events
            | ClientMessage::Leaderboard { .. }
            | ClientMessage::Ping { .. } => None,
        }
    }
}

/// Authentication request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRequest {
    /// JWT issued by the identity provider.
    pub token: String,
    /// Client version, logged only.
    #[serde(default)]
    pub client_version: String,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// A player profile.
    Profile(Profile),

    /// Settled slot spin.
    SlotResult(PlayReceipt),

    /// Settled mini-game.
    MiniGameResult(PlayReceipt),

    /// Play history.
    History { records: Vec<StoredPlayResult> },

    /// Quest listing.
    Quests { quests: Vec<Quest> },

    /// Event listing.
    Events { events: Vec<Event> },

    /// Leaderboard rows.
    Leaderboard { entries: Vec<LeaderboardEntry> },

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// Successful authentication. Failures are sent as [`ServerMessage::Error`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResult {
    /// Player bound to the connection.
    pub user_id: PlayerId,
    /// Server version.
    pub server_version: String,
}

/// Error details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Build from a code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&PlayError> for ServerError {
    fn from(err: &PlayError) -> Self {
        Self::new(ErrorCode::from(err), err.to_string())
    }
}

impl From<&AuthError> for ServerError {
    fn from(err: &AuthError) -> Self {
        Self::new(ErrorCode::from(err), err.to_string())
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed message or rejected field.
    InvalidInput,
    /// No profile for the player.
    ProfileNotFound,
    /// Balance too low for the play.
    InsufficientFunds,
    /// Store failed; the play may have been applied.
    StorageFailure,
    /// Request needs an authenticated connection.
    NotAuthenticated,
    /// Authentication failed.
    AuthFailed,
    /// JWT token has expired.
    TokenExpired,
    /// Invalid JWT token (signature, format, claims).
    InvalidToken,
    /// Request names a player other than the authenticated one.
    Forbidden,
    /// Internal error.
    InternalError,
}

impl From<&PlayError> for ErrorCode {
    fn from(err: &PlayError) -> Self {
        match err {
            PlayError::NotFound(_) => ErrorCode::ProfileNotFound,
            PlayError::InsufficientFunds(_) => ErrorCode::InsufficientFunds,
            PlayError::Validation(_) => ErrorCode::InvalidInput,
            PlayError::Storage(_) => ErrorCode::StorageFailure,
        }
    }
}

impl From<&AuthError> for ErrorCode {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::Expired => ErrorCode::TokenExpired,
            AuthError::NotConfigured => ErrorCode::AuthFailed,
            _ => ErrorCode::InvalidToken,
        }
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

    /// Error reply.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError::new(code, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;
    use crate::economy::balance::{Balance, Currency, Reward};
    use crate::economy::ledger::InsufficientFunds;
    use crate::game::catalog::Theme;
    use crate::game::engine::ValidationError;
    use crate::game::outcome::Tier;
    use crate::game::record::{PlayDetail, PlayResult};
    use crate::game::reels::{Grid, Symbol};
    use crate::store::StoreError;

    #[test]
    fn test_play_slot_from_json() {
        let json = r#"{"type": "play_slot", "user_id": "alice", "theme": "candy_carnival", "bet": 25}"#;
        let msg = ClientMessage::from_json(json).unwrap();

        if let ClientMessage::PlaySlot(req) = &msg {
            assert_eq!(req.user_id.as_str(), "alice");
            assert_eq!(req.theme, "candy_carnival");
            assert_eq!(req.bet, 25);
            assert_eq!(req.idempotency_key, None);
        } else {
            panic!("Wrong message type");
        }
        assert_eq!(msg.target_player().map(PlayerId::as_str), Some("alice"));
    }

    #[test]
    fn test_client_defaults() {
        let msg = ClientMessage::from_json(r#"{"type": "play_mini_game", "user_id": "bob"}"#).unwrap();
        assert_eq!(msg, ClientMessage::PlayMiniGame(MiniGamePlayRequest::new("bob")));

        let msg = ClientMessage::from_json(r#"{"type": "leaderboard"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Leaderboard { limit: DEFAULT_LEADERBOARD_LIMIT });

        let msg = ClientMessage::from_json(r#"{"type": "history", "user_id": "bob"}"#).unwrap();
        assert_eq!(msg, ClientMessage::History { user_id: PlayerId::new("bob"), limit: MAX_HISTORY });

        let msg = ClientMessage::from_json(r#"{"type": "events"}"#).unwrap();
        assert_eq!(msg.target_player(), None);
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(ClientMessage::from_json(r#"{"type": "matchmaking"}"#).is_err());
        assert!(ClientMessage::from_json(r#"{"type": "play_slot"}"#).is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_slot_result_json_roundtrip() {
        let receipt = PlayReceipt {
            record: StoredPlayResult {
                id: Uuid::new_v4(),
                created_at: Utc::now(),
                result: PlayResult {
                    user_id: PlayerId::new("alice"),
                    idempotency_key: Some("spin-9".into()),
                    reward: Some(Reward::coins(1000)),
                    detail: PlayDetail::Slot {
                        theme: Theme::SunnyGarden,
                        bet: 10,
                        outcome: Tier::Jackpot,
                        win_amount: 1000,
                        reels: Grid::filled(Symbol::Daisy),
                        free_spins_awarded: 5,
                    },
                },
            },
            balance: Balance::empty().with(Currency::Coins, 1000),
            replayed: false,
        };

        let msg = ServerMessage::SlotResult(receipt);
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"slot_result""#));
        assert!(json.contains(r#""outcome":"jackpot""#));
        assert!(json.contains("🌼"));

        let parsed = ServerMessage::from_json(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_play_error_codes() {
        let cases = [
            (PlayError::NotFound(PlayerId::new("x")), ErrorCode::ProfileNotFound),
            (
                PlayError::InsufficientFunds(InsufficientFunds {
                    currency: Currency::Energy,
                    required: 1,
                    available: 0,
                }),
                ErrorCode::InsufficientFunds,
            ),
            (PlayError::Validation(ValidationError::StakeOutOfRange(-1)), ErrorCode::InvalidInput),
            (PlayError::Storage(StoreError::Unavailable("down".into())), ErrorCode::StorageFailure),
        ];

        for (err, code) in cases {
            assert_eq!(ServerError::from(&err).code, code);
        }
    }

    #[test]
    fn test_error_json() {
        let json = ServerMessage::error(ErrorCode::InsufficientFunds, "insufficient energy")
            .to_json()
            .unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains("insufficient_funds"));
    }

    #[test]
    fn test_auth_error_codes() {
        assert_eq!(ErrorCode::from(&AuthError::Expired), ErrorCode::TokenExpired);
        assert_eq!(ErrorCode::from(&AuthError::InvalidSignature), ErrorCode::InvalidToken);
        assert_eq!(ErrorCode::from(&AuthError::NotConfigured), ErrorCode::AuthFailed);
    }
}
