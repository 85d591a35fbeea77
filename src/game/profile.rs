//! Player Profiles
//!
//! A profile owns the player's [`Balance`]; the ledger is the only writer of
//! the `currencies` field after creation.

use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::economy::balance::Balance;

/// Unique player identifier (the `user_id` of the profile).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Wrap a user id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for an empty or whitespace-only id.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Persisted player profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Unique user identifier.
    pub user_id: PlayerId,
    /// Player chosen name.
    pub display_name: String,
    /// Avatar key.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Currency holdings.
    #[serde(default)]
    pub currencies: Balance,
    /// Player level.
    #[serde(default = "default_level")]
    pub level: u32,
    /// Experience toward the next level.
    #[serde(default)]
    pub exp: u64,
    /// Daily login streak.
    #[serde(default)]
    pub streak: u32,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_level() -> u32 {
    1
}

impl Profile {
    /// New profile with starting currencies, stamped `now`.
    pub fn new(user_id: PlayerId, display_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            avatar: None,
            currencies: Balance::starting(),
            level: default_level(),
            exp: 0,
            streak: 0,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}

/// Request to create a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProfile {
    /// Unique user identifier.
    pub user_id: PlayerId,
    /// Player chosen name.
    pub display_name: String,
    /// Avatar key.
    #[serde(default)]
    pub avatar: Option<String>,
}
