//! Play Records
//!
//! Every resolved play is appended once to the history collection and never
//! touched again.

use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tracing::debug;
use uuid::Uuid;

use crate::economy::balance::Reward;
use crate::game::catalog::{MiniGame, Theme};
use crate::game::outcome::Tier;
use crate::game::profile::PlayerId;
use crate::game::reels::Grid;
use crate::store::{ResultStore, StoreError};

/// Most records a history query returns.
pub const MAX_HISTORY: usize = 50;

/// Game-specific part of a play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlayDetail {
    /// A slot spin.
    Slot {
        /// Machine theme.
        theme: Theme,
        /// Stake.
        bet: u64,
        /// Classified tier.
        outcome: Tier,
        /// `bet * multiplier`.
        win_amount: u64,
        /// The spun grid.
        reels: Grid,
        /// Bonus annotation.
        free_spins_awarded: u32,
    },
    /// A mini-game.
    MiniGame {
        /// Which game.
        game: MiniGame,
        /// Whether the player won.
        success: bool,
        /// Server-rolled score.
        score: u32,
    },
}

/// A resolved play, before storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayResult {
    /// Player who played.
    pub user_id: PlayerId,
    /// Client retry key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Credit applied to the balance, if any.
    pub reward: Option<Reward>,
    /// Game-specific data.
    pub detail: PlayDetail,
}

impl PlayResult {
    /// Slot tier, if this was a spin.
    pub fn tier(&self) -> Option<Tier> {
        match self.detail {
            PlayDetail::Slot { outcome, .. } => Some(outcome),
            PlayDetail::MiniGame { .. } => None,
        }
    }

    /// Slot win amount, if this was a spin.
    pub fn win_amount(&self) -> Option<u64> {
        match self.detail {
            PlayDetail::Slot { win_amount, .. } => Some(win_amount),
            PlayDetail::MiniGame { .. } => None,
        }
    }
}

/// A play as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPlayResult {
    /// Generated record id.
    pub id: Uuid,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// The play.
    #[serde(flatten)]
    pub result: PlayResult,
}

impl StoredPlayResult {
    /// Stamp `result` with a fresh id and the current time.
    pub fn new(result: PlayResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            result,
        }
    }
}

/// Appends play records to a [`ResultStore`].
pub struct PlayRecorder<S> {
    store: Arc<S>,
}

impl<S: ResultStore> PlayRecorder<S> {
    /// Create a recorder over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Append a stamped record.
    pub async fn record(&self, stored: StoredPlayResult) -> Result<StoredPlayResult, StoreError> {
        let stored = self.store.append(stored).await?;
        debug!("Recorded play {} for {}", stored.id, stored.result.user_id);
        Ok(stored)
    }

    /// Append a record that may already be stored.
    ///
    /// Record ids are never reused, so a duplicate means an earlier append
    /// went through.
    pub async fn complete(&self, stored: StoredPlayResult) -> Result<StoredPlayResult, StoreError> {
        match self.store.append(stored.clone()).await {
            Ok(stored) => Ok(stored),
            Err(StoreError::Duplicate { .. }) => {
                debug!("Play {} already recorded", stored.id);
                Ok(stored)
            }
            Err(e) => Err(e),
        }
    }

    /// Earlier record written under the same retry key.
    pub async fn find_replay(
        &self,
        user_id: &PlayerId,
        key: &str,
    ) -> Result<Option<StoredPlayResult>, StoreError> {
        self.store.find_by_idempotency_key(user_id, key).await
    }

    /// Most recent plays first, at most [`MAX_HISTORY`].
    pub async fn history(
        &self,
        user_id: &PlayerId,
        limit: usize,
    ) -> Result<Vec<StoredPlayResult>, StoreError> {
        self.store.history(user_id, limit.min(MAX_HISTORY)).await
    }
}
