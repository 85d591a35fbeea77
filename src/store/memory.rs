//! In-Memory Store
//!
//! Collections are `BTreeMap`s behind tokio `RwLock`s. A write is visible to
//! the next read of the same player.

use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::economy::balance::Balance;
use crate::game::profile::{PlayerId, Profile};
use crate::game::record::StoredPlayResult;
use crate::store::{PlayerStore, ProfileInsert, ResultStore, StoreError};

const PROFILE: &str = "profile";
const PLAY_RESULT: &str = "play_result";

/// Play history, indexed by player and retry key.
#[derive(Default)]
struct Plays {
    /// Records in append order.
    records: Vec<StoredPlayResult>,
    /// Record ids already used.
    ids: BTreeMap<Uuid, usize>,
    /// (player, idempotency key) -> record index.
    keys: BTreeMap<(PlayerId, String), usize>,
}

/// Profiles and their parked records, written under one lock.
#[derive(Default)]
struct Players {
    profiles: BTreeMap<PlayerId, Profile>,
    /// Record settled with the balance but not yet appended.
    pending: BTreeMap<PlayerId, StoredPlayResult>,
}

/// Store kept entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    players: RwLock<Players>,
    plays: RwLock<Plays>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored play records.
    pub async fn play_count(&self) -> usize {
        self.plays.read().await.records.len()
    }

    /// Number of stored profiles.
    pub async fn profile_count(&self) -> usize {
        self.players.read().await.profiles.len()
    }
}

impl PlayerStore for MemoryStore {
    async fn create_profile(&self, profile: Profile) -> Result<ProfileInsert, StoreError> {
        let mut players = self.players.write().await;
        if let Some(existing) = players.profiles.get(&profile.user_id) {
            return Ok(ProfileInsert::Existing(existing.clone()));
        }
        players.profiles.insert(profile.user_id.clone(), profile.clone());
        Ok(ProfileInsert::Created(profile))
    }

    async fn find_profile(&self, user_id: &PlayerId) -> Result<Option<Profile>, StoreError> {
        Ok(self.players.read().await.profiles.get(user_id).cloned())
    }

    async fn find_balance(&self, user_id: &PlayerId) -> Result<Option<Balance>, StoreError> {
        Ok(self.players.read().await.profiles.get(user_id).map(|p| p.currencies))
    }

    async fn write_balance(
        &self,
        user_id: &PlayerId,
        balance: Balance,
        updated_at: DateTime<Utc>,
        pending: Option<StoredPlayResult>,
    ) -> Result<(), StoreError> {
        let mut players = self.players.write().await;
        let Some(profile) = players.profiles.get_mut(user_id) else {
            return Err(StoreError::Missing {
                collection: PROFILE,
                key: user_id.to_string(),
            });
        };

        profile.currencies = balance;
        profile.updated_at = Some(updated_at);
        if let Some(record) = pending {
            players.pending.insert(user_id.clone(), record);
        }
        Ok(())
    }

    async fn find_pending(&self, user_id: &PlayerId) -> Result<Option<StoredPlayResult>, StoreError> {
        Ok(self.players.read().await.pending.get(user_id).cloned())
    }

    async fn clear_pending(&self, user_id: &PlayerId, record_id: Uuid) -> Result<(), StoreError> {
        let mut players = self.players.write().await;
        if players.pending.get(user_id).is_some_and(|r| r.id == record_id) {
            players.pending.remove(user_id);
        }
        Ok(())
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        Ok(self.players.read().await.profiles.values().cloned().collect())
    }
}

impl ResultStore for MemoryStore {
    async fn append(&self, record: StoredPlayResult) -> Result<StoredPlayResult, StoreError> {
        let mut plays = self.plays.write().await;

        if plays.ids.contains_key(&record.id) {
            return Err(StoreError::Duplicate {
                collection: PLAY_RESULT,
                key: record.id.to_string(),
            });
        }

        let index = plays.records.len();
        if let Some(key) = &record.result.idempotency_key {
            let slot = (record.result.user_id.clone(), key.clone());
            if plays.keys.contains_key(&slot) {
                return Err(StoreError::Duplicate {
                    collection: PLAY_RESULT,
                    key: key.clone(),
                });
            }
            plays.keys.insert(slot, index);
        }

        plays.ids.insert(record.id, index);
        plays.records.push(record.clone());
        Ok(record)
    }

    async fn find_by_idempotency_key(
        &self,
        user_id: &PlayerId,
        key: &str,
    ) -> Result<Option<StoredPlayResult>, StoreError> {
        let plays = self.plays.read().await;
        let slot = (user_id.clone(), key.to_string());
        Ok(plays.keys.get(&slot).map(|&i| plays.records[i].clone()))
    }

    async fn history(
        &self,
        user_id: &PlayerId,
        limit: usize,
    ) -> Result<Vec<StoredPlayResult>, StoreError> {
        let plays = self.plays.read().await;
        Ok(plays
            .records
            .iter()
            .rev()
            .filter(|r| &r.result.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
