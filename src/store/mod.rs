//! Document Store
//!
//! The play engine talks to persistence only through these two traits. The
//! process entry point builds a concrete store and hands it in.
//!
//! - `memory`: in-process store over `BTreeMap` collections

pub mod memory;

use std::future::Future;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::economy::balance::Balance;
use crate::game::profile::{PlayerId, Profile};
use crate::game::record::StoredPlayResult;

pub use memory::MemoryStore;

/// Persistence failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Write targeted a document that does not exist.
    #[error("{collection} document not found: {key}")]
    Missing {
        /// Collection name.
        collection: &'static str,
        /// Document key.
        key: String,
    },

    /// Insert collided with an existing document.
    #[error("duplicate {collection} document: {key}")]
    Duplicate {
        /// Collection name.
        collection: &'static str,
        /// Document key.
        key: String,
    },

    /// Backend unreachable or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a profile upsert.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileInsert {
    /// Stored a new profile.
    Created(Profile),
    /// A profile with that user id already existed; returned unchanged.
    Existing(Profile),
}

/// Profile collection, including each player's balance.
pub trait PlayerStore: Send + Sync + 'static {
    /// Insert `profile` unless its user id is taken.
    fn create_profile(
        &self,
        profile: Profile,
    ) -> impl Future<Output = Result<ProfileInsert, StoreError>> + Send;

    /// Look up a profile.
    fn find_profile(
        &self,
        user_id: &PlayerId,
    ) -> impl Future<Output = Result<Option<Profile>, StoreError>> + Send;

    /// Look up just the balance.
    fn find_balance(
        &self,
        user_id: &PlayerId,
    ) -> impl Future<Output = Result<Option<Balance>, StoreError>> + Send;

    /// Replace the balance and stamp `updated_at`.
    ///
    /// A `pending` record is parked on the player in the same write and stays
    /// there until [`clear_pending`](Self::clear_pending) removes it. `None`
    /// leaves any parked record in place.
    fn write_balance(
        &self,
        user_id: &PlayerId,
        balance: Balance,
        updated_at: DateTime<Utc>,
        pending: Option<StoredPlayResult>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Record parked by the last balance write and not yet cleared.
    fn find_pending(
        &self,
        user_id: &PlayerId,
    ) -> impl Future<Output = Result<Option<StoredPlayResult>, StoreError>> + Send;

    /// Remove the parked record if its id is `record_id`.
    fn clear_pending(
        &self,
        user_id: &PlayerId,
        record_id: Uuid,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// All profiles, unordered.
    fn list_profiles(&self) -> impl Future<Output = Result<Vec<Profile>, StoreError>> + Send;
}

/// Append-only play history.
pub trait ResultStore: Send + Sync + 'static {
    /// Append a record. Never overwrites.
    fn append(
        &self,
        record: StoredPlayResult,
    ) -> impl Future<Output = Result<StoredPlayResult, StoreError>> + Send;

    /// Record previously stored for `user_id` under `key`.
    fn find_by_idempotency_key(
        &self,
        user_id: &PlayerId,
        key: &str,
    ) -> impl Future<Output = Result<Option<StoredPlayResult>, StoreError>> + Send;

    /// Newest first, at most `limit`.
    fn history(
        &self,
        user_id: &PlayerId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<StoredPlayResult>, StoreError>> + Send;
}
