//! Balance Ledger
//!
//! The only writer of player balances. A play runs inside a [`LedgerTxn`],
//! which holds that player's lock from the funds check until the new
//! balance is written, so two plays by one player never interleave.

use std::collections::BTreeMap;
use std::sync::Arc;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, warn};

use crate::economy::balance::{Balance, Cost, Currency, Reward};
use crate::game::profile::PlayerId;
use crate::game::record::StoredPlayResult;
use crate::store::{PlayerStore, StoreError};

/// A cost entry the balance cannot cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("insufficient {currency}: need {required}, have {available}")]
pub struct InsufficientFunds {
    /// Currency that fell short.
    pub currency: Currency,
    /// Amount the play costs.
    pub required: u64,
    /// Amount held.
    pub available: u64,
}

/// Check that `balance` covers every entry of `cost`.
pub fn check_funds(balance: &Balance, cost: &Cost) -> Result<(), InsufficientFunds> {
    for (currency, required) in cost.iter() {
        let available = balance.get(currency);
        if available < required {
            return Err(InsufficientFunds { currency, required, available });
        }
    }
    Ok(())
}

/// Debit `cost` and credit `reward`, or reject without touching anything.
pub fn apply_play(
    balance: &Balance,
    cost: &Cost,
    reward: Option<&Reward>,
) -> Result<Balance, InsufficientFunds> {
    check_funds(balance, cost)?;

    let mut next = *balance;
    for (currency, amount) in cost.iter() {
        next.debit(currency, amount);
    }
    if let Some(reward) = reward {
        next.credit(reward.currency, reward.amount);
    }
    Ok(next)
}

/// Failures while settling a play.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// No balance stored for the player.
    #[error("player not found: {0}")]
    NotFound(PlayerId),

    /// Funds check failed.
    #[error(transparent)]
    InsufficientFunds(#[from] InsufficientFunds),

    /// Store read or write failed.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

// =============================================================================
// PER-PLAYER LOCKS
// =============================================================================

/// One async mutex per player id.
#[derive(Default)]
pub struct PlayerLocks {
    locks: RwLock<BTreeMap<PlayerId, Arc<Mutex<()>>>>,
}

impl PlayerLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the player's lock.
    pub async fn acquire(&self, player_id: &PlayerId) -> OwnedMutexGuard<()> {
        let existing = self.locks.read().await.get(player_id).cloned();
        let lock = match existing {
            Some(lock) => lock,
            None => {
                let mut locks = self.locks.write().await;
                locks.entry(player_id.clone()).or_default().clone()
            }
        };
        lock.lock_owned().await
    }

    /// Drop entries nobody holds or waits on. Returns how many were removed.
    pub async fn prune(&self) -> usize {
        let mut locks = self.locks.write().await;
        let before = locks.len();
        // The table's own Arc is the only reference when idle
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    /// Number of tracked players.
    pub async fn len(&self) -> usize {
        self.locks.read().await.len()
    }

    /// True when no player is tracked.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

// =============================================================================
// LEDGER
// =============================================================================

/// Serialized balance mutations over a [`PlayerStore`].
pub struct Ledger<S> {
    store: Arc<S>,
    locks: PlayerLocks,
}

impl<S: PlayerStore> Ledger<S> {
    /// Create a ledger over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: PlayerLocks::new(),
        }
    }

    /// Lock the player and load their balance.
    pub async fn begin(&self, player_id: &PlayerId) -> Result<LedgerTxn<'_, S>, LedgerError> {
        let guard = self.locks.acquire(player_id).await;
        let balance = self
            .store
            .find_balance(player_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(player_id.clone()))?;

        Ok(LedgerTxn {
            store: &self.store,
            player_id: player_id.clone(),
            balance,
            _guard: guard,
        })
    }

    /// Release lock entries for idle players.
    pub async fn prune_locks(&self) -> usize {
        let removed = self.locks.prune().await;
        if removed > 0 {
            debug!("Pruned {} idle player locks", removed);
        }
        removed
    }
}

/// A locked view of one player's balance.
///
/// Dropping it without [`commit`](Self::commit) leaves the stored balance
/// untouched.
pub struct LedgerTxn<'a, S> {
    store: &'a Arc<S>,
    player_id: PlayerId,
    balance: Balance,
    _guard: OwnedMutexGuard<()>,
}

impl<'a, S: PlayerStore> LedgerTxn<'a, S> {
    /// Balance as loaded under the lock.
    pub fn balance(&self) -> &Balance {
        &self.balance
    }

    /// Player this transaction is for.
    pub fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    /// Funds check for `cost`.
    pub fn ensure_funds(&self, cost: &Cost) -> Result<(), InsufficientFunds> {
        check_funds(&self.balance, cost)
    }

    /// Apply the play and persist the new balance.
    ///
    /// `record` is parked with the balance in the same write, so a play whose
    /// record append later fails can still be completed. The player stays
    /// locked until the returned [`Settled`] is dropped.
    pub async fn commit(
        self,
        cost: &Cost,
        reward: Option<&Reward>,
        record: Option<StoredPlayResult>,
    ) -> Result<Settled, LedgerError> {
        let next = apply_play(&self.balance, cost, reward)?;
        if let Err(e) = self.store.write_balance(&self.player_id, next, Utc::now(), record).await {
            warn!("Balance write failed for {}: {}", self.player_id, e);
            return Err(e.into());
        }
        debug!("Balance for {} now {:?}", self.player_id, next);
        Ok(Settled {
            balance: next,
            _guard: self._guard,
        })
    }
}

/// A written balance whose player is still locked.
pub struct Settled {
    /// Balance as persisted.
    pub balance: Balance,
    _guard: OwnedMutexGuard<()>,
}
