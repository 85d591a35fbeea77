//! Play Engine
//!
//! Entry point for every play. A slot spin or mini-game runs as:
//!
//! 1. validate the request (no lock, no draw, no store access)
//! 2. lock the player and load their balance
//! 3. append any record parked by an earlier play, then replay an earlier
//!    record if the idempotency key was seen
//! 4. funds check
//! 5. draw randomness and derive the reward
//! 6. write the new balance with the play record parked beside it
//! 7. append the play record, then release the lock
//!
//! A failure at steps 1-5 leaves no trace. A failure at step 7 leaves the
//! balance applied and is reported as a storage error; the write is never
//! repeated. The parked record is appended at step 3 of the player's next
//! play, so a retry under the same key replays instead of paying again.

use std::sync::Arc;
use chrono::Utc;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::core::rng::DeterministicRng;
use crate::economy::balance::{Balance, Cost, Currency, Reward};
use crate::economy::ledger::{InsufficientFunds, Ledger, LedgerError, LedgerTxn};
use crate::game::catalog::{self, Event, LeaderboardEntry, MiniGame, Quest, Theme};
use crate::game::mini_game::resolve_mini_game;
use crate::game::outcome::{classify, payout, roll_free_spins};
use crate::game::profile::{NewProfile, PlayerId, Profile};
use crate::game::record::{PlayDetail, PlayRecorder, PlayResult, StoredPlayResult};
use crate::game::reels::{ReelSpinner, UniformReels};
use crate::store::{PlayerStore, ProfileInsert, ResultStore, StoreError};

/// Energy spent per slot spin.
pub const SLOT_ENERGY_COST: u64 = 1;

/// Energy spent per mini-game.
pub const MINI_GAME_ENERGY_COST: u64 = 2;

/// Smallest accepted stake.
pub const MIN_STAKE: i64 = 1;

/// Largest accepted stake. Keeps `stake * 100` well inside `u64`.
pub const MAX_STAKE: i64 = 1_000_000;

/// Most leaderboard rows returned.
pub const MAX_LEADERBOARD: usize = 100;

fn default_theme() -> String {
    Theme::default().key().to_string()
}

fn default_bet() -> i64 {
    10
}

fn default_game() -> String {
    MiniGame::default().key().to_string()
}

/// A slot spin as received from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotPlayRequest {
    /// Player spinning.
    pub user_id: PlayerId,
    /// Theme key.
    #[serde(default = "default_theme")]
    pub theme: String,
    /// Stake. Signed so a negative value reaches validation.
    #[serde(default = "default_bet")]
    pub bet: i64,
    /// Client retry key.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl SlotPlayRequest {
    /// Spin `bet` on the default theme.
    pub fn new(user_id: impl Into<PlayerId>, bet: i64) -> Self {
        Self {
            user_id: user_id.into(),
            theme: default_theme(),
            bet,
            idempotency_key: None,
        }
    }
}

/// A mini-game play as received from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiniGamePlayRequest {
    /// Player playing.
    pub user_id: PlayerId,
    /// Game key.
    #[serde(default = "default_game")]
    pub game: String,
    /// Score the client claims. Never trusted.
    #[serde(default)]
    pub score: Option<i64>,
    /// Client retry key.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl MiniGamePlayRequest {
    /// Play the default mini-game.
    pub fn new(user_id: impl Into<PlayerId>) -> Self {
        Self {
            user_id: user_id.into(),
            game: default_game(),
            score: None,
            idempotency_key: None,
        }
    }
}

/// Request rejected before anything was touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Theme key not in the catalog.
    #[error("unknown theme: {0}")]
    UnknownTheme(String),

    /// Game key not in the catalog.
    #[error("unknown mini-game: {0}")]
    UnknownGame(String),

    /// Stake outside `MIN_STAKE..=MAX_STAKE`.
    #[error("stake {0} out of range {MIN_STAKE}..={MAX_STAKE}")]
    StakeOutOfRange(i64),

    /// Empty player id.
    #[error("player id must not be empty")]
    BlankPlayerId,

    /// Empty display name.
    #[error("display name must not be empty")]
    BlankDisplayName,

    /// Idempotency key already used for a different kind of play.
    #[error("idempotency key {0} was used for another kind of play")]
    KeyReused(String),
}

/// Why a play or lookup failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayError {
    /// No profile for the player.
    #[error("player not found: {0}")]
    NotFound(PlayerId),

    /// Balance cannot cover the play.
    #[error(transparent)]
    InsufficientFunds(#[from] InsufficientFunds),

    /// Bad request.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Store failure.
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl From<LedgerError> for PlayError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => PlayError::NotFound(id),
            LedgerError::InsufficientFunds(e) => PlayError::InsufficientFunds(e),
            LedgerError::Storage(e) => PlayError::Storage(e),
        }
    }
}

impl PlayError {
    /// True when the caller, not the server, is at fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, PlayError::Storage(_))
    }
}

/// A settled play and the balance after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayReceipt {
    /// The stored record.
    pub record: StoredPlayResult,
    /// Balance once the play was applied.
    pub balance: Balance,
    /// True when an earlier record was returned for a repeated key.
    pub replayed: bool,
}

/// Whether a stored detail is the same kind of play as the request.
#[derive(Clone, Copy, PartialEq, Eq)]
enum PlayKind {
    Slot,
    MiniGame,
}

impl PlayKind {
    fn of(detail: &PlayDetail) -> Self {
        match detail {
            PlayDetail::Slot { .. } => PlayKind::Slot,
            PlayDetail::MiniGame { .. } => PlayKind::MiniGame,
        }
    }
}

fn validate_player(user_id: &PlayerId) -> Result<(), ValidationError> {
    if user_id.is_blank() {
        return Err(ValidationError::BlankPlayerId);
    }
    Ok(())
}

fn validate_stake(bet: i64) -> Result<u64, ValidationError> {
    if !(MIN_STAKE..=MAX_STAKE).contains(&bet) {
        return Err(ValidationError::StakeOutOfRange(bet));
    }
    u64::try_from(bet).map_err(|_| ValidationError::StakeOutOfRange(bet))
}

/// Blank keys count as no key.
fn normalize_key(key: Option<&str>) -> Option<String> {
    key.map(str::trim).filter(|k| !k.is_empty()).map(str::to_string)
}

/// Runs plays against a store.
pub struct PlayEngine<S> {
    store: Arc<S>,
    ledger: Ledger<S>,
    recorder: PlayRecorder<S>,
    rng: Mutex<DeterministicRng>,
    reels: Box<dyn ReelSpinner>,
}

impl<S: PlayerStore + ResultStore> PlayEngine<S> {
    /// Create an engine with uniform reels.
    pub fn new(store: Arc<S>, rng: DeterministicRng) -> Self {
        Self {
            ledger: Ledger::new(store.clone()),
            recorder: PlayRecorder::new(store.clone()),
            store,
            rng: Mutex::new(rng),
            reels: Box::new(UniformReels),
        }
    }

    /// Replace the grid source.
    pub fn with_reels(mut self, reels: impl ReelSpinner + 'static) -> Self {
        self.reels = Box::new(reels);
        self
    }

    /// Spin a slot machine.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, bet = request.bet))]
    pub async fn play_slot(&self, request: SlotPlayRequest) -> Result<PlayReceipt, PlayError> {
        validate_player(&request.user_id)?;
        let theme: Theme = request
            .theme
            .parse()
            .map_err(|_| ValidationError::UnknownTheme(request.theme.clone()))?;
        let stake = validate_stake(request.bet)?;
        let key = normalize_key(request.idempotency_key.as_deref());

        let txn = self.ledger.begin(&request.user_id).await?;
        if let Some(receipt) = self.replay(&txn, key.as_deref(), PlayKind::Slot).await? {
            return Ok(receipt);
        }

        let cost = Cost::of(Currency::Energy, SLOT_ENERGY_COST);
        txn.ensure_funds(&cost)?;

        let (grid, tier, free_spins) = {
            let mut rng = self.rng.lock().await;
            let grid = self.reels.spin(&mut *rng);
            let tier = classify(&grid);
            (grid, tier, roll_free_spins(tier, &mut *rng))
        };
        debug!("Spun for {}:\n{}", request.user_id, grid.render());
        let win_amount = payout(stake, tier).ok_or(ValidationError::StakeOutOfRange(request.bet))?;
        let reward = (win_amount > 0).then(|| Reward::coins(win_amount));

        let result = PlayResult {
            user_id: request.user_id.clone(),
            idempotency_key: key,
            reward,
            detail: PlayDetail::Slot {
                theme,
                bet: stake,
                outcome: tier,
                win_amount,
                reels: grid,
                free_spins_awarded: free_spins,
            },
        };

        let receipt = self.settle(txn, &cost, result).await?;
        info!(
            "Slot {} for {}: {} x{} = {}",
            theme, request.user_id, tier, tier.multiplier(), win_amount
        );
        Ok(receipt)
    }

    /// Play a mini-game. The server rolls the score.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, game = %request.game))]
    pub async fn play_mini_game(&self, request: MiniGamePlayRequest) -> Result<PlayReceipt, PlayError> {
        validate_player(&request.user_id)?;
        let game: MiniGame = request
            .game
            .parse()
            .map_err(|_| ValidationError::UnknownGame(request.game.clone()))?;
        if let Some(declared) = request.score {
            debug!("Ignoring declared score {} from {}", declared, request.user_id);
        }
        let key = normalize_key(request.idempotency_key.as_deref());

        let txn = self.ledger.begin(&request.user_id).await?;
        if let Some(receipt) = self.replay(&txn, key.as_deref(), PlayKind::MiniGame).await? {
            return Ok(receipt);
        }

        let cost = Cost::of(Currency::Energy, MINI_GAME_ENERGY_COST);
        txn.ensure_funds(&cost)?;

        let outcome = {
            let mut rng = self.rng.lock().await;
            resolve_mini_game(&mut *rng)
        };

        let result = PlayResult {
            user_id: request.user_id.clone(),
            idempotency_key: key,
            reward: Some(outcome.reward),
            detail: PlayDetail::MiniGame {
                game,
                success: outcome.success,
                score: outcome.score,
            },
        };

        let receipt = self.settle(txn, &cost, result).await?;
        info!(
            "Mini-game {} for {}: success={} score={} reward={}",
            game, request.user_id, outcome.success, outcome.score, outcome.reward.amount
        );
        Ok(receipt)
    }

    /// Earlier record for a repeated key, with the current balance.
    ///
    /// A record parked by a play whose append failed is appended first, so
    /// its key is found here.
    async fn replay(
        &self,
        txn: &LedgerTxn<'_, S>,
        key: Option<&str>,
        kind: PlayKind,
    ) -> Result<Option<PlayReceipt>, PlayError> {
        self.complete_pending(txn.player_id()).await?;

        let Some(key) = key else {
            return Ok(None);
        };
        let Some(record) = self.recorder.find_replay(txn.player_id(), key).await? else {
            return Ok(None);
        };

        if PlayKind::of(&record.result.detail) != kind {
            return Err(ValidationError::KeyReused(key.to_string()).into());
        }

        debug!("Replaying play {} for {}", record.id, txn.player_id());
        Ok(Some(PlayReceipt {
            record,
            balance: *txn.balance(),
            replayed: true,
        }))
    }

    /// Append the record a failed play left parked on the player.
    async fn complete_pending(&self, user_id: &PlayerId) -> Result<(), PlayError> {
        let Some(pending) = self.store.find_pending(user_id).await? else {
            return Ok(());
        };

        let record = self.recorder.complete(pending).await?;
        info!("Completed parked play {} for {}", record.id, user_id);
        self.clear_pending(&record).await;
        Ok(())
    }

    async fn clear_pending(&self, record: &StoredPlayResult) {
        if let Err(e) = self.store.clear_pending(&record.result.user_id, record.id).await {
            // Left parked; the next completion sees the duplicate and clears it
            warn!("Could not clear parked play {}: {}", record.id, e);
        }
    }

    /// Write the balance, then the record, under the player's lock.
    async fn settle(
        &self,
        txn: LedgerTxn<'_, S>,
        cost: &Cost,
        result: PlayResult,
    ) -> Result<PlayReceipt, PlayError> {
        let stored = StoredPlayResult::new(result);
        let settled = txn
            .commit(cost, stored.result.reward.as_ref(), Some(stored.clone()))
            .await?;

        let (user_id, record_id) = (stored.result.user_id.clone(), stored.id);
        let record = match self.recorder.record(stored).await {
            Ok(record) => record,
            Err(e) => {
                error!(
                    "Balance for {} applied but play record {} failed, left parked: {}",
                    user_id, record_id, e
                );
                return Err(e.into());
            }
        };
        self.clear_pending(&record).await;

        Ok(PlayReceipt {
            record,
            balance: settled.balance,
            replayed: false,
        })
    }

    /// Create a profile, or return the existing one unchanged.
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn create_profile(&self, request: NewProfile) -> Result<Profile, PlayError> {
        validate_player(&request.user_id)?;
        let display_name = request.display_name.trim();
        if display_name.is_empty() {
            return Err(ValidationError::BlankDisplayName.into());
        }

        let mut profile = Profile::new(request.user_id, display_name, Utc::now());
        profile.avatar = request.avatar;

        match self.store.create_profile(profile).await? {
            ProfileInsert::Created(profile) => {
                info!("Created profile {}", profile.user_id);
                Ok(profile)
            }
            ProfileInsert::Existing(profile) => {
                debug!("Profile {} already exists", profile.user_id);
                Ok(profile)
            }
        }
    }

    /// Look up a profile.
    pub async fn get_profile(&self, user_id: &PlayerId) -> Result<Profile, PlayError> {
        validate_player(user_id)?;
        self.store
            .find_profile(user_id)
            .await?
            .ok_or_else(|| PlayError::NotFound(user_id.clone()))
    }

    /// Most recent plays first.
    pub async fn history(&self, user_id: &PlayerId, limit: usize) -> Result<Vec<StoredPlayResult>, PlayError> {
        validate_player(user_id)?;
        Ok(self.recorder.history(user_id, limit).await?)
    }

    /// Richest players first.
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, PlayError> {
        let profiles = self.store.list_profiles().await?;
        Ok(catalog::rank_profiles(profiles, limit.min(MAX_LEADERBOARD)))
    }

    /// Quests for a player.
    pub fn quests(&self, user_id: &PlayerId) -> Result<Vec<Quest>, PlayError> {
        validate_player(user_id)?;
        Ok(catalog::quests_for(user_id))
    }

    /// Running events.
    pub fn events(&self) -> Vec<Event> {
        catalog::active_events()
    }

    /// Drop lock entries for players with nothing in flight.
    pub async fn prune_locks(&self) -> usize {
        self.ledger.prune_locks().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use chrono::DateTime;
    use uuid::Uuid;
    use crate::game::outcome::Tier;
    use crate::game::reels::{FixedReels, Grid, Symbol::*};
    use crate::store::memory::MemoryStore;

    const JACKPOT: Grid = Grid::filled(Daisy);
    const MISS: Grid = Grid::from_rows([
        [Daisy, Clover, Strawberry],
        [Bee, Fairy, Gem],
        [Clover, Daisy, Bee],
    ]);

    async fn store_with(user: &str, balance: Balance) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let mut profile = Profile::new(PlayerId::new(user), user, Utc::now());
        profile.currencies = balance;
        store.create_profile(profile).await.unwrap();
        store
    }

    fn engine(store: Arc<MemoryStore>, grid: Grid) -> PlayEngine<MemoryStore> {
        PlayEngine::new(store, DeterministicRng::new(7)).with_reels(FixedReels(grid))
    }

    async fn balance_of(store: &MemoryStore, user: &str) -> Balance {
        store.find_balance(&PlayerId::new(user)).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_jackpot_end_to_end() {
        let start = Balance::empty().with(Currency::Energy, 1);
        let store = store_with("alice", start).await;
        let engine = engine(store.clone(), JACKPOT);

        let receipt = engine.play_slot(SlotPlayRequest::new("alice", 10)).await.unwrap();

        assert_eq!(receipt.record.result.tier(), Some(Tier::Jackpot));
        assert_eq!(receipt.record.result.win_amount(), Some(1000));
        assert_eq!(receipt.record.result.reward, Some(Reward::coins(1000)));
        assert!(!receipt.replayed);

        let expected = Balance::empty().with(Currency::Coins, 1000);
        assert_eq!(receipt.balance, expected);
        assert_eq!(balance_of(&store, "alice").await, expected);
        assert_eq!(store.play_count().await, 1);
    }

    #[tokio::test]
    async fn test_no_energy_rejected_without_record() {
        let start = Balance::empty().with(Currency::Coins, 50);
        let store = store_with("alice", start).await;
        let engine = engine(store.clone(), JACKPOT);

        let err = engine.play_slot(SlotPlayRequest::new("alice", 10)).await.unwrap_err();

        assert!(matches!(
            err,
            PlayError::InsufficientFunds(InsufficientFunds { currency: Currency::Energy, required: 1, available: 0 })
        ));
        assert!(err.is_client_error());
        assert_eq!(balance_of(&store, "alice").await, start);
        assert_eq!(store.play_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_player() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone(), JACKPOT);

        let err = engine.play_slot(SlotPlayRequest::new("ghost", 10)).await.unwrap_err();
        assert_eq!(err, PlayError::NotFound(PlayerId::new("ghost")));

        let err = engine.play_mini_game(MiniGamePlayRequest::new("ghost")).await.unwrap_err();
        assert_eq!(err, PlayError::NotFound(PlayerId::new("ghost")));
        assert_eq!(store.play_count().await, 0);
    }

    #[tokio::test]
    async fn test_validation_runs_first() {
        let start = Balance::starting();
        let store = store_with("alice", start).await;
        let engine = engine(store.clone(), JACKPOT);

        let mut bad_theme = SlotPlayRequest::new("alice", 10);
        bad_theme.theme = "haunted_house".into();
        assert_eq!(
            engine.play_slot(bad_theme).await.unwrap_err(),
            PlayError::Validation(ValidationError::UnknownTheme("haunted_house".into()))
        );

        for bet in [-5, 0, MAX_STAKE + 1] {
            assert_eq!(
                engine.play_slot(SlotPlayRequest::new("alice", bet)).await.unwrap_err(),
                PlayError::Validation(ValidationError::StakeOutOfRange(bet))
            );
        }

        assert_eq!(
            engine.play_slot(SlotPlayRequest::new("  ", 10)).await.unwrap_err(),
            PlayError::Validation(ValidationError::BlankPlayerId)
        );

        let mut bad_game = MiniGamePlayRequest::new("alice");
        bad_game.game = "roulette".into();
        assert_eq!(
            engine.play_mini_game(bad_game).await.unwrap_err(),
            PlayError::Validation(ValidationError::UnknownGame("roulette".into()))
        );

        assert_eq!(balance_of(&store, "alice").await, start);
        assert_eq!(store.play_count().await, 0);
    }

    #[tokio::test]
    async fn test_miss_spends_energy_only() {
        let start = Balance::empty().with(Currency::Energy, 3).with(Currency::Coins, 20);
        let store = store_with("alice", start).await;
        let engine = engine(store.clone(), MISS);

        let receipt = engine.play_slot(SlotPlayRequest::new("alice", 500)).await.unwrap();

        assert_eq!(receipt.record.result.tier(), Some(Tier::Miss));
        assert_eq!(receipt.record.result.reward, None);
        // Stake is a multiplier base only
        assert_eq!(receipt.balance, start.with(Currency::Energy, 2));
    }

    #[tokio::test]
    async fn test_slot_record_contents() {
        let store = store_with("alice", Balance::starting()).await;
        let engine = engine(store.clone(), JACKPOT);

        let mut request = SlotPlayRequest::new("alice", 3);
        request.theme = "pirate_treasure".into();
        let receipt = engine.play_slot(request).await.unwrap();

        match receipt.record.result.detail {
            PlayDetail::Slot { theme, bet, outcome, reels, free_spins_awarded, .. } => {
                assert_eq!(theme, Theme::PirateTreasure);
                assert_eq!(bet, 3);
                assert_eq!(outcome, Tier::Jackpot);
                assert_eq!(reels, JACKPOT);
                assert!(free_spins_awarded == 0 || free_spins_awarded == 5);
            }
            other => panic!("expected slot detail, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mini_game_costs_two_energy() {
        let start = Balance::empty().with(Currency::Energy, 2);
        let store = store_with("alice", start).await;
        let engine = engine(store.clone(), MISS);

        let receipt = engine.play_mini_game(MiniGamePlayRequest::new("alice")).await.unwrap();
        let reward = receipt.record.result.reward.unwrap();

        assert_eq!(reward.currency, Currency::Coins);
        assert!(reward.amount >= 10);
        assert_eq!(receipt.balance.energy, 0);
        assert_eq!(receipt.balance.coins, reward.amount);

        let err = engine.play_mini_game(MiniGamePlayRequest::new("alice")).await.unwrap_err();
        assert!(matches!(err, PlayError::InsufficientFunds(_)));
        assert_eq!(store.play_count().await, 1);
    }

    #[tokio::test]
    async fn test_declared_score_is_ignored() {
        let mut details = Vec::new();
        for declared in [None, Some(100_000), Some(-3)] {
            let store = store_with("alice", Balance::starting()).await;
            let engine = PlayEngine::new(store, DeterministicRng::new(99));

            let mut request = MiniGamePlayRequest::new("alice");
            request.score = declared;
            let receipt = engine.play_mini_game(request).await.unwrap();
            details.push((receipt.record.result.detail, receipt.record.result.reward));
        }

        assert_eq!(details[0], details[1]);
        assert_eq!(details[0], details[2]);
    }

    #[tokio::test]
    async fn test_idempotent_replay() {
        let start = Balance::empty().with(Currency::Energy, 5);
        let store = store_with("alice", start).await;
        let engine = engine(store.clone(), JACKPOT);

        let mut request = SlotPlayRequest::new("alice", 10);
        request.idempotency_key = Some("spin-1".into());

        let first = engine.play_slot(request.clone()).await.unwrap();
        let second = engine.play_slot(request).await.unwrap();

        assert!(second.replayed);
        assert_eq!(second.record.id, first.record.id);
        assert_eq!(second.balance, first.balance);
        assert_eq!(balance_of(&store, "alice").await.energy, 4);
        assert_eq!(store.play_count().await, 1);

        // Same key on a different kind of play
        let mut mini = MiniGamePlayRequest::new("alice");
        mini.idempotency_key = Some("spin-1".into());
        assert_eq!(
            engine.play_mini_game(mini).await.unwrap_err(),
            PlayError::Validation(ValidationError::KeyReused("spin-1".into()))
        );
    }

    #[tokio::test]
    async fn test_blank_key_is_no_key() {
        let store = store_with("alice", Balance::starting()).await;
        let engine = engine(store.clone(), MISS);

        let mut request = SlotPlayRequest::new("alice", 10);
        request.idempotency_key = Some("   ".into());

        let first = engine.play_slot(request.clone()).await.unwrap();
        let second = engine.play_slot(request).await.unwrap();

        assert_ne!(first.record.id, second.record.id);
        assert_eq!(first.record.result.idempotency_key, None);
        assert_eq!(store.play_count().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_plays_same_player() {
        let start = Balance::empty().with(Currency::Energy, 5);
        let store = store_with("alice", start).await;
        let engine = Arc::new(engine(store.clone(), JACKPOT));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.play_slot(SlotPlayRequest::new("alice", 1)).await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(PlayError::InsufficientFunds(_)) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert_eq!(ok, 5);
        let end = balance_of(&store, "alice").await;
        assert_eq!(end.energy, 0);
        assert_eq!(end.coins, 5 * 100);
        assert_eq!(store.play_count().await, 5);
    }

    /// Memory store whose next `failures` appends fail.
    struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicUsize,
    }

    impl FlakyStore {
        async fn with_player(user: &str, balance: Balance, failures: usize) -> Arc<Self> {
            let store = Arc::new(Self {
                inner: MemoryStore::new(),
                failures: AtomicUsize::new(failures),
            });
            let mut profile = Profile::new(PlayerId::new(user), user, Utc::now());
            profile.currencies = balance;
            store.create_profile(profile).await.unwrap();
            store
        }
    }

    impl PlayerStore for FlakyStore {
        async fn create_profile(&self, profile: Profile) -> Result<ProfileInsert, StoreError> {
            self.inner.create_profile(profile).await
        }

        async fn find_profile(&self, user_id: &PlayerId) -> Result<Option<Profile>, StoreError> {
            self.inner.find_profile(user_id).await
        }

        async fn find_balance(&self, user_id: &PlayerId) -> Result<Option<Balance>, StoreError> {
            self.inner.find_balance(user_id).await
        }

        async fn write_balance(
            &self,
            user_id: &PlayerId,
            balance: Balance,
            updated_at: DateTime<Utc>,
            pending: Option<StoredPlayResult>,
        ) -> Result<(), StoreError> {
            self.inner.write_balance(user_id, balance, updated_at, pending).await
        }

        async fn find_pending(&self, user_id: &PlayerId) -> Result<Option<StoredPlayResult>, StoreError> {
            self.inner.find_pending(user_id).await
        }

        async fn clear_pending(&self, user_id: &PlayerId, record_id: Uuid) -> Result<(), StoreError> {
            self.inner.clear_pending(user_id, record_id).await
        }

        async fn list_profiles(&self) -> Result<Vec<Profile>, StoreError> {
            self.inner.list_profiles().await
        }
    }

    impl ResultStore for FlakyStore {
        async fn append(&self, record: StoredPlayResult) -> Result<StoredPlayResult, StoreError> {
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(StoreError::Unavailable("disk full".into()));
            }
            self.inner.append(record).await
        }

        async fn find_by_idempotency_key(
            &self,
            user_id: &PlayerId,
            key: &str,
        ) -> Result<Option<StoredPlayResult>, StoreError> {
            self.inner.find_by_idempotency_key(user_id, key).await
        }

        async fn history(&self, user_id: &PlayerId, limit: usize) -> Result<Vec<StoredPlayResult>, StoreError> {
            self.inner.history(user_id, limit).await
        }
    }

    #[tokio::test]
    async fn test_record_failure_after_balance_write() {
        let start = Balance::empty().with(Currency::Energy, 2);
        let store = FlakyStore::with_player("alice", start, usize::MAX).await;
        let engine = PlayEngine::new(store.clone(), DeterministicRng::new(1)).with_reels(FixedReels(JACKPOT));

        let err = engine.play_slot(SlotPlayRequest::new("alice", 10)).await.unwrap_err();
        assert_eq!(err, PlayError::Storage(StoreError::Unavailable("disk full".into())));
        assert!(!err.is_client_error());

        // Applied once, not rolled back or retried
        let applied = Balance::empty().with(Currency::Energy, 1).with(Currency::Coins, 1000);
        let alice = PlayerId::new("alice");
        assert_eq!(store.find_balance(&alice).await.unwrap(), Some(applied));
        assert_eq!(store.inner.play_count().await, 0);
        assert!(store.find_pending(&alice).await.unwrap().is_some());

        // The parked record must land before anything else is applied
        let err = engine.play_slot(SlotPlayRequest::new("alice", 10)).await.unwrap_err();
        assert!(matches!(err, PlayError::Storage(_)));
        assert_eq!(store.find_balance(&alice).await.unwrap(), Some(applied));
    }

    #[tokio::test]
    async fn test_retry_after_record_failure_replays() {
        let start = Balance::empty().with(Currency::Energy, 5);
        let store = FlakyStore::with_player("alice", start, 1).await;
        let engine = PlayEngine::new(store.clone(), DeterministicRng::new(1)).with_reels(FixedReels(JACKPOT));

        let mut request = SlotPlayRequest::new("alice", 10);
        request.idempotency_key = Some("spin-1".into());

        let err = engine.play_slot(request.clone()).await.unwrap_err();
        assert_eq!(err, PlayError::Storage(StoreError::Unavailable("disk full".into())));

        let retry = engine.play_slot(request).await.unwrap();
        let applied = Balance::empty().with(Currency::Energy, 4).with(Currency::Coins, 1000);

        assert!(retry.replayed);
        assert_eq!(retry.record.result.idempotency_key.as_deref(), Some("spin-1"));
        assert_eq!(retry.balance, applied);
        assert_eq!(store.find_balance(&PlayerId::new("alice")).await.unwrap(), Some(applied));
        assert_eq!(store.inner.play_count().await, 1);
        assert_eq!(store.find_pending(&PlayerId::new("alice")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_parked_record_lands_before_next_play() {
        let start = Balance::empty().with(Currency::Energy, 5);
        let store = FlakyStore::with_player("alice", start, 1).await;
        let engine = PlayEngine::new(store.clone(), DeterministicRng::new(1)).with_reels(FixedReels(MISS));

        assert!(engine.play_slot(SlotPlayRequest::new("alice", 10)).await.is_err());
        let next = engine.play_slot(SlotPlayRequest::new("alice", 10)).await.unwrap();

        assert!(!next.replayed);
        assert_eq!(next.balance.energy, 3);
        let history = engine.history(&PlayerId::new("alice"), 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, next.record.id);
    }

    #[tokio::test]
    async fn test_create_profile_upsert() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone(), MISS);

        let created = engine
            .create_profile(NewProfile {
                user_id: PlayerId::new("alice"),
                display_name: "  Alice ".into(),
                avatar: Some("bunny".into()),
            })
            .await
            .unwrap();
        assert_eq!(created.display_name, "Alice");
        assert_eq!(created.avatar.as_deref(), Some("bunny"));
        assert_eq!(created.currencies, Balance::starting());

        let again = engine
            .create_profile(NewProfile {
                user_id: PlayerId::new("alice"),
                display_name: "Imposter".into(),
                avatar: None,
            })
            .await
            .unwrap();
        assert_eq!(again, created);

        let blank = engine
            .create_profile(NewProfile {
                user_id: PlayerId::new("bob"),
                display_name: " ".into(),
                avatar: None,
            })
            .await;
        assert_eq!(blank.unwrap_err(), PlayError::Validation(ValidationError::BlankDisplayName));
        assert_eq!(store.profile_count().await, 1);

        assert_eq!(engine.get_profile(&PlayerId::new("alice")).await.unwrap(), created);
        assert_eq!(
            engine.get_profile(&PlayerId::new("bob")).await.unwrap_err(),
            PlayError::NotFound(PlayerId::new("bob"))
        );
    }

    #[tokio::test]
    async fn test_history_and_leaderboard() {
        let store = store_with("alice", Balance::starting()).await;
        store
            .create_profile(Profile::new(PlayerId::new("bob"), "Bob", Utc::now()))
            .await
            .unwrap();
        let engine = engine(store.clone(), JACKPOT);

        engine.play_slot(SlotPlayRequest::new("alice", 1)).await.unwrap();
        engine.play_slot(SlotPlayRequest::new("alice", 2)).await.unwrap();

        let history = engine.history(&PlayerId::new("alice"), 10).await.unwrap();
        let bets: Vec<_> = history.iter().map(|r| r.result.win_amount()).collect();
        assert_eq!(bets, vec![Some(200), Some(100)]);
        assert!(engine.history(&PlayerId::new("bob"), 10).await.unwrap().is_empty());

        let board = engine.leaderboard(10).await.unwrap();
        assert_eq!(board[0].user_id.as_str(), "alice");
        assert_eq!(board[0].score, 300);
        assert_eq!(board[1].user_id.as_str(), "bob");
    }

    #[tokio::test]
    async fn test_prune_locks_after_plays() {
        let store = store_with("alice", Balance::starting()).await;
        let engine = engine(store, MISS);

        engine.play_slot(SlotPlayRequest::new("alice", 1)).await.unwrap();
        assert_eq!(engine.prune_locks().await, 1);
        assert_eq!(engine.prune_locks().await, 0);
    }

    #[test]
    fn test_request_defaults() {
        let slot: SlotPlayRequest = serde_json::from_str(r#"{"user_id": "alice"}"#).unwrap();
        assert_eq!(slot.theme, "sunny_garden");
        assert_eq!(slot.bet, 10);

        let mini: MiniGamePlayRequest = serde_json::from_str(r#"{"user_id": "alice", "score": 80}"#).unwrap();
        assert_eq!(mini.game, "bubble_pop");
        assert_eq!(mini.score, Some(80));
    }
}
