//! Currency and Balance Types
//!
//! Amounts are unsigned so a negative balance cannot be represented.
//! Credits saturate instead of wrapping.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};

// =============================================================================
// STARTING AMOUNTS
// =============================================================================

/// Coins granted to a new profile.
pub const STARTING_COINS: u64 = 0;
/// Stars granted to a new profile.
pub const STARTING_STARS: u64 = 0;
/// Energy granted to a new profile.
pub const STARTING_ENERGY: u64 = 30;
/// Keys granted to a new profile.
pub const STARTING_KEYS: u64 = 0;

// =============================================================================
// CURRENCY
// =============================================================================

/// Currency kinds held by a player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    /// Soft currency won from plays.
    Coins,
    /// Premium currency.
    Stars,
    /// Spent to play.
    Energy,
    /// Chest keys.
    Keys,
}

impl Currency {
    /// All currencies, in storage order.
    pub const ALL: [Currency; 4] = [
        Currency::Coins,
        Currency::Stars,
        Currency::Energy,
        Currency::Keys,
    ];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Currency::Coins => "coins",
            Currency::Stars => "stars",
            Currency::Energy => "energy",
            Currency::Keys => "keys",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// BALANCE
// =============================================================================

/// A player's holdings across all currencies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Balance {
    /// Coins held.
    #[serde(default)]
    pub coins: u64,
    /// Stars held.
    #[serde(default)]
    pub stars: u64,
    /// Energy held.
    #[serde(default)]
    pub energy: u64,
    /// Keys held.
    #[serde(default)]
    pub keys: u64,
}

impl Default for Balance {
    fn default() -> Self {
        Self::starting()
    }
}

impl Balance {
    /// Balance given to a freshly created profile.
    pub const fn starting() -> Self {
        Self {
            coins: STARTING_COINS,
            stars: STARTING_STARS,
            energy: STARTING_ENERGY,
            keys: STARTING_KEYS,
        }
    }

    /// Balance with every currency at zero.
    pub const fn empty() -> Self {
        Self { coins: 0, stars: 0, energy: 0, keys: 0 }
    }

    /// Amount held of one currency.
    #[inline]
    pub fn get(&self, currency: Currency) -> u64 {
        match currency {
            Currency::Coins => self.coins,
            Currency::Stars => self.stars,
            Currency::Energy => self.energy,
            Currency::Keys => self.keys,
        }
    }

    /// Mutable slot for one currency.
    #[inline]
    pub fn get_mut(&mut self, currency: Currency) -> &mut u64 {
        match currency {
            Currency::Coins => &mut self.coins,
            Currency::Stars => &mut self.stars,
            Currency::Energy => &mut self.energy,
            Currency::Keys => &mut self.keys,
        }
    }

    /// Builder-style setter, mostly for tests and fixtures.
    pub fn with(mut self, currency: Currency, amount: u64) -> Self {
        *self.get_mut(currency) = amount;
        self
    }

    /// Subtract, flooring at zero.
    pub fn debit(&mut self, currency: Currency, amount: u64) {
        let slot = self.get_mut(currency);
        *slot = slot.saturating_sub(amount);
    }

    /// Add, saturating at `u64::MAX`.
    pub fn credit(&mut self, currency: Currency, amount: u64) {
        let slot = self.get_mut(currency);
        *slot = slot.saturating_add(amount);
    }
}

// =============================================================================
// COST
// =============================================================================

/// Currency amounts a play consumes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cost(BTreeMap<Currency, u64>);

impl Cost {
    /// No cost.
    pub fn free() -> Self {
        Self(BTreeMap::new())
    }

    /// Cost of a single currency.
    pub fn of(currency: Currency, amount: u64) -> Self {
        Self::free().and(currency, amount)
    }

    /// Add another entry (summed if the currency is already present).
    pub fn and(mut self, currency: Currency, amount: u64) -> Self {
        let entry = self.0.entry(currency).or_insert(0);
        *entry = entry.saturating_add(amount);
        self
    }

    /// Entries in currency order.
    pub fn iter(&self) -> impl Iterator<Item = (Currency, u64)> + '_ {
        self.0.iter().map(|(c, a)| (*c, *a))
    }

    /// Amount required of one currency.
    pub fn get(&self, currency: Currency) -> u64 {
        self.0.get(&currency).copied().unwrap_or(0)
    }
}

// =============================================================================
// REWARD
// =============================================================================

/// A credit of one currency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    /// Currency credited.
    #[serde(rename = "type")]
    pub currency: Currency,
    /// Amount credited.
    pub amount: u64,
}

impl Reward {
    /// Create a reward.
    pub const fn new(currency: Currency, amount: u64) -> Self {
        Self { currency, amount }
    }

    /// Coin reward.
    pub const fn coins(amount: u64) -> Self {
        Self::new(Currency::Coins, amount)
    }
}
