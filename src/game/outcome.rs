//! Slot Outcome Classification
//!
//! Grid-based policy: count rows whose three cells match.
//!
//! | row matches | tier    | multiplier |
//! |-------------|---------|------------|
//! | 0           | miss    | 0          |
//! | 1           | small   | 2          |
//! | 2           | medium  | 5          |
//! | 3           | big     | 20         |
//! | 3, all rows identical | jackpot | 100 |

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::rng::RandomSource;
use crate::game::reels::Grid;

/// Payout multiplier per tier, indexed by `Tier as usize`.
pub const PAYOUT_MULTIPLIERS: [u64; 5] = [0, 2, 5, 20, 100];

/// Free spins granted by a successful bonus roll.
pub const BONUS_FREE_SPINS: u32 = 5;

/// Bonus roll must exceed this (per mille) to award free spins.
pub const BONUS_THRESHOLD_PER_MILLE: u32 = 600;

/// Outcome tier of a slot spin, ordered from worst to best.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Tier {
    /// No matching row.
    Miss = 0,
    /// One matching row.
    Small = 1,
    /// Two matching rows.
    Medium = 2,
    /// Three matching rows with different symbols.
    Big = 3,
    /// The whole grid is one symbol.
    Jackpot = 4,
}

impl Tier {
    /// All tiers, worst first.
    pub const ALL: [Tier; 5] = [Tier::Miss, Tier::Small, Tier::Medium, Tier::Big, Tier::Jackpot];

    /// Payout multiplier for this tier.
    #[inline]
    pub fn multiplier(self) -> u64 {
        PAYOUT_MULTIPLIERS[self as usize]
    }

    /// Whether this tier is eligible for the free-spin bonus roll.
    #[inline]
    pub fn earns_bonus_roll(self) -> bool {
        self >= Tier::Big
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Miss => "miss",
            Tier::Small => "small",
            Tier::Medium => "medium",
            Tier::Big => "big",
            Tier::Jackpot => "jackpot",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of rows whose three cells are identical.
pub fn row_matches(grid: &Grid) -> usize {
    grid.rows()
        .iter()
        .filter(|row| row[0] == row[1] && row[1] == row[2])
        .count()
}

/// Classify a grid into its tier.
pub fn classify(grid: &Grid) -> Tier {
    match row_matches(grid) {
        0 => Tier::Miss,
        1 => Tier::Small,
        2 => Tier::Medium,
        _ => {
            let rows = grid.rows();
            if rows.iter().all(|row| *row == rows[0]) {
                Tier::Jackpot
            } else {
                Tier::Big
            }
        }
    }
}

/// Win amount for `stake` at `tier`, or `None` on overflow.
#[inline]
pub fn payout(stake: u64, tier: Tier) -> Option<u64> {
    stake.checked_mul(tier.multiplier())
}

/// Secondary bonus roll. Does not affect payout.
pub fn roll_free_spins<R: RandomSource + ?Sized>(tier: Tier, rng: &mut R) -> u32 {
    if tier.earns_bonus_roll() && rng.roll_per_mille() > BONUS_THRESHOLD_PER_MILLE {
        BONUS_FREE_SPINS
    } else {
        0
    }
}
