//! Mini-Game Resolution
//!
//! Server-authoritative: the server rolls success and score. A score the
//! client claims is never consulted.

use serde::{Serialize, Deserialize};

use crate::core::rng::RandomSource;
use crate::economy::balance::Reward;

/// Success probability (per mille).
pub const SUCCESS_PER_MILLE: u32 = 600;

/// Score range on success (inclusive).
pub const SUCCESS_SCORE: (u32, u32) = (10, 100);

/// Score range on failure (inclusive).
pub const FAILURE_SCORE: (u32, u32) = (0, 20);

/// Coins every play earns; success adds half the score on top.
pub const BASE_REWARD: u64 = 10;

/// Result of one mini-game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiniGameOutcome {
    /// Whether the player won.
    pub success: bool,
    /// Server-rolled score.
    pub score: u32,
    /// Coins earned.
    pub reward: Reward,
}

/// Roll one mini-game.
pub fn resolve_mini_game<R: RandomSource + ?Sized>(rng: &mut R) -> MiniGameOutcome {
    let success = rng.chance(SUCCESS_PER_MILLE);
    let (min, max) = if success { SUCCESS_SCORE } else { FAILURE_SCORE };
    let score = rng.next_int_range(min, max);

    MiniGameOutcome {
        success,
        score,
        reward: Reward::coins(reward_for(success, score)),
    }
}

/// Coins for a resolved game.
#[inline]
pub fn reward_for(success: bool, score: u32) -> u64 {
    if success {
        BASE_REWARD + u64::from(score) / 2
    } else {
        BASE_REWARD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::{DeterministicRng, ScriptedRng};
    use crate::economy::balance::Currency;
    use proptest::prelude::*;

    #[test]
    fn test_scripted_success() {
        // roll 0 < 600 -> success; 90 % 91 = 90 -> score 100
        let mut rng = ScriptedRng::new(vec![0, 90]);
        let outcome = resolve_mini_game(&mut rng);

        assert!(outcome.success);
        assert_eq!(outcome.score, 100);
        assert_eq!(outcome.reward, Reward::coins(60));
    }

    #[test]
    fn test_scripted_failure() {
        // roll 999 -> failure; 5 % 21 = 5 -> score 5
        let mut rng = ScriptedRng::new(vec![999, 5]);
        let outcome = resolve_mini_game(&mut rng);

        assert!(!outcome.success);
        assert_eq!(outcome.score, 5);
        assert_eq!(outcome.reward, Reward::coins(BASE_REWARD));
    }

    #[test]
    fn test_reward_rounds_down() {
        assert_eq!(reward_for(true, 11), 15);
        assert_eq!(reward_for(true, 10), 15);
        assert_eq!(reward_for(false, 20), 10);
    }

    proptest! {
        #[test]
        fn prop_score_within_bounds(seed in any::<u64>()) {
            let mut rng = DeterministicRng::new(seed);
            let outcome = resolve_mini_game(&mut rng);
            let (min, max) = if outcome.success { SUCCESS_SCORE } else { FAILURE_SCORE };

            prop_assert!(outcome.score >= min && outcome.score <= max);
            prop_assert_eq!(outcome.reward.currency, Currency::Coins);
            prop_assert!(outcome.reward.amount >= BASE_REWARD);
        }
    }
}
