//! Game Catalog
//!
//! Slot themes, mini-game keys, the static quest/event listings, and
//! leaderboard ranking.

use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};

use crate::economy::balance::{Currency, Reward};
use crate::game::profile::{PlayerId, Profile};

/// Slot machine themes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    /// Default theme.
    #[default]
    SunnyGarden,
    /// Candy carnival.
    CandyCarnival,
    /// Pirate treasure.
    PirateTreasure,
    /// Fairytale forest.
    FairytaleForest,
    /// Royal pet palace.
    RoyalPetPalace,
}

impl Theme {
    /// All themes.
    pub const ALL: [Theme; 5] = [
        Theme::SunnyGarden,
        Theme::CandyCarnival,
        Theme::PirateTreasure,
        Theme::FairytaleForest,
        Theme::RoyalPetPalace,
    ];

    /// Wire key.
    pub fn key(self) -> &'static str {
        match self {
            Theme::SunnyGarden => "sunny_garden",
            Theme::CandyCarnival => "candy_carnival",
            Theme::PirateTreasure => "pirate_treasure",
            Theme::FairytaleForest => "fairytale_forest",
            Theme::RoyalPetPalace => "royal_pet_palace",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Theme {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Theme::ALL
            .into_iter()
            .find(|t| t.key() == s)
            .ok_or_else(|| UnknownKey(s.to_string()))
    }
}

/// Mini-games.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MiniGame {
    /// Flip tiles.
    LuckyFlip,
    /// Default mini-game.
    #[default]
    BubblePop,
    /// Drop path.
    TreasureDrop,
    /// Timing ring.
    MagicRing,
    /// Pick a chest.
    PuzzlePick,
}

impl MiniGame {
    /// All mini-games.
    pub const ALL: [MiniGame; 5] = [
        MiniGame::LuckyFlip,
        MiniGame::BubblePop,
        MiniGame::TreasureDrop,
        MiniGame::MagicRing,
        MiniGame::PuzzlePick,
    ];

    /// Wire key.
    pub fn key(self) -> &'static str {
        match self {
            MiniGame::LuckyFlip => "lucky_flip",
            MiniGame::BubblePop => "bubble_pop",
            MiniGame::TreasureDrop => "treasure_drop",
            MiniGame::MagicRing => "magic_ring",
            MiniGame::PuzzlePick => "puzzle_pick",
        }
    }
}

impl fmt::Display for MiniGame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for MiniGame {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MiniGame::ALL
            .into_iter()
            .find(|g| g.key() == s)
            .ok_or_else(|| UnknownKey(s.to_string()))
    }
}

/// A theme or game key outside the catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown key: {0}")]
pub struct UnknownKey(pub String);

// =============================================================================
// QUESTS & EVENTS
// =============================================================================

/// A quest shown to a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    /// Quest identifier.
    pub quest_id: String,
    /// Title.
    pub title: String,
    /// Description.
    pub description: Option<String>,
    /// Goal count.
    pub target: u32,
    /// Current progress.
    pub progress: u32,
    /// Reward on completion.
    pub reward: Reward,
    /// Owning player.
    pub user_id: PlayerId,
    /// Whether the quest is complete.
    pub completed: bool,
}

/// A seasonal event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier.
    pub event_id: String,
    /// Display name.
    pub name: String,
    /// Description.
    pub description: Option<String>,
}

/// Quests for a player.
pub fn quests_for(user_id: &PlayerId) -> Vec<Quest> {
    vec![
        Quest {
            quest_id: "q1".into(),
            title: "Spin 10 times".into(),
            description: Some("Warm up your reels".into()),
            target: 10,
            progress: 3,
            reward: Reward::coins(200),
            user_id: user_id.clone(),
            completed: false,
        },
        Quest {
            quest_id: "q2".into(),
            title: "Win a medium prize".into(),
            description: Some("Feel the bloom".into()),
            target: 1,
            progress: 0,
            reward: Reward::new(Currency::Stars, 1),
            user_id: user_id.clone(),
            completed: false,
        },
    ]
}

/// Running events.
pub fn active_events() -> Vec<Event> {
    vec![
        Event {
            event_id: "e1".into(),
            name: "Garden Gala".into(),
            description: Some("Seasonal blossoms".into()),
        },
        Event {
            event_id: "e2".into(),
            name: "Candy Carnival".into(),
            description: Some("Sweet treats week".into()),
        },
    ]
}

/// A leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based position.
    pub rank: u32,
    /// Player.
    pub user_id: PlayerId,
    /// Player chosen name.
    pub display_name: String,
    /// Coins held.
    pub score: u64,
}

/// Rank profiles by coins, highest first; ties by user id.
pub fn rank_profiles(mut profiles: Vec<Profile>, limit: usize) -> Vec<LeaderboardEntry> {
    profiles.sort_by(|a, b| {
        b.currencies
            .coins
            .cmp(&a.currencies.coins)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    profiles
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, p)| LeaderboardEntry {
            rank: i as u32 + 1,
            user_id: p.user_id,
            display_name: p.display_name,
            score: p.currencies.coins,
        })
        .collect()
}
