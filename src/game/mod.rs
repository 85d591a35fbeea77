//! Game Logic Module
//!
//! Everything that decides what a play is worth. Randomness is always passed
//! in, so the same draws give the same results.
//!
//! ## Module Structure
//!
//! - `reels`: Symbols, the 3x3 grid, reel generation
//! - `outcome`: Grid classification, payouts, free-spin bonus
//! - `mini_game`: Server-rolled mini-game resolution
//! - `catalog`: Themes, mini-game keys, quests, events, leaderboard
//! - `profile`: Player ids and profiles
//! - `record`: Immutable play records
//! - `engine`: Orchestrates validation, ledger, draws and recording

pub mod catalog;
pub mod engine;
pub mod mini_game;
pub mod outcome;
pub mod profile;
pub mod record;
pub mod reels;

// Re-export key types
pub use catalog::{Event, LeaderboardEntry, MiniGame, Quest, Theme};
pub use engine::{MiniGamePlayRequest, PlayEngine, PlayError, PlayReceipt, SlotPlayRequest, ValidationError};
pub use outcome::{classify, payout, Tier};
pub use profile::{NewProfile, PlayerId, Profile};
pub use record::{PlayDetail, PlayRecorder, PlayResult, StoredPlayResult};
pub use reels::{generate_grid, Grid, ReelSpinner, Symbol};
