//! # Cozy Casino Server
//!
//! Casual social-casino backend: player profiles, virtual currencies, a
//! slot machine and a family of mini-games.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    COZY CASINO SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  └── rng.rs      - Seedable Xorshift128+ random source       │
//! │                                                              │
//! │  economy/        - Currencies                                │
//! │  ├── balance.rs  - Balances, costs, rewards                  │
//! │  └── ledger.rs   - Funds checks, per-player locked writes    │
//! │                                                              │
//! │  game/           - Play logic                                │
//! │  ├── reels.rs    - Symbols and the 3x3 grid                  │
//! │  ├── outcome.rs  - Tier classification and payouts           │
//! │  ├── mini_game.rs- Server-rolled mini-games                  │
//! │  ├── record.rs   - Immutable play records                    │
//! │  ├── catalog.rs  - Themes, quests, events, leaderboard       │
//! │  ├── profile.rs  - Player profiles                           │
//! │  └── engine.rs   - Validate, lock, draw, settle, record      │
//! │                                                              │
//! │  store/          - Persistence                               │
//! │  └── memory.rs   - In-process document store                 │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Message types                             │
//! │  └── auth.rs     - JWT validation                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Play Guarantees
//!
//! - A play either settles (balance written and record appended) or leaves
//!   nothing behind. The one exception is a record append failing after the
//!   balance write, which is reported and never retried.
//! - Plays by one player are serialized; no currency goes negative.
//! - All randomness comes from one seedable generator owned by the engine,
//!   so a fixed seed replays the same outcomes.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod economy;
pub mod game;
pub mod network;
pub mod store;

// Re-export commonly used types
pub use core::rng::{DeterministicRng, RandomSource};
pub use economy::{Balance, Currency, Reward};
pub use game::{PlayEngine, PlayError, PlayReceipt, PlayerId, Profile, Tier};
pub use store::{MemoryStore, PlayerStore, ResultStore, StoreError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
