//! Reel Generation
//!
//! A spin is a 3x3 row-major grid whose nine cells are drawn independently
//! and uniformly from [`Symbol::ALL`].

use serde::{Serialize, Deserialize};

use crate::core::rng::{choose, RandomSource};

/// Rows in a grid.
pub const GRID_ROWS: usize = 3;
/// Columns in a grid.
pub const GRID_COLS: usize = 3;

/// Reel symbols.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Symbol {
    /// 🌼
    #[serde(rename = "🌼")]
    Daisy,
    /// 🍀
    #[serde(rename = "🍀")]
    Clover,
    /// 🍓
    #[serde(rename = "🍓")]
    Strawberry,
    /// 🐝
    #[serde(rename = "🐝")]
    Bee,
    /// 🧚
    #[serde(rename = "🧚")]
    Fairy,
    /// 💎
    #[serde(rename = "💎")]
    Gem,
}

impl Symbol {
    /// The reel alphabet.
    pub const ALL: [Symbol; 6] = [
        Symbol::Daisy,
        Symbol::Clover,
        Symbol::Strawberry,
        Symbol::Bee,
        Symbol::Fairy,
        Symbol::Gem,
    ];

    /// Emoji shown to players.
    pub fn glyph(self) -> &'static str {
        match self {
            Symbol::Daisy => "🌼",
            Symbol::Clover => "🍀",
            Symbol::Strawberry => "🍓",
            Symbol::Bee => "🐝",
            Symbol::Fairy => "🧚",
            Symbol::Gem => "💎",
        }
    }
}

/// One row of the grid.
pub type Row = [Symbol; GRID_COLS];

/// A 3x3 grid of symbols, row-major.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid(pub [Row; GRID_ROWS]);

impl Grid {
    /// Build from rows.
    pub const fn from_rows(rows: [Row; GRID_ROWS]) -> Self {
        Self(rows)
    }

    /// Grid filled with a single symbol.
    pub const fn filled(symbol: Symbol) -> Self {
        Self([[symbol; GRID_COLS]; GRID_ROWS])
    }

    /// Rows, top to bottom.
    pub fn rows(&self) -> &[Row; GRID_ROWS] {
        &self.0
    }

    /// Render as three lines of emoji.
    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(|row| row.iter().map(|s| s.glyph()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Draw a fresh grid from `rng`.
pub fn generate_grid<R: RandomSource + ?Sized>(rng: &mut R) -> Grid {
    let mut rows = [[Symbol::Daisy; GRID_COLS]; GRID_ROWS];
    for row in rows.iter_mut() {
        for cell in row.iter_mut() {
            // Symbol::ALL is non-empty, so choose always yields
            *cell = choose(rng, &Symbol::ALL).copied().unwrap_or(Symbol::Daisy);
        }
    }
    Grid(rows)
}

/// Source of slot grids used by the play engine.
pub trait ReelSpinner: Send + Sync {
    /// Produce the grid for one spin.
    fn spin(&self, rng: &mut dyn RandomSource) -> Grid;
}

/// Uniform independent reels over [`Symbol::ALL`].
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformReels;

impl ReelSpinner for UniformReels {
    fn spin(&self, rng: &mut dyn RandomSource) -> Grid {
        generate_grid(rng)
    }
}

/// Always yields the same grid.
#[derive(Clone, Copy, Debug)]
pub struct FixedReels(pub Grid);

impl ReelSpinner for FixedReels {
    fn spin(&self, _rng: &mut dyn RandomSource) -> Grid {
        self.0
    }
}
