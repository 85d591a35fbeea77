//! Core primitives.
//!
//! Randomness lives here so every consumer receives it explicitly and tests
//! can replay it from a seed.

pub mod rng;

pub use rng::{DeterministicRng, RandomSource, ScriptedRng, PER_MILLE};
