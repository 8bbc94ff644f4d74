//! Interaction dataset construction.
//!
//! Expands choosers × alternatives into one row per pair so that utility
//! expressions can mix chooser attributes, alternative attributes, and
//! skim values.

mod dataset;
mod skim;

pub use dataset::{InteractionBuilder, InteractionDataset, COLLISION_SUFFIX, DEFAULT_SKIM_JOIN};
pub use skim::{DenseSkim, Skim};
