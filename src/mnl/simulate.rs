//! Multinomial logit probabilities and Monte Carlo choice.
//!
//! # Algorithm
//!
//! For each chooser block of utilities `u_1..u_k`:
//! 1. Clamp every utility to `[-UTIL_CLAMP, UTIL_CLAMP]`
//! 2. `p_j = exp(u_j - max u) / Σ exp(u_i - max u)`
//! 3. Choose the first alternative whose cumulative probability exceeds
//!    the chooser's uniform draw
//!
//! Blocks may differ in length, so choosers with different feasible
//! subsets can share one batch.
//!
//! # Reference
//! McFadden (1974), "Conditional logit analysis of qualitative choice
//! behavior"; Train (2009), "Discrete Choice Methods with Simulation", Ch. 3

use std::ops::Range;
use tracing::debug;

use crate::error::{ChoiceError, Result};

/// Utilities are clamped to this magnitude before exponentiation.
pub const UTIL_CLAMP: f64 = 700.0;

/// Contiguous per-chooser row ranges over a flat utility vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceBlocks {
    offsets: Vec<usize>,
}

impl ChoiceBlocks {
    /// `choosers` blocks of `alternatives` rows each.
    pub fn uniform(choosers: usize, alternatives: usize) -> Self {
        Self {
            offsets: (0..=choosers).map(|i| i * alternatives).collect(),
        }
    }

    /// One block per entry of `sizes`.
    pub fn from_sizes(sizes: &[usize]) -> Self {
        let mut offsets = Vec::with_capacity(sizes.len() + 1);
        let mut total = 0;
        offsets.push(0);
        for &s in sizes {
            total += s;
            offsets.push(total);
        }
        Self { offsets }
    }

    /// Number of choosers.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total rows across all blocks.
    pub fn total_rows(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }

    /// Row range of block `i`.
    pub fn range(&self, i: usize) -> Range<usize> {
        self.offsets[i]..self.offsets[i + 1]
    }

    /// Number of rows in block `i`.
    pub fn size(&self, i: usize) -> usize {
        self.offsets[i + 1] - self.offsets[i]
    }

    /// Iterates over block ranges.
    pub fn iter(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.offsets.windows(2).map(|w| w[0]..w[1])
    }
}

/// Normalized choice probabilities, block by block.
///
/// # Errors
/// `ChoiceSimulation` for an empty block, a NaN utility, or a block whose
/// exponentiated sum is not a positive finite number. The error carries the
/// block position; see [`ChoiceError::for_choosers`].
pub fn probabilities(utilities: &[f64], blocks: &ChoiceBlocks) -> Result<Vec<f64>> {
    if utilities.len() != blocks.total_rows() {
        return Err(ChoiceError::specification(format!(
            "{} utilities for {} interaction rows",
            utilities.len(),
            blocks.total_rows()
        )));
    }

    let mut probs = vec![0.0; utilities.len()];
    for (chooser, range) in blocks.iter().enumerate() {
        if range.is_empty() {
            return Err(ChoiceError::simulation(chooser, "no alternatives"));
        }
        let block = &utilities[range.clone()];
        if block.iter().any(|u| u.is_nan()) {
            return Err(ChoiceError::simulation(chooser, "utility is NaN"));
        }

        let max = block
            .iter()
            .map(|u| u.clamp(-UTIL_CLAMP, UTIL_CLAMP))
            .fold(f64::NEG_INFINITY, f64::max);
        let out = &mut probs[range];
        let mut sum = 0.0;
        for (p, u) in out.iter_mut().zip(block) {
            *p = (u.clamp(-UTIL_CLAMP, UTIL_CLAMP) - max).exp();
            sum += *p;
        }
        if !sum.is_finite() || sum <= 0.0 {
            return Err(ChoiceError::simulation(
                chooser,
                format!("probabilities sum to {sum}"),
            ));
        }
        for p in out.iter_mut() {
            *p /= sum;
        }
    }
    Ok(probs)
}

/// Picks one position per block by inverse CDF.
///
/// Returns offsets within each block. A draw at or beyond the final
/// cumulative sum (rounding) falls back to the last alternative with
/// positive probability.
pub fn make_choices(probs: &[f64], blocks: &ChoiceBlocks, draws: &[f64]) -> Result<Vec<usize>> {
    if draws.len() != blocks.len() {
        return Err(ChoiceError::specification(format!(
            "{} draws for {} choosers",
            draws.len(),
            blocks.len()
        )));
    }

    blocks
        .iter()
        .zip(draws)
        .enumerate()
        .map(|(chooser, (range, &draw))| {
            let block = &probs[range];
            let mut cum = 0.0;
            for (j, &p) in block.iter().enumerate() {
                cum += p;
                if cum > draw {
                    return Ok(j);
                }
            }
            block
                .iter()
                .rposition(|&p| p > 0.0)
                .ok_or_else(|| ChoiceError::simulation(chooser, "all probabilities are zero"))
        })
        .collect()
}

/// Probabilities plus choices for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct MnlOutcome {
    /// Chosen offset within each block.
    pub positions: Vec<usize>,
    /// Probability per interaction row.
    pub probabilities: Vec<f64>,
}

impl MnlOutcome {
    /// Probability of the alternative chosen in block `i`.
    pub fn chosen_probability(&self, blocks: &ChoiceBlocks, i: usize) -> f64 {
        self.probabilities[blocks.range(i).start + self.positions[i]]
    }
}

/// Computes probabilities and makes one choice per block.
pub fn simulate(utilities: &[f64], blocks: &ChoiceBlocks, draws: &[f64]) -> Result<MnlOutcome> {
    let probabilities = probabilities(utilities, blocks)?;
    let positions = make_choices(&probabilities, blocks, draws)?;
    debug!(
        choosers = blocks.len(),
        rows = blocks.total_rows(),
        "simulated multinomial logit choices"
    );
    Ok(MnlOutcome {
        positions,
        probabilities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks() {
        let b = ChoiceBlocks::from_sizes(&[2, 0, 3]);
        assert_eq!(b.len(), 3);
        assert_eq!(b.total_rows(), 5);
        assert_eq!(b.range(2), 2..5);
        assert_eq!(b.size(1), 0);
        assert_eq!(ChoiceBlocks::uniform(2, 3), ChoiceBlocks::from_sizes(&[3, 3]));
    }

    #[test]
    fn test_equal_utilities_middle_draw() {
        let blocks = ChoiceBlocks::uniform(1, 3);
        let out = simulate(&[1.0, 1.0, 1.0], &blocks, &[0.5]).unwrap();
        for p in &out.probabilities {
            assert!((p - 1.0 / 3.0).abs() < 1e-12);
        }
        assert_eq!(out.positions, vec![1]);
    }

    #[test]
    fn test_draw_zero_picks_first() {
        let blocks = ChoiceBlocks::uniform(1, 2);
        let out = simulate(&[0.0, 0.0], &blocks, &[0.0]).unwrap();
        assert_eq!(out.positions, vec![0]);
    }

    #[test]
    fn test_extreme_utilities_clamped() {
        let blocks = ChoiceBlocks::uniform(1, 2);
        let p = probabilities(&[1e6, -1e6], &blocks).unwrap();
        assert!((p[0] - 1.0).abs() < 1e-12);
        assert!(p[1] >= 0.0);

        let p = probabilities(&[f64::INFINITY, 0.0], &blocks).unwrap();
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_nan_is_simulation_error() {
        let blocks = ChoiceBlocks::from_sizes(&[1, 2]);
        let err = probabilities(&[0.0, f64::NAN, 1.0], &blocks).unwrap_err();
        assert!(matches!(
            err,
            ChoiceError::ChoiceSimulation { chooser_id: 1, .. }
        ));
    }

    #[test]
    fn test_empty_block_is_error() {
        let blocks = ChoiceBlocks::from_sizes(&[2, 0]);
        assert!(probabilities(&[0.0, 0.0], &blocks).is_err());
    }

    #[test]
    fn test_rounding_fallback() {
        let blocks = ChoiceBlocks::uniform(1, 3);
        let picks = make_choices(&[0.5, 0.5, 0.0], &blocks, &[1.0]).unwrap();
        assert_eq!(picks, vec![1]);
    }

    #[test]
    fn test_ragged_batch() {
        let blocks = ChoiceBlocks::from_sizes(&[1, 3]);
        let out = simulate(&[5.0, 0.0, 0.0, 9.0], &blocks, &[0.9, 0.01]).unwrap();
        assert_eq!(out.positions[0], 0);
        assert_eq!(out.positions[1], 2);
        assert!(out.chosen_probability(&blocks, 1) > 0.99);
    }

    #[test]
    fn test_length_mismatch() {
        let blocks = ChoiceBlocks::uniform(2, 2);
        assert!(probabilities(&[0.0; 3], &blocks).is_err());
        assert!(make_choices(&[0.5; 4], &blocks, &[0.1]).is_err());
    }
}
