//! Engine configuration.
//!
//! Replaces ad-hoc dictionaries of settings and constants with one
//! validated structure. Loading it from a file is the caller's job; the
//! struct derives serde so any format works.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ChoiceError, Result};

/// Default cap on rows sampled by the zero-variance diagnostic.
pub const DEFAULT_VARIABILITY_SAMPLE_CAP: usize = 100_000;

/// Configuration for choice simulation and scheduling.
///
/// # Examples
///
/// ```
/// use u_choice::ChoiceConfig;
///
/// let config = ChoiceConfig::default()
///     .with_chunk_size(50_000)
///     .with_constant("free_flow_speed", 45.0)
///     .with_seed(7);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChoiceConfig {
    /// Interaction-row budget per chunk. 0 = process everything at once.
    pub chunk_size: usize,

    /// Named scalars visible to raw-scope (`@`) expressions.
    pub constants: BTreeMap<String, f64>,

    /// Multiply each term by the dataset column named after each
    /// coefficient column.
    pub alt_specific_coefficients: bool,

    /// Sample this many alternatives per chooser instead of the full set.
    pub sample_size: Option<usize>,

    /// Alternative column used as sampling weight. Uniform if unset.
    pub sample_weight_column: Option<String>,

    /// Base seed for per-chooser random streams.
    pub seed: u64,

    /// Rows sampled by the zero-variance diagnostic.
    pub variability_sample_cap: usize,

    /// Chooser ids whose utilities and probabilities are logged.
    pub trace_chooser_ids: Vec<i64>,
}

impl Default for ChoiceConfig {
    fn default() -> Self {
        Self {
            chunk_size: 0,
            constants: BTreeMap::new(),
            alt_specific_coefficients: false,
            sample_size: None,
            sample_weight_column: None,
            seed: 0,
            variability_sample_cap: DEFAULT_VARIABILITY_SAMPLE_CAP,
            trace_chooser_ids: Vec::new(),
        }
    }
}

impl ChoiceConfig {
    pub fn with_chunk_size(mut self, rows: usize) -> Self {
        self.chunk_size = rows;
        self
    }

    pub fn with_constant(mut self, name: impl Into<String>, value: f64) -> Self {
        self.constants.insert(name.into(), value);
        self
    }

    pub fn with_alt_specific_coefficients(mut self, enabled: bool) -> Self {
        self.alt_specific_coefficients = enabled;
        self
    }

    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = Some(size);
        self
    }

    pub fn with_sample_weights(mut self, column: impl Into<String>) -> Self {
        self.sample_weight_column = Some(column.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_variability_sample_cap(mut self, cap: usize) -> Self {
        self.variability_sample_cap = cap;
        self
    }

    pub fn with_trace_chooser(mut self, chooser_id: i64) -> Self {
        self.trace_chooser_ids.push(chooser_id);
        self
    }

    /// Whether a chooser is traced.
    pub fn is_traced(&self, chooser_id: i64) -> bool {
        self.trace_chooser_ids.contains(&chooser_id)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.sample_size == Some(0) {
            return Err(ChoiceError::specification("sample_size must be positive"));
        }
        if self.variability_sample_cap == 0 {
            return Err(ChoiceError::specification(
                "variability_sample_cap must be positive",
            ));
        }
        if let Some((name, value)) = self.constants.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ChoiceError::specification(format!(
                "constant '{name}' is not finite ({value})"
            )));
        }
        if self.sample_weight_column.is_some() && self.sample_size.is_none() {
            return Err(ChoiceError::specification(
                "sample_weight_column requires sample_size",
            ));
        }
        Ok(())
    }
}
