//! Chooser × alternative interaction datasets.
//!
//! # Algorithm
//!
//! 1. Pick the alternative positions each chooser sees: the full set, a
//!    sample (uniform or weighted, without replacement), or a caller
//!    supplied subset
//! 2. Emit one row per (chooser, alternative) pair, chooser-major and
//!    alternative-minor
//! 3. Merge columns: chooser index, chooser columns, alternative index,
//!    alternative columns (`_r` suffix on name collisions; a collision the
//!    suffix cannot resolve is an error)
//! 4. Join skims on the chooser zone and the alternative zone

use rand::seq::index;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::skim::Skim;
use crate::error::{ChoiceError, Result};
use crate::mnl::{ChoiceBlocks, Purpose, RandomChannels};
use crate::models::{Column, Table};

/// Suffix appended to alternative-side columns whose names collide.
pub const COLLISION_SUFFIX: &str = "_r";

/// Default zone column used to join skims.
pub const DEFAULT_SKIM_JOIN: &str = "zone_id";

/// Rows for a batch of choosers, grouped into one block per chooser.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionDataset {
    table: Table,
    blocks: ChoiceBlocks,
    alt_positions: Vec<usize>,
}

impl InteractionDataset {
    /// Merged table, indexed by alternative id.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Row range of each chooser.
    pub fn blocks(&self) -> &ChoiceBlocks {
        &self.blocks
    }

    /// Position in the alternatives table of every row.
    pub fn alt_positions(&self) -> &[usize] {
        &self.alt_positions
    }

    /// Alternatives-table position of offset `offset` in block `chooser`.
    pub fn alternative_position(&self, chooser: usize, offset: usize) -> usize {
        self.alt_positions[self.blocks.range(chooser).start + offset]
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Builds interaction datasets for a chooser table and an alternative table.
///
/// # Examples
///
/// ```
/// use u_choice::interaction::InteractionBuilder;
/// use u_choice::mnl::RandomChannels;
/// use u_choice::models::Table;
///
/// let tours = Table::new("tour_id", vec![1, 2]).unwrap();
/// let windows = Table::new("tdd", vec![0, 1, 2])
///     .unwrap()
///     .with_column("start", vec![5.0, 5.0, 6.0])
///     .unwrap();
///
/// let dataset = InteractionBuilder::new(&tours, &windows)
///     .build(&RandomChannels::new(0))
///     .unwrap();
/// assert_eq!(dataset.len(), 6);
/// assert_eq!(dataset.table().index(), &[0, 1, 2, 0, 1, 2]);
/// ```
#[derive(Debug, Clone)]
pub struct InteractionBuilder<'a> {
    choosers: &'a Table,
    alternatives: &'a Table,
    sample_size: Option<usize>,
    weight_column: Option<String>,
    skims: Vec<(String, Arc<dyn Skim>)>,
    join: String,
}

impl<'a> InteractionBuilder<'a> {
    pub fn new(choosers: &'a Table, alternatives: &'a Table) -> Self {
        Self {
            choosers,
            alternatives,
            sample_size: None,
            weight_column: None,
            skims: Vec::new(),
            join: DEFAULT_SKIM_JOIN.to_string(),
        }
    }

    /// Samples this many alternatives per chooser.
    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = Some(size);
        self
    }

    /// Weights samples by an alternative column.
    pub fn with_sample_weights(mut self, column: impl Into<String>) -> Self {
        self.weight_column = Some(column.into());
        self
    }

    /// Joins a skim as a column named `name`.
    pub fn with_skim(mut self, name: impl Into<String>, skim: Arc<dyn Skim>) -> Self {
        self.skims.push((name.into(), skim));
        self
    }

    /// Zone column used for skim joins (default `zone_id`).
    pub fn with_skim_join(mut self, column: impl Into<String>) -> Self {
        self.join = column.into();
        self
    }

    /// Builds the full (or sampled, if a sample size is set) product.
    ///
    /// Sampling draws from each chooser's own stream, so the sample a
    /// chooser sees does not depend on the batch it is in.
    pub fn build(&self, channels: &RandomChannels) -> Result<InteractionDataset> {
        let n_alts = self.alternatives.len();
        let subsets = match self.sample_size {
            Some(size) if size < n_alts => {
                let weights = self.sample_weights()?;
                self.choosers
                    .index()
                    .iter()
                    .map(|&id| -> Result<Vec<usize>> {
                        let mut rng = channels.rng_for(Purpose::Sample, id);
                        let mut picked = match &weights {
                            Some(w) => index::sample_weighted(&mut rng, n_alts, |i| w[i], size)
                                .map_err(|e| {
                                    ChoiceError::specification(format!(
                                        "cannot sample {size} of {n_alts} alternatives: {e}"
                                    ))
                                })?
                                .into_vec(),
                            None => index::sample(&mut rng, n_alts, size).into_vec(),
                        };
                        picked.sort_unstable();
                        Ok(picked)
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            _ => vec![(0..n_alts).collect(); self.choosers.len()],
        };
        self.assemble(&subsets)
    }

    /// Builds rows for caller-chosen alternative positions per chooser.
    pub fn build_subsets(&self, subsets: &[Vec<usize>]) -> Result<InteractionDataset> {
        if subsets.len() != self.choosers.len() {
            return Err(ChoiceError::specification(format!(
                "{} alternative subsets for {} choosers",
                subsets.len(),
                self.choosers.len()
            )));
        }
        let n_alts = self.alternatives.len();
        if let Some(bad) = subsets.iter().flatten().find(|&&p| p >= n_alts) {
            return Err(ChoiceError::table(format!(
                "alternative position {bad} out of range (0..{n_alts})"
            )));
        }
        self.assemble(subsets)
    }

    fn sample_weights(&self) -> Result<Option<Vec<f64>>> {
        let Some(column) = &self.weight_column else {
            return Ok(None);
        };
        let weights = self
            .alternatives
            .require_column(column)?
            .to_f64()
            .ok_or_else(|| ChoiceError::table(format!("weight column '{column}' is not numeric")))?;
        if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(ChoiceError::table(format!(
                "weight column '{column}' has invalid weight {w}"
            )));
        }
        Ok(Some(weights))
    }

    fn assemble(&self, subsets: &[Vec<usize>]) -> Result<InteractionDataset> {
        let sizes: Vec<usize> = subsets.iter().map(Vec::len).collect();
        let blocks = ChoiceBlocks::from_sizes(&sizes);

        let mut chooser_rows = Vec::with_capacity(blocks.total_rows());
        let mut alt_positions = Vec::with_capacity(blocks.total_rows());
        for (chooser, subset) in subsets.iter().enumerate() {
            chooser_rows.extend(std::iter::repeat(chooser).take(subset.len()));
            alt_positions.extend_from_slice(subset);
        }

        let mut names = HashSet::new();
        let mut columns = Vec::new();
        let mut push = |name: String, column: Column| -> Result<()> {
            let name = if names.contains(&name) {
                let renamed = format!("{name}{COLLISION_SUFFIX}");
                if names.contains(&renamed) {
                    return Err(ChoiceError::table(format!(
                        "column '{name}' collides with '{name}' and '{renamed}'"
                    )));
                }
                renamed
            } else {
                name
            };
            names.insert(name.clone());
            columns.push((name, column));
            Ok(())
        };

        push(
            self.choosers.index_name().to_string(),
            Column::from(take_ids(self.choosers.index(), &chooser_rows)),
        )?;
        for (name, column) in self.choosers.columns() {
            push(name.to_string(), column.take(&chooser_rows))?;
        }
        let alt_ids = take_ids(self.alternatives.index(), &alt_positions);
        push(
            self.alternatives.index_name().to_string(),
            Column::from(alt_ids.clone()),
        )?;
        for (name, column) in self.alternatives.columns() {
            push(name.to_string(), column.take(&alt_positions))?;
        }

        let mut table = Table::from_parts_unchecked(
            self.alternatives.index_name().to_string(),
            alt_ids,
            columns,
        );
        self.join_skims(&mut table)?;

        debug!(
            choosers = blocks.len(),
            rows = table.len(),
            "built interaction dataset"
        );
        Ok(InteractionDataset {
            table,
            blocks,
            alt_positions,
        })
    }

    fn join_skims(&self, table: &mut Table) -> Result<()> {
        if self.skims.is_empty() {
            return Ok(());
        }
        let destination_column = format!("{}{COLLISION_SUFFIX}", self.join);
        let origins = zone_ids(table, &self.join)?;
        let destinations = zone_ids(table, &destination_column)?;
        for (name, skim) in &self.skims {
            let values = origins
                .iter()
                .zip(&destinations)
                .map(|(&o, &d)| {
                    skim.get(o, d).ok_or_else(|| ChoiceError::SkimLookup {
                        skim: name.clone(),
                        origin: o,
                        destination: d,
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            table.insert_column(name.clone(), values)?;
        }
        Ok(())
    }
}

fn take_ids(ids: &[i64], rows: &[usize]) -> Vec<i64> {
    rows.iter().map(|&r| ids[r]).collect()
}

fn zone_ids(table: &Table, column: &str) -> Result<Vec<i64>> {
    match table.require_column(column)? {
        Column::Num(values) => values
            .iter()
            .map(|&v| {
                if v.is_finite() && v.fract() == 0.0 {
                    Ok(v as i64)
                } else {
                    Err(ChoiceError::table(format!(
                        "zone column '{column}' holds non-zone value {v}"
                    )))
                }
            })
            .collect(),
        other => Err(ChoiceError::table(format!(
            "zone column '{column}' is {}, expected numeric",
            other.type_name()
        ))),
    }
}
