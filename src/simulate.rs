//! One-call discrete choice simulation.
//!
//! # Algorithm
//!
//! 1. Split choosers into chunks of at most `chunk_size` interaction rows
//! 2. Build the (full or sampled) interaction dataset for a chunk
//! 3. Evaluate the specification into a design matrix
//! 4. Simulate one MNL choice per chooser from its own random stream
//! 5. Map chosen positions back to alternative ids
//!
//! The zero-variance diagnostic runs on the first chunk.

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ChoiceConfig;
use crate::error::Result;
use crate::expression::{check_variability, DesignMatrix, UtilityEvaluator};
use crate::interaction::{InteractionBuilder, Skim};
use crate::mnl::{self, Purpose, RandomChannels};
use crate::models::{Table, UtilitySpec};

/// Choices made by [`simple_simulate`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    /// `(chooser id, alternative id)` in chooser order.
    pub choices: Vec<(i64, i64)>,
    /// Probability of each chosen alternative, in chooser order.
    pub chosen_probabilities: Vec<f64>,
    /// Design matrix over every interaction row.
    pub design: Option<DesignMatrix>,
}

impl SimulationResult {
    /// Alternative chosen by a chooser.
    pub fn choice_for(&self, chooser_id: i64) -> Option<i64> {
        self.choices
            .iter()
            .find(|(c, _)| *c == chooser_id)
            .map(|&(_, a)| a)
    }
}

/// Simulates one choice per chooser over an alternatives table.
///
/// `skims` are joined on `zone_id` / `zone_id_r`.
///
/// # Example
///
/// ```
/// use u_choice::models::{SpecTerm, Table, UtilitySpec};
/// use u_choice::simulate::simple_simulate;
/// use u_choice::ChoiceConfig;
///
/// let persons = Table::new("person_id", vec![1, 2, 3]).unwrap();
/// let modes = Table::new("mode", vec![10, 20])
///     .unwrap()
///     .with_column("cost", vec![1.0, 900.0])
///     .unwrap();
/// let spec = UtilitySpec::shared().with_term(SpecTerm::new("cost", -1.0));
///
/// let result = simple_simulate(&persons, &modes, &spec, &ChoiceConfig::default(), &[]).unwrap();
/// assert_eq!(result.choices, vec![(1, 10), (2, 10), (3, 10)]);
/// ```
pub fn simple_simulate(
    choosers: &Table,
    alternatives: &Table,
    spec: &UtilitySpec,
    config: &ChoiceConfig,
    skims: &[(String, Arc<dyn Skim>)],
) -> Result<SimulationResult> {
    config.validate()?;
    let evaluator = UtilityEvaluator::new(spec, config)?;
    let channels = RandomChannels::new(config.seed);

    if choosers.is_empty() {
        info!("no choosers to simulate");
        return Ok(SimulationResult {
            choices: Vec::new(),
            chosen_probabilities: Vec::new(),
            design: None,
        });
    }

    let width = match config.sample_size {
        Some(size) => size.min(alternatives.len()),
        None => alternatives.len(),
    };
    let per_chunk = if config.chunk_size == 0 {
        choosers.len()
    } else {
        (config.chunk_size / width.max(1)).max(1)
    };
    info!(
        choosers = choosers.len(),
        alternatives = alternatives.len(),
        per_chunk,
        "simulating choices"
    );

    let mut choices = Vec::with_capacity(choosers.len());
    let mut chosen_probabilities = Vec::with_capacity(choosers.len());
    let mut design: Option<DesignMatrix> = None;
    let rows: Vec<usize> = (0..choosers.len()).collect();

    for (c, chunk_rows) in rows.chunks(per_chunk).enumerate() {
        let chunk = choosers.take(chunk_rows)?;
        let mut builder = InteractionBuilder::new(&chunk, alternatives);
        if let Some(size) = config.sample_size {
            builder = builder.with_sample_size(size);
        }
        if let Some(column) = &config.sample_weight_column {
            builder = builder.with_sample_weights(column.clone());
        }
        for (name, skim) in skims {
            builder = builder.with_skim(name.clone(), Arc::clone(skim));
        }
        let dataset = builder.build(&channels)?;
        let chunk_design = evaluator.evaluate(dataset.table())?;
        if c == 0 {
            let mut rng = channels.rng_for(Purpose::Diagnostic, 0);
            check_variability(&chunk_design, config.variability_sample_cap, &mut rng);
        }

        let utilities = chunk_design.utilities();
        let draws = channels.draws(chunk.index());
        let result = mnl::simulate(&utilities, dataset.blocks(), &draws)
            .map_err(|e| e.for_choosers(chunk.index()))?;

        for (i, &chooser_id) in chunk.index().iter().enumerate() {
            let position = dataset.alternative_position(i, result.positions[i]);
            let alternative_id = alternatives.index()[position];
            let probability = result.chosen_probability(dataset.blocks(), i);
            if config.is_traced(chooser_id) {
                let range = dataset.blocks().range(i);
                info!(
                    chooser_id,
                    utilities = ?&utilities[range.clone()],
                    probabilities = ?&result.probabilities[range],
                    draw = draws[i],
                    chosen = alternative_id,
                    "traced chooser"
                );
            }
            choices.push((chooser_id, alternative_id));
            chosen_probabilities.push(probability);
        }
        debug!(chunk = c, choosers = chunk.len(), rows = dataset.len(), "simulated chunk");

        match design.as_mut() {
            Some(d) => d.append(chunk_design),
            None => design = Some(chunk_design),
        }
    }

    Ok(SimulationResult {
        choices,
        chosen_probabilities,
        design,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChoiceError;
    use crate::interaction::DenseSkim;
    use crate::models::SpecTerm;

    fn persons() -> Table {
        Table::new("person_id", (1..=20).collect())
            .unwrap()
            .with_column("zone_id", (0..20).map(|i| (i % 2) as f64).collect::<Vec<_>>())
            .unwrap()
            .with_column("income", (0..20).map(|i| i as f64 * 5.0).collect::<Vec<_>>())
            .unwrap()
    }

    fn destinations() -> Table {
        Table::new("dest", vec![100, 101, 102])
            .unwrap()
            .with_column("zone_id", vec![0.0, 1.0, 1.0])
            .unwrap()
            .with_column("attraction", vec![1.0, 2.0, 0.5])
            .unwrap()
    }

    fn spec() -> UtilitySpec {
        UtilitySpec::shared()
            .with_term(SpecTerm::new("attraction", 0.8))
            .with_term(SpecTerm::new("@df.income * (attraction > 1) / scale", 1.0))
    }

    #[test]
    fn test_choices_valid_and_ordered() {
        let config = ChoiceConfig::default().with_constant("scale", 50.0).with_seed(2);
        let result = simple_simulate(&persons(), &destinations(), &spec(), &config, &[]).unwrap();
        assert_eq!(result.choices.len(), 20);
        for (i, &(chooser, alt)) in result.choices.iter().enumerate() {
            assert_eq!(chooser, i as i64 + 1);
            assert!((100..=102).contains(&alt));
        }
        assert!(result.chosen_probabilities.iter().all(|&p| p > 0.0 && p <= 1.0));
        assert_eq!(result.design.unwrap().rows(), 60);
    }

    #[test]
    fn test_chunking_does_not_change_choices() {
        let base = ChoiceConfig::default().with_constant("scale", 50.0).with_seed(9);
        let whole = simple_simulate(&persons(), &destinations(), &spec(), &base, &[]).unwrap();
        let chunked = simple_simulate(
            &persons(),
            &destinations(),
            &spec(),
            &base.clone().with_chunk_size(7),
            &[],
        )
        .unwrap();
        assert_eq!(whole.choices, chunked.choices);
        assert_eq!(whole.design, chunked.design);
    }

    #[test]
    fn test_sampled_alternatives() {
        let config = ChoiceConfig::default()
            .with_constant("scale", 50.0)
            .with_sample_size(2);
        let result = simple_simulate(&persons(), &destinations(), &spec(), &config, &[]).unwrap();
        assert_eq!(result.design.unwrap().rows(), 40);
    }

    #[test]
    fn test_skims_visible_to_expressions() {
        let dist = DenseSkim::new(vec![0, 1], vec![1.0, 50.0, 50.0, 1.0]).unwrap();
        let skims: Vec<(String, Arc<dyn Skim>)> = vec![("dist".into(), Arc::new(dist))];
        let spec = UtilitySpec::shared().with_term(SpecTerm::new("dist", -20.0));
        let result =
            simple_simulate(&persons(), &destinations(), &spec, &ChoiceConfig::default(), &skims)
                .unwrap();
        // every chooser picks a destination in its own zone
        for (chooser, alt) in result.choices {
            let home = (chooser - 1) % 2;
            let zone = if alt == 100 { 0 } else { 1 };
            assert_eq!(home, zone);
        }
    }

    #[test]
    fn test_empty_choosers() {
        let none = Table::new("person_id", vec![]).unwrap();
        let config = ChoiceConfig::default().with_constant("scale", 1.0);
        let result = simple_simulate(&none, &destinations(), &spec(), &config, &[]).unwrap();
        assert!(result.choices.is_empty());
        assert!(result.design.is_none());
    }

    #[test]
    fn test_bad_spec_aborts() {
        let spec = UtilitySpec::shared().with_term(SpecTerm::new("@df.income / scale", 1.0));
        let err = simple_simulate(&persons(), &destinations(), &spec, &ChoiceConfig::default(), &[])
            .unwrap_err();
        assert!(matches!(err, ChoiceError::ExpressionEvaluation { .. }));
    }

    #[test]
    fn test_simulation_error_names_chooser_under_chunking() {
        // income reaches 75 at person 16, where the square root turns NaN
        let spec = UtilitySpec::shared().with_term(SpecTerm::new("sqrt(70 - income)", 1.0));
        for chunk_size in [0, 6, 15, 30] {
            let config = ChoiceConfig::default().with_chunk_size(chunk_size);
            let err = simple_simulate(&persons(), &destinations(), &spec, &config, &[]).unwrap_err();
            match err {
                ChoiceError::ChoiceSimulation { chooser_id, .. } => {
                    assert_eq!(chooser_id, 16, "chunk_size {chunk_size}")
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
    }
}
