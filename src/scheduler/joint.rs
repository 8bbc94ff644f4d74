//! Joint tour time-window scheduler.
//!
//! # Algorithm
//!
//! 1. Validate groups (any failure aborts before feasibility is checked).
//! 2. Partition groups by participant count.
//! 3. Chunk each partition so that `groups × alternatives <= chunk_size`.
//! 4. Split each chunk into waves of person-disjoint groups.
//! 5. Per wave: filter alternatives by joint feasibility, report groups
//!    with nothing feasible, build one ragged interaction dataset for the
//!    rest, evaluate utilities, draw one choice per group from its own
//!    random stream, and commit each chosen window for every participant.
//!
//! Each chunk is resolved and committed before the next one is built. If a
//! later chunk fails, the choices already committed are returned inside the
//! error.
//!
//! # Complexity
//! O(g · a · p) feasibility work for g groups, a alternatives, and p
//! participants per group, plus O(g · a · k) utility work for k terms.

use std::borrow::Cow;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::chunk::{groups_per_chunk, partition_by_size, waves};
use crate::config::ChoiceConfig;
use crate::error::{ChoiceError, Result};
use crate::expression::{assign_columns, check_variability, UtilityEvaluator};
use crate::interaction::InteractionBuilder;
use crate::mnl::{self, Purpose, RandomChannels};
use crate::models::{
    AlternativeSet, PersonId, SchedulingOutcome, Table, TourChoice, TourGroup, UnscheduledGroup,
    UtilitySpec,
};
use crate::timetable::Timetable;
use crate::validation::{to_specification_error, validate_groups};

/// Chooses a time window for each joint tour group.
///
/// # Example
///
/// ```
/// use u_choice::models::{AlternativeSet, SpecTerm, Table, TourGroup, UtilitySpec};
/// use u_choice::scheduler::JointTourScheduler;
/// use u_choice::timetable::Timetable;
/// use u_choice::ChoiceConfig;
///
/// let spec = UtilitySpec::shared().with_term(SpecTerm::new("duration", 0.2));
/// let alternatives = AlternativeSet::tdd(6).unwrap();
/// let scheduler =
///     JointTourScheduler::new(&spec, alternatives, ChoiceConfig::default().with_seed(1)).unwrap();
///
/// let tours = Table::new("tour_id", vec![100]).unwrap();
/// let groups = vec![TourGroup::new(100, vec![1, 2])];
/// let mut timetable = Timetable::new([1, 2], 6).unwrap();
///
/// let outcome = scheduler.schedule(&tours, &groups, &mut timetable).unwrap();
/// assert!(outcome.is_complete());
/// let window = outcome.choice_for(100).unwrap().window;
/// assert!(!timetable.is_feasible(&[1], window).unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct JointTourScheduler {
    evaluator: UtilityEvaluator,
    alternatives: AlternativeSet,
    config: ChoiceConfig,
    channels: RandomChannels,
    preprocessor: Vec<(String, String)>,
}

impl JointTourScheduler {
    /// Compiles the specification and validates the configuration.
    pub fn new(spec: &UtilitySpec, alternatives: AlternativeSet, config: ChoiceConfig) -> Result<Self> {
        config.validate()?;
        let evaluator = UtilityEvaluator::new(spec, &config)?;
        Ok(Self {
            evaluator,
            alternatives,
            channels: RandomChannels::new(config.seed),
            config,
            preprocessor: Vec::new(),
        })
    }

    /// Chooser annotations evaluated before scheduling.
    ///
    /// Each `(target, expression)` pair is written into a copy of the
    /// chooser table in order; the caller's table is not modified.
    pub fn with_preprocessor(mut self, assignments: Vec<(String, String)>) -> Self {
        self.preprocessor = assignments;
        self
    }

    /// The alternative universe.
    pub fn alternatives(&self) -> &AlternativeSet {
        &self.alternatives
    }

    /// Schedules every group, committing chosen windows to `timetable`.
    ///
    /// Groups with no jointly feasible alternative are returned in
    /// `SchedulingOutcome::unscheduled`; every other failure aborts the call.
    ///
    /// # Errors
    /// Validation and preprocessing failures are returned as raised, before
    /// the timetable is touched. A failure while resolving a wave is
    /// returned as [`ChoiceError::Interrupted`], carrying every choice
    /// committed by earlier waves. The failed wave commits nothing.
    pub fn schedule(
        &self,
        choosers: &Table,
        groups: &[TourGroup],
        timetable: &mut Timetable,
    ) -> Result<SchedulingOutcome> {
        if groups.is_empty() {
            info!("no joint tours to schedule");
            return Ok(SchedulingOutcome::new());
        }
        validate_groups(groups, choosers, timetable).map_err(|e| to_specification_error(&e))?;

        let choosers = if self.preprocessor.is_empty() {
            Cow::Borrowed(choosers)
        } else {
            let mut annotated = choosers.clone();
            assign_columns(&mut annotated, &self.preprocessor, &self.config.constants)?;
            Cow::Owned(annotated)
        };

        let partitions = partition_by_size(groups);
        info!(
            groups = groups.len(),
            partitions = partitions.len(),
            alternatives = self.alternatives.len(),
            chunk_size = self.config.chunk_size,
            "scheduling joint tours"
        );

        let mut run = Run {
            outcome: SchedulingOutcome::new(),
            order: HashMap::new(),
            diagnosed: false,
        };
        let resolved =
            self.resolve_partitions(&choosers, groups, &partitions, timetable, &mut run);
        if let Err(cause) = resolved {
            warn!(
                scheduled = run.outcome.choices.len(),
                unscheduled = run.outcome.unscheduled.len(),
                error = %cause,
                "joint tour scheduling interrupted"
            );
            return Err(ChoiceError::interrupted(run.outcome, cause));
        }

        let outcome = run.outcome;
        info!(
            scheduled = outcome.choices.len(),
            unscheduled = outcome.unscheduled.len(),
            "joint tour scheduling complete"
        );
        Ok(outcome)
    }

    fn resolve_partitions(
        &self,
        choosers: &Table,
        groups: &[TourGroup],
        partitions: &[Vec<usize>],
        timetable: &mut Timetable,
        run: &mut Run,
    ) -> Result<()> {
        for (rank, partition) in partitions.iter().enumerate() {
            let per_chunk =
                groups_per_chunk(self.config.chunk_size, self.alternatives.len(), partition.len());
            for (c, chunk) in partition.chunks(per_chunk).enumerate() {
                debug!(
                    participants = groups[chunk[0]].size(),
                    chunk = c,
                    groups = chunk.len(),
                    "processing chunk"
                );
                for wave in waves(groups, chunk) {
                    self.resolve_wave(choosers, groups, &wave, rank, timetable, run)?;
                }
            }
        }
        Ok(())
    }

    // Nothing is committed until every group in the wave has a choice.
    fn resolve_wave(
        &self,
        choosers: &Table,
        groups: &[TourGroup],
        wave: &[usize],
        rank: usize,
        timetable: &mut Timetable,
        run: &mut Run,
    ) -> Result<()> {
        let mut ready = Vec::with_capacity(wave.len());
        let mut subsets = Vec::with_capacity(wave.len());
        for &g in wave {
            let group = &groups[g];
            let feasible =
                timetable.feasible_alternatives(&group.participants, self.alternatives.windows())?;
            if feasible.is_empty() {
                warn!(
                    chooser_id = group.chooser_id,
                    participants = ?group.participants,
                    "no jointly feasible alternative"
                );
                run.outcome.unscheduled.push(UnscheduledGroup {
                    chooser_id: group.chooser_id,
                    participants: group.participants.clone(),
                });
                continue;
            }
            ready.push(g);
            subsets.push(feasible);
        }
        if ready.is_empty() {
            return Ok(());
        }

        let rows = ready
            .iter()
            .map(|&g| {
                let id = groups[g].chooser_id;
                choosers
                    .position_of(id)
                    .ok_or_else(|| ChoiceError::table(format!("chooser {id} not found")))
            })
            .collect::<Result<Vec<_>>>()?;
        let wave_choosers = choosers.take(&rows)?;

        let dataset = InteractionBuilder::new(&wave_choosers, self.alternatives.table())
            .build_subsets(&subsets)?;
        let design = self.evaluator.evaluate(dataset.table())?;
        if !run.diagnosed {
            let mut rng = self.channels.rng_for(Purpose::Diagnostic, 0);
            check_variability(&design, self.config.variability_sample_cap, &mut rng);
            run.diagnosed = true;
        }
        let utilities = design.utilities();
        let draws = self.channels.draws(wave_choosers.index());
        let result = mnl::simulate(&utilities, dataset.blocks(), &draws)
            .map_err(|e| e.for_choosers(wave_choosers.index()))?;

        for (i, &g) in ready.iter().enumerate() {
            let group = &groups[g];
            let position = dataset.alternative_position(i, result.positions[i]);
            let window = self.alternatives.window(position);

            if self.config.is_traced(group.chooser_id) {
                let range = dataset.blocks().range(i);
                info!(
                    chooser_id = group.chooser_id,
                    feasible = ?&dataset.table().index()[range.clone()],
                    utilities = ?&utilities[range.clone()],
                    probabilities = ?&result.probabilities[range],
                    draw = draws[i],
                    chosen = self.alternatives.id(position),
                    "traced chooser"
                );
            }

            timetable.commit(&group.participants, window)?;
            if cfg!(debug_assertions) {
                run.record(&group.participants, (rank, g));
            }
            run.outcome.choices.push(TourChoice {
                chooser_id: group.chooser_id,
                alternative_id: self.alternatives.id(position),
                window,
            });
        }
        debug!(
            resolved = ready.len(),
            rows = dataset.len(),
            "resolved wave"
        );
        Ok(())
    }
}

/// Mutable state of one `schedule` call.
struct Run {
    outcome: SchedulingOutcome,
    // Last (partition, caller index) resolved per person.
    order: HashMap<PersonId, (usize, usize)>,
    diagnosed: bool,
}

impl Run {
    fn record(&mut self, persons: &[PersonId], key: (usize, usize)) {
        for &p in persons {
            if let Some(prev) = self.order.insert(p, key) {
                debug_assert!(
                    prev < key,
                    "person {p} resolved out of order: {prev:?} then {key:?}"
                );
            }
        }
    }
}
