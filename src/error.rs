//! Error taxonomy for the choice engine.
//!
//! # Propagation
//!
//! | Error | Scope |
//! |-------|-------|
//! | `Specification` | Aborts the whole model step |
//! | `ExpressionEvaluation` | Aborts the whole model step |
//! | `ChoiceSimulation` | Aborts the batch it occurred in |
//! | `SchedulingInfeasible` | Per group, collected in `SchedulingOutcome::unscheduled` |
//! | `Interrupted` | Wraps an abort raised after earlier chunks were committed |
//!
//! `JointTourScheduler::schedule` commits each chunk before building the
//! next. When a later chunk fails, the error is returned as `Interrupted`
//! together with the choices already committed to the timetable.
//!
//! The remaining variants report misuse of the timetable, tables, or skims
//! and abort the call that raised them.

use std::fmt;

use thiserror::Error;

use crate::models::SchedulingOutcome;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ChoiceError>;

/// Which evaluation scope an expression was evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalStage {
    /// `@`-prefixed expression: columns, `df.` access, and configured constants.
    RawScope,
    /// Plain expression: dataset columns only.
    RowExpression,
}

impl fmt::Display for EvalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalStage::RawScope => write!(f, "raw-scope"),
            EvalStage::RowExpression => write!(f, "row-expression"),
        }
    }
}

/// Errors raised by the choice engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChoiceError {
    /// Malformed utility specification, configuration, or chooser groups.
    #[error("specification error: {0}")]
    Specification(String),

    /// An expression failed to evaluate against a dataset.
    #[error("failed {stage} evaluation of `{expression}`: {reason}")]
    ExpressionEvaluation {
        expression: String,
        stage: EvalStage,
        reason: String,
    },

    /// A chooser's probability row is degenerate.
    ///
    /// The low-level `mnl` functions only see blocks, so they report the
    /// block position; callers holding a chooser table rewrite it with
    /// [`ChoiceError::for_choosers`].
    #[error("choice simulation failed for chooser {chooser_id}: {reason}")]
    ChoiceSimulation { chooser_id: i64, reason: String },

    /// A chooser group has no alternative feasible for all its participants.
    #[error("no feasible alternative for chooser {chooser_id} (participants {participants:?})")]
    SchedulingInfeasible {
        chooser_id: i64,
        participants: Vec<i64>,
    },

    /// A person id is not present in the timetable.
    #[error("person {0} is not in the timetable")]
    UnknownPerson(i64),

    /// A window does not fit in the timetable's period range.
    #[error("window [{start}, {end}] is outside 0..{num_periods}")]
    WindowOutOfRange {
        start: usize,
        end: usize,
        num_periods: usize,
    },

    /// A commit would occupy a slot that is already occupied.
    #[error("period {period} is already occupied for person {person_id}")]
    SlotConflict { person_id: i64, period: usize },

    /// A skim has no value for an origin/destination pair.
    #[error("skim `{skim}` has no value for ({origin}, {destination})")]
    SkimLookup {
        skim: String,
        origin: i64,
        destination: i64,
    },

    /// Table construction or column access failed.
    #[error("table error: {0}")]
    Table(String),

    /// Scheduling stopped part way; `completed` holds every choice and
    /// unscheduled group resolved before `cause`, all of which are
    /// reflected in the timetable.
    #[error(
        "joint scheduling interrupted after {} committed choices: {cause}",
        .completed.choices.len()
    )]
    Interrupted {
        completed: Box<SchedulingOutcome>,
        #[source]
        cause: Box<ChoiceError>,
    },
}

impl ChoiceError {
    pub(crate) fn specification(message: impl Into<String>) -> Self {
        ChoiceError::Specification(message.into())
    }

    pub(crate) fn table(message: impl Into<String>) -> Self {
        ChoiceError::Table(message.into())
    }

    pub(crate) fn simulation(block: usize, reason: impl Into<String>) -> Self {
        ChoiceError::ChoiceSimulation {
            chooser_id: block as i64,
            reason: reason.into(),
        }
    }

    pub(crate) fn interrupted(completed: SchedulingOutcome, cause: ChoiceError) -> Self {
        ChoiceError::Interrupted {
            completed: Box::new(completed),
            cause: Box::new(cause),
        }
    }

    /// Maps the block position of a `ChoiceSimulation` error to the chooser
    /// id at that position in `ids`. Other errors pass through unchanged.
    pub fn for_choosers(self, ids: &[i64]) -> Self {
        match self {
            ChoiceError::ChoiceSimulation { chooser_id, reason } => {
                let chooser_id = usize::try_from(chooser_id)
                    .ok()
                    .and_then(|block| ids.get(block).copied())
                    .unwrap_or(chooser_id);
                ChoiceError::ChoiceSimulation { chooser_id, reason }
            }
            other => other,
        }
    }

    /// The error that stopped the call, looking through `Interrupted`.
    pub fn root_cause(&self) -> &ChoiceError {
        match self {
            ChoiceError::Interrupted { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Choices committed before an interruption, if any.
    pub fn completed(&self) -> Option<&SchedulingOutcome> {
        match self {
            ChoiceError::Interrupted { completed, .. } => Some(completed.as_ref()),
            _ => None,
        }
    }

    /// Whether this error only affects a single chooser group.
    pub fn is_per_group(&self) -> bool {
        matches!(self, ChoiceError::SchedulingInfeasible { .. })
    }
}
