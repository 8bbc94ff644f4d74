//! Joint tour groups and scheduling outcomes.
//!
//! A `TourGroup` is a chooser row plus the persons whose timetables must
//! all accommodate the chosen window. The scheduler consumes each group
//! exactly once and produces either a `TourChoice` or an
//! `UnscheduledGroup`.

use serde::{Deserialize, Serialize};

use super::{Table, Window};
use crate::error::{ChoiceError, Result};

/// Person identifier (timetable row key).
pub type PersonId = i64;

/// A chooser together with the participants it schedules for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TourGroup {
    /// Chooser id (row in the chooser table).
    pub chooser_id: i64,
    /// Household (or other grouping) id, informational.
    pub household_id: Option<i64>,
    /// Persons whose timetables constrain the choice.
    pub participants: Vec<PersonId>,
}

impl TourGroup {
    /// Creates a group.
    pub fn new(chooser_id: i64, participants: Vec<PersonId>) -> Self {
        Self {
            chooser_id,
            household_id: None,
            participants,
        }
    }

    /// Sets the household id.
    pub fn with_household(mut self, household_id: i64) -> Self {
        self.household_id = Some(household_id);
        self
    }

    /// Number of participants.
    #[inline]
    pub fn size(&self) -> usize {
        self.participants.len()
    }

    /// Whether two groups share a participant.
    pub fn shares_person_with(&self, other: &Self) -> bool {
        self.participants
            .iter()
            .any(|p| other.participants.contains(p))
    }
}

/// A resolved choice for one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourChoice {
    /// Chooser id.
    pub chooser_id: i64,
    /// Chosen alternative id.
    pub alternative_id: i64,
    /// Window committed for every participant.
    pub window: Window,
}

/// A group that could not be scheduled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnscheduledGroup {
    /// Chooser id.
    pub chooser_id: i64,
    /// Participants whose joint availability was empty.
    pub participants: Vec<PersonId>,
}

impl UnscheduledGroup {
    /// The per-group error this entry stands for.
    pub fn to_error(&self) -> ChoiceError {
        ChoiceError::SchedulingInfeasible {
            chooser_id: self.chooser_id,
            participants: self.participants.clone(),
        }
    }
}

/// Result of a scheduling run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulingOutcome {
    /// Resolved choices, in resolution order.
    pub choices: Vec<TourChoice>,
    /// Groups with no jointly feasible alternative, in detection order.
    pub unscheduled: Vec<UnscheduledGroup>,
}

impl SchedulingOutcome {
    /// Creates an empty outcome.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether every group was scheduled.
    pub fn is_complete(&self) -> bool {
        self.unscheduled.is_empty()
    }

    /// Choice made for a chooser, if any.
    pub fn choice_for(&self, chooser_id: i64) -> Option<&TourChoice> {
        self.choices.iter().find(|c| c.chooser_id == chooser_id)
    }

    /// Number of resolved groups.
    pub fn choice_count(&self) -> usize {
        self.choices.len()
    }

    /// Per-group errors for every unscheduled group.
    pub fn errors(&self) -> Vec<ChoiceError> {
        self.unscheduled.iter().map(|u| u.to_error()).collect()
    }

    /// Writes `tdd`, `start`, `end`, and `duration` columns into the
    /// chooser table. Choosers without a choice get NaN.
    pub fn assign_to(&self, choosers: &mut Table) -> Result<()> {
        let n = choosers.len();
        let mut tdd = vec![f64::NAN; n];
        let mut start = vec![f64::NAN; n];
        let mut end = vec![f64::NAN; n];
        let mut duration = vec![f64::NAN; n];
        for choice in &self.choices {
            let row = choosers.position_of(choice.chooser_id).ok_or_else(|| {
                ChoiceError::table(format!(
                    "chooser {} is not in the chooser table",
                    choice.chooser_id
                ))
            })?;
            tdd[row] = choice.alternative_id as f64;
            start[row] = choice.window.start as f64;
            end[row] = choice.window.end as f64;
            duration[row] = choice.window.duration() as f64;
        }
        choosers.insert_column("tdd", tdd)?;
        choosers.insert_column("start", start)?;
        choosers.insert_column("end", end)?;
        choosers.insert_column("duration", duration)?;
        Ok(())
    }
}
