//! Input validation for joint scheduling.
//!
//! Checks structural integrity of tour groups before any feasibility
//! check or simulation runs. Detects:
//! - Duplicate chooser IDs
//! - Groups with no participants
//! - Participants listed twice in one group
//! - Chooser IDs missing from the chooser table
//! - Participants missing from the timetable

use std::collections::HashSet;
use std::fmt;

use crate::error::ChoiceError;
use crate::models::{Table, TourGroup};
use crate::timetable::Timetable;

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Two groups share the same chooser ID.
    DuplicateId,
    /// A group has no participants.
    EmptyGroup,
    /// A person appears twice in the same group.
    DuplicateParticipant,
    /// A group's chooser is not in the chooser table.
    UnknownChooser,
    /// A participant is not in the timetable.
    UnknownPerson,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Folds a list of validation errors into one specification error.
pub fn to_specification_error(errors: &[ValidationError]) -> ChoiceError {
    let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
    ChoiceError::Specification(format!(
        "{} invalid tour group(s): {}",
        errors.len(),
        joined.join("; ")
    ))
}

/// Validates tour groups against the chooser table and the timetable.
///
/// Checks:
/// 1. No duplicate chooser IDs
/// 2. Every group has at least one participant
/// 3. No participant appears twice in a group
/// 4. Every chooser ID is in `choosers`
/// 5. Every participant is in `timetable`
///
/// # Returns
/// `Ok(())` if all checks pass, `Err(errors)` with all detected issues.
pub fn validate_groups(
    groups: &[TourGroup],
    choosers: &Table,
    timetable: &Timetable,
) -> ValidationResult {
    let mut errors = Vec::new();
    let mut chooser_ids = HashSet::new();

    for group in groups {
        if !chooser_ids.insert(group.chooser_id) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate chooser ID: {}", group.chooser_id),
            ));
        }

        if group.participants.is_empty() {
            errors.push(ValidationError::new(
                ValidationErrorKind::EmptyGroup,
                format!("Chooser {} has no participants", group.chooser_id),
            ));
        }

        if choosers.position_of(group.chooser_id).is_none() {
            errors.push(ValidationError::new(
                ValidationErrorKind::UnknownChooser,
                format!(
                    "Chooser {} is not in table '{}'",
                    group.chooser_id,
                    choosers.index_name()
                ),
            ));
        }

        let mut seen = HashSet::new();
        for &person in &group.participants {
            if !seen.insert(person) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::DuplicateParticipant,
                    format!(
                        "Chooser {} lists person {} twice",
                        group.chooser_id, person
                    ),
                ));
            }
            if !timetable.contains_person(person) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::UnknownPerson,
                    format!(
                        "Chooser {} references unknown person {}",
                        group.chooser_id, person
                    ),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_choosers() -> Table {
        Table::new("tour_id", vec![1, 2, 3]).unwrap()
    }

    fn sample_timetable() -> Timetable {
        Timetable::new([10, 11, 12], 24).unwrap()
    }

    #[test]
    fn test_valid_groups() {
        let groups = vec![TourGroup::new(1, vec![10, 11]), TourGroup::new(2, vec![12])];
        assert!(validate_groups(&groups, &sample_choosers(), &sample_timetable()).is_ok());
    }

    #[test]
    fn test_empty_group() {
        let groups = vec![TourGroup::new(1, vec![])];
        let errors = validate_groups(&groups, &sample_choosers(), &sample_timetable()).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::EmptyGroup));
    }

    #[test]
    fn test_duplicate_chooser_id() {
        let groups = vec![TourGroup::new(1, vec![10]), TourGroup::new(1, vec![11])];
        let errors = validate_groups(&groups, &sample_choosers(), &sample_timetable()).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::DuplicateId));
    }

    #[test]
    fn test_duplicate_participant() {
        let groups = vec![TourGroup::new(1, vec![10, 10])];
        let errors = validate_groups(&groups, &sample_choosers(), &sample_timetable()).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::DuplicateParticipant));
    }

    #[test]
    fn test_unknown_references() {
        let groups = vec![TourGroup::new(9, vec![99])];
        let errors = validate_groups(&groups, &sample_choosers(), &sample_timetable()).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::UnknownChooser));
        assert!(errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::UnknownPerson && e.message.contains("99")));
    }

    #[test]
    fn test_fold_into_specification_error() {
        let groups = vec![TourGroup::new(1, vec![]), TourGroup::new(9, vec![10])];
        let errors = validate_groups(&groups, &sample_choosers(), &sample_timetable()).unwrap_err();
        let err = to_specification_error(&errors);
        assert!(matches!(err, ChoiceError::Specification(ref m) if m.starts_with("2 invalid")));
    }
}
