//! Per-person time-window feasibility store.
//!
//! Each person owns one slot state per period of the cycle. Slots start
//! free and become occupied when a chosen window is committed; there is no
//! release. Occupied slots for a person are always the union of the
//! windows committed for that person, and committed windows never overlap.
//!
//! # Representation
//! Slot states are bit-packed, one `u64` word per 64 periods, so a joint
//! feasibility check ORs the participants' rows once and then tests each
//! candidate window against the combined mask.

use std::collections::HashMap;
use tracing::trace;

use crate::error::{ChoiceError, Result};
use crate::models::{PersonId, Window};

const WORD_BITS: usize = 64;

/// State of one period for one person.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Occupied,
}

/// Slot occupancy for a set of persons.
///
/// # Examples
///
/// ```
/// use u_choice::models::Window;
/// use u_choice::timetable::Timetable;
///
/// let mut tt = Timetable::new([1, 2], 24).unwrap();
/// tt.commit(&[1], Window::new(5, 6)).unwrap();
///
/// let candidates = [Window::new(3, 4), Window::new(5, 6), Window::new(6, 9)];
/// assert_eq!(tt.feasible_alternatives(&[2], &candidates).unwrap(), vec![0, 1, 2]);
/// assert_eq!(tt.feasible_alternatives(&[1, 2], &candidates).unwrap(), vec![0]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Timetable {
    num_periods: usize,
    words: usize,
    bits: Vec<u64>,
    rows: HashMap<PersonId, usize>,
    persons: Vec<PersonId>,
}

impl Timetable {
    /// Creates a timetable with every slot free.
    pub fn new(persons: impl IntoIterator<Item = PersonId>, num_periods: usize) -> Result<Self> {
        if num_periods == 0 {
            return Err(ChoiceError::specification(
                "timetable needs at least one period",
            ));
        }
        let mut tt = Self {
            num_periods,
            words: num_periods.div_ceil(WORD_BITS),
            bits: Vec::new(),
            rows: HashMap::new(),
            persons: Vec::new(),
        };
        for person in persons {
            if !tt.add_person(person) {
                return Err(ChoiceError::specification(format!(
                    "person {person} listed twice in timetable"
                )));
            }
        }
        Ok(tt)
    }

    /// Adds a person with a free row. Returns `false` if already present.
    pub fn add_person(&mut self, person: PersonId) -> bool {
        if self.rows.contains_key(&person) {
            return false;
        }
        self.rows.insert(person, self.persons.len());
        self.persons.push(person);
        self.bits.extend(std::iter::repeat(0).take(self.words));
        true
    }

    /// Periods per cycle.
    pub fn num_periods(&self) -> usize {
        self.num_periods
    }

    /// Number of persons.
    pub fn len(&self) -> usize {
        self.persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }

    pub fn contains_person(&self, person: PersonId) -> bool {
        self.rows.contains_key(&person)
    }

    /// Person ids in insertion order.
    pub fn persons(&self) -> &[PersonId] {
        &self.persons
    }

    fn row(&self, person: PersonId) -> Result<&[u64]> {
        let r = *self
            .rows
            .get(&person)
            .ok_or(ChoiceError::UnknownPerson(person))?;
        Ok(&self.bits[r * self.words..(r + 1) * self.words])
    }

    fn joint_mask(&self, persons: &[PersonId]) -> Result<Vec<u64>> {
        let mut mask = vec![0u64; self.words];
        for &p in persons {
            for (m, w) in mask.iter_mut().zip(self.row(p)?) {
                *m |= w;
            }
        }
        Ok(mask)
    }

    /// State of one slot.
    pub fn slot_state(&self, person: PersonId, period: usize) -> Result<SlotState> {
        if period >= self.num_periods {
            return Err(ChoiceError::WindowOutOfRange {
                start: period,
                end: period,
                num_periods: self.num_periods,
            });
        }
        let row = self.row(person)?;
        Ok(if row[period / WORD_BITS] >> (period % WORD_BITS) & 1 == 1 {
            SlotState::Occupied
        } else {
            SlotState::Free
        })
    }

    /// Number of free periods for a person.
    pub fn free_period_count(&self, person: PersonId) -> Result<usize> {
        let occupied: u32 = self.row(person)?.iter().map(|w| w.count_ones()).sum();
        Ok(self.num_periods - occupied as usize)
    }

    /// Occupied periods for a person, ascending.
    pub fn occupied_periods(&self, person: PersonId) -> Result<Vec<usize>> {
        let row = self.row(person)?;
        Ok((0..self.num_periods)
            .filter(|&p| row[p / WORD_BITS] >> (p % WORD_BITS) & 1 == 1)
            .collect())
    }

    /// Whether every slot of `window` is free for every person.
    ///
    /// An empty person list is vacuously feasible.
    pub fn is_feasible(&self, persons: &[PersonId], window: Window) -> Result<bool> {
        window.check(self.num_periods)?;
        let mask = self.joint_mask(persons)?;
        Ok(fits(&mask, window))
    }

    /// Positions of the candidates feasible for all persons jointly, in
    /// input order.
    pub fn feasible_alternatives(
        &self,
        persons: &[PersonId],
        candidates: &[Window],
    ) -> Result<Vec<usize>> {
        let mask = self.joint_mask(persons)?;
        let mut feasible = Vec::with_capacity(candidates.len());
        for (pos, &window) in candidates.iter().enumerate() {
            window.check(self.num_periods)?;
            if fits(&mask, window) {
                feasible.push(pos);
            }
        }
        Ok(feasible)
    }

    /// Occupies `window` for every person.
    ///
    /// All persons are checked before any slot changes, so a failed commit
    /// leaves the timetable untouched.
    ///
    /// # Errors
    /// `UnknownPerson`, `WindowOutOfRange`, or `SlotConflict` naming the
    /// first occupied slot found.
    pub fn commit(&mut self, persons: &[PersonId], window: Window) -> Result<()> {
        window.check(self.num_periods)?;
        let mut rows = Vec::with_capacity(persons.len());
        for &p in persons {
            let row = self.row(p)?;
            if let Some(period) = (window.start..=window.end)
                .find(|&q| row[q / WORD_BITS] >> (q % WORD_BITS) & 1 == 1)
            {
                return Err(ChoiceError::SlotConflict {
                    person_id: p,
                    period,
                });
            }
            rows.push(self.rows[&p]);
        }

        let span = window_mask(self.words, window);
        for r in rows {
            for (w, s) in self.bits[r * self.words..(r + 1) * self.words]
                .iter_mut()
                .zip(&span)
            {
                *w |= s;
            }
        }
        trace!(?persons, start = window.start, end = window.end, "committed window");
        Ok(())
    }
}

fn window_mask(words: usize, window: Window) -> Vec<u64> {
    let mut mask = vec![0u64; words];
    for p in window.start..=window.end {
        mask[p / WORD_BITS] |= 1 << (p % WORD_BITS);
    }
    mask
}

fn fits(mask: &[u64], window: Window) -> bool {
    (window.start..=window.end).all(|p| mask[p / WORD_BITS] >> (p % WORD_BITS) & 1 == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_duplicates() {
        assert!(Timetable::new([1, 1], 10).is_err());
        assert!(Timetable::new([1], 0).is_err());
    }

    #[test]
    fn test_joint_filter_scenario() {
        let mut tt = Timetable::new([1, 2], 24).unwrap();
        tt.commit(&[1], Window::new(5, 6)).unwrap();

        let w = Window::new(5, 6);
        assert!(tt.is_feasible(&[2], w).unwrap());
        assert!(!tt.is_feasible(&[1, 2], w).unwrap());
        assert!(tt.feasible_alternatives(&[1, 2], &[w]).unwrap().is_empty());
    }

    #[test]
    fn test_commit_exclusive() {
        let mut tt = Timetable::new([7], 16).unwrap();
        tt.commit(&[7], Window::new(3, 5)).unwrap();
        assert!(!tt.is_feasible(&[7], Window::new(5, 8)).unwrap());
        assert!(!tt.is_feasible(&[7], Window::new(0, 3)).unwrap());
        assert!(tt.is_feasible(&[7], Window::new(6, 8)).unwrap());
        assert_eq!(tt.occupied_periods(7).unwrap(), vec![3, 4, 5]);
        assert_eq!(tt.free_period_count(7).unwrap(), 13);
        assert_eq!(tt.slot_state(7, 4).unwrap(), SlotState::Occupied);
        assert_eq!(tt.slot_state(7, 6).unwrap(), SlotState::Free);
    }

    #[test]
    fn test_commit_all_or_nothing() {
        let mut tt = Timetable::new([1, 2], 8).unwrap();
        tt.commit(&[2], Window::new(4, 4)).unwrap();
        let err = tt.commit(&[1, 2], Window::new(3, 5)).unwrap_err();
        assert_eq!(
            err,
            ChoiceError::SlotConflict {
                person_id: 2,
                period: 4
            }
        );
        assert!(tt.occupied_periods(1).unwrap().is_empty());
    }

    #[test]
    fn test_window_crosses_word_boundary() {
        let mut tt = Timetable::new([1], 130).unwrap();
        tt.commit(&[1], Window::new(60, 70)).unwrap();
        assert_eq!(tt.free_period_count(1).unwrap(), 119);
        assert!(!tt.is_feasible(&[1], Window::new(64, 64)).unwrap());
        assert!(tt.is_feasible(&[1], Window::new(71, 129)).unwrap());
    }

    #[test]
    fn test_misuse_errors() {
        let mut tt = Timetable::new([1], 8).unwrap();
        assert_eq!(
            tt.is_feasible(&[9], Window::new(0, 1)),
            Err(ChoiceError::UnknownPerson(9))
        );
        assert!(matches!(
            tt.commit(&[1], Window::new(6, 8)),
            Err(ChoiceError::WindowOutOfRange { .. })
        ));
        assert!(matches!(
            tt.is_feasible(&[1], Window::new(3, 2)),
            Err(ChoiceError::WindowOutOfRange { .. })
        ));
        assert!(tt.add_person(2));
        assert!(!tt.add_person(2));
        assert_eq!(tt.len(), 2);
    }
}
