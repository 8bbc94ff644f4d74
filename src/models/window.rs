//! Time windows and the alternative set they belong to.
//!
//! # Time Model
//! The day is divided into `num_periods` equal periods numbered from 0.
//! A window occupies every period in `[start, end]`, both inclusive, so a
//! tour that departs and returns in the same period has duration 0 and
//! still occupies that period.

use serde::{Deserialize, Serialize};

use super::{Column, Table};
use crate::error::{ChoiceError, Result};

/// An inclusive range of periods `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    /// First occupied period.
    pub start: usize,
    /// Last occupied period.
    pub end: usize,
}

impl Window {
    /// Creates a new window.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Periods between departure and return.
    #[inline]
    pub fn duration(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Number of periods occupied.
    #[inline]
    pub fn span(&self) -> usize {
        self.duration() + 1
    }

    /// Whether a period falls within this window.
    #[inline]
    pub fn contains(&self, period: usize) -> bool {
        period >= self.start && period <= self.end
    }

    /// Whether two windows share at least one period.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Whether the window is well formed and fits in `num_periods`.
    pub fn check(&self, num_periods: usize) -> Result<()> {
        if self.end < self.start || self.end >= num_periods {
            return Err(ChoiceError::WindowOutOfRange {
                start: self.start,
                end: self.end,
                num_periods,
            });
        }
        Ok(())
    }
}

/// The universe of window alternatives.
///
/// Wraps an alternatives `Table` (indexed by alternative id) together with
/// the window each row occupies. Feature columns on the table are visible to
/// utility expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct AlternativeSet {
    table: Table,
    windows: Vec<Window>,
}

impl AlternativeSet {
    /// Builds the set from a table whose `start_column` and `end_column`
    /// hold integral period numbers.
    pub fn from_table(table: Table, start_column: &str, end_column: &str) -> Result<Self> {
        let starts = period_column(&table, start_column)?;
        let ends = period_column(&table, end_column)?;
        let mut windows = Vec::with_capacity(table.len());
        for (row, (&start, &end)) in starts.iter().zip(&ends).enumerate() {
            if end < start {
                return Err(ChoiceError::table(format!(
                    "alternative {} ends ({end}) before it starts ({start})",
                    table.index()[row]
                )));
            }
            windows.push(Window::new(start, end));
        }
        Ok(Self { table, windows })
    }

    /// Enumerates every start/end pair in a day of `num_periods` periods.
    ///
    /// Alternatives are numbered from 0 in start-major order and carry
    /// `start`, `end`, and `duration` columns.
    pub fn tdd(num_periods: usize) -> Result<Self> {
        let mut starts = Vec::new();
        let mut ends = Vec::new();
        for start in 0..num_periods {
            for end in start..num_periods {
                starts.push(start as f64);
                ends.push(end as f64);
            }
        }
        let durations: Vec<f64> = starts.iter().zip(&ends).map(|(s, e)| e - s).collect();
        let ids = (0..starts.len() as i64).collect();
        let table = Table::new("tdd", ids)?
            .with_column("start", starts)?
            .with_column("end", ends)?
            .with_column("duration", durations)?;
        Self::from_table(table, "start", "end")
    }

    /// The underlying alternatives table.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Window of every alternative, in table order.
    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    /// Window at a row position.
    pub fn window(&self, position: usize) -> Window {
        self.windows[position]
    }

    /// Alternative id at a row position.
    pub fn id(&self, position: usize) -> i64 {
        self.table.index()[position]
    }

    /// Number of alternatives.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

fn period_column(table: &Table, name: &str) -> Result<Vec<usize>> {
    match table.require_column(name)? {
        Column::Num(values) => values
            .iter()
            .map(|&v| {
                if v >= 0.0 && v.fract() == 0.0 {
                    Ok(v as usize)
                } else {
                    Err(ChoiceError::table(format!(
                        "column '{name}' holds non-period value {v}"
                    )))
                }
            })
            .collect(),
        other => Err(ChoiceError::table(format!(
            "column '{name}' must be numeric, found {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_span() {
        let w = Window::new(5, 6);
        assert_eq!(w.duration(), 1);
        assert_eq!(w.span(), 2);
        assert!(w.contains(5));
        assert!(w.contains(6));
        assert!(!w.contains(7));
    }

    #[test]
    fn test_window_overlap_inclusive() {
        let a = Window::new(2, 4);
        assert!(a.overlaps(&Window::new(4, 8))); // shares period 4
        assert!(!a.overlaps(&Window::new(5, 8)));
        assert!(Window::new(3, 3).overlaps(&a));
    }

    #[test]
    fn test_window_check() {
        assert!(Window::new(0, 4).check(5).is_ok());
        assert!(Window::new(0, 5).check(5).is_err());
        assert!(Window::new(3, 2).check(5).is_err());
    }

    #[test]
    fn test_tdd_enumeration() {
        let alts = AlternativeSet::tdd(4).unwrap();
        // 4 + 3 + 2 + 1
        assert_eq!(alts.len(), 10);
        assert_eq!(alts.window(0), Window::new(0, 0));
        assert_eq!(alts.window(3), Window::new(0, 3));
        assert_eq!(alts.window(9), Window::new(3, 3));
        assert_eq!(alts.id(9), 9);
        assert!(alts.table().has_column("duration"));
    }

    #[test]
    fn test_from_table_rejects_bad_periods() {
        let t = Table::new("alt", vec![1])
            .unwrap()
            .with_column("start", vec![2.5])
            .unwrap()
            .with_column("end", vec![3.0])
            .unwrap();
        assert!(AlternativeSet::from_table(t, "start", "end").is_err());

        let t = Table::new("alt", vec![1])
            .unwrap()
            .with_column("start", vec![4.0])
            .unwrap()
            .with_column("end", vec![3.0])
            .unwrap();
        assert!(AlternativeSet::from_table(t, "start", "end").is_err());
    }
}
