//! Origin/destination lookups joined onto interaction rows.

use std::collections::HashMap;
use std::fmt::Debug;

use crate::error::{ChoiceError, Result};

/// A zone-to-zone value lookup (travel time, distance, ...).
pub trait Skim: Debug + Send + Sync {
    /// Value for an origin/destination pair, `None` if either zone is
    /// unknown.
    fn get(&self, origin: i64, destination: i64) -> Option<f64>;
}

/// A square matrix over a list of zone ids.
///
/// # Examples
///
/// ```
/// use u_choice::interaction::{DenseSkim, Skim};
///
/// let dist = DenseSkim::new(vec![10, 20], vec![0.0, 3.5, 3.5, 0.0]).unwrap();
/// assert_eq!(dist.get(10, 20), Some(3.5));
/// assert_eq!(dist.get(10, 99), None);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DenseSkim {
    zones: Vec<i64>,
    positions: HashMap<i64, usize>,
    values: Vec<f64>,
}

impl DenseSkim {
    /// Creates a skim from zone ids and a row-major `zones × zones` matrix.
    pub fn new(zones: Vec<i64>, values: Vec<f64>) -> Result<Self> {
        let n = zones.len();
        if values.len() != n * n {
            return Err(ChoiceError::table(format!(
                "skim over {n} zones needs {} values, got {}",
                n * n,
                values.len()
            )));
        }
        let mut positions = HashMap::with_capacity(n);
        for (pos, &zone) in zones.iter().enumerate() {
            if positions.insert(zone, pos).is_some() {
                return Err(ChoiceError::table(format!("duplicate skim zone {zone}")));
            }
        }
        Ok(Self {
            zones,
            positions,
            values,
        })
    }

    /// Zone ids in matrix order.
    pub fn zones(&self) -> &[i64] {
        &self.zones
    }
}

impl Skim for DenseSkim {
    fn get(&self, origin: i64, destination: i64) -> Option<f64> {
        let o = *self.positions.get(&origin)?;
        let d = *self.positions.get(&destination)?;
        Some(self.values[o * self.zones.len() + d])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_lookup() {
        let skim = DenseSkim::new(vec![1, 2, 3], (0..9).map(f64::from).collect()).unwrap();
        assert_eq!(skim.get(1, 1), Some(0.0));
        assert_eq!(skim.get(2, 3), Some(5.0));
        assert_eq!(skim.get(3, 1), Some(6.0));
        assert_eq!(skim.get(4, 1), None);
    }

    #[test]
    fn test_dense_shape_checked() {
        assert!(DenseSkim::new(vec![1, 2], vec![0.0; 3]).is_err());
        assert!(DenseSkim::new(vec![1, 1], vec![0.0; 4]).is_err());
    }
}
