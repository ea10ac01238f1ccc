//! Discretization and value-count histograms

use tabfuse::{
    error::{Error, Result},
    Float,
};

/// Histograms longer than this are refused instead of allocated
const MAX_HISTOGRAM_LEN: usize = 1 << 30;

/// Maps a real value onto an integer grid with `precision` decimal digits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discretizer {
    scale: f64,
}

impl Discretizer {
    pub fn new(precision: u32) -> Self {
        Discretizer {
            scale: 10f64.powi(precision as i32),
        }
    }

    /// `round(x * 10^precision)`, fails for non-finite values
    pub fn key<F: Float>(&self, x: F) -> Result<i64> {
        let scaled = x
            .to_f64()
            .filter(|v| v.is_finite())
            .map(|v| (v * self.scale).round())
            .ok_or_else(|| Error::MalformedInput(format!("non-finite value {}", x)))?;

        if scaled.abs() >= i64::MAX as f64 {
            return Err(Error::MalformedInput(format!(
                "value {} overflows the discretization grid",
                x
            )));
        }
        Ok(scaled as i64)
    }
}

/// Number of occurrences of every discretized value between the smallest and largest key
///
/// Bin `i` counts the key `offset + i`. The bins always add up to the number of keys the
/// histogram was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureHistogram {
    offset: i64,
    counts: Vec<f64>,
}

impl FeatureHistogram {
    pub fn from_keys(keys: &[i64]) -> Result<Self> {
        let (lo, hi) = match (keys.iter().min(), keys.iter().max()) {
            (Some(lo), Some(hi)) => (*lo, *hi),
            _ => return Err(Error::NotEnoughSamples),
        };

        let len = (hi as i128 - lo as i128 + 1) as u128;
        if len > MAX_HISTOGRAM_LEN as u128 {
            return Err(Error::MalformedInput(format!(
                "value range spans {} grid points, more than {}",
                len, MAX_HISTOGRAM_LEN
            )));
        }

        let mut counts = vec![0.0; len as usize];
        for key in keys {
            counts[(key - lo) as usize] += 1.0;
        }

        Ok(FeatureHistogram { offset: lo, counts })
    }

    /// Smallest key
    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    pub fn into_counts(self) -> Vec<f64> {
        self.counts
    }

    /// Bin of `key`, `None` when it lies outside the fitted range
    pub fn index_of(&self, key: i64) -> Option<usize> {
        key.checked_sub(self.offset)
            .filter(|idx| *idx >= 0 && (*idx as usize) < self.counts.len())
            .map(|idx| idx as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discretize_rounds_to_grid() {
        let disc = Discretizer::new(4);
        assert_eq!(disc.key(1.00004f64).unwrap(), 10000);
        assert_eq!(disc.key(1.00006f64).unwrap(), 10001);
        assert_eq!(disc.key(-0.5f32).unwrap(), -5000);
        assert!(disc.key(f64::NAN).is_err());
        assert!(disc.key(f64::INFINITY).is_err());
    }

    #[test]
    fn histogram_counts_each_key() {
        let hist = FeatureHistogram::from_keys(&[3, 5, 5, 7, 3, 3]).unwrap();
        assert_eq!(hist.offset(), 3);
        assert_eq!(hist.counts(), &[3.0, 0.0, 2.0, 0.0, 1.0]);
        assert_eq!(hist.index_of(5), Some(2));
        assert_eq!(hist.index_of(2), None);
        assert_eq!(hist.index_of(8), None);
    }

    #[test]
    fn histogram_conserves_population() {
        let keys = (0..1000).map(|i| (i * 37 % 101) as i64 - 50).collect::<Vec<_>>();
        let hist = FeatureHistogram::from_keys(&keys).unwrap();
        assert_eq!(hist.counts().iter().sum::<f64>(), 1000.0);
    }

    #[test]
    fn empty_and_huge_ranges_rejected() {
        assert!(FeatureHistogram::from_keys(&[]).is_err());
        assert!(FeatureHistogram::from_keys(&[0, i64::MAX / 2]).is_err());
    }
}
