//! Feature discretization for histogram split finding

use ndarray::{ArrayBase, ArrayView1, Axis, Data, Ix2};
use tabfuse::{
    error::{Error, Result},
    Float,
};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Maps the values of one feature onto at most `max_bin` ordered bins
///
/// Bin `b` holds every value `x` with `upper_bounds[b - 1] < x <= upper_bounds[b]`, the last
/// upper bound is infinite. If the feature has no more distinct values than bins, every distinct
/// value gets its own bin and the bounds lie halfway between neighbours. Otherwise the bins are
/// cut so that each holds roughly the same number of samples.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct BinMapper<F> {
    upper_bounds: Vec<F>,
}

impl<F: Float> BinMapper<F> {
    pub fn from_values(values: ArrayView1<F>, max_bin: usize) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::NotEnoughSamples);
        }
        if values.iter().any(|x| !x.is_finite()) {
            return Err(Error::MalformedInput(
                "non-finite value in booster input".into(),
            ));
        }

        let mut sorted = values.to_vec();
        sorted.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        // distinct values with their multiplicity
        let mut distinct: Vec<(F, usize)> = Vec::new();
        for x in sorted {
            match distinct.last_mut() {
                Some((value, count)) if *value == x => *count += 1,
                _ => distinct.push((x, 1)),
            }
        }

        let mut upper_bounds = Vec::with_capacity(max_bin.min(distinct.len()));
        if distinct.len() <= max_bin {
            for pair in distinct.windows(2) {
                upper_bounds.push(midpoint(pair[0].0, pair[1].0));
            }
        } else {
            let per_bin = values.len() as f64 / max_bin as f64;
            let mut cumulative = 0usize;
            for (i, (value, count)) in distinct.iter().enumerate().take(distinct.len() - 1) {
                cumulative += count;
                if upper_bounds.len() + 1 >= max_bin {
                    break;
                }
                if cumulative as f64 >= per_bin * (upper_bounds.len() + 1) as f64 {
                    upper_bounds.push(midpoint(*value, distinct[i + 1].0));
                }
            }
        }
        upper_bounds.push(F::infinity());

        Ok(BinMapper { upper_bounds })
    }

    pub fn n_bins(&self) -> usize {
        self.upper_bounds.len()
    }

    /// Largest value that falls into bin `bin`
    pub fn upper_bound(&self, bin: usize) -> F {
        self.upper_bounds[bin]
    }

    pub fn bin(&self, x: F) -> usize {
        let bin = self.upper_bounds.partition_point(|ub| *ub < x);
        // NaN compares false everywhere and would land past the end
        bin.min(self.upper_bounds.len() - 1)
    }
}

fn midpoint<F: Float>(a: F, b: F) -> F {
    let mid = a + (b - a) / F::cast(2.0);
    // rounding can push the midpoint onto `b`, which would then share `a`'s bin
    if mid < b {
        mid
    } else {
        a
    }
}

/// Column-major bin indices of a whole record matrix
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    columns: Vec<Vec<u16>>,
    n_bins: Vec<usize>,
}

impl BinnedMatrix {
    pub fn new<F: Float, D: Data<Elem = F>>(
        records: &ArrayBase<D, Ix2>,
        mappers: &[BinMapper<F>],
    ) -> Self {
        let columns = records
            .axis_iter(Axis(1))
            .zip(mappers)
            .map(|(column, mapper)| column.iter().map(|x| mapper.bin(*x) as u16).collect())
            .collect();
        let n_bins = mappers.iter().map(|m| m.n_bins()).collect();

        BinnedMatrix { columns, n_bins }
    }

    pub fn nfeatures(&self) -> usize {
        self.columns.len()
    }

    pub fn n_bins(&self, feature: usize) -> usize {
        self.n_bins[feature]
    }

    pub fn column(&self, feature: usize) -> &[u16] {
        &self.columns[feature]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn one_bin_per_distinct_value() {
        let values = array![3.0, 1.0, 2.0, 2.0, 1.0];
        let mapper = BinMapper::from_values(values.view(), 16).unwrap();
        assert_eq!(mapper.n_bins(), 3);
        assert_eq!(mapper.bin(1.0), 0);
        assert_eq!(mapper.bin(2.0), 1);
        assert_eq!(mapper.bin(3.0), 2);
        assert_eq!(mapper.bin(-10.0), 0);
        assert_eq!(mapper.bin(10.0), 2);
        assert_eq!(mapper.upper_bound(0), 1.5);
    }

    #[test]
    fn equal_frequency_when_too_many_values() {
        let values = Array1::range(0.0, 1000.0, 1.0);
        let mapper = BinMapper::from_values(values.view(), 10).unwrap();
        assert_eq!(mapper.n_bins(), 10);

        let mut per_bin = vec![0usize; mapper.n_bins()];
        for x in values.iter() {
            per_bin[mapper.bin(*x)] += 1;
        }
        assert!(per_bin.iter().all(|c| (95..=105).contains(c)));
    }

    #[test]
    fn bins_respect_ordering() {
        let values = Array1::range(-5.0, 5.0, 0.01);
        let mapper = BinMapper::from_values(values.view(), 32).unwrap();
        let bins = values.iter().map(|x| mapper.bin(*x)).collect::<Vec<_>>();
        assert!(bins.windows(2).all(|w| w[0] <= w[1]));
        for (x, b) in values.iter().zip(&bins) {
            assert!(*x <= mapper.upper_bound(*b));
        }
    }

    #[test]
    fn binned_matrix_shape() {
        let records = array![[1.0, 5.0], [2.0, 5.0], [3.0, 6.0]];
        let mappers = records
            .axis_iter(Axis(1))
            .map(|col| BinMapper::from_values(col, 256).unwrap())
            .collect::<Vec<_>>();
        let binned = BinnedMatrix::new(&records, &mappers);
        assert_eq!(binned.nfeatures(), 2);
        assert_eq!(binned.column(0), &[0, 1, 2]);
        assert_eq!(binned.column(1), &[0, 0, 1]);
        assert_eq!(binned.n_bins(1), 2);
    }

    #[test]
    fn rejects_non_finite() {
        assert!(BinMapper::from_values(array![1.0, f64::NAN].view(), 4).is_err());
    }
}
