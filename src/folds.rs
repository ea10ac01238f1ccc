//! Cross-validation splitters
//!
//! Both splitters hand out plain index lists instead of dataset copies. The per-feature tree
//! stage and the fusion stage each keep several prediction vectors per fold (held-out, train,
//! test, fake) and scatter them back into full-length accumulators, which needs the indices
//! anyway.

use rand::{seq::SliceRandom, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

use crate::error::{Error, Result};
use crate::ParamGuard;

/// Indices of one cross-validation fold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldIndices {
    /// Samples the model of this fold is trained on
    pub train: Vec<usize>,
    /// Samples held out for validation
    pub valid: Vec<usize>,
}

impl FoldIndices {
    /// Fails if an index is out of `0..n` or appears both in `train` and `valid`
    pub fn check_disjoint(&self, n: usize) -> Result<()> {
        let mut held_out = vec![false; n];
        for &idx in &self.valid {
            let slot = held_out
                .get_mut(idx)
                .ok_or_else(|| Error::shape_mismatch("fold validation index", n, idx + 1))?;
            *slot = true;
        }
        for &idx in &self.train {
            match held_out.get(idx) {
                None => return Err(Error::shape_mismatch("fold training index", n, idx + 1)),
                Some(true) => {
                    return Err(Error::MalformedInput(format!(
                        "sample {} is trained on and held out in the same fold",
                        idx
                    )))
                }
                Some(false) => {}
            }
        }
        Ok(())
    }
}

/// Checked parameters of a k-fold splitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFoldValidParams {
    n_splits: usize,
    shuffle: Option<u64>,
    stratified: bool,
}

/// A k-fold splitter
///
/// With `stratified(true)` the samples of each class are spread as evenly as possible over the
/// folds, so that every fold has the class balance of the whole set within one sample per class.
/// With `shuffle(Some(seed))` the samples are permuted before the assignment, otherwise folds are
/// contiguous blocks in index order.
///
/// ```rust
/// use tabfuse::folds::KFold;
/// use tabfuse::ParamGuard;
///
/// let targets = vec![true, false, true, false, true, false];
/// let folds = KFold::params()
///     .n_splits(3)
///     .stratified(true)
///     .check()
///     .unwrap()
///     .split(&targets)
///     .unwrap();
/// assert_eq!(folds.len(), 3);
/// assert!(folds.iter().all(|fold| fold.valid.len() == 2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFoldParams(KFoldValidParams);

/// Marker type to create k-fold parameters
pub struct KFold;

impl KFold {
    /// Defaults: five unshuffled, non-stratified folds
    pub fn params() -> KFoldParams {
        KFoldParams(KFoldValidParams {
            n_splits: 5,
            shuffle: None,
            stratified: false,
        })
    }
}

impl KFoldParams {
    /// Sets the number of folds
    pub fn n_splits(mut self, n_splits: usize) -> Self {
        self.0.n_splits = n_splits;
        self
    }

    /// Permute the samples with the given seed before assigning them to folds
    pub fn shuffle(mut self, seed: Option<u64>) -> Self {
        self.0.shuffle = seed;
        self
    }

    /// Keep the class balance in every fold
    pub fn stratified(mut self, stratified: bool) -> Self {
        self.0.stratified = stratified;
        self
    }
}

impl ParamGuard for KFoldParams {
    type Checked = KFoldValidParams;
    type Error = Error;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if self.0.n_splits < 2 {
            Err(Error::Parameters(format!(
                "Number of splits should be at least two, but was {}",
                self.0.n_splits
            )))
        } else {
            Ok(&self.0)
        }
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

impl KFoldValidParams {
    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    pub fn is_stratified(&self) -> bool {
        self.stratified
    }

    /// Splits `targets.len()` samples into folds
    ///
    /// Fails when there are fewer samples than folds or, for stratified splits, when one class
    /// has fewer members than folds.
    pub fn split(&self, targets: &[bool]) -> Result<Vec<FoldIndices>> {
        let n = targets.len();
        if n < self.n_splits {
            return Err(Error::Parameters(format!(
                "Cannot split {} samples into {} folds",
                n, self.n_splits
            )));
        }

        let mut rng = self.shuffle.map(Xoshiro256Plus::seed_from_u64);
        let mut assignment = vec![0usize; n];

        if self.stratified {
            let mut offset = 0;
            for class in [false, true].iter() {
                let mut members = (0..n).filter(|&i| targets[i] == *class).collect::<Vec<_>>();
                if members.is_empty() {
                    continue;
                }
                if members.len() < self.n_splits {
                    return Err(Error::Parameters(format!(
                        "The least populated class has {} members, fewer than {} folds",
                        members.len(),
                        self.n_splits
                    )));
                }
                if let Some(rng) = rng.as_mut() {
                    members.shuffle(rng);
                }
                // the remainder of each class goes to the folds after the previous class's
                // remainder, which keeps fold sizes within one sample of each other
                let sizes = fold_sizes(members.len(), self.n_splits, offset);
                offset = (offset + members.len() % self.n_splits) % self.n_splits;
                assign_blocks(&members, &sizes, &mut assignment);
            }
        } else {
            let mut order = (0..n).collect::<Vec<_>>();
            if let Some(rng) = rng.as_mut() {
                order.shuffle(rng);
            }
            let sizes = fold_sizes(n, self.n_splits, 0);
            assign_blocks(&order, &sizes, &mut assignment);
        }

        Ok((0..self.n_splits)
            .map(|fold| {
                let (valid, train): (Vec<usize>, Vec<usize>) =
                    (0..n).partition(|&i| assignment[i] == fold);
                FoldIndices { train, valid }
            })
            .collect())
    }
}

/// Sizes of `n_splits` blocks covering `n` items, the `n % n_splits` larger blocks starting at
/// `offset`
fn fold_sizes(n: usize, n_splits: usize, offset: usize) -> Vec<usize> {
    let (base, remainder) = (n / n_splits, n % n_splits);
    (0..n_splits)
        .map(|fold| {
            let shifted = (fold + n_splits - offset) % n_splits;
            base + usize::from(shifted < remainder)
        })
        .collect()
}

fn assign_blocks(members: &[usize], sizes: &[usize], assignment: &mut [usize]) {
    let mut start = 0;
    for (fold, size) in sizes.iter().enumerate() {
        for &idx in &members[start..start + size] {
            assignment[idx] = fold;
        }
        start += size;
    }
}

/// Verifies that every one of the `n` samples is validated in exactly one fold and trained on in
/// exactly `k - 1` folds, never in the fold that holds it out
pub fn check_coverage(folds: &[FoldIndices], n: usize) -> Result<()> {
    let mut valid_hits = vec![0usize; n];
    let mut train_hits = vec![0usize; n];
    for fold in folds {
        fold.check_disjoint(n)?;
        for &idx in &fold.valid {
            let hit = valid_hits.get_mut(idx).ok_or_else(|| {
                Error::shape_mismatch("fold validation index", n, idx + 1)
            })?;
            *hit += 1;
        }
        for &idx in &fold.train {
            let hit = train_hits
                .get_mut(idx)
                .ok_or_else(|| Error::shape_mismatch("fold training index", n, idx + 1))?;
            *hit += 1;
        }
    }
    let k = folds.len();
    if let Some(idx) = valid_hits.iter().position(|&hits| hits != 1) {
        return Err(Error::shape_mismatch(
            format!("validation coverage of sample {}", idx),
            1,
            valid_hits[idx],
        ));
    }
    if let Some(idx) = train_hits.iter().position(|&hits| hits + 1 != k) {
        return Err(Error::shape_mismatch(
            format!("training coverage of sample {}", idx),
            k - 1,
            train_hits[idx],
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn balanced_targets(n: usize) -> Vec<bool> {
        (0..n).map(|i| i % 2 == 0).collect()
    }

    #[test]
    fn every_index_validated_exactly_once() {
        let targets = balanced_targets(103);
        for stratified in [false, true].iter() {
            let folds = KFold::params()
                .n_splits(5)
                .shuffle(Some(7))
                .stratified(*stratified)
                .check()
                .unwrap()
                .split(&targets)
                .unwrap();

            let mut union = HashSet::new();
            for fold in &folds {
                let valid = fold.valid.iter().copied().collect::<HashSet<_>>();
                let train = fold.train.iter().copied().collect::<HashSet<_>>();
                assert!(valid.is_disjoint(&train));
                assert_eq!(valid.len() + train.len(), 103);
                assert!(union.is_disjoint(&valid));
                union.extend(valid);
            }
            assert_eq!(union.len(), 103);
            check_coverage(&folds, 103).unwrap();
        }
    }

    #[test]
    fn stratified_balanced_hundred() {
        let targets = balanced_targets(100);
        let folds = KFold::params()
            .n_splits(5)
            .shuffle(Some(42))
            .stratified(true)
            .check()
            .unwrap()
            .split(&targets)
            .unwrap();

        for fold in folds {
            assert_eq!(fold.valid.len(), 20);
            let positives = fold.valid.iter().filter(|&&i| targets[i]).count();
            assert!((9..=11).contains(&positives));
        }
    }

    #[test]
    fn stratified_uneven_classes_within_one_sample() {
        let targets = (0..97).map(|i| i % 3 == 0).collect::<Vec<_>>();
        let total_pos = targets.iter().filter(|x| **x).count();
        let folds = KFold::params()
            .n_splits(5)
            .stratified(true)
            .shuffle(Some(1))
            .check()
            .unwrap()
            .split(&targets)
            .unwrap();

        let sizes = folds.iter().map(|f| f.valid.len()).collect::<Vec<_>>();
        assert!(sizes.iter().max().unwrap() - sizes.iter().min().unwrap() <= 1);
        for fold in folds {
            let positives = fold.valid.iter().filter(|&&i| targets[i]).count();
            assert!(positives == total_pos / 5 || positives == total_pos / 5 + 1);
        }
    }

    #[test]
    fn unshuffled_folds_are_contiguous() {
        let folds = KFold::params()
            .n_splits(3)
            .check()
            .unwrap()
            .split(&[true; 7])
            .unwrap();
        assert_eq!(folds[0].valid, vec![0, 1, 2]);
        assert_eq!(folds[1].valid, vec![3, 4]);
        assert_eq!(folds[2].valid, vec![5, 6]);
    }

    #[test]
    fn same_seed_same_split() {
        let targets = balanced_targets(50);
        let params = KFold::params().shuffle(Some(3)).stratified(true).check().unwrap();
        assert_eq!(params.split(&targets).unwrap(), params.split(&targets).unwrap());
    }

    #[test]
    fn rejects_degenerate_requests() {
        assert!(KFold::params().n_splits(1).check().is_err());
        let params = KFold::params().n_splits(5).stratified(true).check().unwrap();
        assert!(params.split(&[true, false, true]).is_err());
        assert!(params
            .split(&[true, true, false, false, false, false, false, false])
            .is_err());
    }

    #[test]
    fn coverage_detects_overlap() {
        let folds = vec![
            FoldIndices {
                train: vec![1],
                valid: vec![0, 1],
            },
            FoldIndices {
                train: vec![0],
                valid: vec![],
            },
        ];
        assert!(check_coverage(&folds, 2).is_err());
        assert!(folds[0].check_disjoint(2).is_err());
        assert!(folds[1].check_disjoint(2).is_ok());
    }

    #[test]
    fn coverage_accepts_disjoint_folds() {
        let folds = vec![
            FoldIndices {
                train: vec![1],
                valid: vec![0],
            },
            FoldIndices {
                train: vec![0],
                valid: vec![1],
            },
        ];
        assert!(check_coverage(&folds, 2).is_ok());
        assert!(check_coverage(&folds, 1).is_err());
    }
}
