//! Gradient histograms

use rayon::prelude::*;
use rayon::ThreadPool;

use super::binning::BinnedMatrix;

/// Rows per work item when building histograms in parallel
const ROWS_PER_CHUNK: usize = 8192;

/// Sum of gradients, hessians and samples falling into one bin
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BinStats {
    pub grad: f64,
    pub hess: f64,
    pub count: usize,
}

impl BinStats {
    fn add(&mut self, other: &BinStats) {
        self.grad += other.grad;
        self.hess += other.hess;
        self.count += other.count;
    }

    fn sub(&mut self, other: &BinStats) {
        self.grad -= other.grad;
        self.hess -= other.hess;
        self.count -= other.count;
    }
}

/// Per-feature, per-bin gradient statistics of a set of rows
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    bins: Vec<BinStats>,
    offsets: Vec<usize>,
}

impl Histogram {
    fn empty(binned: &BinnedMatrix) -> Self {
        let mut offsets = Vec::with_capacity(binned.nfeatures() + 1);
        let mut total = 0;
        for feature in 0..binned.nfeatures() {
            offsets.push(total);
            total += binned.n_bins(feature);
        }
        offsets.push(total);

        Histogram {
            bins: vec![BinStats::default(); total],
            offsets,
        }
    }

    fn accumulate(&mut self, binned: &BinnedMatrix, rows: &[usize], grad: &[f64], hess: &[f64]) {
        for feature in 0..binned.nfeatures() {
            let column = binned.column(feature);
            let bins = &mut self.bins[self.offsets[feature]..self.offsets[feature + 1]];
            for &row in rows {
                let bin = &mut bins[column[row] as usize];
                bin.grad += grad[row];
                bin.hess += hess[row];
                bin.count += 1;
            }
        }
    }

    fn merge(mut self, other: Histogram) -> Self {
        for (a, b) in self.bins.iter_mut().zip(other.bins.iter()) {
            a.add(b);
        }
        self
    }

    /// Builds the histogram of `rows`, spreading row chunks over `pool`
    pub fn build(
        binned: &BinnedMatrix,
        rows: &[usize],
        grad: &[f64],
        hess: &[f64],
        pool: &ThreadPool,
    ) -> Self {
        if rows.len() <= ROWS_PER_CHUNK || pool.current_num_threads() == 1 {
            let mut hist = Histogram::empty(binned);
            hist.accumulate(binned, rows, grad, hess);
            return hist;
        }

        pool.install(|| {
            rows.par_chunks(ROWS_PER_CHUNK)
                .map(|chunk| {
                    let mut hist = Histogram::empty(binned);
                    hist.accumulate(binned, chunk, grad, hess);
                    hist
                })
                .reduce(|| Histogram::empty(binned), Histogram::merge)
        })
    }

    /// Histogram of the sibling, given the parent histogram
    pub fn subtract_from(&self, parent: &Histogram) -> Self {
        let mut sibling = parent.clone();
        for (a, b) in sibling.bins.iter_mut().zip(self.bins.iter()) {
            a.sub(b);
        }
        sibling
    }

    pub fn feature(&self, feature: usize) -> &[BinStats] {
        &self.bins[self.offsets[feature]..self.offsets[feature + 1]]
    }
}
