//! One-dimensional Gaussian smoothing

/// Normalized Gaussian weights for offsets `-radius..=radius`
pub fn gaussian_kernel(sigma: f64, truncate: f64) -> Vec<f64> {
    let radius = (truncate * sigma + 0.5) as isize;
    let denom = -0.5 / (sigma * sigma);
    let mut weights = (-radius..=radius)
        .map(|x| (denom * (x * x) as f64).exp())
        .collect::<Vec<_>>();
    let total = weights.iter().sum::<f64>();
    weights.iter_mut().for_each(|w| *w /= total);

    weights
}

/// Maps an out-of-bounds position onto `0..n` by mirroring at the edges, the edge sample
/// included (`d c b a | a b c d | d c b a`)
fn reflect(idx: isize, n: isize) -> usize {
    let period = 2 * n;
    let mut m = idx.rem_euclid(period);
    if m >= n {
        m = period - 1 - m;
    }
    m as usize
}

/// Smooths `input` with a Gaussian of standard deviation `sigma`
///
/// The kernel is cut off at `truncate` standard deviations and the signal is extended by
/// reflection at both ends. The output has the length of the input, and a non-negative input
/// stays non-negative.
pub fn gaussian_filter1d(input: &[f64], sigma: f64, truncate: f64) -> Vec<f64> {
    if input.is_empty() {
        return Vec::new();
    }
    let weights = gaussian_kernel(sigma, truncate);
    let radius = (weights.len() / 2) as isize;
    let n = input.len() as isize;

    (0..n)
        .map(|i| {
            weights
                .iter()
                .enumerate()
                .map(|(j, w)| {
                    let pos = i + j as isize - radius;
                    let value = if pos >= 0 && pos < n {
                        input[pos as usize]
                    } else {
                        input[reflect(pos, n)]
                    };
                    w * value
                })
                .sum()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn kernel_is_normalized_and_symmetric() {
        let kernel = gaussian_kernel(2.5, 4.0);
        assert_eq!(kernel.len(), 2 * 10 + 1);
        assert_abs_diff_eq!(kernel.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        for i in 0..10 {
            assert_abs_diff_eq!(kernel[i], kernel[20 - i]);
        }
    }

    #[test]
    fn reflect_mirrors_with_edge() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
        assert_eq!(reflect(-3, 1), 0);
    }

    #[test]
    fn constant_signal_is_preserved() {
        let smoothed = gaussian_filter1d(&[3.0; 7], 4.0, 4.0);
        for x in smoothed {
            assert_abs_diff_eq!(x, 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn impulse_spreads_mass() {
        let mut input = vec![0.0; 41];
        input[20] = 1.0;
        let smoothed = gaussian_filter1d(&input, 2.0, 4.0);
        // away from the edges the total mass is unchanged
        assert_abs_diff_eq!(smoothed.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(smoothed[20] < 1.0);
        assert!(smoothed[20] > smoothed[21]);
        assert_abs_diff_eq!(smoothed[19], smoothed[21], epsilon = 1e-15);
    }

    #[test]
    fn kernel_wider_than_signal() {
        let smoothed = gaussian_filter1d(&[1.0, 0.0], 5.0, 4.0);
        assert_eq!(smoothed.len(), 2);
        assert!(smoothed.iter().all(|x| x.is_finite() && *x >= 0.0));
        assert!(smoothed.iter().all(|x| *x > 0.0 && *x < 1.0));
    }
}
