//! Mantel-type pairwise association between trait profiles and weights.
//!
//! Each unit carries a profile of `p` trait values. The Pearson correlation
//! between every pair of profiles is weighted by the matching entry of the
//! weight matrix:
//!
//! ```text
//! r  = strictly lower triangle of cor(profiles), row-major (i > j)
//! w  = matching entries of W
//! M  = Σ (r − mean r)·w / Σ w
//! ```
//!
//! Positive values mean that heavily weighted pairs (e.g. close neighbours)
//! have more similar profiles than the average pair.
//!
//! **Single-shot only.** Unlike [`moran_test`](crate::moran::moran_test) and
//! the Blomberg tests, this module computes the observed statistic and
//! nothing else. A significance test needs the caller to re-evaluate
//! [`mantel_statistic`] over permutations of the rows of the trait matrix
//! and rank the observed value, e.g. with
//! [`monte_carlo_p_value`](crate::permutation::monte_carlo_p_value).

use phylosig_core::linalg;
use phylosig_core::{Result, SignalError};

/// Weighted, centered pairwise correlation statistic.
///
/// # Arguments
///
/// * `traits` — `n` rows (units) of `p` trait values each
/// * `weights` — `n × n` weight matrix; only the strictly lower triangle is read
///
/// # Errors
///
/// - [`SignalError::InvalidInput`] for fewer than 2 units or 2 variables
/// - [`SignalError::DimensionMismatch`] for ragged traits or a weight matrix
///   that is not `n × n`
/// - [`SignalError::Degenerate`] if a unit's profile is constant (its
///   correlations are undefined) or the lower-triangle weights sum to zero
///
/// # Example
///
/// ```
/// use phylosig_stats::mantel::mantel_statistic;
///
/// let traits = vec![
///     vec![1.0, 2.0, 3.0],
///     vec![2.0, 4.0, 6.5],
///     vec![3.0, 1.0, 2.0],
/// ];
/// // equal weights: centered correlations average to zero
/// let weights = vec![vec![1.0; 3]; 3];
/// let m = mantel_statistic(&traits, &weights).unwrap();
/// assert!(m.abs() < 1e-12);
/// ```
pub fn mantel_statistic(traits: &[Vec<f64>], weights: &[Vec<f64>]) -> Result<f64> {
    let n = traits.len();
    if n < 2 {
        return Err(SignalError::InvalidInput(format!(
            "mantel: need at least 2 units, got {}",
            n
        )));
    }
    let profiles = linalg::row_matrix(traits, "mantel: traits")?;
    if weights.len() != n {
        return Err(SignalError::DimensionMismatch(format!(
            "mantel: trait rows ({}) != weight matrix size ({})",
            n,
            weights.len()
        )));
    }
    let weights = linalg::square_matrix(weights, "mantel: weights")?;
    let corr = linalg::row_correlations(&profiles, "mantel")?;

    let n_pairs = n * (n - 1) / 2;
    let mut tri_r = Vec::with_capacity(n_pairs);
    let mut tri_w = Vec::with_capacity(n_pairs);
    for i in 0..n {
        for j in 0..i {
            tri_r.push(corr[(i, j)]);
            tri_w.push(weights[(i, j)]);
        }
    }

    let w_sum: f64 = tri_w.iter().sum();
    if w_sum == 0.0 || !w_sum.is_finite() {
        return Err(SignalError::Degenerate(format!(
            "mantel: lower-triangle weights must have a finite, nonzero sum (got {})",
            w_sum
        )));
    }

    let r_mean = linalg::mean(&tri_r);
    let weighted: f64 = tri_r
        .iter()
        .zip(tri_w.iter())
        .map(|(r, w)| (r - r_mean) * w)
        .sum();
    Ok(weighted / w_sum)
}
