//! Moran's I spatial autocorrelation.
//!
//! For a trait `x` over `n` units and a weight matrix `W`,
//!
//! ```text
//! I = (n / ΣW) · Σᵢⱼ W[i,j]·yᵢ·yⱼ / Σᵢ yᵢ²,   y = x − mean(x)
//! ```
//!
//! The numerator is the full bilinear form, so an asymmetric `W` contributes
//! both `W[i,j]` and `W[j,i]`. By convention the diagonal of `W` is zero.
//! Positive values indicate that neighbouring units carry similar trait
//! values.

use nalgebra::DMatrix;
use phylosig_core::linalg;
use phylosig_core::{Result, SignalError};

use crate::permutation::{PermutationConfig, PermutationResult, PermutationTest, SignalStatistic};

/// Moran's I with a fixed weight matrix.
#[derive(Debug, Clone)]
pub struct MoranI {
    weights: DMatrix<f64>,
    /// `n / ΣW`, shared by every permutation.
    scale: f64,
}

impl MoranI {
    /// Prepare the statistic for a square weight matrix.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::DimensionMismatch`] for a non-square matrix and
    /// [`SignalError::Degenerate`] if the weights sum to zero (or to a
    /// non-finite value), which leaves the scale factor undefined.
    pub fn new(weights: &[Vec<f64>]) -> Result<Self> {
        let weights = linalg::square_matrix(weights, "moran: weights")?;
        let total = weights.sum();
        if total == 0.0 || !total.is_finite() {
            return Err(SignalError::Degenerate(format!(
                "moran: weights must have a finite, nonzero sum (got {})",
                total
            )));
        }
        let scale = weights.nrows() as f64 / total;
        Ok(Self { weights, scale })
    }
}

impl SignalStatistic for MoranI {
    fn name(&self) -> &'static str {
        "Moran's I"
    }

    fn dim(&self) -> usize {
        self.weights.nrows()
    }

    fn evaluate(&self, x: &[f64]) -> Result<f64> {
        linalg::ensure_len(x, self.dim(), "moran")?;
        if linalg::is_constant(x) {
            return Err(SignalError::Degenerate(
                "moran: trait has zero variance".into(),
            ));
        }
        let y = linalg::centered(x, linalg::mean(x));
        let cross = linalg::quadratic_form(&self.weights, &y);
        let ss = y.norm_squared();
        Ok(self.scale * cross / ss)
    }
}

/// Observed Moran's I, without a permutation test.
///
/// # Example
///
/// ```
/// use phylosig_stats::moran::moran_i;
///
/// // a path of four units with a steadily increasing trait
/// let weights = vec![
///     vec![0.0, 1.0, 0.0, 0.0],
///     vec![1.0, 0.0, 1.0, 0.0],
///     vec![0.0, 1.0, 0.0, 1.0],
///     vec![0.0, 0.0, 1.0, 0.0],
/// ];
/// let i = moran_i(&[1.0, 2.0, 3.0, 4.0], &weights).unwrap();
/// assert!((i - 1.0 / 3.0).abs() < 1e-12);
/// ```
pub fn moran_i(x: &[f64], weights: &[Vec<f64>]) -> Result<f64> {
    linalg::ensure_len(x, weights.len(), "moran")?;
    MoranI::new(weights)?.evaluate(x)
}

/// Permutation test for Moran's I (right-tailed).
///
/// # Arguments
///
/// * `x` — trait value for each unit
/// * `weights` — `n × n` spatial weight matrix, row `i` belonging to `x[i]`
/// * `reps` — number of permutations (at least 1)
/// * `seed` — random seed for reproducibility
///
/// # Errors
///
/// Returns an error if `reps` is zero, the sizes disagree, the weights sum to
/// zero, or the trait is constant.
pub fn moran_test(
    x: &[f64],
    weights: &[Vec<f64>],
    reps: usize,
    seed: u64,
) -> Result<PermutationResult> {
    moran_test_with(x, weights, &PermutationConfig::new(reps).with_seed(seed))
}

/// Permutation test for Moran's I with explicit settings.
pub fn moran_test_with(
    x: &[f64],
    weights: &[Vec<f64>],
    config: &PermutationConfig,
) -> Result<PermutationResult> {
    config.validate()?;
    linalg::ensure_len(x, weights.len(), "moran_test")?;
    PermutationTest::new(MoranI::new(weights)?, config.clone()).run_seeded(x)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Trait, symmetric weights and a relabeling of the units.
    fn labeled_case() -> impl Strategy<Value = (Vec<f64>, Vec<Vec<f64>>, Vec<usize>)> {
        (3usize..9).prop_flat_map(|n| {
            (
                proptest::collection::vec(-5.0f64..5.0, n),
                proptest::collection::vec(0.1f64..2.0, n * n),
                Just((0..n).collect::<Vec<usize>>()).prop_shuffle(),
            )
                .prop_map(move |(x, flat, perm)| {
                    let mut w = vec![vec![0.0; n]; n];
                    for i in 0..n {
                        for j in 0..i {
                            w[i][j] = flat[i * n + j];
                            w[j][i] = flat[i * n + j];
                        }
                    }
                    (x, w, perm)
                })
        })
    }

    proptest! {
        #[test]
        fn moran_invariant_under_relabeling((x, w, perm) in labeled_case()) {
            prop_assume!(!linalg::is_constant(&x));
            let px: Vec<f64> = perm.iter().map(|&i| x[i]).collect();
            let pw: Vec<Vec<f64>> = perm
                .iter()
                .map(|&i| perm.iter().map(|&j| w[i][j]).collect())
                .collect();
            let a = moran_i(&x, &w).unwrap();
            let b = moran_i(&px, &pw).unwrap();
            prop_assert!((a - b).abs() < 1e-8, "{} vs {}", a, b);
        }

        #[test]
        fn moran_test_p_value_bounds((x, w, _perm) in labeled_case(), seed in any::<u64>()) {
            prop_assume!(!linalg::is_constant(&x));
            let result = moran_test(&x, &w, 19, seed).unwrap();
            prop_assert!(result.p_value >= 0.05 - 1e-12 && result.p_value <= 1.0);
            prop_assert_eq!(result.null_distribution.len(), 19);
        }
    }
}
