//! Blomberg's K and K* phylogenetic signal.
//!
//! Both statistics compare the observed ratio of raw to phylogenetically
//! corrected mean squared error with the ratio expected under Brownian
//! motion on the tree summarized by the variance-covariance matrix `V`:
//!
//! ```text
//! x̂  = Σ(V⁻¹x) / ΣV⁻¹            GLS mean
//! dx = x − x̂                      GLS residual
//! K  = [(dxᵀdx) / (dxᵀV⁻¹dx)] / [(tr V − n / ΣV⁻¹) / (n − 1)]
//! K* = [(dmᵀdm) / (dxᵀV⁻¹dx)] / [(tr V − ΣV / n) / (n − 1)],   dm = x − mean(x)
//! ```
//!
//! K near 1 is what Brownian motion produces; K > 1 means close relatives
//! resemble each other more than Brownian motion predicts. The inverse and
//! the expected ratio depend only on `V`, so they are computed once per
//! test rather than once per permutation.

use nalgebra::{DMatrix, DVector};
use phylosig_core::linalg;
use phylosig_core::{Result, SignalError};

use crate::permutation::{PermutationConfig, PermutationResult, PermutationTest, SignalStatistic};

/// Quantities derived from the covariance matrix that K and K* share.
#[derive(Debug, Clone)]
struct GlsTerms {
    vcv_inv: DMatrix<f64>,
    inv_sum: f64,
    trace: f64,
    total: f64,
}

impl GlsTerms {
    fn new(vcv: &[Vec<f64>], what: &str) -> Result<Self> {
        let vcv = linalg::square_matrix(vcv, what)?;
        let n = vcv.nrows();
        if n < 2 {
            return Err(SignalError::Degenerate(format!(
                "{}: need at least 2 taxa, got {}",
                what, n
            )));
        }
        let vcv_inv = linalg::inverse(&vcv, what)?;
        let inv_sum = vcv_inv.sum();
        if inv_sum == 0.0 {
            return Err(SignalError::Degenerate(format!(
                "{}: entries of the inverse covariance sum to zero",
                what
            )));
        }
        Ok(Self {
            vcv_inv,
            inv_sum,
            trace: vcv.trace(),
            total: vcv.sum(),
        })
    }

    fn n(&self) -> usize {
        self.vcv_inv.nrows()
    }

    /// `x − x̂` with the GLS mean.
    fn residual(&self, x: &DVector<f64>) -> DVector<f64> {
        let xhat = linalg::gls_mean(&self.vcv_inv, self.inv_sum, x);
        x.add_scalar(-xhat)
    }

    /// `dxᵀV⁻¹dx`, the phylogenetically corrected sum of squares.
    fn corrected_ss(&self, dx: &DVector<f64>, what: &str) -> Result<f64> {
        let ss = linalg::quadratic_form(&self.vcv_inv, dx);
        if ss <= 0.0 || !ss.is_finite() {
            return Err(SignalError::Degenerate(format!(
                "{}: corrected sum of squares is not positive ({})",
                what, ss
            )));
        }
        Ok(ss)
    }

    fn checked_trait(&self, x: &[f64], what: &str) -> Result<DVector<f64>> {
        linalg::ensure_len(x, self.n(), what)?;
        if linalg::is_constant(x) {
            return Err(SignalError::Degenerate(format!(
                "{}: trait has zero variance",
                what
            )));
        }
        Ok(DVector::from_column_slice(x))
    }
}

fn expected_ratio(numerator: f64, n: usize, what: &str) -> Result<f64> {
    let expected = numerator / (n as f64 - 1.0);
    if expected == 0.0 || !expected.is_finite() {
        return Err(SignalError::Degenerate(format!(
            "{}: expected ratio under Brownian motion is {}",
            what, expected
        )));
    }
    Ok(expected)
}

// ── K ───────────────────────────────────────────────────────────────────────

/// Blomberg's K with a fixed phylogenetic covariance matrix.
#[derive(Debug, Clone)]
pub struct BlombergK {
    terms: GlsTerms,
    expected: f64,
}

impl BlombergK {
    /// Invert `vcv` and precompute the expected ratio.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::DimensionMismatch`] for a non-square matrix,
    /// [`SignalError::SingularMatrix`] if it cannot be inverted, and
    /// [`SignalError::Degenerate`] for fewer than 2 taxa or a zero expected
    /// ratio.
    pub fn new(vcv: &[Vec<f64>]) -> Result<Self> {
        let terms = GlsTerms::new(vcv, "blomberg_k")?;
        let n = terms.n();
        let expected = expected_ratio(terms.trace - n as f64 / terms.inv_sum, n, "blomberg_k")?;
        Ok(Self { terms, expected })
    }

    /// Ratio expected under Brownian motion, `(tr V − n / ΣV⁻¹) / (n − 1)`.
    pub fn expected_ratio(&self) -> f64 {
        self.expected
    }
}

impl SignalStatistic for BlombergK {
    fn name(&self) -> &'static str {
        "Blomberg's K"
    }

    fn dim(&self) -> usize {
        self.terms.n()
    }

    fn evaluate(&self, x: &[f64]) -> Result<f64> {
        let x = self.terms.checked_trait(x, "blomberg_k")?;
        let dx = self.terms.residual(&x);
        let observed = dx.norm_squared() / self.terms.corrected_ss(&dx, "blomberg_k")?;
        Ok(observed / self.expected)
    }
}

// ── K* ──────────────────────────────────────────────────────────────────────

/// Blomberg's K* with a fixed phylogenetic covariance matrix.
///
/// Differs from [`BlombergK`] in using deviations from the arithmetic mean
/// for the raw sum of squares and `ΣV / n` in the expected ratio.
#[derive(Debug, Clone)]
pub struct BlombergKStar {
    terms: GlsTerms,
    expected: f64,
}

impl BlombergKStar {
    /// Invert `vcv` and precompute the expected ratio.
    ///
    /// # Errors
    ///
    /// Same conditions as [`BlombergK::new`].
    pub fn new(vcv: &[Vec<f64>]) -> Result<Self> {
        let terms = GlsTerms::new(vcv, "blomberg_k_star")?;
        let n = terms.n();
        let expected = expected_ratio(
            terms.trace - terms.total / n as f64,
            n,
            "blomberg_k_star",
        )?;
        Ok(Self { terms, expected })
    }

    /// Ratio expected under Brownian motion, `(tr V − ΣV / n) / (n − 1)`.
    pub fn expected_ratio(&self) -> f64 {
        self.expected
    }
}

impl SignalStatistic for BlombergKStar {
    fn name(&self) -> &'static str {
        "Blomberg's K*"
    }

    fn dim(&self) -> usize {
        self.terms.n()
    }

    fn evaluate(&self, x: &[f64]) -> Result<f64> {
        let x = self.terms.checked_trait(x, "blomberg_k_star")?;
        let dx = self.terms.residual(&x);
        let dm = x.add_scalar(-x.mean());
        let observed = dm.norm_squared() / self.terms.corrected_ss(&dx, "blomberg_k_star")?;
        Ok(observed / self.expected)
    }
}

// ── Entry points ────────────────────────────────────────────────────────────

/// Observed Blomberg's K, without a permutation test.
pub fn blomberg_k(x: &[f64], vcv: &[Vec<f64>]) -> Result<f64> {
    linalg::ensure_len(x, vcv.len(), "blomberg_k")?;
    BlombergK::new(vcv)?.evaluate(x)
}

/// Observed Blomberg's K*, without a permutation test.
pub fn blomberg_k_star(x: &[f64], vcv: &[Vec<f64>]) -> Result<f64> {
    linalg::ensure_len(x, vcv.len(), "blomberg_k_star")?;
    BlombergKStar::new(vcv)?.evaluate(x)
}

/// Permutation test for Blomberg's K (right-tailed).
///
/// # Arguments
///
/// * `x` — trait value for each taxon
/// * `vcv` — `n × n` phylogenetic variance-covariance matrix (invertible)
/// * `reps` — number of permutations (at least 1)
/// * `seed` — random seed for reproducibility
///
/// # Errors
///
/// Returns an error if `reps` is zero, the sizes disagree, `vcv` is
/// singular, or the trait is constant.
///
/// # Example
///
/// ```
/// use phylosig_stats::blomberg::k_test;
///
/// // two clades of two, with the trait split along the clades
/// let vcv = vec![
///     vec![1.0, 0.8, 0.0, 0.0],
///     vec![0.8, 1.0, 0.0, 0.0],
///     vec![0.0, 0.0, 1.0, 0.8],
///     vec![0.0, 0.0, 0.8, 1.0],
/// ];
/// let result = k_test(&[1.0, 1.2, 5.0, 5.3], &vcv, 99, 42).unwrap();
/// assert!(result.statistic > 1.0);
/// ```
pub fn k_test(x: &[f64], vcv: &[Vec<f64>], reps: usize, seed: u64) -> Result<PermutationResult> {
    k_test_with(x, vcv, &PermutationConfig::new(reps).with_seed(seed))
}

/// Permutation test for Blomberg's K with explicit settings.
pub fn k_test_with(
    x: &[f64],
    vcv: &[Vec<f64>],
    config: &PermutationConfig,
) -> Result<PermutationResult> {
    config.validate()?;
    linalg::ensure_len(x, vcv.len(), "k_test")?;
    PermutationTest::new(BlombergK::new(vcv)?, config.clone()).run_seeded(x)
}

/// Permutation test for Blomberg's K* (right-tailed).
///
/// Arguments and errors as for [`k_test`].
pub fn k_star_test(
    x: &[f64],
    vcv: &[Vec<f64>],
    reps: usize,
    seed: u64,
) -> Result<PermutationResult> {
    k_star_test_with(x, vcv, &PermutationConfig::new(reps).with_seed(seed))
}

/// Permutation test for Blomberg's K* with explicit settings.
pub fn k_star_test_with(
    x: &[f64],
    vcv: &[Vec<f64>],
    config: &PermutationConfig,
) -> Result<PermutationResult> {
    config.validate()?;
    linalg::ensure_len(x, vcv.len(), "k_star_test")?;
    PermutationTest::new(BlombergKStar::new(vcv)?, config.clone()).run_seeded(x)
}
