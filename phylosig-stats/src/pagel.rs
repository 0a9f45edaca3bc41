//! Pagel's lambda log-likelihood.
//!
//! Lambda scales the off-diagonal entries of the phylogenetic covariance
//! matrix while leaving each taxon's own variance untouched:
//!
//! ```text
//! Vλ = λ·(V − diag V) + diag V
//! ```
//!
//! `λ = 1` recovers Brownian motion on the original tree and `λ = 0` treats
//! the taxa as independent. [`pagel_log_likelihood`] evaluates the Gaussian
//! log-likelihood of the trait under `Vλ`, with the mean and rate profiled
//! out by generalized least squares. It evaluates a single `λ`; searching
//! for the maximum (grid, golden-section, ...) is left to the caller.

use std::f64::consts::PI;

use nalgebra::DMatrix;
use phylosig_core::linalg;
use phylosig_core::{Result, SignalError};

/// Apply the lambda transform to a covariance matrix.
///
/// # Errors
///
/// Returns [`SignalError::DimensionMismatch`] if `vcv` is not square and
/// [`SignalError::InvalidInput`] if `lambda` is not finite.
///
/// # Example
///
/// ```
/// use phylosig_stats::pagel::lambda_transform;
///
/// let vcv = vec![vec![2.0, 1.0], vec![1.0, 2.0]];
/// let scaled = lambda_transform(&vcv, 0.5).unwrap();
/// assert_eq!(scaled, vec![vec![2.0, 0.5], vec![0.5, 2.0]]);
/// ```
pub fn lambda_transform(vcv: &[Vec<f64>], lambda: f64) -> Result<Vec<Vec<f64>>> {
    check_lambda(lambda)?;
    let vcv = linalg::square_matrix(vcv, "lambda_transform")?;
    Ok(linalg::to_rows(&transformed(&vcv, lambda)))
}

fn check_lambda(lambda: f64) -> Result<()> {
    if !lambda.is_finite() {
        return Err(SignalError::InvalidInput(format!(
            "pagel: lambda must be finite, got {}",
            lambda
        )));
    }
    if !(0.0..=1.0).contains(&lambda) {
        log::warn!(
            "pagel: lambda {} outside [0, 1]; the transformed covariance may not be positive definite",
            lambda
        );
    }
    Ok(())
}

fn transformed(vcv: &DMatrix<f64>, lambda: f64) -> DMatrix<f64> {
    let mut out = vcv * lambda;
    out.set_diagonal(&vcv.diagonal());
    out
}

/// Log-likelihood of the trait `x` under Pagel's lambda transform of `vcv`.
///
/// With `a` the GLS mean and `s` the GLS residual variance under `Vλ`,
///
/// ```text
/// log L = −(x − a)ᵀ(Vλ⁻¹ / s)(x − a) / 2 − n·ln(2π) / 2 − ln det(s·Vλ) / 2
/// ```
///
/// # Errors
///
/// - [`SignalError::InvalidInput`] for a non-finite `lambda` or empty `x`
/// - [`SignalError::DimensionMismatch`] if `vcv` is not `n × n`
/// - [`SignalError::SingularMatrix`] if `Vλ` is singular or numerically
///   rank deficient
/// - [`SignalError::Degenerate`] if the residual variance `s` is not
///   positive, checked before the determinant: a negative `s` is rejected
///   even when `det(s·Vλ)` comes out positive (possible for even `n`)
/// - [`SignalError::Degenerate`] if `det(s·Vλ)` is not positive
///
/// # Example
///
/// ```
/// use phylosig_stats::pagel::pagel_log_likelihood;
///
/// let vcv = vec![vec![2.0, 1.0], vec![1.0, 2.0]];
/// let ll = pagel_log_likelihood(1.0, &[1.0, 3.0], &vcv).unwrap();
/// let expected = -1.0 - (2.0 * std::f64::consts::PI).ln() - 3.0_f64.ln() / 2.0;
/// assert!((ll - expected).abs() < 1e-10);
/// ```
pub fn pagel_log_likelihood(lambda: f64, x: &[f64], vcv: &[Vec<f64>]) -> Result<f64> {
    check_lambda(lambda)?;
    if x.is_empty() {
        return Err(SignalError::InvalidInput(
            "pagel: trait vector must not be empty".into(),
        ));
    }
    linalg::ensure_len(x, vcv.len(), "pagel")?;
    let vcv = linalg::square_matrix(vcv, "pagel")?;
    if linalg::is_constant(x) {
        return Err(SignalError::Degenerate(
            "pagel: trait has zero variance".into(),
        ));
    }
    let n = x.len() as f64;

    let v_lambda = transformed(&vcv, lambda);
    let v_inv = linalg::inverse(&v_lambda, "pagel: lambda-transformed covariance")?;
    let inv_sum = v_inv.sum();
    if inv_sum == 0.0 || !inv_sum.is_finite() {
        return Err(SignalError::Degenerate(format!(
            "pagel: entries of the inverse covariance sum to {}",
            inv_sum
        )));
    }

    let x = nalgebra::DVector::from_column_slice(x);
    let a = linalg::gls_mean(&v_inv, inv_sum, &x);
    let xa = x.add_scalar(-a);
    let s = linalg::quadratic_form(&v_inv, &xa) / n;
    if s <= 0.0 || !s.is_finite() {
        return Err(SignalError::Degenerate(format!(
            "pagel: residual variance is not positive ({}) at lambda {}",
            s, lambda
        )));
    }

    let log_det = linalg::log_det(&(&v_lambda * s));
    if log_det.sign <= 0.0 {
        return Err(SignalError::Degenerate(format!(
            "pagel: determinant of the scaled covariance is not positive at lambda {}",
            lambda
        )));
    }

    let scaled_inv = v_inv / s;
    let ll = -linalg::quadratic_form(&scaled_inv, &xa) / 2.0 - n * (2.0 * PI).ln() / 2.0
        - log_det.value / 2.0;
    Ok(ll)
}
