//! Dense linear algebra for the signal statistics.
//!
//! Thin helpers over [`nalgebra`]: conversion from the row-major
//! `&[Vec<f64>]` matrices used at the API boundary, conditioning-checked
//! inversion and log-determinants via LU decomposition, and the handful of
//! reductions (sums, quadratic forms, row correlations) the statistics share.
//!
//! Inversion never falls back to a pseudo-inverse: a matrix without an
//! inverse is reported as [`SignalError::SingularMatrix`].

use nalgebra::{DMatrix, DVector};

use crate::{Result, SignalError};

// ── Conversion and shape checks ─────────────────────────────────────────────

/// Convert a row-major square matrix into a [`DMatrix`].
///
/// # Errors
///
/// Returns [`SignalError::InvalidInput`] for an empty matrix and
/// [`SignalError::DimensionMismatch`] if any row length differs from the
/// number of rows.
pub fn square_matrix(rows: &[Vec<f64>], what: &str) -> Result<DMatrix<f64>> {
    let n = rows.len();
    if n == 0 {
        return Err(SignalError::InvalidInput(format!(
            "{}: matrix must not be empty",
            what
        )));
    }
    for (i, row) in rows.iter().enumerate() {
        if row.len() != n {
            return Err(SignalError::DimensionMismatch(format!(
                "{}: matrix must be square, row {} has {} columns, expected {}",
                what,
                i,
                row.len(),
                n
            )));
        }
    }
    Ok(DMatrix::from_fn(n, n, |i, j| rows[i][j]))
}

/// Convert a row-major `n × p` matrix (rows of equal length) into a [`DMatrix`].
pub fn row_matrix(rows: &[Vec<f64>], what: &str) -> Result<DMatrix<f64>> {
    let n = rows.len();
    if n == 0 {
        return Err(SignalError::InvalidInput(format!(
            "{}: matrix must not be empty",
            what
        )));
    }
    let p = rows[0].len();
    for (i, row) in rows.iter().enumerate() {
        if row.len() != p {
            return Err(SignalError::DimensionMismatch(format!(
                "{}: row {} has {} columns, expected {}",
                what,
                i,
                row.len(),
                p
            )));
        }
    }
    Ok(DMatrix::from_fn(n, p, |i, j| rows[i][j]))
}

/// Convert a [`DMatrix`] back to row-major nested vectors.
pub fn to_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    (0..m.nrows())
        .map(|i| m.row(i).iter().copied().collect())
        .collect()
}

/// Check that a vector has the length a matrix was built for.
pub fn ensure_len(x: &[f64], n: usize, what: &str) -> Result<()> {
    if x.len() != n {
        return Err(SignalError::DimensionMismatch(format!(
            "{}: trait vector length ({}) != matrix size ({})",
            what,
            x.len(),
            n
        )));
    }
    Ok(())
}

// ── Reductions ──────────────────────────────────────────────────────────────

/// Arithmetic mean. Returns 0.0 for an empty slice.
pub fn mean(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    x.iter().sum::<f64>() / x.len() as f64
}

/// Whether every value equals the first one (zero variance).
///
/// Checked by value rather than by a centered sum of squares, which can
/// come out as a tiny positive number for constant input after rounding.
pub fn is_constant(x: &[f64]) -> bool {
    match x.first() {
        Some(&first) => x.iter().all(|&v| v == first),
        None => true,
    }
}

/// `x − center` as a column vector.
pub fn centered(x: &[f64], center: f64) -> DVector<f64> {
    DVector::from_iterator(x.len(), x.iter().map(|&v| v - center))
}

/// The quadratic form `vᵀ·M·v`.
pub fn quadratic_form(m: &DMatrix<f64>, v: &DVector<f64>) -> f64 {
    v.dot(&(m * v))
}

/// Generalized least squares mean `Σ(M⁻¹·x) / ΣM⁻¹`, given the inverse and
/// the sum of its entries.
pub fn gls_mean(inverse: &DMatrix<f64>, inverse_sum: f64, x: &DVector<f64>) -> f64 {
    (inverse * x).sum() / inverse_sum
}

// ── Decompositions ──────────────────────────────────────────────────────────

/// Smallest reciprocal condition number accepted by [`inverse`].
pub const MIN_RCOND: f64 = 1e-12;

/// Invert a square matrix via LU decomposition with partial pivoting.
///
/// A matrix whose smallest-to-largest singular value ratio is at most
/// `max(n·ε, MIN_RCOND)` is rejected even when LU finds no zero pivot.
///
/// # Errors
///
/// Returns [`SignalError::SingularMatrix`] if the matrix has non-finite
/// entries, is numerically rank deficient, has a zero pivot, or yields an
/// inverse with non-finite entries.
pub fn inverse(m: &DMatrix<f64>, what: &str) -> Result<DMatrix<f64>> {
    if m.iter().any(|v| !v.is_finite()) {
        return Err(SignalError::SingularMatrix(format!(
            "{}: matrix has non-finite entries",
            what
        )));
    }
    let rcond = reciprocal_condition(m).ok_or_else(|| {
        SignalError::SingularMatrix(format!("{}: singular value decomposition failed", what))
    })?;
    let tol = (m.nrows() as f64 * f64::EPSILON).max(MIN_RCOND);
    if rcond <= tol {
        return Err(SignalError::SingularMatrix(format!(
            "{}: matrix is numerically singular (rcond {:e})",
            what, rcond
        )));
    }

    let inv = m.clone().lu().try_inverse().ok_or_else(|| {
        SignalError::SingularMatrix(format!("{}: matrix is not invertible", what))
    })?;
    if inv.iter().any(|v| !v.is_finite()) {
        return Err(SignalError::SingularMatrix(format!(
            "{}: inverse has non-finite entries",
            what
        )));
    }
    Ok(inv)
}

/// `σ_min / σ_max`, or `None` if the SVD does not converge.
fn reciprocal_condition(m: &DMatrix<f64>) -> Option<f64> {
    let svd = m.clone().try_svd(false, false, f64::EPSILON, 10_000)?;
    let sv = &svd.singular_values;
    let max = sv.max();
    if max == 0.0 {
        return Some(0.0);
    }
    Some(sv.min() / max)
}

/// Log-determinant magnitude and sign.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogDet {
    /// `ln |det M|`; negative infinity for a singular matrix.
    pub value: f64,
    /// Sign of the determinant: `1.0`, `-1.0`, or `0.0` when singular.
    pub sign: f64,
}

/// Compute `ln |det M|` and the sign of `det M` from an LU decomposition.
///
/// Working in log space keeps large covariance matrices from overflowing
/// the determinant.
pub fn log_det(m: &DMatrix<f64>) -> LogDet {
    let lu = m.clone().lu();
    let mut sign: f64 = lu.p().determinant();
    let mut value = 0.0;
    for &d in lu.u().diagonal().iter() {
        if d == 0.0 {
            return LogDet {
                value: f64::NEG_INFINITY,
                sign: 0.0,
            };
        }
        if d < 0.0 {
            sign = -sign;
        }
        value += d.abs().ln();
    }
    LogDet { value, sign }
}

/// Pearson correlation between every pair of rows of `m` (each row is one
/// unit's profile across the columns).
///
/// # Errors
///
/// Returns [`SignalError::InvalidInput`] with fewer than two columns and
/// [`SignalError::Degenerate`] if a row has zero variance, since its
/// correlation with anything is undefined.
pub fn row_correlations(m: &DMatrix<f64>, what: &str) -> Result<DMatrix<f64>> {
    let (n, p) = m.shape();
    if p < 2 {
        return Err(SignalError::InvalidInput(format!(
            "{}: need at least 2 variables to correlate units, got {}",
            what, p
        )));
    }

    let mut centered_rows = Vec::with_capacity(n);
    for i in 0..n {
        let row: Vec<f64> = m.row(i).iter().copied().collect();
        if is_constant(&row) {
            return Err(SignalError::Degenerate(format!(
                "{}: unit {} has zero variance across variables",
                what, i
            )));
        }
        let c = centered(&row, mean(&row));
        let norm = c.norm();
        centered_rows.push((c, norm));
    }

    let mut corr = DMatrix::identity(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let (ci, ni) = &centered_rows[i];
            let (cj, nj) = &centered_rows[j];
            let r = ci.dot(cj) / (ni * nj);
            corr[(i, j)] = r;
            corr[(j, i)] = r;
        }
    }
    Ok(corr)
}

// ── Tests ──────────────────────────────────────────────────────────────────
