//! Thin SVD of a voxel matrix
//!
//! Wraps `nalgebra::SVD` with the guarantees the reduction relies on:
//! - singular values are non-negative and non-increasing, ties broken by the
//!   order nalgebra returned them in, so the result is deterministic
//! - each (u_r, v_r) pair is oriented so that the entries of u_r sum to a
//!   positive value; when the sum is within [`SIGN_TOLERANCE`] of zero, the
//!   entry of u_r with the largest magnitude is made positive instead
//! - any non-finite value in or out is reported as a failure

use nalgebra::{DMatrix, DVector, SVD};
use thiserror::Error;

/// Iteration cap for the implicit QR sweeps.
pub const MAX_SVD_ITERATIONS: usize = 1000;

/// Loading sums this close to zero do not decide a component's sign.
pub const SIGN_TOLERANCE: f64 = 1e-8;

/// Why a voxel could not be decomposed. Counted, never fatal.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SvdFailure {
    #[error("matrix contains non-finite values")]
    NonFiniteInput,
    #[error("SVD did not converge")]
    NoConvergence,
    #[error("SVD produced non-finite values")]
    NonFiniteOutput,
}

/// `matrix = u * diag(singular_values) * v_t` with m = min(K, T).
#[derive(Clone, Debug)]
pub struct SvdResult {
    /// Length m, descending
    pub singular_values: DVector<f64>,
    /// K x m
    pub u: DMatrix<f64>,
    /// m x T
    pub v_t: DMatrix<f64>,
}

impl SvdResult {
    /// Number of singular triplets, min(K, T).
    pub fn rank(&self) -> usize {
        self.singular_values.len()
    }

    /// `sigma_r * v_r`, the time course of component `r` (0-based).
    pub fn scaled_component(&self, r: usize) -> impl Iterator<Item = f64> + '_ {
        let sigma = self.singular_values[r];
        (0..self.v_t.ncols()).map(move |t| sigma * self.v_t[(r, t)])
    }

    /// Rebuild the matrix from the first `r` components.
    pub fn reconstruct(&self, r: usize) -> DMatrix<f64> {
        let r = r.min(self.rank());
        let u = self.u.columns(0, r);
        let s = DMatrix::from_diagonal(&self.singular_values.rows(0, r).into_owned());
        let v_t = self.v_t.rows(0, r);
        u * s * v_t
    }
}

/// Decompose a K x T matrix.
pub fn decompose(matrix: DMatrix<f64>) -> Result<SvdResult, SvdFailure> {
    if matrix.iter().any(|x| !x.is_finite()) {
        return Err(SvdFailure::NonFiniteInput);
    }

    let (k, t) = matrix.shape();
    let m = k.min(t);

    // nothing to iterate on; report zero singular values
    if matrix.iter().all(|&x| x == 0.0) {
        return Ok(SvdResult {
            singular_values: DVector::zeros(m),
            u: DMatrix::identity(k, m),
            v_t: DMatrix::identity(m, t),
        });
    }

    let svd = SVD::try_new(matrix, true, true, f64::EPSILON, MAX_SVD_ITERATIONS)
        .ok_or(SvdFailure::NoConvergence)?;
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(SvdFailure::NoConvergence),
    };
    let sigma = svd.singular_values;

    // stable sort keeps the returned order among equal values
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| sigma[b].total_cmp(&sigma[a]));

    let mut out = SvdResult {
        singular_values: DVector::zeros(m),
        u: DMatrix::zeros(k, m),
        v_t: DMatrix::zeros(m, t),
    };
    for (r, &j) in order.iter().enumerate() {
        let sign = orientation(&u, j);
        out.singular_values[r] = sigma[j].abs();
        out.u.set_column(r, &(u.column(j) * sign));
        out.v_t.set_row(r, &(v_t.row(j) * sign));
    }

    let finite = out.singular_values.iter().all(|x| x.is_finite())
        && out.u.iter().all(|x| x.is_finite())
        && out.v_t.iter().all(|x| x.is_finite());
    if !finite {
        return Err(SvdFailure::NonFiniteOutput);
    }

    Ok(out)
}

/// +1 or -1, whichever makes column `j` of `u` point along the inputs.
fn orientation(u: &DMatrix<f64>, j: usize) -> f64 {
    let column = u.column(j);
    let sum = column.sum();
    if sum.abs() > SIGN_TOLERANCE {
        return sum.signum();
    }
    // balanced loadings: largest magnitude decides, first one on ties
    let largest = column
        .iter()
        .fold(0.0f64, |best, &x| if x.abs() > best.abs() { x } else { best });
    if largest < 0.0 {
        -1.0
    } else {
        1.0
    }
}
