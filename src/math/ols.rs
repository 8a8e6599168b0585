//! Linear least-squares solve via SVD.
//!
//! The Levenberg–Marquardt step solves the damped normal equations
//!
//! ```text
//! (JᵀJ + μ·D) δ = -Jᵀr
//! ```
//!
//! with a Cholesky factorization first. When the system is too ill-conditioned
//! for Cholesky (flat directions, e.g. `delta` pinned at a bound with a tiny
//! column in `J`), we fall back to SVD with progressively looser tolerances.

use nalgebra::{DMatrix, DVector};

/// Singular-value cutoffs tried in order.
const SVD_TOLERANCES: [f64; 3] = [1e-12, 1e-10, 1e-8];

/// Solve `a · x ≈ b` in the least-squares sense.
///
/// Returns `None` if no tolerance yields a finite solution.
pub fn solve_least_squares(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    if a.nrows() != b.len() || a.ncols() == 0 {
        return None;
    }
    let svd = a.clone().svd(true, true);

    for &tol in &SVD_TOLERANCES {
        if let Ok(x) = svd.solve(b, tol) {
            if x.iter().all(|v| v.is_finite()) {
                return Some(x);
            }
        }
    }

    None
}
