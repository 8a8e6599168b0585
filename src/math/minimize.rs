//! Bounded scalar minimization.
//!
//! Relaxation constants are positive and span orders of magnitude, so the
//! search runs over `ln(x)` rather than `x`.

use crate::error::AppError;

/// `1/φ`, the golden-section shrink factor.
const INV_PHI: f64 = 0.618_033_988_749_894_8;

/// Minimize `f` over `x ∈ [lower, upper]` by golden-section search in log space.
///
/// `tol` is the width of the final bracket in `ln(x)` units. The returned point
/// is the bracket midpoint. If `f` is not unimodal on the bracket, a local
/// minimum is returned.
pub fn minimize_log_bracket<F>(f: F, lower: f64, upper: f64, tol: f64, max_iter: usize) -> Result<f64, AppError>
where
    F: Fn(f64) -> f64,
{
    if !(lower.is_finite() && upper.is_finite() && lower > 0.0 && upper > lower) {
        return Err(AppError::numerical(format!(
            "Invalid minimization bracket: [{lower}, {upper}] (must be finite, >0, and upper>lower)."
        )));
    }

    let mut a = lower.ln();
    let mut b = upper.ln();
    let mut c = b - INV_PHI * (b - a);
    let mut d = a + INV_PHI * (b - a);
    let mut fc = f(c.exp());
    let mut fd = f(d.exp());

    for _ in 0..max_iter {
        if (b - a).abs() <= tol {
            break;
        }
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INV_PHI * (b - a);
            fc = f(c.exp());
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INV_PHI * (b - a);
            fd = f(d.exp());
        }
    }

    Ok(((a + b) / 2.0).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_minimum_of_log_parabola() {
        let x = minimize_log_bracket(|x| (x.ln() - 5.0_f64.ln()).powi(2), 0.01, 1000.0, 1e-12, 200).unwrap();
        assert!((x - 5.0).abs() < 1e-8, "got {x}");
    }

    #[test]
    fn finds_root_of_squared_recovery_term() {
        // (1 - 1.9 e^{-400/T})² vanishes at T = 400 / ln(1.9).
        let f = |t: f64| (1.0 - 1.9 * (-400.0 / t).exp()).powi(2);
        let x = minimize_log_bracket(f, 5.0, 50_000.0, 1e-12, 200).unwrap();
        let expected = 400.0 / 1.9_f64.ln();
        assert!((x - expected).abs() / expected < 1e-8, "got {x}, expected {expected}");
    }

    #[test]
    fn rejects_non_positive_bracket() {
        assert!(minimize_log_bracket(|x| x, 0.0, 1.0, 1e-9, 10).is_err());
        assert!(minimize_log_bracket(|x| x, 2.0, 1.0, 1e-9, 10).is_err());
    }
}
