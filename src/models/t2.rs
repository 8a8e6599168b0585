//! T2 mono-exponential decay: `Si · e^{-TE/T2}`.

use crate::error::AppError;
use crate::models::check_curve;

pub fn signal(te: f64, t2: f64, si: f64) -> f64 {
    si * (-te / t2).exp()
}

/// Initial values for the T2 fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct T2Seed {
    pub t2: f64,
    pub si: f64,
}

/// Seed `(T2, Si)` from a mean curve (one point per distinct TE).
///
/// `Si` is the curve maximum. T2 comes from the two-point decay between the
/// maximum and the sample closest to half of it:
/// `T2 = (TE_half - TE_max) / ln(S_max / S_half)`.
pub fn initial_guess(te: &[f64], signal_curve: &[f64]) -> Result<T2Seed, AppError> {
    let (_, hi) = check_curve(te, signal_curve, "T2")?;
    let si = signal_curve[hi];
    let te_max = te[hi];

    let half = si / 2.0;
    let distances: Vec<f64> = signal_curve.iter().map(|s| (s - half).abs()).collect();
    let Some(target) = crate::models::argmin(&distances) else {
        return Err(AppError::degenerate("T2 initialization found no half-amplitude sample."));
    };

    let t2 = (te[target] - te_max) / (si / signal_curve[target]).ln();
    if !(t2.is_finite() && t2 > 0.0) {
        return Err(AppError::degenerate(format!(
            "T2 initialization produced an unusable seed ({t2}) from TE={} and TE={}.",
            te_max, te[target]
        )));
    }

    Ok(T2Seed { t2, si })
}
