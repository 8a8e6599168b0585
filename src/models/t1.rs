//! T1 inversion-recovery model.
//!
//! Magnitude signal at inversion time `TI`:
//!
//! - without TR correction: `|Si · (1 - (1+δ)·e^{-TI/T1})|`
//! - with TR correction:    `|Si · (1 - (1+δ)·e^{-TI/T1} + e^{-TR/T1})|`
//!
//! `δ` is the inversion efficiency (1 = perfect inversion).
//!
//! Seeding matters: the magnitude model has a kink at the null point and the
//! least-squares surface has a spurious basin on either side of it. We seed T1
//! from the null point of the measured curve, which puts the solver in the
//! right basin.

use crate::error::AppError;
use crate::math::minimize_log_bracket;
use crate::models::check_curve;

/// Inversion efficiency assumed while seeding.
pub const DELTA_INIT: f64 = 0.90;

/// A curve whose minimum exceeds this fraction of its maximum never crosses
/// its null point within the sampled TIs.
const FLAT_RECOVERY_RATIO: f64 = 0.8;

/// The seed refinement searches `[seed / k, seed · k]`.
const REFINE_BRACKET: f64 = 10.0;
const REFINE_TOL: f64 = 1e-10;
const REFINE_MAX_ITER: usize = 200;

/// Signed recovery term (no `Si`, no magnitude).
pub fn recovery(ti: f64, t1: f64, delta: f64, tr: Option<f64>) -> f64 {
    let base = 1.0 - (1.0 + delta) * (-ti / t1).exp();
    match tr {
        Some(tr) => base + (-tr / t1).exp(),
        None => base,
    }
}

/// Magnitude signal.
pub fn signal(ti: f64, t1: f64, si: f64, delta: f64, tr: Option<f64>) -> f64 {
    (si * recovery(ti, t1, delta, tr)).abs()
}

/// Initial values for the T1 fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct T1Seed {
    pub t1: f64,
    pub si: f64,
    pub delta: f64,
}

/// Seed `(T1, Si, δ)` from a mean curve (one point per distinct TI).
pub fn initial_guess(ti: &[f64], signal_curve: &[f64], tr: Option<f64>) -> Result<T1Seed, AppError> {
    let (lo, hi) = check_curve(ti, signal_curve, "T1")?;
    let t1 = guess_t1(ti, signal_curve, lo, hi, tr)?;

    // Back-solve Si so the seed model passes through the longest-TI sample.
    let Some(last) = crate::models::argmax(ti) else {
        return Err(AppError::degenerate("T1 initialization found no inversion times."));
    };
    let unit = signal(ti[last], t1, 1.0, DELTA_INIT, tr);
    let si = signal_curve[last] / unit;
    if !(si.is_finite() && si > 0.0) {
        return Err(AppError::degenerate(format!(
            "T1 initialization produced an unusable Si seed ({si}) at TI={}.",
            ti[last]
        )));
    }

    Ok(T1Seed {
        t1,
        si,
        delta: DELTA_INIT,
    })
}

fn guess_t1(ti: &[f64], signal_curve: &[f64], lo: usize, hi: usize, tr: Option<f64>) -> Result<f64, AppError> {
    if signal_curve[lo] > signal_curve[hi] * FLAT_RECOVERY_RATIO {
        // No null crossing sampled; the shortest TI is the best scale we have.
        let ti_min = ti.iter().copied().fold(f64::INFINITY, f64::min);
        return positive_seed(ti_min / std::f64::consts::LN_2);
    }

    // The magnitude minimum sits near the null point, TI_null ≈ ln(2)·T1.
    let ti_null = ti[lo];
    let seed = positive_seed(ti_null / std::f64::consts::LN_2)?;

    let refined = minimize_log_bracket(
        |t1| recovery(ti_null, t1, DELTA_INIT, tr).powi(2),
        seed / REFINE_BRACKET,
        seed * REFINE_BRACKET,
        REFINE_TOL,
        REFINE_MAX_ITER,
    )?;
    positive_seed(refined)
}

fn positive_seed(t1: f64) -> Result<f64, AppError> {
    if t1.is_finite() && t1 > 0.0 {
        Ok(t1)
    } else {
        Err(AppError::degenerate(format!("T1 initialization produced an unusable seed ({t1}).")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TI: [f64; 6] = [50.0, 100.0, 400.0, 800.0, 1600.0, 3000.0];

    fn curve(t1: f64, si: f64, delta: f64, tr: Option<f64>) -> Vec<f64> {
        TI.iter().map(|&ti| signal(ti, t1, si, delta, tr)).collect()
    }

    #[test]
    fn signal_is_magnitude_of_recovery() {
        // At TI=0 with perfect inversion the signal is |Si·(1-2)| = Si.
        assert!((signal(0.0, 700.0, 1000.0, 1.0, None) - 1000.0).abs() < 1e-9);
        assert!(recovery(400.0, 700.0, 0.95, None) < 0.0);
        assert!(signal(400.0, 700.0, 1000.0, 0.95, None) > 0.0);
    }

    #[test]
    fn tr_correction_adds_recovery_term() {
        let a = recovery(100.0, 700.0, 0.9, None);
        let b = recovery(100.0, 700.0, 0.9, Some(2000.0));
        assert!((b - a - (-2000.0_f64 / 700.0).exp()).abs() < 1e-12);
    }

    #[test]
    fn seed_refines_to_null_point() {
        let data = curve(700.0, 1000.0, 0.95, None);
        let seed = initial_guess(&TI, &data, None).unwrap();
        // Minimum sample is TI=400; the refined seed nulls 1 - 1.9·e^{-400/T1}.
        let expected = 400.0 / 1.9_f64.ln();
        assert!((seed.t1 - expected).abs() / expected < 1e-6, "t1 seed {}", seed.t1);
        assert_eq!(seed.delta, DELTA_INIT);
        // Si passes the seed model through the longest-TI sample.
        let at_last = signal(3000.0, seed.t1, seed.si, seed.delta, None);
        assert!((at_last - data[5]).abs() < 1e-9);
    }

    #[test]
    fn flat_curve_seeds_from_shortest_ti() {
        let ti = [200.0, 400.0, 800.0];
        let data = [950.0, 980.0, 1000.0];
        let seed = initial_guess(&ti, &data, None).unwrap();
        assert!((seed.t1 - 200.0 / std::f64::consts::LN_2).abs() < 1e-9);
    }

    #[test]
    fn seed_uses_tr_variant_when_present() {
        let tr = Some(2500.0);
        let data = curve(700.0, 1000.0, 0.95, tr);
        let seed = initial_guess(&TI, &data, tr).unwrap();
        let lo = crate::models::argmin(&data).unwrap();
        assert!(recovery(TI[lo], seed.t1, DELTA_INIT, tr).abs() < 1e-6);
    }

    #[test]
    fn constant_curve_is_degenerate() {
        let err = initial_guess(&TI, &[10.0; 6], None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Degenerate);
    }
}
