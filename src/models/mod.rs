//! Relaxation signal models and their initial-guess heuristics.
//!
//! Models are small, pure functions so the fit strategies can stay generic:
//! each strategy builds a residual closure from a model's `signal` function and
//! seeds the solver from the model's `initial_guess`.

pub mod t1;
pub mod t2;

use crate::error::AppError;

/// Index of the first maximum (NaN entries never win).
pub(crate) fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some(b) if !(v > values[b]) => {}
            _ if v.is_nan() => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Index of the first minimum (NaN entries never win).
pub(crate) fn argmin(values: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some(b) if !(v < values[b]) => {}
            _ if v.is_nan() => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Shared input checks for the initializers.
///
/// Returns `(argmin, argmax)` of `signal`.
pub(crate) fn check_curve(x: &[f64], signal: &[f64], what: &str) -> Result<(usize, usize), AppError> {
    if x.is_empty() || x.len() != signal.len() {
        return Err(AppError::degenerate(format!(
            "{what} initialization needs matching, non-empty curves (got {} x-values, {} signals).",
            x.len(),
            signal.len()
        )));
    }
    if x.iter().chain(signal).any(|v| !v.is_finite()) {
        return Err(AppError::degenerate(format!("{what} initialization received non-finite values.")));
    }
    let (Some(lo), Some(hi)) = (argmin(signal), argmax(signal)) else {
        return Err(AppError::degenerate(format!("{what} initialization found no extrema.")));
    };
    if !(signal[hi] > signal[lo]) {
        return Err(AppError::degenerate(format!(
            "{what} initialization needs signal variation; curve is flat at {}.",
            signal[hi]
        )));
    }
    Ok((lo, hi))
}
