//! Per-voxel fit validity.

use crate::domain::{GroupEstimate, ParamName};

/// A fit is valid when the standard error is strictly below the fitted value.
///
/// NaN in either argument yields `false`.
pub fn is_valid_fit(value: f64, stderr: f64) -> bool {
    stderr < value
}

/// Validity of `primary` within an estimate; `None` for map passthrough.
pub fn classify(estimate: &GroupEstimate, primary: ParamName) -> Option<bool> {
    match estimate {
        GroupEstimate::Fitted(set) => Some(
            set.get(primary)
                .is_some_and(|p| is_valid_fit(p.value, p.stderr)),
        ),
        GroupEstimate::Map { .. } => None,
    }
}
