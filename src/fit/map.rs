//! Map passthrough: scanner-reconstructed parameter maps are averaged, not fit.
//!
//! Zero and NaN readings carry no weight. Records are kept (with their signal
//! replaced by NaN) so the output covers every voxel of the input.

use crate::domain::{GroupEstimate, Measurement, ParamName};

pub fn is_valid_map_signal(v: f64) -> bool {
    !v.is_nan() && v != 0.0
}

/// Mean of the valid readings; NaN when there are none.
pub fn map_mean<'a>(records: impl IntoIterator<Item = &'a Measurement>) -> f64 {
    let (sum, count) = records
        .into_iter()
        .map(|r| r.data)
        .filter(|&v| is_valid_map_signal(v))
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

pub fn map_estimate(records: &[&Measurement], name: ParamName) -> GroupEstimate {
    GroupEstimate::Map {
        name,
        value: map_mean(records.iter().copied()),
    }
}

/// Copy of `records` with invalid readings replaced by NaN.
pub fn mask_invalid(records: &[Measurement]) -> Vec<Measurement> {
    records
        .iter()
        .map(|r| {
            let mut r = r.clone();
            if !is_valid_map_signal(r.data) {
                r.data = f64::NAN;
            }
            r
        })
        .collect()
}
