//! Grouping and filtering of measurement tables.
//!
//! Everything here is a pure transformation: each function takes a record
//! slice and returns a new collection, leaving the input untouched.
//!
//! Filters applied to one slice, in order:
//!
//! 1. slice gating against the dataset maximum (`passes_slice_gate`)
//! 2. removal of voxels containing an exact-zero reading (`remove_groups_with_zeros`)
//! 3. threshold masking against the slice maximum (`limit_to_threshold`)

use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::warn;

use crate::domain::{Datatype, FitBy, GroupKey, Measurement};
use crate::error::AppError;

/// A slice is fit only if its maximum exceeds `min(SLICE_GATE_FLOOR, threshold)`
/// times the dataset maximum.
pub const SLICE_GATE_FLOOR: f64 = 0.1;

/// Records sharing one group key.
#[derive(Debug, Clone)]
pub struct FitGroup<'a> {
    pub key: GroupKey,
    pub records: Vec<&'a Measurement>,
}

/// Partition records into fit groups, ordered by key.
pub fn partition(records: &[Measurement], fit_by: FitBy) -> Vec<FitGroup<'_>> {
    let mut groups: BTreeMap<GroupKey, Vec<&Measurement>> = BTreeMap::new();
    for record in records {
        let key = match fit_by {
            FitBy::Voxel => record.voxel_key(),
            FitBy::All => GroupKey::All,
        };
        groups.entry(key).or_default().push(record);
    }
    groups
        .into_iter()
        .map(|(key, records)| FitGroup { key, records })
        .collect()
}

/// Largest non-NaN signal, if any.
pub fn max_signal(records: &[Measurement]) -> Option<f64> {
    records
        .iter()
        .map(|r| r.data)
        .filter(|v| !v.is_nan())
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
}

/// Drop every voxel that has at least one reading exactly equal to zero.
pub fn remove_groups_with_zeros(records: &[Measurement]) -> Vec<Measurement> {
    let zero_voxels: HashSet<GroupKey> = records
        .iter()
        .filter(|r| r.data == 0.0)
        .map(Measurement::voxel_key)
        .collect();

    if !zero_voxels.is_empty() {
        warn!("Number of zero row groups removed: {}", zero_voxels.len());
    }

    records
        .iter()
        .filter(|r| !zero_voxels.contains(&r.voxel_key()))
        .cloned()
        .collect()
}

/// Keep only voxels with at least one reading above `threshold · slice_max`.
pub fn limit_to_threshold(records: &[Measurement], slice_max: f64, threshold: f64) -> Vec<Measurement> {
    let cutoff = slice_max * threshold;
    let keep: HashSet<GroupKey> = records
        .iter()
        .filter(|r| r.data > cutoff)
        .map(Measurement::voxel_key)
        .collect();

    records
        .iter()
        .filter(|r| keep.contains(&r.voxel_key()))
        .cloned()
        .collect()
}

/// Whether a slice carries enough signal, relative to the whole dataset, to fit.
pub fn passes_slice_gate(slice_max: f64, global_max: f64, threshold: f64) -> bool {
    slice_max > SLICE_GATE_FLOOR.min(threshold) * global_max
}

/// Restrict records to an allow-list of acquisition values (TI for T1, TE for T2).
///
/// Fails with a completeness error if any requested value is absent after
/// filtering.
pub fn limit_to_values(records: &[Measurement], datatype: Datatype, values: &[f64]) -> Result<Vec<Measurement>, AppError> {
    let Some(column) = datatype.acquisition_name() else {
        return Err(AppError::config(format!("Cannot limit data for datatype {datatype}")));
    };
    if distinct_values(values.iter().copied()).len() != values.len() {
        return Err(AppError::config(format!(
            "Datatype values contain duplicates: {}",
            join_values(values)
        )));
    }

    let available = distinct_values(records.iter().filter_map(|r| r.acquisition_value(datatype)));

    let kept: Vec<Measurement> = records
        .iter()
        .filter(|r| r.acquisition_value(datatype).is_some_and(|v| values.contains(&v)))
        .cloned()
        .collect();

    let found = distinct_values(kept.iter().filter_map(|r| r.acquisition_value(datatype)));
    let missing: Vec<f64> = values.iter().copied().filter(|v| !found.contains(v)).collect();

    if !missing.is_empty() {
        return Err(AppError::completeness(format!(
            "Values are missing for datatype {datatype} ({column}).\n\tExpected to find: {}\n\tActually found: {}\n\tMissing: {}\n\tout of possible values: {}",
            join_values(values),
            join_values(&found),
            join_values(&missing),
            join_values(&available),
        )));
    }

    Ok(kept)
}

/// Sorted, de-duplicated values.
pub(crate) fn distinct_values(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.collect();
    out.sort_by(f64::total_cmp);
    out.dedup();
    out
}

/// Slice indices present, ascending.
pub fn slice_indices(records: &[Measurement]) -> BTreeSet<u32> {
    records.iter().map(|r| r.slc).collect()
}

fn join_values(values: &[f64]) -> String {
    values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn voxel(x: u32, y: u32, data: &[f64]) -> Vec<Measurement> {
        let ti = [100.0, 200.0, 400.0];
        data.iter()
            .zip(ti)
            .map(|(&d, t)| Measurement::new(x, y, 0, d).with_ti(t))
            .collect()
    }

    fn table() -> Vec<Measurement> {
        let mut out = Vec::new();
        out.extend(voxel(0, 0, &[500.0, 300.0, 1000.0]));
        out.extend(voxel(0, 1, &[400.0, 0.0, 900.0]));
        out.extend(voxel(1, 0, &[50.0, 20.0, 150.0]));
        out.extend(voxel(1, 1, &[10.0, 5.0, 30.0]));
        out
    }

    fn voxels(records: &[Measurement]) -> BTreeSet<GroupKey> {
        records.iter().map(Measurement::voxel_key).collect()
    }

    #[test]
    fn partition_groups_by_voxel_in_key_order() {
        let records = table();
        let groups = partition(&records, FitBy::Voxel);
        assert_eq!(groups.len(), 4);
        assert!(groups.windows(2).all(|w| w[0].key < w[1].key));
        assert!(groups.iter().all(|g| g.records.len() == 3));

        let all = partition(&records, FitBy::All);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].key, GroupKey::All);
        assert_eq!(all[0].records.len(), 12);
    }

    #[test]
    fn zero_removal_drops_whole_voxel_and_is_a_subset() {
        let records = table();
        let kept = remove_groups_with_zeros(&records);
        assert!(kept.iter().all(|r| r.data != 0.0));
        assert!(voxels(&kept).is_subset(&voxels(&records)));
        assert!(!voxels(&kept).contains(&GroupKey::Voxel { slc: 0, x: 0, y: 1 }));
        assert_eq!(kept.len(), 9);
    }

    #[test]
    fn threshold_keeps_voxels_with_any_reading_above_cutoff() {
        let records = table();
        let kept = limit_to_threshold(&records, 1000.0, 0.2);
        // Cutoff 200: voxel (1,0) peaks at 150 and (1,1) at 30.
        assert_eq!(voxels(&kept).len(), 2);
        // Every reading of a kept voxel survives, including low ones.
        assert!(kept.iter().any(|r| r.data == 300.0));
    }

    #[test]
    fn threshold_is_idempotent() {
        let records = table();
        let once = limit_to_threshold(&records, 1000.0, 0.1);
        let twice = limit_to_threshold(&once, 1000.0, 0.1);
        assert_eq!(once, twice);
    }

    #[test]
    fn slice_gate_uses_floor_of_point_one() {
        assert!(passes_slice_gate(150.0, 1000.0, 0.2));
        assert!(!passes_slice_gate(90.0, 1000.0, 0.2));
        // A smaller threshold lowers the gate.
        assert!(passes_slice_gate(60.0, 1000.0, 0.05));
        assert!(!passes_slice_gate(100.0, 1000.0, 0.5));
    }

    #[test]
    fn max_signal_ignores_nan() {
        let records = vec![
            Measurement::new(0, 0, 0, f64::NAN),
            Measurement::new(0, 1, 0, 3.0),
            Measurement::new(0, 2, 0, 7.0),
        ];
        assert_eq!(max_signal(&records), Some(7.0));
        assert_eq!(max_signal(&[]), None);
    }

    #[test]
    fn value_subset_keeps_requested_values() {
        let records = table();
        let kept = limit_to_values(&records, Datatype::T1, &[100.0, 400.0]).unwrap();
        assert_eq!(kept.len(), 8);
        assert!(kept.iter().all(|r| r.ti != Some(200.0)));
    }

    #[test]
    fn value_subset_reports_missing_values() {
        let records = table();
        let err = limit_to_values(&records, Datatype::T1, &[100.0, 9999.0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Completeness);
        assert!(err.to_string().contains("Missing: 9999"), "{err}");
        assert!(err.to_string().contains("100 200 400"), "{err}");
    }

    #[test]
    fn value_subset_rejects_duplicate_values() {
        let err = limit_to_values(&table(), Datatype::T1, &[100.0, 100.0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn value_subset_rejects_map_datatypes() {
        let err = limit_to_values(&table(), Datatype::T2Map, &[10.0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
