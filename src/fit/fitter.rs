//! Fit orchestration for one filtered measurement table.
//!
//! Given the records of one slice (already gated and masked) we:
//! - drop NaN readings (fit datatypes) or mask invalid ones (maps)
//! - partition into groups by `FitBy`
//! - fit every group in parallel into a buffer indexed by group
//! - join each group's estimate and validity back onto its records
//!
//! Degenerate and numerical failures stay local to their group and are
//! reported in `FitOutcome::failures`.

use std::sync::atomic::{AtomicUsize, Ordering};

use log::{info, warn};
use rayon::prelude::*;

use crate::domain::{FitConfig, GroupEstimate, GroupFailure, Measurement, VoxelResult};
use crate::error::AppError;
use crate::fit::grouping::partition;
use crate::fit::map::mask_invalid;
use crate::fit::strategy::FitStrategy;
use crate::fit::validity::classify;
use crate::math::LmOptions;

/// Progress is logged only when a call has at least this many groups.
const PROGRESS_MIN_GROUPS: usize = 10;

/// Per-record results plus the groups that could not be fit.
#[derive(Debug, Clone, Default)]
pub struct FitOutcome {
    pub results: Vec<VoxelResult>,
    pub failures: Vec<GroupFailure>,
    pub n_groups: usize,
}

impl FitOutcome {
    pub fn n_fitted_groups(&self) -> usize {
        self.n_groups - self.failures.len()
    }
}

/// Fit every group of `records` with the strategy selected by `config`.
pub fn fit_groups(records: &[Measurement], config: &FitConfig) -> Result<FitOutcome, AppError> {
    fit_groups_with(records, config, &LmOptions::default())
}

/// `fit_groups` with explicit solver settings.
///
/// Groups that stop at the iteration limit keep their last iterate and are
/// reported like any other fit; validity still comes from the stderr check.
pub fn fit_groups_with(records: &[Measurement], config: &FitConfig, opts: &LmOptions) -> Result<FitOutcome, AppError> {
    let strategy = FitStrategy::for_datatype(config.datatype);
    let primary = config.datatype.primary_param();

    let prepared: Vec<Measurement> = if config.datatype.is_map() {
        mask_invalid(records)
    } else {
        records.iter().filter(|r| !r.data.is_nan()).cloned().collect()
    };

    let groups = partition(&prepared, config.fit_by);
    let n_groups = groups.len();
    let progress = Progress::new(n_groups);

    let estimates: Vec<Result<GroupEstimate, AppError>> = groups
        .par_iter()
        .map(|group| {
            let estimate = strategy.fit_group_with(&group.records, opts);
            progress.tick();
            estimate
        })
        .collect();

    let mut outcome = FitOutcome {
        n_groups,
        ..FitOutcome::default()
    };

    for (idx, (group, estimate)) in groups.iter().zip(estimates).enumerate() {
        let estimate = match estimate {
            Ok(e) => e,
            Err(e) if e.is_group_local() => {
                warn!("Fit failed for group {}: {}", group.key, e.message());
                outcome.failures.push(GroupFailure {
                    key: group.key,
                    message: e.message().to_string(),
                });
                continue;
            }
            Err(e) => return Err(e),
        };

        let valid = classify(&estimate, primary);
        outcome.results.extend(group.records.iter().map(|&record| VoxelResult {
            record: record.clone(),
            group: idx + 1,
            key: group.key,
            estimate: estimate.clone(),
            valid,
        }));
    }

    Ok(outcome)
}

/// Advisory completion counter shared by worker threads.
struct Progress {
    done: AtomicUsize,
    total: usize,
}

impl Progress {
    fn new(total: usize) -> Self {
        Self {
            done: AtomicUsize::new(0),
            total,
        }
    }

    fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if self.total < PROGRESS_MIN_GROUPS {
            return;
        }
        let step = self.total / 10;
        if done % step == 0 {
            info!("{}% complete ({done}/{} groups)", done * 100 / self.total, self.total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Datatype, FitBy, GroupKey, ParamName};
    use crate::models::t2;

    fn t2_voxel(x: u32, y: u32, t2_true: f64, si: f64) -> Vec<Measurement> {
        [10.0, 30.0, 60.0, 100.0]
            .iter()
            .map(|&te| Measurement::new(x, y, 0, t2::signal(te, t2_true, si)).with_te(te))
            .collect()
    }

    #[test]
    fn every_record_carries_its_group_estimate() {
        let mut records = t2_voxel(0, 0, 50.0, 100.0);
        records.extend(t2_voxel(0, 1, 80.0, 200.0));
        let outcome = fit_groups(&records, &FitConfig::new(Datatype::T2)).unwrap();

        assert_eq!(outcome.n_groups, 2);
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.results.len(), 8);

        for r in &outcome.results {
            let expected = if r.record.y == 0 { 50.0 } else { 80.0 };
            let t2v = r.estimate.value(ParamName::T2).unwrap();
            assert!((t2v - expected).abs() / expected < 0.01, "T2 {t2v}");
            assert_eq!(r.valid, Some(true));
            assert_eq!(r.key, r.record.voxel_key());
        }
        assert!(outcome.results.iter().all(|r| r.group == 1 || r.group == 2));
    }

    #[test]
    fn degenerate_group_is_reported_and_others_survive() {
        let mut records = t2_voxel(0, 0, 50.0, 100.0);
        records.extend([10.0, 30.0, 60.0, 100.0].iter().map(|&te| Measurement::new(3, 3, 0, 42.0).with_te(te)));
        let outcome = fit_groups(&records, &FitConfig::new(Datatype::T2)).unwrap();

        assert_eq!(outcome.n_groups, 2);
        assert_eq!(outcome.n_fitted_groups(), 1);
        assert_eq!(outcome.failures[0].key, GroupKey::Voxel { slc: 0, x: 3, y: 3 });
        assert_eq!(outcome.results.len(), 4);
    }

    #[test]
    fn groups_stopped_at_the_iteration_limit_still_produce_rows() {
        // Start the solver one iteration away from a converged fit.
        let records: Vec<Measurement> = [10.0, 30.0, 60.0, 100.0]
            .iter()
            .zip([1.5, -1.0, 0.7, -0.4])
            .map(|(&te, n)| Measurement::new(2, 2, 0, t2::signal(te, 50.0, 100.0) + n).with_te(te))
            .collect();
        let opts = LmOptions {
            max_iter: 1,
            ..LmOptions::default()
        };
        let outcome = fit_groups_with(&records, &FitConfig::new(Datatype::T2), &opts).unwrap();

        assert_eq!(outcome.n_groups, 1);
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.results.len(), 4);
        for r in &outcome.results {
            let GroupEstimate::Fitted(set) = &r.estimate else {
                panic!("expected a fitted estimate");
            };
            assert!(!set.converged);
            assert!(r.estimate.value(ParamName::T2).unwrap().is_finite());
            assert!(r.valid.is_some());
        }
    }

    #[test]
    fn aggregate_fit_uses_one_group() {
        let mut records = t2_voxel(0, 0, 50.0, 100.0);
        records.extend(t2_voxel(1, 0, 50.0, 100.0));
        let config = FitConfig {
            fit_by: FitBy::All,
            ..FitConfig::new(Datatype::T2)
        };
        let outcome = fit_groups(&records, &config).unwrap();
        assert_eq!(outcome.n_groups, 1);
        assert!(outcome.results.iter().all(|r| r.key == GroupKey::All && r.group == 1));
    }

    #[test]
    fn map_keeps_voxels_without_valid_signal() {
        let records = vec![
            Measurement::new(0, 0, 0, 2.0),
            Measurement::new(0, 0, 0, 4.0),
            Measurement::new(0, 0, 0, f64::NAN),
            Measurement::new(0, 0, 0, 0.0),
            Measurement::new(5, 5, 0, 0.0),
        ];
        let outcome = fit_groups(&records, &FitConfig::new(Datatype::T1Map)).unwrap();
        assert_eq!(outcome.results.len(), 5);

        let first = outcome.results.iter().find(|r| r.record.x == 0).unwrap();
        assert_eq!(first.estimate.value(ParamName::T1), Some(3.0));
        assert_eq!(first.valid, None);

        let empty = outcome.results.iter().find(|r| r.record.x == 5).unwrap();
        assert!(empty.estimate.value(ParamName::T1).unwrap().is_nan());
    }

    #[test]
    fn results_do_not_depend_on_input_order() {
        let mut records = t2_voxel(0, 0, 50.0, 100.0);
        records.extend(t2_voxel(2, 1, 70.0, 150.0));
        let forward = fit_groups(&records, &FitConfig::new(Datatype::T2)).unwrap();
        records.reverse();
        let backward = fit_groups(&records, &FitConfig::new(Datatype::T2)).unwrap();

        for key in [GroupKey::Voxel { slc: 0, x: 0, y: 0 }, GroupKey::Voxel { slc: 0, x: 2, y: 1 }] {
            let a = forward.results.iter().find(|r| r.key == key).unwrap();
            let b = backward.results.iter().find(|r| r.key == key).unwrap();
            assert_eq!(a.group, b.group);
            let (va, vb) = (a.estimate.value(ParamName::T2).unwrap(), b.estimate.value(ParamName::T2).unwrap());
            assert!((va - vb).abs() < 1e-6 * va, "{va} vs {vb}");
        }
    }
}
