//! Per-dataset fit pipeline shared by the CLI and library callers.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! allow-list -> global max -> per slice (gate -> zero removal -> threshold -> fit)
//!
//! The CLI can then focus on discovery, file output and reporting.

use std::collections::BTreeMap;

use log::{info, warn};

use crate::domain::{FitConfig, Measurement, VoxelResult};
use crate::error::AppError;
use crate::fit::{FitOutcome, fit_groups, limit_to_threshold, limit_to_values, max_signal, passes_slice_gate, remove_groups_with_zeros};

/// Fit results for one slice.
#[derive(Debug, Clone)]
pub struct SliceFit {
    pub slc: u32,
    pub outcome: FitOutcome,
}

impl SliceFit {
    /// Groups whose validity flag is set.
    pub fn n_valid_groups(&self) -> usize {
        let mut groups: Vec<usize> = self
            .outcome
            .results
            .iter()
            .filter(|r| r.valid == Some(true))
            .map(|r| r.group)
            .collect();
        groups.sort_unstable();
        groups.dedup();
        groups.len()
    }
}

/// A slice that produced no groups to fit.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceSkip {
    pub slc: u32,
    pub reason: String,
}

/// All computed outputs of one dataset.
#[derive(Debug, Clone, Default)]
pub struct DatasetRun {
    pub fitted: Vec<SliceFit>,
    pub skipped: Vec<SliceSkip>,
    pub global_max: f64,
}

impl DatasetRun {
    pub fn n_groups(&self) -> usize {
        self.fitted.iter().map(|s| s.outcome.n_groups).sum()
    }

    pub fn n_valid(&self) -> usize {
        self.fitted.iter().map(SliceFit::n_valid_groups).sum()
    }

    pub fn n_failed(&self) -> usize {
        self.fitted.iter().map(|s| s.outcome.failures.len()).sum()
    }

    /// Every per-record result, in slice order.
    pub fn results(&self) -> impl Iterator<Item = &VoxelResult> {
        self.fitted.iter().flat_map(|s| s.outcome.results.iter())
    }
}

/// Run the full per-slice pipeline over one dataset's slice tables.
///
/// Configuration and completeness errors abort before any slice is fit.
pub fn run_dataset(slices: &BTreeMap<u32, Vec<Measurement>>, config: &FitConfig) -> Result<DatasetRun, AppError> {
    config.validate()?;

    let slices: BTreeMap<u32, Vec<Measurement>> = match &config.values_to_use {
        Some(values) => {
            info!("Fitting {} using limited values: {values:?}", config.datatype);
            slices
                .iter()
                .map(|(&slc, records)| Ok((slc, limit_to_values(records, config.datatype, values)?)))
                .collect::<Result<_, AppError>>()?
        }
        None => slices.clone(),
    };

    let global_max = slices
        .values()
        .filter_map(|records| max_signal(records))
        .fold(f64::NEG_INFINITY, f64::max);

    let mut run = DatasetRun {
        global_max,
        ..DatasetRun::default()
    };

    for (&slc, records) in &slices {
        info!("Processing fit by {} for slice {slc}", config.fit_by.name());

        let Some(slice_max) = max_signal(records) else {
            warn!("Slice {slc} has no signal; skipping.");
            run.skipped.push(SliceSkip {
                slc,
                reason: "no signal".to_string(),
            });
            continue;
        };

        if !passes_slice_gate(slice_max, global_max, config.voxel_threshold) {
            warn!("Slice {slc} max {slice_max} is below the slice gate; skipping.");
            run.skipped.push(SliceSkip {
                slc,
                reason: "below slice gate".to_string(),
            });
            continue;
        }

        let kept = remove_groups_with_zeros(records);
        let kept = limit_to_threshold(&kept, slice_max, config.voxel_threshold);
        if kept.is_empty() {
            run.skipped.push(SliceSkip {
                slc,
                reason: "no voxels above threshold".to_string(),
            });
            continue;
        }

        let outcome = fit_groups(&kept, config)?;
        run.fitted.push(SliceFit { slc, outcome });
    }

    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PhantomConfig, generate_phantom};
    use crate::domain::{Datatype, ParamName};
    use crate::error::ErrorKind;

    #[test]
    fn phantom_t2_round_trip_recovers_truth() {
        let phantom = generate_phantom(&PhantomConfig {
            nx: 8,
            ny: 8,
            nslc: 1,
            noise: 0.0,
            ..PhantomConfig::new(Datatype::T2)
        })
        .unwrap();

        let run = run_dataset(&phantom.slices, &FitConfig::new(Datatype::T2)).unwrap();
        assert_eq!(run.fitted.len(), 1);
        assert_eq!(run.n_failed(), 0);
        assert_eq!(run.n_groups(), phantom.truth.len());
        assert_eq!(run.n_valid(), run.n_groups());

        for r in run.results() {
            let truth = phantom.truth[&r.key];
            let t2v = r.estimate.value(ParamName::T2).unwrap();
            assert!((t2v - truth.t2).abs() / truth.t2 < 0.01, "T2 {t2v} vs {}", truth.t2);
        }
    }

    #[test]
    fn dim_slice_is_skipped_by_the_gate() {
        let bright: Vec<Measurement> = [10.0, 30.0, 60.0]
            .iter()
            .map(|&te| Measurement::new(0, 0, 0, 1000.0 * (-te / 50.0_f64).exp()).with_te(te))
            .collect();
        let dim: Vec<Measurement> = [10.0, 30.0, 60.0]
            .iter()
            .map(|&te| Measurement::new(0, 0, 1, 50.0 * (-te / 50.0_f64).exp()).with_te(te))
            .collect();
        let slices = BTreeMap::from([(0, bright), (1, dim)]);

        let run = run_dataset(&slices, &FitConfig::new(Datatype::T2)).unwrap();
        assert_eq!(run.fitted.iter().map(|s| s.slc).collect::<Vec<_>>(), vec![0]);
        assert_eq!(
            run.skipped,
            vec![SliceSkip {
                slc: 1,
                reason: "below slice gate".to_string()
            }]
        );
    }

    #[test]
    fn allow_list_mismatch_aborts_before_fitting() {
        let records: Vec<Measurement> = [100.0, 200.0, 400.0]
            .iter()
            .map(|&ti| Measurement::new(0, 0, 0, ti).with_ti(ti))
            .collect();
        let slices = BTreeMap::from([(0, records)]);
        let config = FitConfig {
            values_to_use: Some(vec![100.0, 9999.0]),
            ..FitConfig::new(Datatype::T1)
        };
        let err = run_dataset(&slices, &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Completeness);
        assert!(err.message().contains("9999"));
    }

    #[test]
    fn invalid_threshold_is_rejected() {
        let config = FitConfig {
            voxel_threshold: 1.5,
            ..FitConfig::new(Datatype::T2)
        };
        let err = run_dataset(&BTreeMap::new(), &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
