//! Reporting utilities: dataset summaries and the batch exception list.
//!
//! We keep formatting code in one place so:
//! - the fitting code stays clean and testable
//! - output changes are localized

use std::collections::BTreeMap;

use crate::app::pipeline::DatasetRun;
use crate::domain::{FitConfig, GroupEstimate, ParamName};

/// Failures listed individually before the rest are summarised.
const MAX_LISTED_FAILURES: usize = 5;

/// Format the summary printed after a dataset has been processed.
pub fn format_dataset_summary(dataset: &str, run: &DatasetRun, config: &FitConfig) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== relax - {} / {dataset} ===\n", config.datatype));
    out.push_str(&format!(
        "Fit by: {} | threshold={} | values={}\n",
        config.fit_by.name(),
        config.voxel_threshold,
        config
            .values_to_use
            .as_deref()
            .map(fmt_vec)
            .unwrap_or_else(|| "all".to_string()),
    ));

    let fitted: Vec<String> = run.fitted.iter().map(|s| s.slc.to_string()).collect();
    out.push_str(&format!("Slices fitted: {} [{}]\n", fitted.len(), fitted.join(", ")));
    for skip in &run.skipped {
        out.push_str(&format!("  (skipped slice {}) {}\n", skip.slc, skip.reason));
    }

    let n_groups = run.n_groups();
    out.push_str(&format!("Groups: n={n_groups} | failed={}", run.n_failed()));
    if !config.datatype.is_map() {
        let pct = if n_groups > 0 {
            100.0 * run.n_valid() as f64 / n_groups as f64
        } else {
            0.0
        };
        out.push_str(&format!(" | valid={} ({pct:.1}%)", run.n_valid()));
    }
    out.push('\n');

    let stats = parameter_stats(run, config.datatype.quantitative_params());
    if !stats.is_empty() {
        out.push_str(&format!("\n{:<8} {:>6} {:>12} {:>12} {:>12}\n", "param", "n", "median", "min", "max"));
        out.push_str(&format!("{:-<8} {:-<6} {:-<12} {:-<12} {:-<12}\n", "", "", "", "", ""));
        for (name, s) in &stats {
            out.push_str(&format!(
                "{:<8} {:>6} {:>12.3} {:>12.3} {:>12.3}\n",
                name.as_str(),
                s.n,
                s.median,
                s.min,
                s.max
            ));
        }
    }

    let failures: Vec<_> = run
        .fitted
        .iter()
        .flat_map(|s| s.outcome.failures.iter())
        .collect();
    if !failures.is_empty() {
        out.push_str("\nFailed groups:\n");
        for f in failures.iter().take(MAX_LISTED_FAILURES) {
            out.push_str(&format!("- {}: {}\n", f.key, f.message));
        }
        if failures.len() > MAX_LISTED_FAILURES {
            out.push_str(&format!("- ... and {} more\n", failures.len() - MAX_LISTED_FAILURES));
        }
    }

    out
}

/// Format the end-of-batch list of dataset/datatype combinations that could not be processed.
pub fn format_exceptions(exceptions: &[String]) -> String {
    let mut out = String::from("\nFinished processing data!\n");
    if exceptions.is_empty() {
        return out;
    }
    out.push_str("\nNote, unable to process data for the following file and datatype combinations:\n");
    for e in exceptions {
        out.push_str(&format!("{e}\n"));
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ParamStats {
    n: usize,
    median: f64,
    min: f64,
    max: f64,
}

/// Per-parameter stats over one value per group; fits flagged invalid are excluded.
fn parameter_stats(run: &DatasetRun, params: &[ParamName]) -> Vec<(ParamName, ParamStats)> {
    let mut per_group: BTreeMap<(u32, usize), &GroupEstimate> = BTreeMap::new();
    for slice in &run.fitted {
        for r in &slice.outcome.results {
            if r.valid != Some(false) {
                per_group.entry((slice.slc, r.group)).or_insert(&r.estimate);
            }
        }
    }

    params
        .iter()
        .filter_map(|&name| {
            let mut values: Vec<f64> = per_group
                .values()
                .filter_map(|e| e.value(name))
                .filter(|v| v.is_finite())
                .collect();
            median_mut(&mut values).map(|median| {
                let min = values.first().copied().unwrap_or(f64::NAN);
                let max = values.last().copied().unwrap_or(f64::NAN);
                (name, ParamStats { n: values.len(), median, min, max })
            })
        })
        .collect()
}

/// Median; sorts `values` in place.
fn median_mut(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::{SliceFit, SliceSkip};
    use crate::domain::{Datatype, GroupFailure, GroupKey, Measurement, VoxelResult};
    use crate::fit::FitOutcome;

    fn map_result(x: u32, group: usize, value: f64) -> VoxelResult {
        let record = Measurement::new(x, 0, 0, value);
        VoxelResult {
            key: record.voxel_key(),
            record,
            group,
            estimate: GroupEstimate::Map { name: ParamName::T2, value },
            valid: None,
        }
    }

    fn sample_run() -> DatasetRun {
        DatasetRun {
            fitted: vec![SliceFit {
                slc: 0,
                outcome: FitOutcome {
                    results: vec![map_result(0, 1, 40.0), map_result(1, 2, 60.0), map_result(2, 3, 90.0)],
                    failures: vec![GroupFailure {
                        key: GroupKey::Voxel { slc: 0, x: 9, y: 9 },
                        message: "flat curve".to_string(),
                    }],
                    n_groups: 4,
                },
            }],
            skipped: vec![SliceSkip { slc: 1, reason: "below slice gate".to_string() }],
            global_max: 90.0,
        }
    }

    #[test]
    fn summary_lists_slices_stats_and_failures() {
        let config = FitConfig::new(Datatype::T2Map);
        let text = format_dataset_summary("knee", &sample_run(), &config);

        assert!(text.contains("=== relax - t2_map / knee ==="), "{text}");
        assert!(text.contains("Slices fitted: 1 [0]"));
        assert!(text.contains("(skipped slice 1) below slice gate"));
        assert!(text.contains("Groups: n=4 | failed=1\n"), "{text}");
        assert!(text.contains("60.000"));
        assert!(text.contains("- slc=0 x=9 y=9: flat curve"));
    }

    #[test]
    fn median_handles_even_and_odd_lengths() {
        assert_eq!(median_mut(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median_mut(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median_mut(&mut []), None);
    }

    #[test]
    fn exceptions_are_listed_after_the_finish_line() {
        let text = format_exceptions(&["data/t1/knee does not exist".to_string()]);
        assert!(text.starts_with("\nFinished processing data!"));
        assert!(text.ends_with("data/t1/knee does not exist\n"));
        assert!(!format_exceptions(&[]).contains("unable"));
    }
}
