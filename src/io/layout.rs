//! On-disk directory conventions.
//!
//! Input:  `<saved>/<datatype>/<dataset>/raw*.csv` (one file per slice), or a
//! single legacy `raw.csv` holding every slice.
//!
//! Output: `<out>/<datatype>/<dataset>[_<v1>_<v2>…]/fit_pd[_<slc>]<extra>.csv`
//! plus `run.json`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{Datatype, FitBy};
use crate::error::AppError;

pub const LEGACY_RAW_FILE: &str = "raw.csv";
pub const MANIFEST_FILE: &str = "run.json";

pub fn input_dir(saved_data_dir: &Path, datatype: Datatype, dataset: &str) -> PathBuf {
    saved_data_dir.join(datatype.name()).join(dataset)
}

/// Output directory; an allow-list is appended to the dataset name.
pub fn output_dir(output_root: &Path, datatype: Datatype, dataset: &str, values: Option<&[f64]>) -> PathBuf {
    let suffix = values
        .map(|vs| vs.iter().map(|v| format!("_{v}")).collect::<String>())
        .unwrap_or_default();
    output_root.join(datatype.name()).join(format!("{dataset}{suffix}"))
}

/// `_byvoxel`, `_byvoxel_<threshold>` (threshold > 0) or `_all`.
pub fn fit_suffix(fit_by: FitBy, voxel_threshold: f64) -> String {
    match fit_by {
        FitBy::Voxel if voxel_threshold > 0.0 => format!("_byvoxel_{voxel_threshold}"),
        FitBy::Voxel => "_byvoxel".to_string(),
        FitBy::All => "_all".to_string(),
    }
}

pub fn slice_fit_file(dir: &Path, slc: u32, suffix: &str) -> PathBuf {
    dir.join(format!("fit_pd_{slc}{suffix}.csv"))
}

pub fn combined_fit_file(dir: &Path, suffix: &str) -> PathBuf {
    dir.join(format!("fit_pd{suffix}.csv"))
}

pub fn slice_raw_file(dir: &Path, slc: u32) -> PathBuf {
    dir.join(format!("raw_{slc}.csv"))
}

/// Where the measurement tables of one dataset live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawSource {
    /// Single `raw.csv`, split by slice after loading.
    Legacy(PathBuf),
    /// `raw*.csv` files in name order.
    PerSlice(Vec<PathBuf>),
}

/// Locate raw tables under `dir`; a legacy `raw.csv` takes precedence.
pub fn discover_raw_files(dir: &Path) -> Result<RawSource, AppError> {
    let legacy = dir.join(LEGACY_RAW_FILE);
    if legacy.is_file() {
        return Ok(RawSource::Legacy(legacy));
    }

    let entries = fs::read_dir(dir)
        .map_err(|e| AppError::io(format!("Failed to list '{}': {e}", dir.display())))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AppError::io(format!("Failed to list '{}': {e}", dir.display())))?;
        let path = entry.path();
        let is_raw = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("raw") && n.ends_with(".csv"));
        if is_raw && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(RawSource::PerSlice(files))
}

pub fn ensure_dir(dir: &Path) -> Result<(), AppError> {
    fs::create_dir_all(dir).map_err(|e| AppError::io(format!("Failed to create directory '{}': {e}", dir.display())))
}
