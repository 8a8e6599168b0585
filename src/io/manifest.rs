//! Read/write the run manifest (`run.json`).
//!
//! The manifest sits beside the combined fit CSV and records how it was
//! produced:
//! - datatype, dataset and grouping/threshold settings
//! - which slices were fit and which were skipped (and why)
//! - group, valid-fit and failure counts

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::domain::{Datatype, FitBy};
use crate::error::AppError;

pub const TOOL_NAME: &str = "relax";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSlice {
    pub slc: u32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub tool: String,
    pub generated: DateTime<Local>,
    pub datatype: Datatype,
    pub dataset: String,
    pub fit_by: FitBy,
    pub voxel_threshold: f64,
    pub values_to_use: Option<Vec<f64>>,
    pub fitted_slices: Vec<u32>,
    pub skipped_slices: Vec<SkippedSlice>,
    pub n_groups: usize,
    /// Groups whose primary parameter passed the stderr check.
    pub n_valid: usize,
    pub n_failed: usize,
    pub output_files: Vec<String>,
}

/// Write a manifest as pretty JSON.
pub fn write_manifest(path: &Path, manifest: &RunManifest) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create manifest '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, manifest)
        .map_err(|e| AppError::io(format!("Failed to write manifest JSON: {e}")))?;
    Ok(())
}

pub fn read_manifest(path: &Path) -> Result<RunManifest, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open manifest '{}': {e}", path.display())))?;
    serde_json::from_reader(file).map_err(|e| AppError::io(format!("Invalid manifest JSON: {e}")))
}
