//! Export per-voxel results and measurement tables to CSV.
//!
//! Result files hold one row per voxel: acquisition columns and raw signal
//! are dropped and the group's estimate is repeated on every voxel it covers.
//! Missing values (NaN, absent dimensions) are written as empty cells.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::{Datatype, GroupEstimate, Measurement, VoxelResult};
use crate::error::AppError;

/// Header row for a result file of `datatype`.
pub fn result_columns(datatype: Datatype) -> Vec<String> {
    let mut cols: Vec<String> = ["x", "y", "slc", "nx", "ny", "nslc", "group"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let params = datatype.quantitative_params();
    if datatype.is_map() {
        cols.extend(params.iter().map(|p| p.to_string()));
        return cols;
    }

    for p in params {
        cols.push(p.to_string());
        cols.push(format!("init_{p}"));
        cols.push(format!("stderr_{p}"));
    }
    cols.push("norm_redchi".to_string());
    cols.push(format!("valid_fit_by_stderr_{}", datatype.primary_param()));
    cols
}

/// Write per-voxel results to a CSV file; returns the number of rows written.
pub fn write_results_csv(path: &Path, results: &[VoxelResult], datatype: Datatype) -> Result<usize, AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create export CSV '{}': {e}", path.display())))?;
    write_results(file, results, datatype)
}

pub fn write_results<W: Write>(writer: W, results: &[VoxelResult], datatype: Datatype) -> Result<usize, AppError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(result_columns(datatype))
        .map_err(|e| AppError::io(format!("Failed to write export CSV header: {e}")))?;

    let mut seen = BTreeSet::new();
    let mut rows = 0usize;
    for r in results {
        let m = &r.record;
        if !seen.insert((m.slc, m.x, m.y, r.group)) {
            continue;
        }
        wtr.write_record(result_row(r, datatype))
            .map_err(|e| AppError::io(format!("Failed to write export CSV row: {e}")))?;
        rows += 1;
    }

    wtr.flush()
        .map_err(|e| AppError::io(format!("Failed to flush export CSV: {e}")))?;
    Ok(rows)
}

fn result_row(r: &VoxelResult, datatype: Datatype) -> Vec<String> {
    let m = &r.record;
    let mut row = vec![
        m.x.to_string(),
        m.y.to_string(),
        m.slc.to_string(),
        fmt_opt_u32(m.nx),
        fmt_opt_u32(m.ny),
        fmt_opt_u32(m.nslc),
        r.group.to_string(),
    ];

    match &r.estimate {
        GroupEstimate::Map { value, .. } => row.push(fmt_f64(*value)),
        GroupEstimate::Fitted(set) => {
            for &p in datatype.quantitative_params() {
                match set.get(p) {
                    Some(fp) => row.extend([fmt_f64(fp.value), fmt_f64(fp.init), fmt_f64(fp.stderr)]),
                    None => row.extend([String::new(), String::new(), String::new()]),
                }
            }
            row.push(fmt_f64(set.norm_redchi));
            row.push(r.valid.map(|v| v.to_string()).unwrap_or_default());
        }
    }
    row
}

/// Write a measurement table in the ingest schema.
pub fn write_measurements_csv(path: &Path, records: &[Measurement], datatype: Datatype) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create CSV '{}': {e}", path.display())))?;
    write_measurements(file, records, datatype)
}

pub fn write_measurements<W: Write>(writer: W, records: &[Measurement], datatype: Datatype) -> Result<(), AppError> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec!["x", "y", "slc", "nx", "ny", "nslc"];
    match datatype {
        Datatype::T1 => header.extend(["ti", "tr"]),
        Datatype::T2 => header.push("te"),
        Datatype::T1Map | Datatype::T2Map => {}
    }
    header.push("data");
    wtr.write_record(&header)
        .map_err(|e| AppError::io(format!("Failed to write CSV header: {e}")))?;

    for m in records {
        let mut row = vec![
            m.x.to_string(),
            m.y.to_string(),
            m.slc.to_string(),
            fmt_opt_u32(m.nx),
            fmt_opt_u32(m.ny),
            fmt_opt_u32(m.nslc),
        ];
        match datatype {
            Datatype::T1 => row.extend([fmt_opt_f64(m.ti), fmt_opt_f64(m.tr)]),
            Datatype::T2 => row.push(fmt_opt_f64(m.te)),
            Datatype::T1Map | Datatype::T2Map => {}
        }
        row.push(fmt_f64(m.data));
        wtr.write_record(&row)
            .map_err(|e| AppError::io(format!("Failed to write CSV row: {e}")))?;
    }

    wtr.flush().map_err(|e| AppError::io(format!("Failed to flush CSV: {e}")))
}

fn fmt_f64(v: f64) -> String {
    if v.is_nan() { String::new() } else { v.to_string() }
}

fn fmt_opt_f64(v: Option<f64>) -> String {
    v.map(fmt_f64).unwrap_or_default()
}

fn fmt_opt_u32(v: Option<u32>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}
