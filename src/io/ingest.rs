//! CSV ingest of measurement tables.
//!
//! This module turns the flat per-slice tables written by the acquisition
//! exporter into `Measurement` records.
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Separation of concerns**: no filtering or fitting here

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use log::{info, warn};

use crate::domain::{Datatype, Measurement};
use crate::error::AppError;
use crate::io::layout::{RawSource, discover_raw_files};

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// One parsed table.
#[derive(Debug, Clone)]
pub struct IngestedTable {
    pub records: Vec<Measurement>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Every slice of one dataset, keyed by slice index.
#[derive(Debug, Clone, Default)]
pub struct LoadedDataset {
    pub slices: BTreeMap<u32, Vec<Measurement>>,
    pub files: Vec<PathBuf>,
    pub row_errors: usize,
}

pub fn read_measurements(path: &Path, datatype: Datatype) -> Result<IngestedTable, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open CSV '{}': {e}", path.display())))?;
    read_measurements_from_reader(file, datatype)
        .map_err(|e| AppError::new(e.kind(), format!("{}: {}", path.display(), e.message())))
}

pub fn read_measurements_from_reader<R: Read>(reader: R, datatype: Datatype) -> Result<IngestedTable, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::io(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    ensure_required_columns_exist(datatype, &header_map)?;

    let mut records = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header; lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let parsed = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| parse_row(&record, &header_map));
        match parsed {
            Ok(m) => records.push(m),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    Ok(IngestedTable {
        records,
        row_errors,
        rows_read,
    })
}

/// Load all slice tables of a dataset directory.
pub fn load_slices(dir: &Path, datatype: Datatype) -> Result<LoadedDataset, AppError> {
    let files = match discover_raw_files(dir)? {
        RawSource::Legacy(path) => {
            warn!("Using deprecated load method - loading {}", path.display());
            vec![path]
        }
        RawSource::PerSlice(files) => files,
    };

    if files.is_empty() {
        return Err(AppError::io(format!("No raw*.csv files found in '{}'.", dir.display())));
    }

    let mut dataset = LoadedDataset::default();
    for path in &files {
        info!("Opening file {}", path.display());
        let table = read_measurements(path, datatype)?;
        for err in &table.row_errors {
            warn!("{}:{}: {}", path.display(), err.line, err.message);
        }
        dataset.row_errors += table.row_errors.len();
        for record in table.records {
            dataset.slices.entry(record.slc).or_default().push(record);
        }
    }
    dataset.files = files;
    Ok(dataset)
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Strip a UTF-8 BOM on the first header.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn ensure_required_columns_exist(datatype: Datatype, header_map: &HashMap<String, usize>) -> Result<(), AppError> {
    for name in ["x", "y", "slc", "data"] {
        if !header_map.contains_key(name) {
            return Err(AppError::io(format!("Missing required column: `{name}`")));
        }
    }
    if let Some(column) = datatype.acquisition_name() {
        if !header_map.contains_key(column) {
            return Err(AppError::io(format!(
                "Missing required column for datatype {datatype}: `{column}`"
            )));
        }
    }
    Ok(())
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<Measurement, String> {
    let x = parse_index(get_required(record, header_map, "x")?, "x")?;
    let y = parse_index(get_required(record, header_map, "y")?, "y")?;
    let slc = parse_index(get_required(record, header_map, "slc")?, "slc")?;

    let data = match get_optional(record, header_map, "data") {
        None => f64::NAN,
        Some(s) => s
            .parse::<f64>()
            .map_err(|_| format!("Invalid `data` value '{s}'."))?,
    };

    let nx = parse_opt_index(get_optional(record, header_map, "nx"), "nx")?;
    let ny = parse_opt_index(get_optional(record, header_map, "ny"), "ny")?;
    let nslc = parse_opt_index(get_optional(record, header_map, "nslc"), "nslc")?;

    Ok(Measurement {
        x,
        y,
        slc,
        nx,
        ny,
        nslc,
        data,
        ti: parse_opt_f64(get_optional(record, header_map, "ti"), "ti")?,
        te: parse_opt_f64(get_optional(record, header_map, "te"), "te")?,
        tr: parse_opt_f64(get_optional(record, header_map, "tr"), "tr")?,
        b_value: parse_opt_f64(get_optional(record, header_map, "b_value"), "b_value")?,
    })
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    get_optional(record, header_map, name).ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

/// Non-negative integer; accepts integral floats such as `3.0`.
fn parse_index(s: &str, name: &str) -> Result<u32, String> {
    if let Ok(v) = s.parse::<u32>() {
        return Ok(v);
    }
    match s.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&v) => Ok(v as u32),
        _ => Err(format!("Invalid `{name}` value '{s}' (expected a non-negative integer).")),
    }
}

fn parse_opt_index(s: Option<&str>, name: &str) -> Result<Option<u32>, String> {
    s.map(|s| parse_index(s, name)).transpose()
}

/// Optional finite float; an empty or `nan` cell is absent.
fn parse_opt_f64(s: Option<&str>, name: &str) -> Result<Option<f64>, String> {
    let Some(s) = s else {
        return Ok(None);
    };
    match s.parse::<f64>() {
        Ok(v) if v.is_nan() => Ok(None),
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(format!("Invalid `{name}` value '{s}' (expected a finite number).")),
    }
}
