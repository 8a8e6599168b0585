//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - used in-memory during grouping and fitting
//! - exported to CSV/JSON
//! - constructed directly by library callers without going through the CLI

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Which kind of acquisition is being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum Datatype {
    /// Inversion-recovery series; fit the T1 model.
    #[serde(rename = "t1")]
    #[value(name = "t1")]
    T1,
    /// Multi-echo series; fit the T2 decay model.
    #[serde(rename = "t2")]
    #[value(name = "t2")]
    T2,
    /// Scanner-reconstructed T1 map; averaged, not fit.
    #[serde(rename = "t1_map")]
    #[value(name = "t1_map")]
    T1Map,
    /// Scanner-reconstructed T2 map; averaged, not fit.
    #[serde(rename = "t2_map")]
    #[value(name = "t2_map")]
    T2Map,
}

impl Datatype {
    /// Parse a datatype name (`t1`, `t2`, `t1_map`, `t2_map`).
    pub fn parse(name: &str) -> Result<Self, AppError> {
        <Datatype as ValueEnum>::from_str(name, true)
            .map_err(|_| AppError::config(format!("Unknown datatype: {name}")))
    }

    /// Directory/CLI name.
    pub fn name(self) -> &'static str {
        match self {
            Datatype::T1 => "t1",
            Datatype::T2 => "t2",
            Datatype::T1Map => "t1_map",
            Datatype::T2Map => "t2_map",
        }
    }

    pub fn is_map(self) -> bool {
        matches!(self, Datatype::T1Map | Datatype::T2Map)
    }

    /// The quantitative variable reported for this datatype.
    pub fn primary_param(self) -> ParamName {
        match self {
            Datatype::T1 | Datatype::T1Map => ParamName::T1,
            Datatype::T2 | Datatype::T2Map => ParamName::T2,
        }
    }

    /// Every quantitative variable, primary first.
    pub fn quantitative_params(self) -> &'static [ParamName] {
        match self {
            Datatype::T1 => &[ParamName::T1, ParamName::Si, ParamName::Delta],
            Datatype::T2 => &[ParamName::T2, ParamName::Si],
            Datatype::T1Map => &[ParamName::T1],
            Datatype::T2Map => &[ParamName::T2],
        }
    }

    /// Name of the acquisition parameter that forms the curve's x-axis.
    pub fn acquisition_name(self) -> Option<&'static str> {
        match self {
            Datatype::T1 => Some("ti"),
            Datatype::T2 => Some("te"),
            Datatype::T1Map | Datatype::T2Map => None,
        }
    }
}

impl std::fmt::Display for Datatype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How measurements are partitioned into fit groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FitBy {
    /// One group per `(slc, x, y)` voxel.
    Voxel,
    /// One group for the whole table.
    All,
}

impl FitBy {
    pub fn parse(name: &str) -> Result<Self, AppError> {
        <FitBy as ValueEnum>::from_str(name, true)
            .map_err(|_| AppError::config(format!("Unknown group by type: {name}")))
    }

    pub fn name(self) -> &'static str {
        match self {
            FitBy::Voxel => "voxel",
            FitBy::All => "all",
        }
    }
}

/// Model parameter names as they appear in outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParamName {
    T1,
    T2,
    Si,
    #[serde(rename = "delta")]
    Delta,
}

impl ParamName {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamName::T1 => "T1",
            ParamName::T2 => "T2",
            ParamName::Si => "Si",
            ParamName::Delta => "delta",
        }
    }
}

impl std::fmt::Display for ParamName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One signal sample for one voxel under one acquisition setting.
///
/// `data` may be NaN (missing) or exactly zero (background / corrupted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub x: u32,
    pub y: u32,
    pub slc: u32,
    pub nx: Option<u32>,
    pub ny: Option<u32>,
    pub nslc: Option<u32>,
    pub data: f64,
    /// Inversion time.
    pub ti: Option<f64>,
    /// Echo time.
    pub te: Option<f64>,
    /// Repetition time.
    pub tr: Option<f64>,
    pub b_value: Option<f64>,
}

impl Measurement {
    pub fn new(x: u32, y: u32, slc: u32, data: f64) -> Self {
        Self {
            x,
            y,
            slc,
            nx: None,
            ny: None,
            nslc: None,
            data,
            ti: None,
            te: None,
            tr: None,
            b_value: None,
        }
    }

    pub fn with_ti(mut self, ti: f64) -> Self {
        self.ti = Some(ti);
        self
    }

    pub fn with_te(mut self, te: f64) -> Self {
        self.te = Some(te);
        self
    }

    pub fn with_tr(mut self, tr: f64) -> Self {
        self.tr = Some(tr);
        self
    }

    pub fn with_dims(mut self, nx: u32, ny: u32, nslc: u32) -> Self {
        self.nx = Some(nx);
        self.ny = Some(ny);
        self.nslc = Some(nslc);
        self
    }

    /// The curve's independent variable for `datatype` (TI for T1, TE for T2).
    pub fn acquisition_value(&self, datatype: Datatype) -> Option<f64> {
        match datatype {
            Datatype::T1 => self.ti,
            Datatype::T2 => self.te,
            Datatype::T1Map | Datatype::T2Map => None,
        }
    }

    pub fn voxel_key(&self) -> GroupKey {
        GroupKey::Voxel {
            slc: self.slc,
            x: self.x,
            y: self.y,
        }
    }
}

/// Identity of a fit group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GroupKey {
    Voxel { slc: u32, x: u32, y: u32 },
    All,
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupKey::Voxel { slc, x, y } => write!(f, "slc={slc} x={x} y={y}"),
            GroupKey::All => f.write_str("all"),
        }
    }
}

/// A fitted parameter with its uncertainty and the seed it started from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitParam {
    pub value: f64,
    pub stderr: f64,
    pub init: f64,
}

/// Fitted parameters for one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    pub params: Vec<(ParamName, FitParam)>,
    /// Reduced chi-square divided by `Si²`.
    pub norm_redchi: f64,
    pub chisqr: f64,
    pub redchi: f64,
    pub converged: bool,
    pub iterations: usize,
}

impl ParamSet {
    pub fn get(&self, name: ParamName) -> Option<&FitParam> {
        self.params.iter().find(|(n, _)| *n == name).map(|(_, p)| p)
    }
}

/// What a fit strategy produced for one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GroupEstimate {
    Fitted(ParamSet),
    /// Averaged map value (NaN when the group has no valid signal).
    Map { name: ParamName, value: f64 },
}

impl GroupEstimate {
    pub fn value(&self, name: ParamName) -> Option<f64> {
        match self {
            GroupEstimate::Fitted(set) => set.get(name).map(|p| p.value),
            GroupEstimate::Map { name: n, value } if *n == name => Some(*value),
            GroupEstimate::Map { .. } => None,
        }
    }
}

/// A measurement joined with its group's estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelResult {
    pub record: Measurement,
    /// 1-based group index within the fit call.
    pub group: usize,
    pub key: GroupKey,
    pub estimate: GroupEstimate,
    /// `stderr < value` for the primary parameter; `None` for map datatypes.
    pub valid: Option<bool>,
}

/// A group whose fit could not be produced.
#[derive(Debug, Clone)]
pub struct GroupFailure {
    pub key: GroupKey,
    pub message: String,
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub datatype: Datatype,
    pub fit_by: FitBy,
    /// Fraction of the slice maximum a voxel must exceed to be fit.
    pub voxel_threshold: f64,
    /// Optional allow-list of acquisition values (TI or TE).
    pub values_to_use: Option<Vec<f64>>,
}

impl FitConfig {
    pub fn new(datatype: Datatype) -> Self {
        Self {
            datatype,
            fit_by: FitBy::Voxel,
            voxel_threshold: 0.2,
            values_to_use: None,
        }
    }

    /// Reject configurations that cannot be run, before touching data.
    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.voxel_threshold.is_finite() && (0.0..1.0).contains(&self.voxel_threshold)) {
            return Err(AppError::config(format!(
                "Invalid voxel threshold {} (must be finite and in [0, 1)).",
                self.voxel_threshold
            )));
        }
        if let Some(values) = &self.values_to_use {
            if self.datatype.is_map() {
                return Err(AppError::config(format!(
                    "Cannot limit data for datatype {}",
                    self.datatype
                )));
            }
            if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
                return Err(AppError::config("Datatype values must be a non-empty list of finite numbers."));
            }
            let mut sorted = values.clone();
            sorted.sort_by(f64::total_cmp);
            if sorted.windows(2).any(|w| w[0] == w[1]) {
                return Err(AppError::config(format!("Datatype values contain duplicates: {values:?}")));
            }
        }
        Ok(())
    }
}
