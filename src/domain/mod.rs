//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - configuration enums (`Datatype`, `FitBy`) and `FitConfig`
//! - raw per-voxel measurements (`Measurement`) and group identity (`GroupKey`)
//! - fit outputs (`ParamSet`, `GroupEstimate`, `VoxelResult`)

pub mod types;

pub use types::*;
