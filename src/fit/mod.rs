//! Relaxation fitting.
//!
//! Responsibilities:
//!
//! - reduce a slice table to the groups worth fitting (`grouping`)
//! - pick a per-datatype strategy: T1 / T2 curve fit or map passthrough (`strategy`)
//! - fit groups in parallel and join estimates back onto records (`fitter`)
//! - flag each fit valid or invalid by its standard error (`validity`)

pub mod fitter;
pub mod grouping;
pub mod map;
pub mod strategy;
pub mod validity;

pub use fitter::*;
pub use grouping::*;
pub use map::*;
pub use strategy::*;
pub use validity::*;
