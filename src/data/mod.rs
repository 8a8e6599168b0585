//! Synthetic data sources.

pub mod phantom;

pub use phantom::*;
