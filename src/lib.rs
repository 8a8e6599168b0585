//! `relax-fit` library crate.
//!
//! The binary (`relax`) is a thin wrapper around this library so that:
//!
//! - the fitting engine is testable without spawning processes
//! - library callers can build a `FitConfig` and call `fit_groups` directly
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
