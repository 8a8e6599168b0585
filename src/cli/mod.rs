//! Command-line parsing for the relaxation fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the fitting/math code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{Datatype, FitBy};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "relax", version, about = "Quantitative MRI T1/T2 relaxation fitter")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit saved raw measurement tables and write per-voxel estimates.
    Fit(FitArgs),
    /// Write a synthetic phantom in the saved-data layout.
    Simulate(SimulateArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Dataset(s) to process.
    #[arg(long = "dataset", num_args = 1.., required = true)]
    pub datasets: Vec<String>,

    /// Type(s) of data to process.
    #[arg(long = "datatype", value_enum, num_args = 1.., required = true)]
    pub datatypes: Vec<Datatype>,

    /// Only use these acquisition values (TI for t1, TE for t2).
    ///
    /// Only valid when exactly one datatype is given.
    #[arg(long = "datatype-values", num_args = 1..)]
    pub datatype_values: Option<Vec<f64>>,

    /// Group measurements per voxel or fit each slice as one aggregate.
    #[arg(long, value_enum, default_value_t = FitBy::Voxel)]
    pub fit_by: FitBy,

    /// Fraction of the slice maximum a voxel must exceed to be fit.
    #[arg(long, default_value_t = 0.2)]
    pub fit_by_voxel_threshold: f64,

    /// Load raw tables from `<dir>/<datatype>/<dataset>/raw*.csv`.
    #[arg(long)]
    pub saved_data_dir: PathBuf,

    /// Write fits to `<dir>/<datatype>/<dataset>/`.
    #[arg(long)]
    pub output_dir: PathBuf,
}

#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Dataset name to write.
    #[arg(long)]
    pub dataset: String,

    #[arg(long, value_enum)]
    pub datatype: Datatype,

    /// Saved-data root the phantom is written under.
    #[arg(long)]
    pub output_dir: PathBuf,

    #[arg(long, default_value_t = 16)]
    pub nx: u32,

    #[arg(long, default_value_t = 16)]
    pub ny: u32,

    #[arg(long, default_value_t = 2)]
    pub nslc: u32,

    /// Acquisition values (TI or TE); defaults depend on the datatype.
    #[arg(long, num_args = 1..)]
    pub values: Option<Vec<f64>>,

    /// Repetition time (t1 only).
    #[arg(long)]
    pub tr: Option<f64>,

    /// Gaussian noise sigma.
    #[arg(long, default_value_t = 5.0)]
    pub noise: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Fraction of each slice left as background.
    #[arg(long, default_value_t = 0.25)]
    pub background: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fit_with_multiple_datasets_and_datatypes() {
        let cli = Cli::try_parse_from([
            "relax",
            "fit",
            "--dataset",
            "knee",
            "brain",
            "--datatype",
            "t1",
            "t2_map",
            "--saved-data-dir",
            "saved",
            "--output-dir",
            "out",
        ])
        .unwrap();

        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.datasets, ["knee", "brain"]);
        assert_eq!(args.datatypes, [Datatype::T1, Datatype::T2Map]);
        assert_eq!(args.fit_by, FitBy::Voxel);
        assert_eq!(args.fit_by_voxel_threshold, 0.2);
        assert!(args.datatype_values.is_none());
    }

    #[test]
    fn rejects_unknown_datatype() {
        let result = Cli::try_parse_from([
            "relax", "fit", "--dataset", "a", "--datatype", "t3", "--saved-data-dir", "s", "--output-dir", "o",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn simulate_defaults() {
        let cli = Cli::try_parse_from([
            "relax", "simulate", "--dataset", "p", "--datatype", "t2", "--output-dir", "o",
        ])
        .unwrap();
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!((args.nx, args.ny, args.nslc), (16, 16, 2));
        assert_eq!(args.seed, 42);
        assert!(args.values.is_none());
    }
}
