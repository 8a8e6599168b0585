//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - discovers and loads saved measurement tables
//! - runs the per-slice fit pipeline for every dataset × datatype
//! - writes per-slice and combined CSVs plus a run manifest
//! - prints summaries and the exception list

use std::path::Path;

use chrono::Local;
use clap::Parser;
use log::info;

use crate::cli::{Command, FitArgs, SimulateArgs};
use crate::data::{PhantomConfig, default_values, generate_phantom};
use crate::domain::{Datatype, FitConfig, VoxelResult};
use crate::error::AppError;
use crate::io::{
    RunManifest, SkippedSlice, TOOL_NAME, combined_fit_file, ensure_dir, fit_suffix, input_dir, layout, load_slices,
    slice_fit_file, slice_raw_file, write_manifest, write_measurements_csv, write_results_csv,
};

pub mod pipeline;

/// Entry point for the `relax` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    if args.datatypes.len() > 1 && args.datatype_values.is_some() {
        return Err(AppError::config(
            "Only one datatype can be given if datatype-values is specified!",
        ));
    }

    // Validate every configuration before touching any data.
    let configs: Vec<FitConfig> = args
        .datatypes
        .iter()
        .map(|&dt| {
            let config = fit_config_from_args(&args, dt);
            config.validate().map(|()| config)
        })
        .collect::<Result<_, _>>()?;

    let mut exceptions = Vec::new();
    for config in &configs {
        for dataset in &args.datasets {
            let dir = input_dir(&args.saved_data_dir, config.datatype, dataset);
            if !dir.is_dir() {
                exceptions.push(format!("{} does not exist", dir.display()));
                continue;
            }
            process_dataset(&dir, dataset, config, &args.output_dir)?;
        }
    }

    println!("{}", crate::report::format_exceptions(&exceptions));
    Ok(())
}

fn process_dataset(dir: &Path, dataset: &str, config: &FitConfig, output_root: &Path) -> Result<(), AppError> {
    info!("Processing {} for dataset {dataset}", config.datatype);
    let loaded = load_slices(dir, config.datatype)?;
    let run = pipeline::run_dataset(&loaded.slices, config)?;

    let save_dir = layout::output_dir(output_root, config.datatype, dataset, config.values_to_use.as_deref());
    ensure_dir(&save_dir)?;
    let suffix = fit_suffix(config.fit_by, config.voxel_threshold);

    let mut output_files = Vec::new();
    for slice in &run.fitted {
        let path = slice_fit_file(&save_dir, slice.slc, &suffix);
        let rows = write_results_csv(&path, &slice.outcome.results, config.datatype)?;
        info!("Wrote {rows} voxel rows to {}", path.display());
        output_files.push(file_name(&path));
    }

    let all: Vec<VoxelResult> = run.results().cloned().collect();
    let combined = combined_fit_file(&save_dir, &suffix);
    let rows = write_results_csv(&combined, &all, config.datatype)?;
    info!("Wrote {rows} voxel rows to {}", combined.display());
    output_files.push(file_name(&combined));

    let manifest = RunManifest {
        tool: TOOL_NAME.to_string(),
        generated: Local::now(),
        datatype: config.datatype,
        dataset: dataset.to_string(),
        fit_by: config.fit_by,
        voxel_threshold: config.voxel_threshold,
        values_to_use: config.values_to_use.clone(),
        fitted_slices: run.fitted.iter().map(|s| s.slc).collect(),
        skipped_slices: run
            .skipped
            .iter()
            .map(|s| SkippedSlice {
                slc: s.slc,
                reason: s.reason.clone(),
            })
            .collect(),
        n_groups: run.n_groups(),
        n_valid: run.n_valid(),
        n_failed: run.n_failed(),
        output_files,
    };
    write_manifest(&save_dir.join(layout::MANIFEST_FILE), &manifest)?;

    println!("{}", crate::report::format_dataset_summary(dataset, &run, config));
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = phantom_config_from_args(&args);
    let phantom = generate_phantom(&config)?;

    let dir = input_dir(&args.output_dir, args.datatype, &args.dataset);
    ensure_dir(&dir)?;
    for (&slc, records) in &phantom.slices {
        let path = slice_raw_file(&dir, slc);
        write_measurements_csv(&path, records, args.datatype)?;
        info!("Wrote {} records to {}", records.len(), path.display());
    }

    println!(
        "Simulated {} phantom '{}': {}x{}x{} voxels, {} tissue voxels, {} records -> {}",
        args.datatype,
        args.dataset,
        args.nx,
        args.ny,
        args.nslc,
        phantom.truth.len(),
        phantom.n_records(),
        dir.display()
    );
    Ok(())
}

pub fn fit_config_from_args(args: &FitArgs, datatype: Datatype) -> FitConfig {
    FitConfig {
        datatype,
        fit_by: args.fit_by,
        voxel_threshold: args.fit_by_voxel_threshold,
        values_to_use: args.datatype_values.clone(),
    }
}

pub fn phantom_config_from_args(args: &SimulateArgs) -> PhantomConfig {
    PhantomConfig {
        datatype: args.datatype,
        nx: args.nx,
        ny: args.ny,
        nslc: args.nslc,
        values: args.values.clone().unwrap_or_else(|| default_values(args.datatype)),
        tr: args.tr,
        noise: args.noise,
        seed: args.seed,
        background: args.background,
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
