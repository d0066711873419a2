use std::{env, time::Instant};

use anyhow::Result;
use env_logger::Builder;
use log::{info, LevelFilter};
use ndarray::Array2;

use crate::cli::ProgramArgs;
use crate::weights::nnls::{compute_splits, NNLSParams, SplitWeights};

pub mod cli;
pub mod estimator;
pub mod splits;
pub mod utils;
pub mod weights;

pub fn set_log_level(matches: &ProgramArgs, is_last: bool, program_name: &str, version: &str) {
    let mut log_level = LevelFilter::Info;
    let mut specified = false;
    if matches.verbose {
        specified = true;
        log_level = LevelFilter::Debug;
    }
    if matches.quiet {
        specified = true;
        log_level = LevelFilter::Error;
    }
    if specified || is_last {
        let mut builder = Builder::new();
        builder.filter_level(log_level);
        if let Ok(filters) = env::var("RUST_LOG") {
            builder.parse_filters(&filters);
        }
        if builder.try_init().is_err() {
            panic!("Failed to set log level - has it been specified multiple times?")
        }
    }
    if is_last {
        info!("{} version {}", program_name, version);
    }
}

/// The single entry point for bindings.
///
/// - `dist`: square distance matrix (n x n), indexed by 0-based taxon id
/// - `cycle`: circular order of the taxa as 1-based ids, without the leading sentinel
/// - `params`: estimation parameters
pub fn run_split_weights_from_memory(
    dist: Array2<f64>,
    cycle: &[usize],
    params: NNLSParams,
) -> Result<SplitWeights> {
    let t0 = Instant::now();

    let cycle: Vec<usize> = std::iter::once(0).chain(cycle.iter().copied()).collect();
    let result = compute_splits(&cycle, &dist, &params, None)?;
    info!(
        "Estimated {} split weights in {:?}",
        result.splits.len(),
        t0.elapsed()
    );
    Ok(result)
}
