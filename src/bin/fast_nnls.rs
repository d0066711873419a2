use clap::{crate_name, crate_version, Parser};

use fast_nnls::{
    cli::{ProgramArgs, ProgramSubcommand},
    estimator::estimator::SplitWeightEstimator,
    set_log_level,
};
use log::{error, info};

fn main() {
    let app = ProgramArgs::parse();

    set_log_level(&app, true, crate_name!(), crate_version!());

    if let Err(err) = rayon::ThreadPoolBuilder::new()
        .num_threads(app.threads)
        .build_global()
    {
        error!("Failed to build thread pool: {}", err);
        std::process::exit(1);
    }
    info!("Rayon threads: {}", rayon::current_num_threads());

    let result = match app.subcommand {
        ProgramSubcommand::SplitWeights(args) => SplitWeightEstimator::new(args).run(),
    };

    if let Err(err) = result {
        error!("{:#}", err);
        std::process::exit(1);
    }
}
