use clap::{Args, Parser, Subcommand};

use crate::weights::nnls::NNLSParams;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct ProgramArgs {
    #[command(subcommand)]
    pub subcommand: ProgramSubcommand,
    #[arg(
        short,
        long,
        default_value = "1",
        global = true,
        help = "Number of threads to use."
    )]
    pub threads: usize,
    #[arg(
        short,
        long,
        default_value = "false",
        conflicts_with = "quiet",
        global = true
    )]
    pub verbose: bool,
    #[arg(
        short,
        long,
        default_value = "false",
        conflicts_with = "verbose",
        global = true
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum ProgramSubcommand {
    #[clap(
        name = "split-weights",
        about = "Estimate non-negative circular split weights for a fixed cycle"
    )]
    SplitWeights(SplitWeightsArgs),
}

#[derive(Args, Debug)]
pub struct SplitWeightsArgs {
    #[arg(short, long, help = "Input distance matrix file path", required = true)]
    pub input: String,
    #[arg(
        short,
        long,
        help = "Circular ordering: a file or a comma separated list of labels or 1-based taxon numbers [default: input order]"
    )]
    pub cycle: Option<String>,
    #[arg(long, help = "Print the result as JSON")]
    pub json: bool,
    #[clap(flatten)]
    pub nnls_params: NNLSParams,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::InferenceMethod;

    #[test]
    fn parses_split_weights_flags() {
        let args = ProgramArgs::try_parse_from([
            "fast_nnls",
            "split-weights",
            "-i",
            "d.csv",
            "--cycle",
            "A,B,C",
            "--method",
            "active-set",
            "--tolerance",
            "1e-8",
            "--outer-iterations",
            "50",
            "-v",
        ])
        .unwrap();
        assert!(args.verbose);
        let ProgramSubcommand::SplitWeights(sw) = args.subcommand;
        assert_eq!(sw.input, "d.csv");
        assert_eq!(sw.cycle.as_deref(), Some("A,B,C"));
        assert_eq!(sw.nnls_params.method, InferenceMethod::ActiveSet);
        assert_eq!(sw.nnls_params.tolerance, 1e-8);
        assert_eq!(sw.nnls_params.outer_iterations, Some(50));
        assert_eq!(sw.nnls_params.cg_iterations, None);
    }

    #[test]
    fn defaults_match_library_defaults() {
        let args = ProgramArgs::try_parse_from(["fast_nnls", "split-weights", "-i", "d.csv"]).unwrap();
        let ProgramSubcommand::SplitWeights(sw) = args.subcommand;
        let lib = NNLSParams::default();
        assert_eq!(sw.nnls_params.method, lib.method);
        assert_eq!(sw.nnls_params.tolerance, lib.tolerance);
        assert_eq!(sw.nnls_params.initial_weights, lib.initial_weights);
        assert_eq!(sw.nnls_params.fraction_negative_to_keep, lib.fraction_negative_to_keep);
        assert!(!sw.nnls_params.greedy && !sw.nnls_params.collapse_multiple);
        assert!(!sw.json);
    }

    #[test]
    fn verbose_conflicts_with_quiet() {
        assert!(
            ProgramArgs::try_parse_from(["fast_nnls", "split-weights", "-i", "d", "-v", "-q"]).is_err()
        );
    }
}
