pub mod cgnr;
pub mod circular_operator;
pub mod feasibility;
pub mod kkt;
pub mod negative_filter;
pub mod nnls;
pub mod square_array;

use clap::ValueEnum;

/// How constraints are released once a face is optimal, and how infeasible CGNR
/// steps are repaired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum InferenceMethod {
    /// Golden-section search along the projected path; release all KKT violators.
    #[value(aliases = ["gradient-projection", "projgrad"])]
    ProjectedGradient,
    /// Furthest feasible point on the path; release the worst KKT violator.
    #[value(alias = "activeset")]
    ActiveSet,
}

impl InferenceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceMethod::ProjectedGradient => "projected-gradient",
            InferenceMethod::ActiveSet => "active-set",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "projected-gradient" | "projected_gradient" | "gradient-projection"
            | "GradientProjection" | "projgrad" => InferenceMethod::ProjectedGradient,
            "active-set" | "active_set" | "activeset" | "ActiveSet" => InferenceMethod::ActiveSet,
            _ => InferenceMethod::default(),
        }
    }

    pub fn from_option(opt: Option<&str>) -> Self {
        opt.map_or_else(InferenceMethod::default, InferenceMethod::from_str)
    }
}

impl Default for InferenceMethod {
    fn default() -> Self {
        InferenceMethod::ProjectedGradient
    }
}

/// Starting point for the optimisation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum InitialWeights {
    /// Unconstrained least-squares solution with negative weights clipped to zero.
    Unconstrained,
    /// Every split weight set to one.
    Ones,
}

impl InitialWeights {
    pub fn as_str(&self) -> &'static str {
        match self {
            InitialWeights::Unconstrained => "unconstrained",
            InitialWeights::Ones => "ones",
        }
    }
}

impl Default for InitialWeights {
    fn default() -> Self {
        InitialWeights::Unconstrained
    }
}
