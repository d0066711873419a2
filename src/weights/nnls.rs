//! Non-negative least squares estimation of circular split weights.
//!
//! Given a circular ordering and a distance matrix, finds split weights `x ≥ 0`
//! minimising `‖A x − d‖`, where `A` maps weights to the induced circular metric.
//! Each outer iteration optimises over one face of the feasible cone with CGNR,
//! repairs infeasible steps, and checks the KKT conditions before releasing
//! constraints.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::Args;
use fixedbitset::FixedBitSet;
use log::{debug, warn};
use ndarray::Array2;
use thiserror::Error;

use crate::splits::asplit::ASplit;
use crate::weights::cgnr::cgnr;
use crate::weights::circular_operator::{calc_ainv_y, calc_ax};
use crate::weights::feasibility::{furthest_feasible, golden_projection};
use crate::weights::kkt::check_kkt;
use crate::weights::negative_filter::filter_most_negative;
use crate::weights::square_array::{
    count_active, dimension, fro_dist, from_cycle, get_zero_elements, min_array, ones,
    update_zero_elements, zero_negative_entries, zeros, ActiveSet,
};
use crate::weights::{InferenceMethod, InitialWeights};

/// Cooperative cancellation and progress reporting.
pub trait Progress {
    /// Return an error (usually [`Canceled`]) to abort the computation.
    fn check_for_cancel(&self) -> Result<()>;

    fn report(&self, _iteration: usize, _max_iterations: usize) {}
}

#[derive(Debug, Error)]
#[error("split weight estimation was canceled")]
pub struct Canceled;

/// A [`Progress`] that cancels once [`CancelFlag::cancel`] has been called, from any thread.
#[derive(Debug, Default)]
pub struct CancelFlag {
    canceled: AtomicBool,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Relaxed)
    }
}

impl Progress for CancelFlag {
    fn check_for_cancel(&self) -> Result<()> {
        if self.is_canceled() {
            Err(Canceled.into())
        } else {
            Ok(())
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct NNLSParams {
    /// Constraint release and feasibility repair strategy.
    #[arg(long, value_enum, default_value = "projected-gradient")]
    pub method: InferenceMethod,
    /// Approximate tolerance in split weights.
    #[arg(long, default_value = "1e-6")]
    pub tolerance: f64,
    /// Stop at the first optimal face without checking the KKT conditions.
    #[arg(long)]
    pub greedy: bool,
    /// Starting point for the optimisation.
    #[arg(long, value_enum, default_value = "unconstrained")]
    pub initial_weights: InitialWeights,
    /// Max CGNR iterations per face [default: max(n, 10)].
    #[arg(long)]
    pub cg_iterations: Option<usize>,
    /// Max outer iterations [default: max(n, 10)].
    #[arg(long)]
    pub outer_iterations: Option<usize>,
    /// Pin a batch of the most negative weights after each CGNR solve (SplitsTree4 behaviour).
    #[arg(long)]
    pub collapse_multiple: bool,
    /// Fraction of negative weights left free by --collapse-multiple.
    #[arg(long, default_value = "0.4")]
    pub fraction_negative_to_keep: f64,
    /// Largest tolerated KKT violation [default: tolerance / 100].
    #[arg(long)]
    pub kkt_bound: Option<f64>,
    /// Report only splits with weight above this [default: tolerance / 10].
    #[arg(long)]
    pub cutoff: Option<f64>,
}

impl Default for NNLSParams {
    fn default() -> Self {
        Self {
            method: InferenceMethod::ProjectedGradient,
            tolerance: 1e-6,
            greedy: false,
            initial_weights: InitialWeights::Unconstrained,
            cg_iterations: None,
            outer_iterations: None,
            collapse_multiple: false,
            fraction_negative_to_keep: 0.4,
            kkt_bound: None,
            cutoff: None,
        }
    }
}

impl NNLSParams {
    pub fn cg_iterations_for(&self, ntax: usize) -> usize {
        self.cg_iterations.unwrap_or_else(|| ntax.max(10))
    }

    pub fn outer_iterations_for(&self, ntax: usize) -> usize {
        self.outer_iterations.unwrap_or_else(|| ntax.max(10))
    }

    pub fn effective_kkt_bound(&self) -> f64 {
        self.kkt_bound.unwrap_or(self.tolerance / 100.0)
    }

    pub fn effective_cutoff(&self) -> f64 {
        self.cutoff.unwrap_or(self.tolerance / 10.0)
    }

    fn validate(&self) {
        assert!(
            self.tolerance > 0.0 && self.tolerance.is_finite(),
            "tolerance must be positive and finite (got {})",
            self.tolerance
        );
        assert!(
            (0.0..=1.0).contains(&self.fraction_negative_to_keep),
            "fraction_negative_to_keep must lie in [0, 1] (got {})",
            self.fraction_negative_to_keep
        );
        assert!(
            self.effective_kkt_bound() >= 0.0,
            "kkt_bound must be non-negative"
        );
        assert!(self.effective_cutoff() >= 0.0, "cutoff must be non-negative");
        assert!(
            self.cg_iterations != Some(0) && self.outer_iterations != Some(0),
            "iteration caps must be at least 1"
        );
    }
}

/// Result of a split weight estimation.
#[derive(Clone, Debug)]
pub struct SplitWeights {
    /// Splits with weight above the cutoff, ordered by their position in the cycle.
    pub splits: Vec<ASplit>,
    /// `false` when the outer iteration cap was hit; the weights are still the best found.
    pub converged: bool,
    /// Outer iterations used (0 when no optimisation was needed).
    pub iterations: usize,
    /// `‖A x − d‖` at the returned weights, before the cutoff is applied.
    pub objective: f64,
}

struct FitOutcome {
    converged: bool,
    iterations: usize,
}

/// Estimate split weights and return only the splits.
pub fn compute_asplits(
    cycle: &[usize],
    distances: &Array2<f64>,
    params: &NNLSParams,
    progress: Option<&dyn Progress>,
) -> Result<Vec<ASplit>> {
    Ok(compute_splits(cycle, distances, params, progress)?.splits)
}

/// Estimate non-negative weights for all circular splits of `cycle`.
///
/// - `cycle`: circular order, 1-based with a leading `0` sentinel (`cycle.len() == n + 1`)
/// - `distances`: symmetric `n×n` matrix indexed by 0-based taxon id
///
/// Panics if the inputs are inconsistent. Returns an error only when `progress`
/// cancels the computation.
pub fn compute_splits(
    cycle: &[usize],
    distances: &Array2<f64>,
    params: &NNLSParams,
    progress: Option<&dyn Progress>,
) -> Result<SplitWeights> {
    validate_inputs(cycle, distances);
    params.validate();

    let n = cycle.len() - 1;
    if n <= 1 {
        return Ok(SplitWeights {
            splits: Vec::new(),
            converged: true,
            iterations: 0,
            objective: 0.0,
        });
    }
    if n == 2 {
        let d_12 = distances[[cycle[1] - 1, cycle[2] - 1]];
        let mut splits = Vec::new();
        if d_12 > 0.0 {
            let mut a = FixedBitSet::with_capacity(n + 1);
            a.insert(cycle[1]);
            splits.push(ASplit::from_a_ntax_with_weight(a, n, d_12));
        }
        return Ok(SplitWeights {
            splits,
            converged: true,
            iterations: 0,
            objective: 0.0,
        });
    }

    let d = from_cycle(cycle, distances);

    let (mut x, outcome) = match params.initial_weights {
        InitialWeights::Unconstrained => {
            let mut x = zeros(n);
            calc_ainv_y(&d, &mut x);
            if min_array(&x) >= 0.0 {
                debug!("Unconstrained solution is non-negative; no optimisation needed");
                let done = FitOutcome {
                    converged: true,
                    iterations: 0,
                };
                (x, Some(done))
            } else {
                zero_negative_entries(&mut x);
                (x, None)
            }
        }
        InitialWeights::Ones => (ones(n), None),
    };

    let outcome = match outcome {
        Some(done) => done,
        None => optimize_fit(&mut x, &d, params, progress)?,
    };
    let objective = eval_f(&x, &d);

    let cutoff = params.effective_cutoff();
    let mut splits = Vec::new();
    for i in 1..=n {
        let mut a = FixedBitSet::with_capacity(n + 1);
        for j in (i + 1)..=n {
            a.insert(cycle[j - 1]);
            if x[[i, j]] > cutoff {
                splits.push(ASplit::from_a_ntax_with_weight(a.clone(), n, x[[i, j]]));
            }
        }
    }

    Ok(SplitWeights {
        splits,
        converged: outcome.converged,
        iterations: outcome.iterations,
        objective,
    })
}

fn validate_inputs(cycle: &[usize], distances: &Array2<f64>) {
    assert!(
        cycle.first() == Some(&0),
        "cycle must be 1-based with a leading 0 sentinel"
    );
    let n = cycle.len() - 1;
    let (rows, cols) = distances.dim();
    assert_eq!(rows, cols, "distance matrix must be square (got {}x{})", rows, cols);
    assert_eq!(
        rows, n,
        "cycle covers {} taxa but the distance matrix is {}x{}",
        n, rows, cols
    );
    let mut seen = FixedBitSet::with_capacity(n + 1);
    for &t in &cycle[1..] {
        assert!(
            (1..=n).contains(&t),
            "taxon {} in cycle is outside 1..={}",
            t,
            n
        );
        assert!(!seen.put(t), "taxon {} appears twice in cycle", t);
    }
}

fn optimize_fit(
    x: &mut Array2<f64>,
    d: &Array2<f64>,
    params: &NNLSParams,
    progress: Option<&dyn Progress>,
) -> Result<FitOutcome> {
    let n = dimension(x);
    let outer_iterations = params.outer_iterations_for(n);
    let kkt_bound = params.effective_kkt_bound();

    let mut fx_old = eval_f(x, d);
    let mut active_set = get_zero_elements(x);

    for k in 1..=outer_iterations {
        let optimal_for_face = search_face(x, d, &mut active_set, params);
        let fx = eval_f(x, d);
        debug!(
            "Outer iteration {}: objective {:.9}, {} active, face optimal: {}",
            k,
            fx,
            count_active(&active_set),
            optimal_for_face
        );

        if optimal_for_face || fx_old - fx < params.tolerance {
            if params.greedy {
                return Ok(FitOutcome {
                    converged: true,
                    iterations: k,
                });
            }
            if check_kkt(x, d, &mut active_set, params.method, kkt_bound) {
                debug!("KKT conditions satisfied after {} outer iterations", k);
                return Ok(FitOutcome {
                    converged: true,
                    iterations: k,
                });
            }
        }
        fx_old = fx;

        if let Some(pl) = progress {
            pl.report(k, outer_iterations);
            pl.check_for_cancel()?;
        }
    }

    warn!(
        "NNLS algorithm failed to converge within {} outer iterations",
        outer_iterations
    );
    Ok(FitOutcome {
        converged: false,
        iterations: outer_iterations,
    })
}

/// Minimise `‖A x − d‖` on the face where pinned weights are zero, then step back
/// into the feasible region if the solution went negative.
///
/// Returns `true` if `x` ends as the (approximate) minimiser of the current face;
/// `false` when a repair moved `x` and rebuilt the active set.
fn search_face(
    x: &mut Array2<f64>,
    d: &Array2<f64>,
    active_set: &mut ActiveSet,
    params: &NNLSParams,
) -> bool {
    let n = dimension(x);
    let cg_iterations = params.cg_iterations_for(n);
    let x0 = x.clone();

    let mut cg_converged = cgnr(x, d, active_set, params.tolerance, cg_iterations);
    if params.collapse_multiple {
        filter_most_negative(x, active_set, params.fraction_negative_to_keep);
        cg_converged = cgnr(x, d, active_set, params.tolerance, cg_iterations);
    }

    if min_array(x) < 0.0 {
        match params.method {
            InferenceMethod::ProjectedGradient => golden_projection(x, &x0, d, params.tolerance),
            InferenceMethod::ActiveSet => furthest_feasible(x, &x0, params.tolerance),
        }
        update_zero_elements(x, active_set);
        false
    } else {
        cg_converged
    }
}

/// `‖A x − d‖`
fn eval_f(x: &Array2<f64>, d: &Array2<f64>) -> f64 {
    let mut ax = zeros(dimension(x));
    calc_ax(x, &mut ax);
    fro_dist(&ax, d)
}
