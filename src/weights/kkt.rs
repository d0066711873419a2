use log::trace;
use ndarray::{Array2, Zip};

use crate::weights::circular_operator::{calc_ax, calc_atx};
use crate::weights::square_array::{dimension, zeros, ActiveSet};
use crate::weights::InferenceMethod;

/// Gradient of `½‖A x − d‖²` at `x`, i.e. `Aᵗ(A x − d)`.
pub fn eval_gradient(x: &Array2<f64>, d: &Array2<f64>) -> Array2<f64> {
    let n = dimension(x);
    let mut residual = zeros(n);
    calc_ax(x, &mut residual);
    Zip::from(&mut residual)
        .and(d)
        .par_for_each(|r_ij, &d_ij| *r_ij -= d_ij);
    let mut gradient = zeros(n);
    calc_atx(&residual, &mut gradient);
    gradient
}

/// Check the KKT conditions at `x`, assuming `x` is optimal on the face given by
/// `active_set` (so `active_set[i][j]` implies `x[i][j] == 0`).
///
/// Returns `true` when no pinned weight has a gradient below `-kkt_bound`. Otherwise
/// releases constraints and returns `false`: only the most violating one for
/// [`InferenceMethod::ActiveSet`], every violator for
/// [`InferenceMethod::ProjectedGradient`].
pub fn check_kkt(
    x: &Array2<f64>,
    d: &Array2<f64>,
    active_set: &mut ActiveSet,
    method: InferenceMethod,
    kkt_bound: f64,
) -> bool {
    let n = dimension(x);
    let gradient = eval_gradient(x, d);

    let mut min_grad = 0.0;
    let (mut min_i, mut min_j) = (0usize, 0usize);
    for i in 1..=n {
        for j in (i + 1)..=n {
            let grad_ij = gradient[[i, j]];
            if active_set[[i, j]] && grad_ij < min_grad {
                min_grad = grad_ij;
                min_i = i;
                min_j = j;
            }
        }
    }
    if min_grad >= -kkt_bound {
        return true;
    }

    match method {
        InferenceMethod::ActiveSet => {
            active_set[[min_i, min_j]] = false;
            active_set[[min_j, min_i]] = false;
            trace!("Released ({}, {}) with gradient {:e}", min_i, min_j, min_grad);
        }
        InferenceMethod::ProjectedGradient => {
            let mut released = 0usize;
            for i in 1..=n {
                for j in (i + 1)..=n {
                    if active_set[[i, j]] && gradient[[i, j]] < -kkt_bound {
                        active_set[[i, j]] = false;
                        active_set[[j, i]] = false;
                        released += 1;
                    }
                }
            }
            trace!("Released {} constraints, worst gradient {:e}", released, min_grad);
        }
    }
    false
}
