//! Restoring non-negativity after an unconstrained face solve.
//!
//! Both strategies look along the segment from the previous feasible iterate `x0` to
//! the infeasible CGNR result `x` and overwrite `x` with a feasible point on (or
//! projected from) that segment.

use ndarray::{Array2, Zip};

use crate::weights::circular_operator::calc_ax;
use crate::weights::square_array::{dimension, fro_dist, zeros};

/// Minimise `‖A π((1−t) x0 + t x) − d‖` over `t ∈ [0, 1]` by golden-section search,
/// where `π` clips negative entries to zero, and store the minimising point in `x`.
///
/// When the search ends on the left boundary bracket, `t = 0` is evaluated as well
/// and chosen if it ties or beats the best interior point, so that a minimum at the
/// boundary returns `x0` exactly.
pub fn golden_projection(x: &mut Array2<f64>, x0: &Array2<f64>, d: &Array2<f64>, tolerance: f64) {
    let c = (3.0 - 5f64.sqrt()) / 2.0;
    let r = 1.0 - c;

    let mut eval = ProjectedObjective::new(x0, x, d);

    let mut t0: f64 = 0.0;
    let mut t1 = c;
    let mut t2 = c + c * (1.0 - c);
    let mut t3: f64 = 1.0;
    let mut f1 = eval.at(t1);
    let mut f2 = eval.at(t2);

    while (t3 - t0).abs() > tolerance {
        if f2 < f1 {
            t0 = t1;
            t1 = t2;
            t2 = r * t1 + c * t3;
            f1 = f2;
            f2 = eval.at(t2);
        } else {
            t3 = t2;
            t2 = t1;
            t1 = r * t2 + c * t0;
            f2 = f1;
            f1 = eval.at(t1);
        }
    }

    let mut tmin = t1;
    if f2 < f1 {
        tmin = t2;
    } else if t0 == 0.0 {
        let f0 = eval.at(t0);
        if f0 <= f1 {
            tmin = t0;
        }
    }

    Zip::from(&mut *x).and(x0).par_for_each(|x_ij, &x0_ij| {
        *x_ij = ((1.0 - tmin) * x0_ij + tmin * *x_ij).max(0.0);
    });
}

/// Move `x` to the point on the segment from `x0` that is furthest from `x0` while
/// staying non-negative (a ratio test), then snap entries below `tolerance` to zero.
pub fn furthest_feasible(x: &mut Array2<f64>, x0: &Array2<f64>, tolerance: f64) {
    let n = dimension(x);
    let mut tmin = 1.0f64;
    for i in 1..=n {
        for j in 1..=n {
            let x_ij = x[[i, j]];
            if x_ij < 0.0 {
                let x0_ij = x0[[i, j]];
                tmin = tmin.min(x0_ij / (x0_ij - x_ij));
            }
        }
    }

    for i in 1..=n {
        for j in (i + 1)..=n {
            let mut x_ij = (1.0 - tmin) * x0[[i, j]] + tmin * x[[i, j]];
            if x_ij < tolerance {
                x_ij = 0.0;
            }
            x[[i, j]] = x_ij;
            x[[j, i]] = x_ij;
        }
    }
}

/// `t ↦ ‖A π((1−t) x0 + t x) − d‖` with reusable buffers.
struct ProjectedObjective<'a> {
    x0: &'a Array2<f64>,
    x: &'a Array2<f64>,
    d: &'a Array2<f64>,
    xt: Array2<f64>,
    axt: Array2<f64>,
}

impl<'a> ProjectedObjective<'a> {
    fn new(x0: &'a Array2<f64>, x: &'a Array2<f64>, d: &'a Array2<f64>) -> Self {
        let n = dimension(x);
        Self {
            x0,
            x,
            d,
            xt: zeros(n),
            axt: zeros(n),
        }
    }

    fn at(&mut self, t: f64) -> f64 {
        Zip::from(&mut self.xt)
            .and(self.x0)
            .and(self.x)
            .par_for_each(|xt_ij, &x0_ij, &x_ij| *xt_ij = (x0_ij * (1.0 - t) + x_ij * t).max(0.0));
        calc_ax(&self.xt, &mut self.axt);
        fro_dist(&self.axt, self.d)
    }
}
