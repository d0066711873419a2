//! Dense symmetric square arrays indexed from 1.
//!
//! Every array used by the solver has shape `(n+1) × (n+1)`: row and column `0` are
//! never read, so the circular recurrences can be written with the same 1-based
//! positions as the published algorithm. Element-wise updates go through
//! `ndarray::Zip::par_for_each`; reductions stay sequential so results do not depend
//! on the rayon pool size.

use ndarray::{Array2, ArrayView1, Zip};

/// Pinned-to-zero flags, same shape as the weight arrays.
pub type ActiveSet = Array2<bool>;

/// Number of taxa represented by a `(n+1) × (n+1)` array.
#[inline]
pub fn dimension<T>(a: &Array2<T>) -> usize {
    let (rows, cols) = a.dim();
    assert_eq!(rows, cols, "square array expected, got {}x{}", rows, cols);
    assert!(rows >= 1, "square array must keep the unused row 0");
    rows - 1
}

pub fn zeros(n: usize) -> Array2<f64> {
    Array2::zeros((n + 1, n + 1))
}

/// All off-diagonal entries in `1..=n` set to one.
pub fn ones(n: usize) -> Array2<f64> {
    let mut a = zeros(n);
    for i in 1..=n {
        for j in 1..=n {
            if i != j {
                a[[i, j]] = 1.0;
            }
        }
    }
    a
}

/// Re-index a 0-based taxon distance matrix by circular position.
///
/// `cycle` is 1-based with a leading `0` sentinel: position `i` holds taxon `cycle[i]`,
/// which is row `cycle[i] - 1` of `distances`.
pub fn from_cycle(cycle: &[usize], distances: &Array2<f64>) -> Array2<f64> {
    let n = cycle.len() - 1;
    let mut d = zeros(n);
    for i in 1..=n {
        for j in (i + 1)..=n {
            let v = distances[[cycle[i] - 1, cycle[j] - 1]];
            d[[i, j]] = v;
            d[[j, i]] = v;
        }
    }
    d
}

/// Sum of `v[from..=to]`, accumulated left to right.
#[inline]
pub fn sum_subvector(v: ArrayView1<f64>, from: usize, to: usize) -> f64 {
    let mut s = 0.0;
    for k in from..=to {
        s += v[k];
    }
    s
}

/// Squared Frobenius norm over `1..=n × 1..=n`; each row is summed before it is added.
pub fn sum_array_squared(a: &Array2<f64>) -> f64 {
    let n = dimension(a);
    let mut total = 0.0;
    for i in 1..=n {
        let mut s_i = 0.0;
        for j in 1..=n {
            let a_ij = a[[i, j]];
            s_i += a_ij * a_ij;
        }
        total += s_i;
    }
    total
}

/// Frobenius distance `‖a − b‖` over `1..=n × 1..=n`.
pub fn fro_dist(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    let n = dimension(a);
    assert_eq!(n, dimension(b), "fro_dist on arrays of different size");
    let mut total = 0.0;
    for i in 1..=n {
        let mut s_i = 0.0;
        for j in 1..=n {
            let diff = a[[i, j]] - b[[i, j]];
            s_i += diff * diff;
        }
        total += s_i;
    }
    total.sqrt()
}

/// Smallest entry of the strict upper triangle. `+∞` when `n < 2`.
pub fn min_array(a: &Array2<f64>) -> f64 {
    let n = dimension(a);
    let mut m = f64::INFINITY;
    for i in 1..=n {
        for j in (i + 1)..=n {
            m = m.min(a[[i, j]]);
        }
    }
    m
}

/// Zero every entry flagged in `active`.
pub fn mask_elements(a: &mut Array2<f64>, active: &ActiveSet) {
    Zip::from(a).and(active).par_for_each(|a_ij, &pinned| {
        if pinned {
            *a_ij = 0.0;
        }
    });
}

/// Clip negative entries to zero.
pub fn zero_negative_entries(a: &mut Array2<f64>) {
    a.par_mapv_inplace(|v| if v < 0.0 { 0.0 } else { v });
}

/// Active set implied by `x`: every entry that is not strictly positive.
pub fn get_zero_elements(x: &Array2<f64>) -> ActiveSet {
    let mut active = ActiveSet::from_elem(x.dim(), false);
    update_zero_elements(x, &mut active);
    active
}

/// Overwrite `active` with the zero pattern of `x`.
pub fn update_zero_elements(x: &Array2<f64>, active: &mut ActiveSet) {
    Zip::from(active)
        .and(x)
        .par_for_each(|pinned, &x_ij| *pinned = x_ij <= 0.0);
}

/// Number of pinned entries in the strict upper triangle.
pub fn count_active(active: &ActiveSet) -> usize {
    let n = dimension(active);
    let mut count = 0;
    for i in 1..=n {
        for j in (i + 1)..=n {
            if active[[i, j]] {
                count += 1;
            }
        }
    }
    count
}
