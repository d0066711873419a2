use ndarray::{Array2, Zip};

use crate::weights::circular_operator::{calc_ax, calc_atx};
use crate::weights::square_array::{dimension, mask_elements, sum_array_squared, zeros, ActiveSet};

struct Scratch {
    p: Array2<f64>,
    r: Array2<f64>,
    z: Array2<f64>,
    w: Array2<f64>,
}

impl Scratch {
    fn new(n: usize) -> Self {
        Self {
            p: zeros(n),
            r: zeros(n),
            z: zeros(n),
            w: zeros(n),
        }
    }
}

/// Conjugate gradients on the normal equations (CGNR, Saad §8.3) for
/// `min ‖A x − d‖` subject to `x[i][j] = 0` wherever `active_set[i][j]`.
///
/// `x` is the starting point and is overwritten with the face solution, which may
/// have negative entries. Stops when the squared norm of the masked gradient drops
/// below `tol` or after `max_iterations` steps.
///
/// Returns `true` if the method converged before the iteration cap.
pub fn cgnr(
    x: &mut Array2<f64>,
    d: &Array2<f64>,
    active_set: &ActiveSet,
    tol: f64,
    max_iterations: usize,
) -> bool {
    let n = dimension(x);
    let Scratch {
        mut p,
        mut r,
        mut z,
        mut w,
    } = Scratch::new(n);

    // r = d - A x
    calc_ax(x, &mut r);
    Zip::from(&mut r)
        .and(d)
        .par_for_each(|r_ij, &d_ij| *r_ij = d_ij - *r_ij);

    // z = mask(Aᵗ r)
    calc_atx(&r, &mut z);
    mask_elements(&mut z, active_set);
    p.assign(&z);
    let mut ztz = sum_array_squared(&z);

    // Exactly stationary on this face; a step would be 0/0.
    if ztz == 0.0 {
        return true;
    }

    let mut k = 1usize;
    loop {
        calc_ax(&p, &mut w);
        let alpha = ztz / sum_array_squared(&w);

        Zip::from(&mut *x)
            .and(&p)
            .par_for_each(|x_ij, &p_ij| *x_ij += alpha * p_ij);
        Zip::from(&mut r)
            .and(&w)
            .par_for_each(|r_ij, &w_ij| *r_ij -= alpha * w_ij);

        calc_atx(&r, &mut z);
        mask_elements(&mut z, active_set);
        let ztz2 = sum_array_squared(&z);

        if ztz2 < tol || k >= max_iterations {
            break;
        }

        let beta = ztz2 / ztz;
        Zip::from(&mut p)
            .and(&z)
            .par_for_each(|p_ij, &z_ij| *p_ij = z_ij + beta * *p_ij);
        ztz = ztz2;
        k += 1;
    }

    k < max_iterations
}
