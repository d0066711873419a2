//! The linear map `A` from circular split weights to the circular metric they induce,
//! its adjoint, and its inverse, each in O(n²) without forming the design matrix.
//!
//! For `1 ≤ i < j ≤ n`, `x[[i, j]]` is the weight of the split separating positions
//! `{i, …, j-1}` from the rest of the cycle.

use ndarray::Array2;

use crate::weights::square_array::{dimension, sum_subvector};

/// `y = A x`: distances between circular positions induced by split weights `x`.
///
/// Gap-1 distances are partial row sums of `x`; larger gaps follow
/// `y[i][j] = y[i][j-1] + y[i+1][j] - y[i+1][j-1] - 2 x[i+1][j]`.
pub fn calc_ax(x: &Array2<f64>, y: &mut Array2<f64>) {
    let n = dimension(x);
    debug_assert_eq!(x.dim(), y.dim());

    for i in 1..n {
        let row = x.row(i + 1);
        let v = sum_subvector(row, i + 1, n) + sum_subvector(row, 1, i);
        y[[i, i + 1]] = v;
        y[[i + 1, i]] = v;
    }

    for i in 1..n.saturating_sub(1) {
        let v = y[[i, i + 1]] + y[[i + 1, i + 2]] - 2.0 * x[[i + 1, i + 2]];
        y[[i, i + 2]] = v;
        y[[i + 2, i]] = v;
    }

    for k in 3..n {
        for i in 1..=(n - k) {
            let j = i + k;
            let v = y[[i, j - 1]] + y[[i + 1, j]] - y[[i + 1, j - 1]] - 2.0 * x[[i + 1, j]];
            y[[i, j]] = v;
            y[[j, i]] = v;
        }
    }
}

/// `y = Aᵗ r`: adjoint of [`calc_ax`] with respect to the inner product over `i < j`.
pub fn calc_atx(r: &Array2<f64>, y: &mut Array2<f64>) {
    let n = dimension(r);
    debug_assert_eq!(r.dim(), y.dim());

    for i in 1..n {
        let v = sum_subvector(r.row(i), 1, n);
        y[[i, i + 1]] = v;
        y[[i + 1, i]] = v;
    }

    for i in 1..n.saturating_sub(1) {
        let v = y[[i, i + 1]] + y[[i + 1, i + 2]] - 2.0 * r[[i, i + 1]];
        y[[i, i + 2]] = v;
        y[[i + 2, i]] = v;
    }

    for k in 3..n {
        for i in 1..=(n - k) {
            let j = i + k;
            let v = y[[i, j - 1]] + y[[i + 1, j]] - y[[i + 1, j - 1]] - 2.0 * r[[i, j - 1]];
            y[[i, j]] = v;
            y[[j, i]] = v;
        }
    }
}

/// `x = A⁻¹ y`: the unconstrained split weights reproducing a circular metric exactly.
///
/// `x[i][j] = (y[i-1][j-1] + y[i][j] - y[i-1][j] - y[i][j-1]) / 2`, reading position 0
/// as position n and using `y[k][k] = 0`.
pub fn calc_ainv_y(y: &Array2<f64>, x: &mut Array2<f64>) {
    let n = dimension(y);
    assert!(n >= 2, "n must be >= 2");
    debug_assert_eq!(x.dim(), y.dim());

    for i in 1..=n {
        let prev = if i == 1 { n } else { i - 1 };
        for j in (i + 1)..=n {
            let v = (y[[prev, j - 1]] + y[[i, j]] - y[[prev, j]] - y[[i, j - 1]]) / 2.0;
            x[[i, j]] = v;
            x[[j, i]] = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::square_array::{ones, zeros};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_symmetric(n: usize, rng: &mut StdRng) -> Array2<f64> {
        let mut a = zeros(n);
        for i in 1..=n {
            for j in (i + 1)..=n {
                let v = rng.gen_range(-1.0..1.0);
                a[[i, j]] = v;
                a[[j, i]] = v;
            }
        }
        a
    }

    fn upper_dot(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
        let n = dimension(a);
        let mut s = 0.0;
        for i in 1..=n {
            for j in (i + 1)..=n {
                s += a[[i, j]] * b[[i, j]];
            }
        }
        s
    }

    #[test]
    fn single_trivial_split_separates_one_position() {
        // x[2][3] is the split {2} | rest.
        let n = 5;
        let mut x = zeros(n);
        x[[2, 3]] = 1.5;
        x[[3, 2]] = 1.5;
        let mut y = zeros(n);
        calc_ax(&x, &mut y);
        for i in 1..=n {
            for j in (i + 1)..=n {
                let expected = if i == 2 || j == 2 { 1.5 } else { 0.0 };
                assert!((y[[i, j]] - expected).abs() < 1e-12, "d({},{})={}", i, j, y[[i, j]]);
            }
        }
    }

    #[test]
    fn uniform_weights_give_arc_product_metric() {
        // With every split weight one, d(i,j) = k (n - k) where k = j - i.
        let n = 7;
        let x = ones(n);
        let mut y = zeros(n);
        calc_ax(&x, &mut y);
        for i in 1..=n {
            for j in (i + 1)..=n {
                let k = (j - i) as f64;
                assert!((y[[i, j]] - k * (n as f64 - k)).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn adjoint_identity_holds_for_random_arrays() {
        let mut rng = StdRng::seed_from_u64(17);
        for &n in &[3usize, 4, 6, 11, 20] {
            let u = random_symmetric(n, &mut rng);
            let v = random_symmetric(n, &mut rng);
            let mut au = zeros(n);
            let mut atv = zeros(n);
            calc_ax(&u, &mut au);
            calc_atx(&v, &mut atv);
            let lhs = upper_dot(&au, &v);
            let rhs = upper_dot(&u, &atv);
            assert!(
                (lhs - rhs).abs() < 1e-9 * (1.0 + lhs.abs()),
                "n={n}: <Au,v>={lhs} <u,Atv>={rhs}"
            );
        }
    }

    #[test]
    fn inverse_recovers_random_weights() {
        let mut rng = StdRng::seed_from_u64(5);
        for &n in &[3usize, 5, 9] {
            let x = random_symmetric(n, &mut rng);
            let mut y = zeros(n);
            calc_ax(&x, &mut y);
            let mut back = zeros(n);
            calc_ainv_y(&y, &mut back);
            for i in 1..=n {
                for j in (i + 1)..=n {
                    assert!((back[[i, j]] - x[[i, j]]).abs() < 1e-10);
                }
            }
        }
    }

    #[test]
    fn operator_is_pure() {
        let mut rng = StdRng::seed_from_u64(99);
        let x = random_symmetric(8, &mut rng);
        let mut y1 = zeros(8);
        let mut y2 = zeros(8);
        calc_ax(&x, &mut y1);
        calc_ax(&x, &mut y2);
        assert_eq!(y1, y2);
    }
}
