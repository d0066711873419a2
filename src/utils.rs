use crate::splits::asplit::ASplit;
use ndarray::Array2;
use rayon::prelude::*;

/// Distances induced by a split system: `s_ij = Σ w` over the splits separating `i` and `j`.
/// The result is 0-based (`taxon t` → row `t-1`).
pub fn induced_distances(ntax: usize, splits: &[ASplit]) -> Array2<f64> {
    splits
        .par_iter()
        .map(|s| {
            let mut m = Array2::<f64>::zeros((ntax, ntax));
            let w = s.get_weight();
            for i1 in s.get_a().ones().filter(|&t| t != 0 && t <= ntax) {
                for j1 in s.get_b().ones().filter(|&t| t != 0 && t <= ntax) {
                    m[[i1 - 1, j1 - 1]] += w;
                    m[[j1 - 1, i1 - 1]] += w;
                }
            }
            m
        })
        .reduce(
            || Array2::<f64>::zeros((ntax, ntax)),
            |mut acc, m| {
                acc.zip_mut_with(&m, |a, b| *a += *b);
                acc
            },
        )
}

/// Least-squares fit of the splits to the distances, as a percentage:
/// `100 * (1 - Σ (s_ij - d_ij)² / Σ d_ij²)` over `i < j`. Zero when every distance is zero.
pub fn compute_least_squares_fit(distances: &Array2<f64>, splits: &[ASplit]) -> f64 {
    let n = distances.nrows();
    assert_eq!(n, distances.ncols(), "distances must be square");
    if n < 2 {
        return 0.0;
    }

    let split_dist = induced_distances(n, splits);

    let (sum_diff_sq, sum_d_sq) = (0..n - 1)
        .into_par_iter()
        .map(|i| {
            let mut diff_sum = 0.0;
            let mut d_sum = 0.0;
            for j in (i + 1)..n {
                let dij = distances[[i, j]];
                let diff = split_dist[[i, j]] - dij;
                diff_sum += diff * diff;
                d_sum += dij * dij;
            }
            (diff_sum, d_sum)
        })
        .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1));

    if sum_d_sq > 0.0 {
        100.0 * (1.0 - sum_diff_sq / sum_d_sq)
    } else {
        0.0
    }
}
