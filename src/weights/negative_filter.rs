use ndarray::Array2;

use crate::weights::square_array::{dimension, ActiveSet};

/// Pin the most negative free weights in one step, as SplitsTree4 did.
///
/// Among the free entries with negative weight, keeps `ceil(count * fraction_negative_to_keep)`
/// of the least negative ones free and adds every free entry strictly below that
/// threshold to the active set. Does nothing when no free entry is negative.
pub fn filter_most_negative(
    x: &Array2<f64>,
    active_set: &mut ActiveSet,
    fraction_negative_to_keep: f64,
) {
    let n = dimension(x);

    let mut vals = Vec::new();
    for i in 1..=n {
        for j in (i + 1)..=n {
            if !active_set[[i, j]] && x[[i, j]] < 0.0 {
                vals.push(x[[i, j]]);
            }
        }
    }
    let num_neg = vals.len();
    if num_neg == 0 {
        return;
    }

    vals.sort_by(|a, b| a.total_cmp(b));
    let num_to_keep = (num_neg as f64 * fraction_negative_to_keep).ceil() as usize;
    let threshold = if num_to_keep == 0 {
        0.0
    } else {
        vals[num_neg - num_to_keep.min(num_neg)]
    };

    for i in 1..=n {
        for j in (i + 1)..=n {
            if !active_set[[i, j]] && x[[i, j]] < threshold {
                active_set[[i, j]] = true;
                active_set[[j, i]] = true;
            }
        }
    }
}
