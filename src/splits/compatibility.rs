use fixedbitset::FixedBitSet;
use serde::Serialize;

use crate::splits::asplit::ASplit;

/// Classification of a circular split system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compatibility {
    /// Pairwise compatible: the splits form a tree.
    Compatible,
    /// Circular but not a tree.
    Cyclic,
}

/// Two splits are compatible when one of the four side intersections is empty.
pub fn are_compatible(s1: &ASplit, s2: &ASplit) -> bool {
    !intersects(s1.get_a(), s2.get_a())
        || !intersects(s1.get_a(), s2.get_b())
        || !intersects(s1.get_b(), s2.get_a())
        || !intersects(s1.get_b(), s2.get_b())
}

pub fn is_compatible(splits: &[ASplit]) -> bool {
    splits
        .iter()
        .enumerate()
        .all(|(i, s1)| splits[i + 1..].iter().all(|s2| are_compatible(s1, s2)))
}

/// Splits computed on a cycle are circular by construction, so they are either a
/// tree or cyclic.
pub fn classify(splits: &[ASplit]) -> Compatibility {
    if is_compatible(splits) {
        Compatibility::Compatible
    } else {
        Compatibility::Cyclic
    }
}

fn intersects(a: &FixedBitSet, b: &FixedBitSet) -> bool {
    !a.is_disjoint(b)
}
