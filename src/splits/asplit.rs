use fixedbitset::FixedBitSet;
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};

/// A weighted bipartition of the taxa `1..=ntax`.
/// Indices are 1-based; bit 0 is never set.
#[derive(Debug, Clone)]
pub struct ASplit {
    a: FixedBitSet,
    b: FixedBitSet,
    weight: f64,
}

impl ASplit {
    /// Split `A | complement(A)` over `1..=ntax`.
    pub fn from_a_ntax_with_weight(a: FixedBitSet, ntax: usize, weight: f64) -> Self {
        let mut a = a;
        a.grow(ntax + 1);
        let mut b = FixedBitSet::with_capacity(ntax + 1);
        for t in 1..=ntax {
            if !a.contains(t) {
                b.insert(t);
            }
        }
        Self { a, b, weight }
    }

    /// Split `A | complement(A)` from a list of 1-based taxon ids.
    pub fn from_taxa(taxa: &[usize], ntax: usize, weight: f64) -> Self {
        let mut a = FixedBitSet::with_capacity(ntax + 1);
        for &t in taxa {
            a.insert(t);
        }
        Self::from_a_ntax_with_weight(a, ntax, weight)
    }

    pub fn get_a(&self) -> &FixedBitSet {
        &self.a
    }

    pub fn get_b(&self) -> &FixedBitSet {
        &self.b
    }

    pub fn get_weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, w: f64) {
        self.weight = w;
    }

    pub fn ntax(&self) -> usize {
        self.a.count_ones(1..) + self.b.count_ones(1..)
    }

    /// Cardinality of the smaller side.
    pub fn size(&self) -> usize {
        self.a.count_ones(1..).min(self.b.count_ones(1..))
    }

    pub fn is_trivial(&self) -> bool {
        self.size() == 1
    }

    /// The side containing taxon `t`.
    pub fn part_containing(&self, t: usize) -> &FixedBitSet {
        if self.a.contains(t) {
            &self.a
        } else {
            &self.b
        }
    }

    pub fn part_not_containing(&self, t: usize) -> &FixedBitSet {
        if self.a.contains(t) {
            &self.b
        } else {
            &self.a
        }
    }

    pub fn separates(&self, s: usize, t: usize) -> bool {
        self.a.contains(s) != self.a.contains(t)
    }

    /// Taxa of side A in ascending order.
    pub fn a_taxa(&self) -> Vec<usize> {
        self.a.ones().filter(|&t| t != 0).collect()
    }
}

impl PartialEq for ASplit {
    /// Same bipartition, whichever side is called A; the weight is ignored.
    fn eq(&self, other: &Self) -> bool {
        same_members(self.part_containing(1), other.part_containing(1))
            && same_members(self.part_not_containing(1), other.part_not_containing(1))
    }
}
impl Eq for ASplit {}

impl Hash for ASplit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for t in self.part_containing(1).ones() {
            t.hash(state);
        }
    }
}

impl Display for ASplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}}} | {{{}}} weight={}",
            join_ones(&self.a),
            join_ones(&self.b),
            self.weight
        )
    }
}

fn same_members(a: &FixedBitSet, b: &FixedBitSet) -> bool {
    a.ones().eq(b.ones())
}

fn join_ones(bs: &FixedBitSet) -> String {
    bs.ones()
        .filter(|&t| t != 0)
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
