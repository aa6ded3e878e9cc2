use std::fmt;

/// Dense index of an atom within a [`Molecule`](super::molecule::Molecule).
pub type AtomIndex = usize;

/// Unordered pair of atoms identifying a bond.
///
/// The pair is always stored with `first <= second` so that `BondIndex::new(a, b)`
/// and `BondIndex::new(b, a)` compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BondIndex {
    pub first: AtomIndex,
    pub second: AtomIndex,
}

impl BondIndex {
    pub fn new(a: AtomIndex, b: AtomIndex) -> Self {
        if a <= b {
            Self {
                first: a,
                second: b,
            }
        } else {
            Self {
                first: b,
                second: a,
            }
        }
    }

    pub fn contains(&self, atom: AtomIndex) -> bool {
        self.first == atom || self.second == atom
    }

    /// Returns the atom at the opposite end of the bond, if `atom` is part of it.
    pub fn other(&self, atom: AtomIndex) -> Option<AtomIndex> {
        if self.first == atom {
            Some(self.second)
        } else if self.second == atom {
            Some(self.first)
        } else {
            None
        }
    }
}

impl fmt::Display for BondIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first, self.second)
    }
}
