use crate::core::models::ids::AtomIndex;
use crate::core::models::value_bounds::ValueBounds;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChiralityTarget {
    Positive,
    Flat,
    Negative,
}

impl ChiralityTarget {
    pub fn from_volume(volume: f64, flat_threshold: f64) -> Self {
        if volume.abs() <= flat_threshold {
            Self::Flat
        } else if volume > 0.0 {
            Self::Positive
        } else {
            Self::Negative
        }
    }
}

/// An oriented tetrahedron over four atoms whose signed volume target is
/// realized once distance bounds are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChiralityPrototype {
    pub atoms: [AtomIndex; 4],
    pub target: ChiralityTarget,
}

/// A direct angular window on the `i-j-k-l` dihedral, in radians.
///
/// Windows may extend past `±π`; deviations are measured with wraparound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DihedralConstraint {
    pub atoms: [AtomIndex; 4],
    pub lower: f64,
    pub upper: f64,
}

/// Bounds a stereocenter contributes to a spatial model. The model only adds
/// entries for keys that are not yet set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelContributions {
    pub bonds: Vec<([AtomIndex; 2], ValueBounds)>,
    pub angles: Vec<([AtomIndex; 3], ValueBounds)>,
    pub dihedrals: Vec<([AtomIndex; 4], ValueBounds)>,
}

/// Variances and heuristics a stereocenter needs to emit its contributions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionParameters {
    pub bond_relative_variance: f64,
    pub angle_absolute_variance: f64,
    pub ligand_distance_factor: f64,
    pub looseness: f64,
}
