use super::AssignmentError;
use super::atom::AtomStereocenter;
use super::bond::BondStereocenter;
use super::constraints::{ChiralityPrototype, DihedralConstraint, EmissionParameters, ModelContributions};
use super::inference::resolve_shape;
use crate::core::cycles::Cycles;
use crate::core::models::ids::{AtomIndex, BondIndex};
use crate::core::models::molecule::Molecule;
use crate::core::models::ranking::atom_classes;
use rand::Rng;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Where a stereocenter sits: on an atom or across a bond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StereocenterKey {
    Atom(AtomIndex),
    Bond(BondIndex),
}

impl fmt::Display for StereocenterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(atom) => write!(f, "atom {atom}"),
            Self::Bond(bond) => write!(f, "bond {bond}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stereocenter {
    Atom(AtomStereocenter),
    Bond(BondStereocenter),
}

impl Stereocenter {
    pub fn key(&self) -> StereocenterKey {
        match self {
            Self::Atom(s) => StereocenterKey::Atom(s.central()),
            Self::Bond(s) => StereocenterKey::Bond(s.bond()),
        }
    }

    pub fn num_assignments(&self) -> usize {
        match self {
            Self::Atom(s) => s.num_assignments(),
            Self::Bond(s) => s.num_assignments(),
        }
    }

    pub fn assignment(&self) -> Option<usize> {
        match self {
            Self::Atom(s) => s.assignment(),
            Self::Bond(s) => s.assignment(),
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.assignment().is_some()
    }

    pub fn weights(&self) -> Vec<u32> {
        match self {
            Self::Atom(s) => s.weights(),
            Self::Bond(s) => s.weights(),
        }
    }

    pub fn assign(&mut self, assignment: Option<usize>) -> Result<(), AssignmentError> {
        match self {
            Self::Atom(s) => s.assign(assignment),
            Self::Bond(s) => s.assign(assignment),
        }
    }

    /// Picks a feasible assignment at random, weighted by occurrence. Leaves
    /// the stereocenter unassigned if it has no feasible assignment.
    pub fn assign_random(&mut self, rng: &mut impl Rng) -> Option<usize> {
        if self.num_assignments() == 0 {
            return None;
        }
        match self {
            Self::Atom(s) => s.assign_random(rng),
            Self::Bond(s) => s.assign_random(rng),
        }
    }

    pub fn model_contributions(
        &self,
        molecule: &Molecule,
        cycles: &Cycles,
        parameters: &EmissionParameters,
        cycle_multiplier: f64,
    ) -> ModelContributions {
        match self {
            Self::Atom(s) => s.model_contributions(molecule, cycles, parameters, cycle_multiplier),
            Self::Bond(s) => s.model_contributions(parameters),
        }
    }

    pub fn chirality_prototypes(&self) -> Vec<ChiralityPrototype> {
        match self {
            Self::Atom(s) => s.chirality_prototypes(),
            Self::Bond(s) => s.chirality_prototypes(),
        }
    }

    pub fn dihedral_constraints(&self, parameters: &EmissionParameters) -> Vec<DihedralConstraint> {
        match self {
            Self::Atom(_) => Vec::new(),
            Self::Bond(s) => s.dihedral_constraints(parameters),
        }
    }
}

/// All stereocenters of a molecule, ordered by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StereocenterList {
    entries: BTreeMap<StereocenterKey, Stereocenter>,
}

impl StereocenterList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Perceives the stereocenters of a molecule.
    ///
    /// Atom stereocenters are kept if their number of assignments is not one
    /// or if their shape was requested explicitly. Bond stereocenters are kept
    /// if they distinguish E from Z.
    pub fn detect(molecule: &Molecule) -> Self {
        let cycles = Cycles::new(molecule, true);
        let classes = atom_classes(molecule);
        let mut list = Self::new();

        for atom in 0..molecule.num_atoms() {
            if molecule.ligands(atom).len() < 2 {
                continue;
            }
            let Some(shape) = resolve_shape(molecule, atom) else {
                continue;
            };
            let stereocenter = AtomStereocenter::new(molecule, &cycles, &classes, atom, shape);
            if molecule.shape_override(atom).is_some() || stereocenter.num_assignments() != 1 {
                list.insert(Stereocenter::Atom(stereocenter));
            }
        }

        for bond in molecule.bonds() {
            let stereocenter = BondStereocenter::try_new(molecule, &cycles, &classes, bond.index);
            if let Some(stereocenter) = stereocenter.filter(|s| s.num_assignments() == 2) {
                list.insert(Stereocenter::Bond(stereocenter));
            }
        }

        debug!(count = list.len(), "Perceived stereocenters");
        list
    }

    pub fn insert(&mut self, stereocenter: Stereocenter) -> Option<Stereocenter> {
        self.entries.insert(stereocenter.key(), stereocenter)
    }

    pub fn get(&self, key: StereocenterKey) -> Option<&Stereocenter> {
        self.entries.get(&key)
    }

    pub fn get_mut(&mut self, key: StereocenterKey) -> Option<&mut Stereocenter> {
        self.entries.get_mut(&key)
    }

    pub fn atom(&self, atom: AtomIndex) -> Option<&AtomStereocenter> {
        match self.entries.get(&StereocenterKey::Atom(atom)) {
            Some(Stereocenter::Atom(s)) => Some(s),
            _ => None,
        }
    }

    pub fn bond(&self, bond: BondIndex) -> Option<&BondStereocenter> {
        match self.entries.get(&StereocenterKey::Bond(bond)) {
            Some(Stereocenter::Bond(s)) => Some(s),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stereocenter> {
        self.entries.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Stereocenter> {
        self.entries.values_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = StereocenterKey> + '_ {
        self.entries.keys().copied()
    }

    pub fn has_unassigned(&self) -> bool {
        self.iter().any(|s| !s.is_assigned())
    }

    /// Whether any stereocenter admits no feasible arrangement at all.
    pub fn has_zero_assignment(&self) -> bool {
        self.iter().any(|s| s.num_assignments() == 0)
    }
}
