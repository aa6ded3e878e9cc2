use super::element::Element;
use super::ids::{AtomIndex, BondIndex};
use super::topology::{Bond, BondType};
use crate::core::shapes::Shape;
use crate::core::stereo::{AssignmentError, StereocenterKey, StereocenterList};
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Atom {
    pub element: Element,
    pub charge: i32,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MoleculeError {
    #[error("Atom index {index} is out of range for a molecule with {num_atoms} atoms")]
    AtomOutOfRange { index: AtomIndex, num_atoms: usize },

    #[error("Atom {0} cannot be bonded to itself")]
    SelfBond(AtomIndex),

    #[error("Bond {0} was added more than once")]
    DuplicateBond(BondIndex),

    #[error("Shape {shape} needs {expected} ligands but atom {atom} has {found}")]
    ShapeSizeMismatch {
        atom: AtomIndex,
        shape: Shape,
        expected: usize,
        found: usize,
    },

    #[error("No stereocenter exists at {0}")]
    NoSuchStereocenter(StereocenterKey),

    #[error("Invalid assignment for stereocenter at {key}: {source}")]
    InvalidAssignment {
        key: StereocenterKey,
        #[source]
        source: AssignmentError,
    },
}

/// A molecular graph with its stereocenters.
///
/// Atoms are addressed by dense indices in insertion order. The stereocenter
/// list is derived from the graph when the molecule is built and only its
/// assignments may change afterwards.
#[derive(Debug, Clone)]
pub struct Molecule {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    bond_lookup: HashMap<BondIndex, usize>,
    adjacency: Vec<Vec<AtomIndex>>,
    shape_overrides: BTreeMap<AtomIndex, Shape>,
    stereocenters: StereocenterList,
}

impl Molecule {
    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atom(&self, index: AtomIndex) -> Option<&Atom> {
        self.atoms.get(index)
    }

    /// Element of an atom. Panics if the index is out of range.
    pub fn element(&self, index: AtomIndex) -> Element {
        self.atoms[index].element
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn bond_type(&self, bond: BondIndex) -> Option<BondType> {
        self.bond_lookup.get(&bond).map(|&i| self.bonds[i].bond_type)
    }

    pub fn bond_type_between(&self, a: AtomIndex, b: AtomIndex) -> Option<BondType> {
        self.bond_type(BondIndex::new(a, b))
    }

    pub fn neighbors(&self, atom: AtomIndex) -> &[AtomIndex] {
        self.adjacency.get(atom).map_or(&[], Vec::as_slice)
    }

    /// Sum of bond weights of all bonds to `atom`.
    pub fn valence(&self, atom: AtomIndex) -> f64 {
        self.neighbors(atom)
            .iter()
            .filter_map(|&other| self.bond_type_between(atom, other))
            .map(BondType::weight)
            .sum()
    }

    /// Groups the neighbors of `center` into ligands.
    ///
    /// Every neighbor bonded by a regular bond is its own ligand. Neighbors
    /// bonded by eta bonds form haptic ligands: eta-bonded neighbors that are
    /// bonded to one another belong to the same ligand. Atoms within a ligand
    /// are sorted and ligands are ordered by their smallest atom index.
    pub fn ligands(&self, center: AtomIndex) -> Vec<Vec<AtomIndex>> {
        let neighbors = self.neighbors(center);
        let (eta, plain): (Vec<AtomIndex>, Vec<AtomIndex>) =
            neighbors.iter().copied().partition(|&n| {
                self.bond_type_between(center, n)
                    .is_some_and(BondType::is_eta)
            });

        let mut ligands: Vec<Vec<AtomIndex>> = plain.into_iter().map(|n| vec![n]).collect();

        let mut group: Vec<usize> = (0..eta.len()).collect();
        fn root(group: &mut [usize], mut i: usize) -> usize {
            while group[i] != i {
                group[i] = group[group[i]];
                i = group[i];
            }
            i
        }
        for i in 0..eta.len() {
            for j in (i + 1)..eta.len() {
                if self.bond_type_between(eta[i], eta[j]).is_some() {
                    let (ri, rj) = (root(&mut group, i), root(&mut group, j));
                    if ri != rj {
                        group[rj] = ri;
                    }
                }
            }
        }
        let mut haptic: BTreeMap<usize, Vec<AtomIndex>> = BTreeMap::new();
        for i in 0..eta.len() {
            let r = root(&mut group, i);
            haptic.entry(r).or_default().push(eta[i]);
        }
        ligands.extend(haptic.into_values());

        for ligand in &mut ligands {
            ligand.sort_unstable();
        }
        ligands.sort_by_key(|ligand| ligand[0]);
        ligands
    }

    /// Explicitly requested shape of an atom, if any.
    pub fn shape_override(&self, atom: AtomIndex) -> Option<Shape> {
        self.shape_overrides.get(&atom).copied()
    }

    pub fn stereocenters(&self) -> &StereocenterList {
        &self.stereocenters
    }

    pub(crate) fn stereocenters_mut(&mut self) -> &mut StereocenterList {
        &mut self.stereocenters
    }

    /// Sets (or clears, with `None`) the assignment of a stereocenter.
    pub fn assign_stereocenter(
        &mut self,
        key: StereocenterKey,
        assignment: Option<usize>,
    ) -> Result<(), MoleculeError> {
        let stereocenter = self
            .stereocenters
            .get_mut(key)
            .ok_or(MoleculeError::NoSuchStereocenter(key))?;
        stereocenter
            .assign(assignment)
            .map_err(|source| MoleculeError::InvalidAssignment { key, source })
    }

    /// Assigns a stereocenter by weighted random choice among its feasible
    /// assignments. Returns the chosen assignment, or `None` if it has none.
    pub fn assign_stereocenter_randomly(
        &mut self,
        key: StereocenterKey,
        rng: &mut impl Rng,
    ) -> Result<Option<usize>, MoleculeError> {
        let stereocenter = self
            .stereocenters
            .get_mut(key)
            .ok_or(MoleculeError::NoSuchStereocenter(key))?;
        Ok(stereocenter.assign_random(rng))
    }

    fn check_atom(&self, index: AtomIndex) -> Result<(), MoleculeError> {
        if index < self.atoms.len() {
            Ok(())
        } else {
            Err(MoleculeError::AtomOutOfRange {
                index,
                num_atoms: self.atoms.len(),
            })
        }
    }
}

/// Builder for [`Molecule`].
///
/// Collects atoms, bonds and shape requests, then validates them and perceives
/// stereocenters in [`MoleculeBuilder::build`].
#[derive(Debug, Default)]
pub struct MoleculeBuilder {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    bond_lookup: HashMap<BondIndex, usize>,
    shape_overrides: BTreeMap<AtomIndex, Shape>,
}

impl MoleculeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_atom(&mut self, element: Element) -> AtomIndex {
        self.add_charged_atom(element, 0)
    }

    pub fn add_charged_atom(&mut self, element: Element, charge: i32) -> AtomIndex {
        self.atoms.push(Atom { element, charge });
        self.atoms.len() - 1
    }

    pub fn add_bond(
        &mut self,
        a: AtomIndex,
        b: AtomIndex,
        bond_type: BondType,
    ) -> Result<BondIndex, MoleculeError> {
        for index in [a, b] {
            if index >= self.atoms.len() {
                return Err(MoleculeError::AtomOutOfRange {
                    index,
                    num_atoms: self.atoms.len(),
                });
            }
        }
        if a == b {
            return Err(MoleculeError::SelfBond(a));
        }
        let bond = Bond::new(a, b, bond_type);
        if self.bond_lookup.contains_key(&bond.index) {
            return Err(MoleculeError::DuplicateBond(bond.index));
        }
        self.bond_lookup.insert(bond.index, self.bonds.len());
        self.bonds.push(bond);
        Ok(bond.index)
    }

    /// Requests a specific coordination shape for an atom. The shape's size is
    /// checked against the atom's ligand count on build.
    pub fn set_shape(&mut self, atom: AtomIndex, shape: Shape) -> &mut Self {
        self.shape_overrides.insert(atom, shape);
        self
    }

    pub fn build(self) -> Result<Molecule, MoleculeError> {
        let mut adjacency = vec![Vec::new(); self.atoms.len()];
        for bond in &self.bonds {
            adjacency[bond.index.first].push(bond.index.second);
            adjacency[bond.index.second].push(bond.index.first);
        }

        let mut molecule = Molecule {
            atoms: self.atoms,
            bonds: self.bonds,
            bond_lookup: self.bond_lookup,
            adjacency,
            shape_overrides: self.shape_overrides,
            stereocenters: StereocenterList::new(),
        };

        for (&atom, &shape) in &molecule.shape_overrides {
            molecule.check_atom(atom)?;
            let found = molecule.ligands(atom).len();
            if found != shape.size() {
                return Err(MoleculeError::ShapeSizeMismatch {
                    atom,
                    shape,
                    expected: shape.size(),
                    found,
                });
            }
        }

        molecule.stereocenters = StereocenterList::detect(&molecule);
        Ok(molecule)
    }
}
