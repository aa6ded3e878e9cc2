use super::config::{Configuration, FixedPosition, ModelConstants};
use super::error::DgError;
use super::units::ANGSTROM_PER_BOHR;
use crate::core::cycles::{Cycles, count_planarity_enforcing_bonds, make_ring_index_sequence};
use crate::core::models::element::bond_length;
use crate::core::models::ids::AtomIndex;
use crate::core::models::molecule::Molecule;
use crate::core::models::ranking::atom_classes;
use crate::core::models::topology::BondType;
use crate::core::models::value_bounds::ValueBounds;
use crate::core::shapes::Shape;
use crate::core::stereo::atom::AtomStereocenter;
use crate::core::stereo::bond::BondStereocenter;
use crate::core::stereo::constraints::{ChiralityPrototype, DihedralConstraint, EmissionParameters};
use crate::core::stereo::inference::resolve_shape;
use crate::core::stereo::list::{Stereocenter, StereocenterKey, StereocenterList};
use crate::core::utils::cyclic_polygons;
use itertools::Itertools;
use nalgebra::Vector3;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;
use tracing::{debug, instrument, trace};

/// Explicit pairwise distance bounds in Ångström, keyed by ordered atom pairs.
pub type BoundsList = BTreeMap<[AtomIndex; 2], ValueBounds>;

/// Half-width of the distance window between two fixed atoms.
const FIXED_PAIR_TOLERANCE: f64 = 1e-3;

/// Orients an index tuple so that its first entry does not exceed its last.
/// `(a, b, c)` and `(c, b, a)` map onto the same key.
pub fn canonical_key<const N: usize>(mut key: [AtomIndex; N]) -> [AtomIndex; N] {
    if key[0] > key[N - 1] {
        key.reverse();
    }
    key
}

/// Angle between the exocyclic bond pairs of a spiro center whose two rings
/// open at angles `alpha` and `beta`.
pub fn spiro_cross_angle(alpha: f64, beta: f64) -> f64 {
    (-(alpha / 2.0).cos() * (beta / 2.0).cos()).clamp(-1.0, 1.0).acos()
}

/// Distance between two atoms bonded to a common center.
pub fn law_of_cosines(a: f64, b: f64, angle: f64) -> f64 {
    (a * a + b * b - 2.0 * a * b * angle.cos()).max(0.0).sqrt()
}

/// 1-4 distance of a chain `i-j-k-l` with bond lengths `a`, `b`, `c`, angles
/// `alpha` (at `j`) and `beta` (at `k`) and dihedral `phi`.
pub fn dihedral_length(a: f64, b: f64, c: f64, alpha: f64, beta: f64, phi: f64) -> f64 {
    let dx = b - c * beta.cos() - a * alpha.cos();
    let dy = c * beta.sin() * phi.cos() - a * alpha.sin();
    let dz = c * beta.sin() * phi.sin();
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Geometric model of a molecule: bond, angle and dihedral bounds derived from
/// its graph and stereocenter assignments.
///
/// Construction is the whole modelling pass. Every stereocenter that is still
/// unassigned gets a weighted random assignment, and non-terminal atoms and
/// double bonds without a stereocenter receive one, so that every local
/// geometry is fixed before bounds are emitted.
pub struct SpatialModel<'a> {
    molecule: &'a Molecule,
    cycles: Cycles,
    stereocenters: StereocenterList,
    constants: ModelConstants,
    looseness: f64,
    fixed_positions: Vec<FixedPosition>,
    bond_bounds: BTreeMap<[AtomIndex; 2], ValueBounds>,
    angle_bounds: BTreeMap<[AtomIndex; 3], ValueBounds>,
    dihedral_bounds: BTreeMap<[AtomIndex; 4], ValueBounds>,
}

impl<'a> SpatialModel<'a> {
    #[instrument(level = "debug", skip_all, fields(atoms = molecule.num_atoms()))]
    pub fn new(molecule: &'a Molecule, configuration: &Configuration, rng: &mut impl Rng) -> Self {
        let mut model = Self {
            molecule,
            cycles: Cycles::new(molecule, true),
            stereocenters: molecule.stereocenters().clone(),
            constants: configuration.constants.clone(),
            looseness: configuration.spatial_model_loosening,
            fixed_positions: configuration.fixed_positions.clone(),
            bond_bounds: BTreeMap::new(),
            angle_bounds: BTreeMap::new(),
            dihedral_bounds: BTreeMap::new(),
        };

        model.add_bond_bounds();
        model.complete_stereocenters(rng);
        model.add_flat_cycle_angles();
        model.add_stereocenter_information();
        model.add_spiro_cross_angles();
        model.add_default_angles();
        model.add_default_dihedrals();

        debug!(
            bonds = model.bond_bounds.len(),
            angles = model.angle_bounds.len(),
            dihedrals = model.dihedral_bounds.len(),
            stereocenters = model.stereocenters.len(),
            "Spatial model constructed"
        );
        model
    }

    /// Checks that fixed positions refer to distinct atoms of `molecule` and
    /// carry finite coordinates.
    pub fn check_fixed_positions(
        molecule: &Molecule,
        configuration: &Configuration,
    ) -> Result<(), DgError> {
        let mut seen = BTreeSet::new();
        for fixed in &configuration.fixed_positions {
            if fixed.atom >= molecule.num_atoms() {
                return Err(DgError::InvalidFixedPositions(format!(
                    "atom index {} is out of range for {} atoms",
                    fixed.atom,
                    molecule.num_atoms()
                )));
            }
            if !seen.insert(fixed.atom) {
                return Err(DgError::InvalidFixedPositions(format!(
                    "atom {} is fixed more than once",
                    fixed.atom
                )));
            }
            if fixed.position.iter().any(|c| !c.is_finite()) {
                return Err(DgError::InvalidFixedPositions(format!(
                    "atom {} has a non-finite position",
                    fixed.atom
                )));
            }
        }
        Ok(())
    }

    pub fn molecule(&self) -> &Molecule {
        self.molecule
    }

    /// The stereocenters the model was built from, all of them assigned unless
    /// they have no feasible assignment.
    pub fn stereocenters(&self) -> &StereocenterList {
        &self.stereocenters
    }

    pub fn bond_bounds(&self) -> &BTreeMap<[AtomIndex; 2], ValueBounds> {
        &self.bond_bounds
    }

    pub fn angle_bounds(&self) -> &BTreeMap<[AtomIndex; 3], ValueBounds> {
        &self.angle_bounds
    }

    pub fn dihedral_bounds(&self) -> &BTreeMap<[AtomIndex; 4], ValueBounds> {
        &self.dihedral_bounds
    }

    pub fn emission_parameters(&self) -> EmissionParameters {
        EmissionParameters {
            bond_relative_variance: self.constants.bond_relative_variance,
            angle_absolute_variance: self.constants.angle_absolute_variance,
            ligand_distance_factor: self.constants.ligand_distance_factor,
            looseness: self.looseness,
        }
    }

    /// Inserts bond bounds unless the pair is already modelled. Returns whether
    /// the bounds were inserted.
    pub fn set_bond_bounds_if_empty(&mut self, atoms: [AtomIndex; 2], bounds: ValueBounds) -> bool {
        insert_if_empty(&mut self.bond_bounds, canonical_key(atoms), bounds)
    }

    /// Inserts angle bounds, clamped to `[0, π]`, unless the triple is already
    /// modelled.
    pub fn set_angle_bounds_if_empty(&mut self, atoms: [AtomIndex; 3], bounds: ValueBounds) -> bool {
        insert_if_empty(&mut self.angle_bounds, canonical_key(atoms), bounds.clamp_angle())
    }

    /// Inserts dihedral bounds, clamped to `[0, π]`, unless the quadruple is
    /// already modelled.
    pub fn set_dihedral_bounds_if_empty(
        &mut self,
        atoms: [AtomIndex; 4],
        bounds: ValueBounds,
    ) -> bool {
        insert_if_empty(&mut self.dihedral_bounds, canonical_key(atoms), bounds.clamp_angle())
    }

    fn add_bond_bounds(&mut self) {
        let variance = self.constants.bond_relative_variance * self.looseness;
        for bond in self.molecule.bonds() {
            if bond.bond_type.is_eta() {
                continue;
            }
            let (a, b) = (bond.index.first, bond.index.second);
            let length = bond_length(
                self.molecule.element(a),
                self.molecule.element(b),
                bond.bond_type.length_order(),
            );
            self.set_bond_bounds_if_empty([a, b], ValueBounds::relative(length, variance));
        }
    }

    fn complete_stereocenters(&mut self, rng: &mut impl Rng) {
        let molecule = self.molecule;
        let classes = atom_classes(molecule);

        for atom in 0..molecule.num_atoms() {
            if self.stereocenters.atom(atom).is_some() || molecule.ligands(atom).len() < 2 {
                continue;
            }
            let Some(shape) = resolve_shape(molecule, atom) else {
                continue;
            };
            let stereocenter = AtomStereocenter::new(molecule, &self.cycles, &classes, atom, shape);
            self.stereocenters.insert(Stereocenter::Atom(stereocenter));
        }

        for bond in molecule.bonds() {
            if bond.bond_type != BondType::Double || self.stereocenters.bond(bond.index).is_some() {
                continue;
            }
            let planar_ends = [bond.index.first, bond.index.second].iter().all(|&end| {
                self.stereocenters
                    .atom(end)
                    .is_some_and(|s| matches!(s.shape(), Shape::Bent | Shape::TrigonalPlanar))
            });
            if !planar_ends {
                continue;
            }
            if let Some(stereocenter) =
                BondStereocenter::try_new(molecule, &self.cycles, &classes, bond.index)
            {
                self.stereocenters.insert(Stereocenter::Bond(stereocenter));
            }
        }

        for stereocenter in self.stereocenters.iter_mut() {
            if !stereocenter.is_assigned() {
                let choice = stereocenter.assign_random(rng);
                trace!(key = %stereocenter.key(), ?choice, "Assigned stereocenter for modelling");
            }
        }
    }

    /// Sets exact internal angles of three-membered rings and of
    /// four-membered rings with a planarity enforcing bond.
    fn add_flat_cycle_angles(&mut self) {
        let molecule = self.molecule;
        let variance = self.constants.angle_absolute_variance * self.looseness;
        let mut flat_angles = Vec::new();

        for cycle in self.cycles.size_less_than(5) {
            let size = cycle.size();
            let flat = size == 3
                || (size == 4 && count_planarity_enforcing_bonds(cycle.edges(), molecule) >= 1);
            if !flat {
                continue;
            }

            let sequence = make_ring_index_sequence(cycle.edges());
            if sequence.len() != size + 1 {
                continue;
            }
            let edge_lengths: Vec<f64> = sequence
                .windows(2)
                .map(|pair| {
                    let order = molecule
                        .bond_type_between(pair[0], pair[1])
                        .map_or(1.0, BondType::length_order);
                    bond_length(molecule.element(pair[0]), molecule.element(pair[1]), order)
                })
                .collect();
            let Some(angles) = cyclic_polygons::internal_angles(&edge_lengths) else {
                continue;
            };

            for (i, &angle) in angles.iter().enumerate() {
                let key = [sequence[i], sequence[i + 1], sequence[(i + 2) % size]];
                flat_angles.push((key, ValueBounds::around(angle, variance)));
            }
        }

        for (key, bounds) in flat_angles {
            self.set_angle_bounds_if_empty(key, bounds);
        }
    }

    fn add_stereocenter_information(&mut self) {
        let parameters = self.emission_parameters();
        let smallest_cycles = self.cycles.smallest_cycle_map();

        let contributions: Vec<_> = self
            .stereocenters
            .iter()
            .map(|stereocenter| {
                let multiplier = match stereocenter.key() {
                    StereocenterKey::Atom(atom) => self
                        .constants
                        .cycle_multiplier(smallest_cycles.get(&atom).copied()),
                    StereocenterKey::Bond(_) => 1.0,
                };
                stereocenter.model_contributions(self.molecule, &self.cycles, &parameters, multiplier)
            })
            .collect();

        for contribution in contributions {
            for (atoms, bounds) in contribution.bonds {
                self.set_bond_bounds_if_empty(atoms, bounds);
            }
            for (atoms, bounds) in contribution.angles {
                self.set_angle_bounds_if_empty(atoms, bounds);
            }
            for (atoms, bounds) in contribution.dihedrals {
                self.set_dihedral_bounds_if_empty(atoms, bounds);
            }
        }
    }

    /// Tightens the angles between the two rings of small spiro centers.
    fn add_spiro_cross_angles(&mut self) {
        let mut corrections = Vec::new();

        for stereocenter in self.stereocenters.iter() {
            let Stereocenter::Atom(stereocenter) = stereocenter else {
                continue;
            };
            let center = stereocenter.central();
            if stereocenter.shape() != Shape::Tetrahedral
                || self.cycles.num_relevant_cycles(center) != 2
            {
                continue;
            }

            let rings: Vec<_> = self.cycles.containing_atom(center).collect();
            let [first, second] = rings.as_slice() else {
                continue;
            };
            if first.size() > 5 || second.size() > 5 {
                continue;
            }
            let shared: Vec<_> = first
                .atoms()
                .iter()
                .filter(|&&atom| second.contains_atom(atom))
                .collect();
            if shared != [&center] {
                continue;
            }

            let adjacent_in = |ring: &crate::core::cycles::Cycle| -> Vec<AtomIndex> {
                self.molecule
                    .neighbors(center)
                    .iter()
                    .copied()
                    .filter(|&atom| ring.contains_atom(atom))
                    .collect()
            };
            let (first_adjacent, second_adjacent) = (adjacent_in(first), adjacent_in(second));
            let (&[a1, a2], &[b1, b2]) = (first_adjacent.as_slice(), second_adjacent.as_slice())
            else {
                continue;
            };

            let (Some(first_angle), Some(second_angle)) = (
                self.angle_bounds.get(&canonical_key([a1, center, a2])),
                self.angle_bounds.get(&canonical_key([b1, center, b2])),
            ) else {
                continue;
            };

            // Wider ring angles close the cross angle
            let cross = ValueBounds::new(
                spiro_cross_angle(first_angle.upper, second_angle.upper).clamp(0.0, PI),
                spiro_cross_angle(first_angle.lower, second_angle.lower).clamp(0.0, PI),
            );
            for (&x, &y) in [a1, a2].iter().cartesian_product([b1, b2].iter()) {
                corrections.push((canonical_key([x, center, y]), cross));
            }
            trace!(center, cross = %cross, "Spiro cross angles");
        }

        for (key, bounds) in corrections {
            self.angle_bounds.insert(key, bounds);
        }
    }

    fn add_default_angles(&mut self) {
        let molecule = self.molecule;
        for center in 0..molecule.num_atoms() {
            for (&i, &j) in molecule.neighbors(center).iter().tuple_combinations() {
                self.set_angle_bounds_if_empty([i, center, j], ValueBounds::full_angle());
            }
        }
    }

    fn add_default_dihedrals(&mut self) {
        let molecule = self.molecule;
        for bond in molecule.bonds() {
            let (source, target) = (bond.index.first, bond.index.second);
            for (&a, &b) in molecule
                .neighbors(source)
                .iter()
                .cartesian_product(molecule.neighbors(target).iter())
            {
                if a != target && b != source && a != b {
                    self.set_dihedral_bounds_if_empty([a, source, target, b], ValueBounds::full_angle());
                }
            }
        }
    }

    /// Explicit pairwise distance bounds: bonds, 1-3 distances from angles,
    /// 1-4 distances from dihedrals and windows between fixed atoms.
    ///
    /// Angle and dihedral derived bounds only tighten pairs that are already
    /// present and are skipped whenever a constituent bond is not modelled.
    pub fn make_bounds_list(&self) -> BoundsList {
        let mut bounds: BoundsList = self.bond_bounds.clone();
        let bond = |i: AtomIndex, j: AtomIndex| self.bond_bounds.get(&canonical_key([i, j])).copied();

        for (&[i, j, k], angle) in &self.angle_bounds {
            let (Some(first), Some(second)) = (bond(i, j), bond(j, k)) else {
                continue;
            };
            let derived = ValueBounds::new(
                law_of_cosines(first.lower, second.lower, angle.lower),
                law_of_cosines(first.upper, second.upper, angle.upper),
            );
            add_information(&mut bounds, [i, k], derived);
        }

        for (&[i, j, k, l], dihedral) in &self.dihedral_bounds {
            if i == l {
                continue;
            }
            let (Some(first), Some(second), Some(third)) = (bond(i, j), bond(j, k), bond(k, l)) else {
                continue;
            };
            let (Some(alpha), Some(beta)) = (
                self.angle_bounds.get(&canonical_key([i, j, k])),
                self.angle_bounds.get(&canonical_key([j, k, l])),
            ) else {
                continue;
            };
            let derived = ValueBounds::new(
                dihedral_length(first.lower, second.lower, third.lower, alpha.lower, beta.lower, dihedral.lower),
                dihedral_length(first.upper, second.upper, third.upper, alpha.upper, beta.upper, dihedral.upper),
            );
            add_information(&mut bounds, [i, l], derived);
        }

        for (a, b) in self.fixed_positions.iter().tuple_combinations() {
            let distance = (Vector3::from(a.position) - Vector3::from(b.position)).norm()
                * ANGSTROM_PER_BOHR;
            let window = ValueBounds::new(
                (distance - FIXED_PAIR_TOLERANCE).max(0.0),
                distance + FIXED_PAIR_TOLERANCE,
            );
            bounds.insert(canonical_key([a.atom, b.atom]), window);
        }

        bounds
    }

    pub fn chirality_prototypes(&self) -> Vec<ChiralityPrototype> {
        self.stereocenters
            .iter()
            .flat_map(Stereocenter::chirality_prototypes)
            .collect()
    }

    pub fn dihedral_constraints(&self) -> Vec<DihedralConstraint> {
        let parameters = self.emission_parameters();
        self.stereocenters
            .iter()
            .flat_map(|s| s.dihedral_constraints(&parameters))
            .collect()
    }
}

fn insert_if_empty<K: Ord>(map: &mut BTreeMap<K, ValueBounds>, key: K, bounds: ValueBounds) -> bool {
    use std::collections::btree_map::Entry;
    match map.entry(key) {
        Entry::Vacant(entry) => {
            entry.insert(bounds);
            true
        }
        Entry::Occupied(_) => false,
    }
}

/// Narrows an existing pair window with `new` where that keeps it non-empty,
/// or inserts `new` for an unmodelled pair.
fn add_information(bounds: &mut BoundsList, pair: [AtomIndex; 2], new: ValueBounds) {
    let current = bounds.entry(canonical_key(pair)).or_insert(new);
    if new.lower > current.lower && new.lower < current.upper {
        current.lower = new.lower;
    }
    if new.upper < current.upper && new.upper > current.lower {
        current.upper = new.upper;
    }
}
