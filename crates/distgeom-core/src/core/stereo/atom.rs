use super::AssignmentError;
use super::constraints::{ChiralityPrototype, ChiralityTarget, EmissionParameters, ModelContributions};
use super::permutations::{LigandLink, Stereopermutations};
use crate::core::cycles::{Cycles, make_ring_index_sequence};
use crate::core::models::element::bond_length;
use crate::core::models::ids::{AtomIndex, BondIndex};
use crate::core::models::molecule::Molecule;
use crate::core::models::ranking::{LigandRanking, rank_ligands};
use crate::core::models::topology::BondType;
use crate::core::models::value_bounds::ValueBounds;
use crate::core::shapes::Shape;
use crate::core::utils::cyclic_polygons;
use rand::Rng;
use std::collections::BTreeMap;

const FLAT_VOLUME_THRESHOLD: f64 = 0.1;

/// Spatial extent of a ligand as seen from the central atom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LigandCone {
    /// Half-angle of the cone enclosing all ligand atoms.
    pub angle: ValueBounds,
    /// Distance from the central atom to each ligand atom.
    pub distance: ValueBounds,
}

/// The arrangement of ligands around a single central atom.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomStereocenter {
    central: AtomIndex,
    ranking: LigandRanking,
    links: Vec<LigandLink>,
    permutations: Stereopermutations,
    assignment: Option<usize>,
}

impl AtomStereocenter {
    /// Ranks the ligands of `central`, finds cycles linking them and
    /// enumerates the arrangements of those ligands on `shape`.
    ///
    /// A stereocenter with exactly one feasible arrangement starts assigned.
    pub fn new(
        molecule: &Molecule,
        cycles: &Cycles,
        classes: &[usize],
        central: AtomIndex,
        shape: Shape,
    ) -> Self {
        let ranking = rank_ligands(molecule, classes, central, None);
        let links = find_links(cycles, central, &ranking.ligands);
        let permutations = Stereopermutations::generate(shape, &ranking.ranks, &links);
        let assignment = (permutations.num_assignments() == 1).then_some(0);
        Self {
            central,
            ranking,
            links,
            permutations,
            assignment,
        }
    }

    pub fn central(&self) -> AtomIndex {
        self.central
    }

    pub fn shape(&self) -> Shape {
        self.permutations.shape()
    }

    pub fn ligands(&self) -> &[Vec<AtomIndex>] {
        &self.ranking.ligands
    }

    pub fn ranking(&self) -> &LigandRanking {
        &self.ranking
    }

    pub fn links(&self) -> &[LigandLink] {
        &self.links
    }

    pub fn num_assignments(&self) -> usize {
        self.permutations.num_assignments()
    }

    pub fn assignment(&self) -> Option<usize> {
        self.assignment
    }

    pub fn weights(&self) -> Vec<u32> {
        self.permutations.weights()
    }

    pub fn assign(&mut self, assignment: Option<usize>) -> Result<(), AssignmentError> {
        if let Some(value) = assignment {
            if value >= self.num_assignments() {
                return Err(AssignmentError {
                    assignment: value,
                    num_assignments: self.num_assignments(),
                });
            }
        }
        self.assignment = assignment;
        Ok(())
    }

    pub fn assign_random(&mut self, rng: &mut impl Rng) -> Option<usize> {
        self.assignment = self.permutations.sample(rng);
        self.assignment
    }

    /// Vertex of the shape occupied by each ligand under the current assignment.
    pub fn ligand_vertices(&self) -> Option<Vec<usize>> {
        self.assignment
            .and_then(|a| self.permutations.assignment(a))
            .map(|p| p.ligand_vertices())
    }

    /// Cone of every ligand. Single-atom ligands have a zero-width cone and
    /// no distance of their own; their bond is modelled separately.
    pub fn cones(
        &self,
        molecule: &Molecule,
        cycles: &Cycles,
        parameters: &EmissionParameters,
    ) -> Vec<Option<LigandCone>> {
        self.ranking
            .ligands
            .iter()
            .map(|ligand| {
                (ligand.len() > 1)
                    .then(|| haptic_cone(molecule, cycles, self.central, ligand, parameters))
            })
            .collect()
    }

    /// Angle and haptic bond bounds under the current assignment.
    ///
    /// `cycle_multiplier` widens angle variances for centers in small cycles.
    pub fn model_contributions(
        &self,
        molecule: &Molecule,
        cycles: &Cycles,
        parameters: &EmissionParameters,
        cycle_multiplier: f64,
    ) -> ModelContributions {
        let mut contributions = ModelContributions::default();
        let Some(ligand_vertices) = self.ligand_vertices() else {
            return contributions;
        };

        let shape = self.shape();
        let ligands = &self.ranking.ligands;
        let cones = self.cones(molecule, cycles, parameters);
        let variance = parameters.angle_absolute_variance * parameters.looseness * cycle_multiplier;

        for (ligand, cone) in ligands.iter().zip(&cones) {
            let Some(cone) = cone else { continue };
            for &atom in ligand {
                contributions.bonds.push(([self.central, atom], cone.distance));
            }
            let within = ValueBounds::new(0.0, 2.0 * cone.angle.upper).clamp_angle();
            for (i, &x) in ligand.iter().enumerate() {
                for &y in &ligand[i + 1..] {
                    contributions.angles.push(([x, self.central, y], within));
                }
            }
        }

        let cone_upper = |i: usize| cones[i].map_or(0.0, |c| c.angle.upper);
        for a in 0..ligands.len() {
            for b in (a + 1)..ligands.len() {
                let ideal = shape.angle(ligand_vertices[a], ligand_vertices[b]);
                let widening = variance + cone_upper(a) + cone_upper(b);
                let bounds = ValueBounds::around(ideal, widening).clamp_angle();
                for &x in &ligands[a] {
                    for &y in &ligands[b] {
                        contributions.angles.push(([x, self.central, y], bounds));
                    }
                }
            }
        }

        contributions
    }

    /// Oriented tetrahedra fixing the handedness of the current assignment.
    ///
    /// Vertices occupied by haptic ligands cannot be expressed with a single
    /// atom, so tetrahedra touching them are left out. Non-planar tetrahedra
    /// are only emitted if the stereocenter has more than one assignment.
    pub fn chirality_prototypes(&self) -> Vec<ChiralityPrototype> {
        let Some(permutation) = self.assignment.and_then(|a| self.permutations.assignment(a))
        else {
            return Vec::new();
        };

        let shape = self.shape();
        let stereogenic = self.num_assignments() > 1;

        shape
            .tetrahedra()
            .iter()
            .filter_map(|tetrahedron| {
                let target =
                    ChiralityTarget::from_volume(shape.ideal_volume(tetrahedron), FLAT_VOLUME_THRESHOLD);
                if target != ChiralityTarget::Flat && !stereogenic {
                    return None;
                }
                let mut atoms = [self.central; 4];
                for (slot, vertex) in atoms.iter_mut().zip(tetrahedron) {
                    if let Some(vertex) = vertex {
                        let ligand = &self.ranking.ligands[permutation.vertex_ligands[*vertex]];
                        if ligand.len() != 1 {
                            return None;
                        }
                        *slot = ligand[0];
                    }
                }
                Some(ChiralityPrototype { atoms, target })
            })
            .collect()
    }
}

/// Smallest cycles through the central atom that enter and leave it via two
/// different ligands.
fn find_links(cycles: &Cycles, central: AtomIndex, ligands: &[Vec<AtomIndex>]) -> Vec<LigandLink> {
    let ligand_of = |atom: AtomIndex| ligands.iter().position(|l| l.contains(&atom));
    let mut smallest: BTreeMap<(usize, usize), usize> = BTreeMap::new();

    for cycle in cycles.containing_atom(central) {
        let adjacent: Vec<AtomIndex> = cycle
            .edges()
            .iter()
            .filter_map(|edge| edge.other(central))
            .collect();
        let &[x, y] = adjacent.as_slice() else {
            continue;
        };
        let (Some(a), Some(b)) = (ligand_of(x), ligand_of(y)) else {
            continue;
        };
        if a == b {
            continue;
        }
        let key = (a.min(b), a.max(b));
        smallest
            .entry(key)
            .and_modify(|size| *size = (*size).min(cycle.size()))
            .or_insert(cycle.size());
    }

    smallest
        .into_iter()
        .map(|((first, second), cycle_size)| LigandLink {
            first,
            second,
            cycle_size,
        })
        .collect()
}

/// Cone of a haptic ligand: its height is a fraction of the mean bond length
/// to the central atom and its base radius follows from the ligand topology.
fn haptic_cone(
    molecule: &Molecule,
    cycles: &Cycles,
    central: AtomIndex,
    ligand: &[AtomIndex],
    parameters: &EmissionParameters,
) -> LigandCone {
    let variance = parameters.bond_relative_variance * parameters.looseness;
    let central_element = molecule.element(central);
    let pair_length = |a: AtomIndex, b: AtomIndex| {
        let order = molecule
            .bond_type_between(a, b)
            .unwrap_or(BondType::Single)
            .length_order();
        bond_length(molecule.element(a), molecule.element(b), order)
    };

    let mean_length = ligand
        .iter()
        .map(|&atom| bond_length(central_element, molecule.element(atom), BondType::Eta.length_order()))
        .sum::<f64>()
        / ligand.len() as f64;
    let height = ValueBounds::relative(parameters.ligand_distance_factor * mean_length, variance);

    let radius = if ligand.len() == 2 {
        ValueBounds::relative(pair_length(ligand[0], ligand[1]) / 2.0, variance)
    } else if let Some(cycle) = cycles.consisting_of(ligand) {
        let sequence = make_ring_index_sequence(cycle.edges());
        let edges: Vec<f64> = sequence
            .windows(2)
            .map(|pair| pair_length(pair[0], pair[1]))
            .collect();
        let scaled = |factor: f64| -> Vec<f64> { edges.iter().map(|e| e * factor).collect() };
        let lower = cyclic_polygons::circumradius(&scaled(1.0 - variance)).map(|c| c.radius);
        let upper = cyclic_polygons::circumradius(&scaled(1.0 + variance)).map(|c| c.radius);
        match (lower, upper) {
            (Some(lower), Some(upper)) => ValueBounds::new(lower, upper),
            _ => chain_radius(molecule, ligand, &pair_length),
        }
    } else {
        chain_radius(molecule, ligand, &pair_length)
    };

    let angle = ValueBounds::new(
        radius.lower.atan2(height.upper),
        radius.upper.atan2(height.lower),
    );
    let distance = ValueBounds::new(
        height.lower.hypot(radius.lower),
        height.upper.hypot(radius.upper),
    );
    LigandCone { angle, distance }
}

/// Loose radius estimate for haptic ligands that are neither a single bond
/// nor a closed cycle: an unbranched chain spread across the cone base.
fn chain_radius(
    molecule: &Molecule,
    ligand: &[AtomIndex],
    pair_length: &dyn Fn(AtomIndex, AtomIndex) -> f64,
) -> ValueBounds {
    let longest = ligand
        .iter()
        .enumerate()
        .flat_map(|(i, &a)| ligand[i + 1..].iter().map(move |&b| (a, b)))
        .filter(|&(a, b)| molecule.bond_type(BondIndex::new(a, b)).is_some())
        .map(|(a, b)| pair_length(a, b))
        .fold(0.0, f64::max);
    ValueBounds::new(0.0, (ligand.len() - 1) as f64 * longest / 2.0)
}
