use crate::core::shapes::{Shape, all_permutations};
use rand::{Rng, distributions::WeightedIndex, prelude::Distribution};
use std::collections::HashMap;
use std::f64::consts::PI;
use tracing::instrument;

/// Links between ligands that close a cycle of at most this many atoms cannot
/// span a trans arrangement.
const SMALL_CYCLE_LIMIT: usize = 5;
const TRANS_ANGLE_THRESHOLD: f64 = 0.9 * PI;

/// Two ligands joined by a path that does not pass through the central atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LigandLink {
    pub first: usize,
    pub second: usize,
    /// Size of the smallest cycle through the center closed by this link.
    pub cycle_size: usize,
}

/// One spatially distinct arrangement of ligands on the vertices of a shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stereopermutation {
    /// Ligand index placed at each vertex.
    pub vertex_ligands: Vec<usize>,
    /// Number of ligand permutations equivalent to this arrangement.
    pub weight: u32,
    pub feasible: bool,
}

impl Stereopermutation {
    /// Vertex occupied by each ligand.
    pub fn ligand_vertices(&self) -> Vec<usize> {
        let mut inverse = vec![0; self.vertex_ligands.len()];
        for (vertex, &ligand) in self.vertex_ligands.iter().enumerate() {
            inverse[ligand] = vertex;
        }
        inverse
    }
}

type CanonicalKey = (Vec<usize>, Vec<(usize, usize, usize)>);

/// The unique arrangements of ranked, possibly linked ligands on a shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stereopermutations {
    shape: Shape,
    permutations: Vec<Stereopermutation>,
    feasible: Vec<usize>,
}

impl Stereopermutations {
    /// Enumerates all placements of the ligands onto the shape's vertices and
    /// groups them into classes of rotationally equivalent arrangements.
    ///
    /// `ranks[i]` is the rank class of ligand `i`; ligands with equal rank are
    /// indistinguishable. Arrangements that force a small-cycle link across a
    /// trans angle are kept but marked infeasible.
    #[instrument(level = "trace", skip_all, fields(shape = %shape, ligands = ranks.len()))]
    pub fn generate(shape: Shape, ranks: &[usize], links: &[LigandLink]) -> Self {
        let n = shape.size();
        if ranks.len() != n {
            return Self {
                shape,
                permutations: Vec::new(),
                feasible: Vec::new(),
            };
        }

        let rotations = shape.rotations();
        let mut index_of: HashMap<CanonicalKey, usize> = HashMap::new();
        let mut permutations: Vec<Stereopermutation> = Vec::new();

        for vertex_ligands in all_permutations(n) {
            let key = rotations
                .iter()
                .map(|rotation| {
                    let mut rotated = vec![0; n];
                    for (vertex, &ligand) in vertex_ligands.iter().enumerate() {
                        rotated[rotation[vertex]] = ligand;
                    }
                    arrangement_key(&rotated, ranks, links)
                })
                .min()
                .unwrap_or_else(|| arrangement_key(&vertex_ligands, ranks, links));

            match index_of.get(&key) {
                Some(&index) => permutations[index].weight += 1,
                None => {
                    index_of.insert(key, permutations.len());
                    let feasible = is_feasible(shape, &vertex_ligands, links);
                    permutations.push(Stereopermutation {
                        vertex_ligands,
                        weight: 1,
                        feasible,
                    });
                }
            }
        }

        let feasible = permutations
            .iter()
            .enumerate()
            .filter(|(_, p)| p.feasible)
            .map(|(i, _)| i)
            .collect();

        Self {
            shape,
            permutations,
            feasible,
        }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// All arrangements, including infeasible ones.
    pub fn all(&self) -> &[Stereopermutation] {
        &self.permutations
    }

    pub fn num_assignments(&self) -> usize {
        self.feasible.len()
    }

    /// The arrangement selected by an assignment index.
    pub fn assignment(&self, assignment: usize) -> Option<&Stereopermutation> {
        self.feasible
            .get(assignment)
            .map(|&index| &self.permutations[index])
    }

    /// Occurrence weights of the feasible assignments, in assignment order.
    pub fn weights(&self) -> Vec<u32> {
        self.feasible
            .iter()
            .map(|&index| self.permutations[index].weight)
            .collect()
    }

    /// Draws an assignment with probability proportional to its weight.
    pub fn sample(&self, rng: &mut impl Rng) -> Option<usize> {
        let weights = self.weights();
        if weights.is_empty() {
            return None;
        }
        let distribution = WeightedIndex::new(&weights).ok()?;
        Some(distribution.sample(rng))
    }
}

fn arrangement_key(vertex_ligands: &[usize], ranks: &[usize], links: &[LigandLink]) -> CanonicalKey {
    let characters = vertex_ligands.iter().map(|&ligand| ranks[ligand]).collect();

    let mut ligand_vertex = vec![0; vertex_ligands.len()];
    for (vertex, &ligand) in vertex_ligands.iter().enumerate() {
        ligand_vertex[ligand] = vertex;
    }

    let mut linked: Vec<(usize, usize, usize)> = links
        .iter()
        .map(|link| {
            let a = ligand_vertex[link.first];
            let b = ligand_vertex[link.second];
            (a.min(b), a.max(b), link.cycle_size)
        })
        .collect();
    linked.sort_unstable();

    (characters, linked)
}

fn is_feasible(shape: Shape, vertex_ligands: &[usize], links: &[LigandLink]) -> bool {
    let mut ligand_vertex = vec![0; vertex_ligands.len()];
    for (vertex, &ligand) in vertex_ligands.iter().enumerate() {
        ligand_vertex[ligand] = vertex;
    }

    links.iter().all(|link| {
        let angle = shape.angle(ligand_vertex[link.first], ligand_vertex[link.second]);
        link.cycle_size > SMALL_CYCLE_LIMIT || angle < TRANS_ANGLE_THRESHOLD
    })
}
