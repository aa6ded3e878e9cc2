//! Relevant cycle perception for molecular graphs.
//!
//! A cycle is *relevant* if it cannot be written as the GF(2) sum of strictly
//! shorter cycles. Candidates are generated from breadth-first shortest path
//! trees rooted at every vertex (odd and even Horton-type cycles), deduplicated
//! as edge bitsets, and then filtered by Gaussian elimination in order of
//! increasing length.

use super::models::ids::{AtomIndex, BondIndex};
use super::models::molecule::Molecule;
use std::collections::{BTreeMap, HashSet, VecDeque};

/// A single relevant cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    edges: Vec<BondIndex>,
    ring: Vec<AtomIndex>,
}

impl Cycle {
    fn from_edges(mut edges: Vec<BondIndex>) -> Self {
        edges.sort();
        let mut ring = make_ring_index_sequence(&edges);
        ring.pop();
        Self { edges, ring }
    }

    pub fn size(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> &[BondIndex] {
        &self.edges
    }

    /// Atoms of the ring in traversal order, without repeating the first atom.
    pub fn atoms(&self) -> &[AtomIndex] {
        &self.ring
    }

    pub fn contains_atom(&self, atom: AtomIndex) -> bool {
        self.ring.contains(&atom)
    }

    pub fn contains_edge(&self, bond: BondIndex) -> bool {
        self.edges.binary_search(&bond).is_ok()
    }
}

/// Relevant cycles of a molecular graph.
///
/// Owns all perception data; nothing of the underlying search state is exposed
/// beyond the query methods below.
#[derive(Debug, Clone, Default)]
pub struct Cycles {
    cycles: Vec<Cycle>,
    membership: Vec<usize>,
}

impl Cycles {
    /// Perceives the relevant cycles of `molecule`.
    ///
    /// If `ignore_eta_bonds` is set, multi-center bonds do not participate in
    /// any cycle.
    pub fn new(molecule: &Molecule, ignore_eta_bonds: bool) -> Self {
        let edges = molecule
            .bonds()
            .iter()
            .filter(|bond| !(ignore_eta_bonds && bond.bond_type.is_eta()))
            .map(|bond| bond.index);
        Self::from_edges(molecule.num_atoms(), edges)
    }

    pub fn from_edges(num_atoms: usize, edges: impl IntoIterator<Item = BondIndex>) -> Self {
        let graph = EdgeGraph::new(num_atoms, edges);
        let cycles: Vec<Cycle> = graph
            .relevant_cycle_bitsets()
            .into_iter()
            .map(|bits| Cycle::from_edges(graph.edges_of(&bits)))
            .collect();

        let mut membership = vec![0; num_atoms];
        for cycle in &cycles {
            for &atom in cycle.atoms() {
                membership[atom] += 1;
            }
        }

        Self { cycles, membership }
    }

    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cycle> {
        self.cycles.iter()
    }

    pub fn size_less_than(&self, size: usize) -> impl Iterator<Item = &Cycle> {
        self.cycles.iter().filter(move |c| c.size() < size)
    }

    pub fn containing_atom(&self, atom: AtomIndex) -> impl Iterator<Item = &Cycle> {
        self.cycles.iter().filter(move |c| c.contains_atom(atom))
    }

    /// The cycle whose atoms are exactly `atoms`, if any.
    pub fn consisting_of(&self, atoms: &[AtomIndex]) -> Option<&Cycle> {
        let wanted: HashSet<AtomIndex> = atoms.iter().copied().collect();
        self.cycles.iter().find(|c| {
            c.size() == wanted.len() && c.atoms().iter().all(|a| wanted.contains(a))
        })
    }

    pub fn num_relevant_cycles(&self, atom: AtomIndex) -> usize {
        self.membership.get(atom).copied().unwrap_or(0)
    }

    /// Maps every atom that is part of at least one cycle to the size of the
    /// smallest cycle containing it.
    pub fn smallest_cycle_map(&self) -> BTreeMap<AtomIndex, usize> {
        let mut map = BTreeMap::new();
        for cycle in &self.cycles {
            for &atom in cycle.atoms() {
                map.entry(atom)
                    .and_modify(|size: &mut usize| *size = (*size).min(cycle.size()))
                    .or_insert(cycle.size());
            }
        }
        map
    }
}

/// Converts an unordered set of cycle edges into a closed walk of atom indices.
///
/// The returned sequence starts and ends with the same atom, so a cycle of size
/// `n` yields `n + 1` entries.
pub fn make_ring_index_sequence(edges: &[BondIndex]) -> Vec<AtomIndex> {
    let Some(first) = edges.first() else {
        return Vec::new();
    };

    let mut remaining: Vec<BondIndex> = edges[1..].to_vec();
    let mut sequence = vec![first.first, first.second];

    while !remaining.is_empty() {
        let last = sequence[sequence.len() - 1];
        let Some(position) = remaining.iter().position(|e| e.contains(last)) else {
            break;
        };
        let edge = remaining.swap_remove(position);
        if let Some(next) = edge.other(last) {
            sequence.push(next);
        }
    }

    sequence
}

/// Rotates a closed ring index sequence so that it starts and ends at `center`.
pub fn centralize_ring_index_sequence(sequence: &[AtomIndex], center: AtomIndex) -> Vec<AtomIndex> {
    if sequence.len() < 2 {
        return sequence.to_vec();
    }
    let open = &sequence[..sequence.len() - 1];
    let Some(offset) = open.iter().position(|&a| a == center) else {
        return sequence.to_vec();
    };
    let mut rotated: Vec<AtomIndex> = open[offset..]
        .iter()
        .chain(open[..offset].iter())
        .copied()
        .collect();
    rotated.push(center);
    rotated
}

pub fn count_planarity_enforcing_bonds(edges: &[BondIndex], molecule: &Molecule) -> usize {
    edges
        .iter()
        .filter(|&&edge| {
            molecule
                .bond_type(edge)
                .is_some_and(|bond_type| bond_type.enforces_planarity())
        })
        .count()
}

struct EdgeGraph {
    num_atoms: usize,
    edges: Vec<BondIndex>,
    adjacency: Vec<Vec<(AtomIndex, usize)>>,
}

type EdgeBits = Vec<u64>;

struct ShortestPathTree {
    distance: Vec<Option<usize>>,
    parent: Vec<Option<(AtomIndex, usize)>>,
}

impl EdgeGraph {
    fn new(num_atoms: usize, edges: impl IntoIterator<Item = BondIndex>) -> Self {
        let mut unique: Vec<BondIndex> = edges
            .into_iter()
            .filter(|e| e.first != e.second && e.second < num_atoms)
            .collect();
        unique.sort();
        unique.dedup();

        let mut adjacency = vec![Vec::new(); num_atoms];
        for (id, edge) in unique.iter().enumerate() {
            adjacency[edge.first].push((edge.second, id));
            adjacency[edge.second].push((edge.first, id));
        }

        Self {
            num_atoms,
            edges: unique,
            adjacency,
        }
    }

    fn words(&self) -> usize {
        self.edges.len().div_ceil(64).max(1)
    }

    fn edges_of(&self, bits: &EdgeBits) -> Vec<BondIndex> {
        (0..self.edges.len())
            .filter(|&id| bits[id / 64] & (1u64 << (id % 64)) != 0)
            .map(|id| self.edges[id])
            .collect()
    }

    fn shortest_path_tree(&self, root: AtomIndex) -> ShortestPathTree {
        let mut distance = vec![None; self.num_atoms];
        let mut parent = vec![None; self.num_atoms];
        let mut queue = VecDeque::new();
        distance[root] = Some(0);
        queue.push_back(root);

        while let Some(v) = queue.pop_front() {
            let next = distance[v].map_or(0, |d| d + 1);
            for &(w, edge) in &self.adjacency[v] {
                if distance[w].is_none() {
                    distance[w] = Some(next);
                    parent[w] = Some((v, edge));
                    queue.push_back(w);
                }
            }
        }

        ShortestPathTree { distance, parent }
    }

    /// Atoms and edges of the tree path from `v` back to the root (root excluded).
    fn tree_path(tree: &ShortestPathTree, mut v: AtomIndex) -> (Vec<AtomIndex>, Vec<usize>) {
        let mut atoms = Vec::new();
        let mut edges = Vec::new();
        while let Some((p, edge)) = tree.parent[v] {
            atoms.push(v);
            edges.push(edge);
            v = p;
        }
        (atoms, edges)
    }

    fn candidate(&self, tree: &ShortestPathTree, x: AtomIndex, y: AtomIndex, extra: &[usize]) -> Option<EdgeBits> {
        let (atoms_x, edges_x) = Self::tree_path(tree, x);
        let (atoms_y, edges_y) = Self::tree_path(tree, y);
        let disjoint = atoms_x.iter().all(|a| !atoms_y.contains(a));
        if !disjoint {
            return None;
        }
        let mut bits = vec![0u64; self.words()];
        for &edge in edges_x.iter().chain(edges_y.iter()).chain(extra.iter()) {
            bits[edge / 64] ^= 1u64 << (edge % 64);
        }
        Some(bits)
    }

    fn candidate_cycles(&self) -> Vec<EdgeBits> {
        let mut seen: HashSet<EdgeBits> = HashSet::new();
        let mut candidates = Vec::new();

        for root in 0..self.num_atoms {
            let tree = self.shortest_path_tree(root);

            for (id, edge) in self.edges.iter().enumerate() {
                let (x, y) = (edge.first, edge.second);
                let (Some(dx), Some(dy)) = (tree.distance[x], tree.distance[y]) else {
                    continue;
                };
                if dx != dy || tree.parent[x].is_some_and(|(_, e)| e == id) {
                    continue;
                }
                if let Some(bits) = self.candidate(&tree, x, y, &[id]) {
                    if seen.insert(bits.clone()) {
                        candidates.push(bits);
                    }
                }
            }

            for p in 0..self.num_atoms {
                let Some(dp) = tree.distance[p] else { continue };
                if dp == 0 {
                    continue;
                }
                let predecessors: Vec<(AtomIndex, usize)> = self.adjacency[p]
                    .iter()
                    .copied()
                    .filter(|&(w, _)| tree.distance[w] == Some(dp - 1))
                    .collect();
                for (i, &(y, ey)) in predecessors.iter().enumerate() {
                    for &(z, ez) in &predecessors[i + 1..] {
                        if let Some(bits) = self.candidate(&tree, y, z, &[ey, ez]) {
                            if seen.insert(bits.clone()) {
                                candidates.push(bits);
                            }
                        }
                    }
                }
            }
        }

        candidates.retain(|bits| bits.iter().any(|&w| w != 0));
        candidates
    }

    fn relevant_cycle_bitsets(&self) -> Vec<EdgeBits> {
        let mut candidates = self.candidate_cycles();
        candidates.sort_by_key(|bits| (popcount(bits), bits.clone()));

        let mut basis: Vec<(usize, EdgeBits)> = Vec::new();
        let mut relevant = Vec::new();

        let mut start = 0;
        while start < candidates.len() {
            let length = popcount(&candidates[start]);
            let end = candidates[start..]
                .iter()
                .position(|c| popcount(c) != length)
                .map_or(candidates.len(), |offset| start + offset);

            let group = &candidates[start..end];
            for cycle in group {
                if reduce(&basis, cycle.clone()).iter().any(|&w| w != 0) {
                    relevant.push(cycle.clone());
                }
            }
            for cycle in group {
                let reduced = reduce(&basis, cycle.clone());
                if let Some(pivot) = lowest_bit(&reduced) {
                    basis.push((pivot, reduced));
                }
            }

            start = end;
        }

        relevant
    }
}

fn popcount(bits: &EdgeBits) -> usize {
    bits.iter().map(|w| w.count_ones() as usize).sum()
}

fn lowest_bit(bits: &EdgeBits) -> Option<usize> {
    bits.iter()
        .enumerate()
        .find(|(_, w)| **w != 0)
        .map(|(i, w)| i * 64 + w.trailing_zeros() as usize)
}

fn reduce(basis: &[(usize, EdgeBits)], mut bits: EdgeBits) -> EdgeBits {
    for (pivot, row) in basis {
        if bits[pivot / 64] & (1u64 << (pivot % 64)) != 0 {
            for (w, r) in bits.iter_mut().zip(row.iter()) {
                *w ^= r;
            }
        }
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(atoms: &[usize]) -> Vec<BondIndex> {
        (0..atoms.len())
            .map(|i| BondIndex::new(atoms[i], atoms[(i + 1) % atoms.len()]))
            .collect()
    }

    fn sorted_sizes(cycles: &Cycles) -> Vec<usize> {
        let mut sizes: Vec<usize> = cycles.iter().map(|c| c.size()).collect();
        sizes.sort();
        sizes
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let edges = vec![BondIndex::new(0, 1), BondIndex::new(1, 2), BondIndex::new(2, 3)];
        let cycles = Cycles::from_edges(4, edges);
        assert!(cycles.is_empty());
        assert_eq!(cycles.num_relevant_cycles(1), 0);
        assert!(cycles.smallest_cycle_map().is_empty());
    }

    #[test]
    fn cyclopropane_has_single_three_membered_ring() {
        let cycles = Cycles::from_edges(3, ring(&[0, 1, 2]));
        assert_eq!(sorted_sizes(&cycles), vec![3]);
        for atom in 0..3 {
            assert_eq!(cycles.num_relevant_cycles(atom), 1);
        }
    }

    #[test]
    fn bicyclobutane_envelope_is_not_relevant() {
        let mut edges = ring(&[0, 1, 2, 3]);
        edges.push(BondIndex::new(0, 2));
        let cycles = Cycles::from_edges(4, edges);
        assert_eq!(sorted_sizes(&cycles), vec![3, 3]);
        assert_eq!(cycles.num_relevant_cycles(0), 2);
        assert_eq!(cycles.num_relevant_cycles(1), 1);
    }

    #[test]
    fn naphthalene_skeleton_has_two_six_membered_rings() {
        let mut edges = ring(&[0, 1, 2, 3, 4, 5]);
        edges.extend([
            BondIndex::new(4, 6),
            BondIndex::new(6, 7),
            BondIndex::new(7, 8),
            BondIndex::new(8, 9),
            BondIndex::new(9, 5),
        ]);
        let cycles = Cycles::from_edges(10, edges);
        assert_eq!(sorted_sizes(&cycles), vec![6, 6]);
        assert_eq!(cycles.num_relevant_cycles(4), 2);
        assert_eq!(cycles.num_relevant_cycles(0), 1);
    }

    #[test]
    fn cubane_skeleton_has_six_relevant_four_membered_rings() {
        let mut edges = ring(&[0, 1, 2, 3]);
        edges.extend(ring(&[4, 5, 6, 7]));
        edges.extend((0..4).map(|i| BondIndex::new(i, i + 4)));
        let cycles = Cycles::from_edges(8, edges);
        assert_eq!(sorted_sizes(&cycles), vec![4; 6]);
        for atom in 0..8 {
            assert_eq!(cycles.num_relevant_cycles(atom), 3);
        }
    }

    #[test]
    fn spiropentane_rings_meet_at_a_single_atom() {
        let mut edges = ring(&[0, 1, 2]);
        edges.extend(ring(&[0, 3, 4]));
        let cycles = Cycles::from_edges(5, edges);
        assert_eq!(sorted_sizes(&cycles), vec![3, 3]);
        assert_eq!(cycles.num_relevant_cycles(0), 2);
        assert_eq!(cycles.containing_atom(0).count(), 2);
        assert_eq!(cycles.smallest_cycle_map().get(&3), Some(&3));
    }

    #[test]
    fn size_less_than_filters_cycles() {
        let mut edges = ring(&[0, 1, 2]);
        edges.extend(ring(&[3, 4, 5, 6, 7, 8]));
        let cycles = Cycles::from_edges(9, edges);
        assert_eq!(cycles.size_less_than(6).count(), 1);
        assert!(cycles.size_less_than(6).all(|c| c.size() < 6));
        assert_eq!(cycles.size_less_than(7).count(), 2);
    }

    #[test]
    fn consisting_of_matches_exact_atom_sets() {
        let mut edges = ring(&[0, 1, 2, 3, 4]);
        edges.push(BondIndex::new(0, 5));
        let cycles = Cycles::from_edges(6, edges);
        assert!(cycles.consisting_of(&[4, 3, 2, 1, 0]).is_some());
        assert!(cycles.consisting_of(&[0, 1, 2, 3]).is_none());
        assert!(cycles.consisting_of(&[0, 1, 2, 3, 5]).is_none());
    }

    #[test]
    fn ring_index_sequence_is_closed_walk() {
        let edges = vec![
            BondIndex::new(3, 9),
            BondIndex::new(4, 7),
            BondIndex::new(7, 9),
            BondIndex::new(3, 4),
        ];
        let sequence = make_ring_index_sequence(&edges);
        assert_eq!(sequence.len(), 5);
        assert_eq!(sequence.first(), sequence.last());
        for pair in sequence.windows(2) {
            assert!(edges.contains(&BondIndex::new(pair[0], pair[1])));
        }
    }

    #[test]
    fn centralize_rotates_sequence_to_start_at_center() {
        let sequence = vec![3, 9, 7, 4, 3];
        let centralized = centralize_ring_index_sequence(&sequence, 7);
        assert_eq!(centralized, vec![7, 4, 3, 9, 7]);
        assert_eq!(centralize_ring_index_sequence(&sequence, 42), sequence);
    }
}
