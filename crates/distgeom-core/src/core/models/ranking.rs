use super::ids::AtomIndex;
use super::molecule::Molecule;
use std::collections::BTreeMap;

/// Ligands of a central atom grouped into equivalence classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LigandRanking {
    /// Atoms making up each ligand. Haptic ligands contain several atoms.
    pub ligands: Vec<Vec<AtomIndex>>,
    /// Dense rank class of each ligand. Ligands with equal rank are
    /// topologically indistinguishable.
    pub ranks: Vec<usize>,
}

impl LigandRanking {
    pub fn num_classes(&self) -> usize {
        self.ranks.iter().max().map_or(0, |&max| max + 1)
    }

    /// Whether every ligand is in its own rank class.
    pub fn all_distinct(&self) -> bool {
        self.num_classes() == self.ligands.len()
    }
}

/// Symmetry classes of all atoms by iterative refinement of atom invariants
/// (element, charge, degree, then the multiset of neighbor classes).
pub fn atom_classes(molecule: &Molecule) -> Vec<usize> {
    let n = molecule.num_atoms();
    let initial: Vec<(u8, i32, usize)> = (0..n)
        .map(|i| {
            let atom = &molecule.atoms()[i];
            (atom.element.atomic_number(), atom.charge, molecule.neighbors(i).len())
        })
        .collect();
    let mut classes = densify(&initial);
    let mut num_classes = count_classes(&classes);

    for _ in 0..n {
        let invariants: Vec<(usize, Vec<(usize, u8)>)> = (0..n)
            .map(|i| {
                let mut neighborhood: Vec<(usize, u8)> = molecule
                    .neighbors(i)
                    .iter()
                    .map(|&j| {
                        let bond_type = molecule.bond_type_between(i, j).map_or(0, |b| b as u8);
                        (classes[j], bond_type)
                    })
                    .collect();
                neighborhood.sort_unstable();
                (classes[i], neighborhood)
            })
            .collect();

        let refined = densify(&invariants);
        let refined_count = count_classes(&refined);
        classes = refined;
        if refined_count == num_classes {
            break;
        }
        num_classes = refined_count;
    }

    classes
}

/// Ranks the ligands of `center`, optionally leaving out one neighbor (the
/// partner atom of a bond stereocenter).
pub fn rank_ligands(
    molecule: &Molecule,
    classes: &[usize],
    center: AtomIndex,
    excluding: Option<AtomIndex>,
) -> LigandRanking {
    let ligands: Vec<Vec<AtomIndex>> = molecule
        .ligands(center)
        .into_iter()
        .filter(|ligand| !excluding.is_some_and(|excluded| ligand.contains(&excluded)))
        .collect();

    let keys: Vec<Vec<usize>> = ligands
        .iter()
        .map(|ligand| {
            let mut key: Vec<usize> = ligand.iter().map(|&atom| classes[atom]).collect();
            key.sort_unstable();
            key
        })
        .collect();

    LigandRanking {
        ranks: densify(&keys),
        ligands,
    }
}

fn densify<T: Ord + Clone>(values: &[T]) -> Vec<usize> {
    let mut sorted: Vec<T> = values.to_vec();
    sorted.sort();
    sorted.dedup();
    let lookup: BTreeMap<&T, usize> = sorted.iter().enumerate().map(|(i, v)| (v, i)).collect();
    values.iter().map(|v| lookup[v]).collect()
}

fn count_classes(classes: &[usize]) -> usize {
    classes.iter().max().map_or(0, |&max| max + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::element::Element;
    use crate::core::models::molecule::MoleculeBuilder;
    use crate::core::models::topology::BondType;

    #[test]
    fn methane_hydrogens_share_a_class() {
        let mut builder = MoleculeBuilder::new();
        let c = builder.add_atom(Element::C);
        let hs: Vec<_> = (0..4).map(|_| builder.add_atom(Element::H)).collect();
        for &h in &hs {
            builder.add_bond(c, h, BondType::Single).unwrap();
        }
        let molecule = builder.build().unwrap();
        let classes = atom_classes(&molecule);
        assert!(hs.iter().all(|&h| classes[h] == classes[hs[0]]));
        assert_ne!(classes[c], classes[hs[0]]);

        let ranking = rank_ligands(&molecule, &classes, c, None);
        assert_eq!(ranking.ligands.len(), 4);
        assert_eq!(ranking.num_classes(), 1);
    }

    #[test]
    fn chlorofluoromethane_center_has_distinct_halogens() {
        let mut builder = MoleculeBuilder::new();
        let c = builder.add_atom(Element::C);
        let f = builder.add_atom(Element::F);
        let cl = builder.add_atom(Element::Cl);
        let h1 = builder.add_atom(Element::H);
        let h2 = builder.add_atom(Element::H);
        for atom in [f, cl, h1, h2] {
            builder.add_bond(c, atom, BondType::Single).unwrap();
        }
        let molecule = builder.build().unwrap();
        let classes = atom_classes(&molecule);
        let ranking = rank_ligands(&molecule, &classes, c, None);
        assert_eq!(ranking.num_classes(), 3);
        assert!(!ranking.all_distinct());
    }

    #[test]
    fn refinement_distinguishes_atoms_by_environment() {
        // Propanol: C0-C1-C2-O3, all three carbons differ.
        let mut builder = MoleculeBuilder::new();
        let c0 = builder.add_atom(Element::C);
        let c1 = builder.add_atom(Element::C);
        let c2 = builder.add_atom(Element::C);
        let o = builder.add_atom(Element::O);
        builder.add_bond(c0, c1, BondType::Single).unwrap();
        builder.add_bond(c1, c2, BondType::Single).unwrap();
        builder.add_bond(c2, o, BondType::Single).unwrap();
        let molecule = builder.build().unwrap();
        let classes = atom_classes(&molecule);
        assert_ne!(classes[c0], classes[c1]);
        assert_ne!(classes[c1], classes[c2]);
        assert_ne!(classes[c0], classes[c2]);
    }

    #[test]
    fn excluded_neighbor_is_not_ranked() {
        let mut builder = MoleculeBuilder::new();
        let c0 = builder.add_atom(Element::C);
        let c1 = builder.add_atom(Element::C);
        let h = builder.add_atom(Element::H);
        let f = builder.add_atom(Element::F);
        builder.add_bond(c0, c1, BondType::Double).unwrap();
        builder.add_bond(c0, h, BondType::Single).unwrap();
        builder.add_bond(c0, f, BondType::Single).unwrap();
        let molecule = builder.build().unwrap();
        let classes = atom_classes(&molecule);
        let ranking = rank_ligands(&molecule, &classes, c0, Some(c1));
        assert_eq!(ranking.ligands, vec![vec![h], vec![f]]);
        assert!(ranking.all_distinct());
    }
}
