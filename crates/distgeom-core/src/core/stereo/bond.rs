use super::AssignmentError;
use super::constraints::{
    ChiralityPrototype, ChiralityTarget, DihedralConstraint, EmissionParameters, ModelContributions,
};
use crate::core::cycles::Cycles;
use crate::core::models::ids::{AtomIndex, BondIndex};
use crate::core::models::molecule::Molecule;
use crate::core::models::ranking::rank_ligands;
use crate::core::models::topology::BondType;
use crate::core::models::value_bounds::ValueBounds;
use rand::Rng;
use std::f64::consts::PI;

/// Double bonds in rings of up to this many atoms cannot be trans.
pub const MAX_CIS_ONLY_CYCLE_SIZE: usize = 7;

/// One end of a double bond with its substituents, highest rank first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondSide {
    pub atom: AtomIndex,
    pub substituents: Vec<AtomIndex>,
    /// Whether the two substituents can be told apart.
    pub distinct: bool,
}

impl BondSide {
    fn position(&self, atom: AtomIndex) -> Option<usize> {
        self.substituents.iter().position(|&s| s == atom)
    }
}

/// E/Z isomerism about a double bond between two planar ends.
///
/// Arrangement `0` places the highest-ranked substituents of both ends cis,
/// arrangement `1` places them trans. A bond inside a small ring only admits
/// the arrangement that keeps the ring atoms cis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondStereocenter {
    bond: BondIndex,
    sides: [BondSide; 2],
    /// Feasible arrangements, indexed by assignment.
    arrangements: Vec<usize>,
    assignment: Option<usize>,
}

impl BondStereocenter {
    /// Describes the double bond `bond`, or returns `None` if it is not a
    /// double bond or either end does not carry one or two plain substituents.
    pub fn try_new(
        molecule: &Molecule,
        cycles: &Cycles,
        classes: &[usize],
        bond: BondIndex,
    ) -> Option<Self> {
        if molecule.bond_type(bond) != Some(BondType::Double) {
            return None;
        }

        let side = |atom: AtomIndex, partner: AtomIndex| -> Option<BondSide> {
            let ranking = rank_ligands(molecule, classes, atom, Some(partner));
            if !(1..=2).contains(&ranking.ligands.len())
                || ranking.ligands.iter().any(|ligand| ligand.len() != 1)
            {
                return None;
            }
            let mut ranked: Vec<(usize, AtomIndex)> = ranking
                .ranks
                .iter()
                .zip(&ranking.ligands)
                .map(|(&rank, ligand)| (rank, ligand[0]))
                .collect();
            ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
            Some(BondSide {
                atom,
                distinct: ranked.len() == 2 && ranked[0].0 != ranked[1].0,
                substituents: ranked.into_iter().map(|(_, atom)| atom).collect(),
            })
        };

        let sides = [
            side(bond.first, bond.second)?,
            side(bond.second, bond.first)?,
        ];
        let arrangements = match ring_arrangement(cycles, bond, &sides) {
            Some(arrangement) => vec![arrangement],
            None if sides.iter().all(|s| s.distinct) => vec![0, 1],
            None => vec![0],
        };
        Some(Self {
            bond,
            assignment: (arrangements.len() == 1).then_some(0),
            sides,
            arrangements,
        })
    }

    pub fn bond(&self) -> BondIndex {
        self.bond
    }

    pub fn sides(&self) -> &[BondSide; 2] {
        &self.sides
    }

    pub fn num_assignments(&self) -> usize {
        self.arrangements.len()
    }

    pub fn assignment(&self) -> Option<usize> {
        self.assignment
    }

    pub fn weights(&self) -> Vec<u32> {
        vec![1; self.num_assignments()]
    }

    pub fn assign(&mut self, assignment: Option<usize>) -> Result<(), AssignmentError> {
        match assignment {
            Some(value) if value >= self.num_assignments() => Err(AssignmentError {
                assignment: value,
                num_assignments: self.num_assignments(),
            }),
            _ => {
                self.assignment = assignment;
                Ok(())
            }
        }
    }

    pub fn assign_random(&mut self, rng: &mut impl Rng) -> Option<usize> {
        self.assignment = Some(rng.gen_range(0..self.num_assignments()));
        self.assignment
    }

    /// Whether substituent `a` of the first end and `b` of the second end are
    /// cis under the current assignment.
    pub fn is_cis(&self, a: AtomIndex, b: AtomIndex) -> Option<bool> {
        let arrangement = *self.arrangements.get(self.assignment?)?;
        let pa = self.sides[0].position(a)?;
        let pb = self.sides[1].position(b)?;
        Some((pa + pb + arrangement) % 2 == 0)
    }

    fn substituent_pairs(&self) -> impl Iterator<Item = (AtomIndex, AtomIndex, bool)> + '_ {
        self.sides[0].substituents.iter().flat_map(move |&a| {
            self.sides[1]
                .substituents
                .iter()
                .filter_map(move |&b| self.is_cis(a, b).map(|cis| (a, b, cis)))
        })
    }

    /// Dihedral bounds in `[0, π]` for every substituent pair across the bond.
    pub fn model_contributions(&self, parameters: &EmissionParameters) -> ModelContributions {
        let variance = parameters.angle_absolute_variance * parameters.looseness;
        let (left, right) = (self.sides[0].atom, self.sides[1].atom);
        ModelContributions {
            dihedrals: self
                .substituent_pairs()
                .map(|(a, b, cis)| {
                    let bounds = if cis {
                        ValueBounds::new(0.0, variance)
                    } else {
                        ValueBounds::new(PI - variance, PI)
                    };
                    ([a, left, right, b], bounds)
                })
                .collect(),
            ..Default::default()
        }
    }

    /// Each substituent pair and the bond atoms must stay coplanar.
    pub fn chirality_prototypes(&self) -> Vec<ChiralityPrototype> {
        let (left, right) = (self.sides[0].atom, self.sides[1].atom);
        self.substituent_pairs()
            .map(|(a, b, _)| ChiralityPrototype {
                atoms: [a, left, right, b],
                target: ChiralityTarget::Flat,
            })
            .collect()
    }

    /// Signed dihedral windows used during refinement.
    pub fn dihedral_constraints(&self, parameters: &EmissionParameters) -> Vec<DihedralConstraint> {
        let variance = parameters.angle_absolute_variance * parameters.looseness;
        let (left, right) = (self.sides[0].atom, self.sides[1].atom);
        self.substituent_pairs()
            .map(|(a, b, cis)| {
                let center = if cis { 0.0 } else { PI };
                DihedralConstraint {
                    atoms: [a, left, right, b],
                    lower: center - variance,
                    upper: center + variance,
                }
            })
            .collect()
    }
}

/// The only arrangement that closes the smallest ring through `bond`, if that
/// ring is small enough to forbid trans substituents.
fn ring_arrangement(cycles: &Cycles, bond: BondIndex, sides: &[BondSide; 2]) -> Option<usize> {
    let cycle = cycles
        .size_less_than(MAX_CIS_ONLY_CYCLE_SIZE + 1)
        .filter(|cycle| cycle.contains_edge(bond))
        .min_by_key(|cycle| cycle.size())?;
    let pa = sides[0].substituents.iter().position(|&s| cycle.contains_atom(s))?;
    let pb = sides[1].substituents.iter().position(|&s| cycle.contains_atom(s))?;
    Some((pa + pb) % 2)
}
