use super::error::BoundsError;
use super::spatial_model::BoundsList;
use crate::core::models::ids::AtomIndex;
use crate::core::models::molecule::Molecule;
use crate::core::models::value_bounds::ValueBounds;
use nalgebra::DMatrix;
use tracing::{instrument, trace};

/// Upper distance of unconstrained atom pairs, in Ångström.
pub const DEFAULT_UPPER: f64 = 100.0;

/// Lower bounds exceeding upper bounds by less than this are treated as
/// rounding noise and collapsed.
const INCONSISTENCY_TOLERANCE: f64 = 1e-8;

/// Symmetric matrix of pairwise distance windows over all atoms.
///
/// Pairs without explicit bounds default to the sum of the van der Waals
/// radii as lower and [`DEFAULT_UPPER`] as upper bound.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceBoundsMatrix {
    lower: DMatrix<f64>,
    upper: DMatrix<f64>,
}

impl DistanceBoundsMatrix {
    pub fn new(molecule: &Molecule, list: &BoundsList) -> Result<Self, BoundsError> {
        let n = molecule.num_atoms();
        let mut lower = DMatrix::zeros(n, n);
        let mut upper = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in (i + 1)..n {
                let vdw = molecule.element(i).vdw_radius() + molecule.element(j).vdw_radius();
                let default_lower = vdw.min(DEFAULT_UPPER);
                lower[(i, j)] = default_lower;
                lower[(j, i)] = default_lower;
                upper[(i, j)] = DEFAULT_UPPER;
                upper[(j, i)] = DEFAULT_UPPER;
            }
        }

        let mut matrix = Self { lower, upper };
        for (&[i, j], &bounds) in list {
            matrix.set_bounds(i, j, bounds)?;
        }
        Ok(matrix)
    }

    pub fn num_atoms(&self) -> usize {
        self.lower.nrows()
    }

    #[inline]
    pub fn lower(&self, i: AtomIndex, j: AtomIndex) -> f64 {
        self.lower[(i, j)]
    }

    #[inline]
    pub fn upper(&self, i: AtomIndex, j: AtomIndex) -> f64 {
        self.upper[(i, j)]
    }

    pub fn bounds(&self, i: AtomIndex, j: AtomIndex) -> ValueBounds {
        ValueBounds {
            lower: self.lower(i, j),
            upper: self.upper(i, j),
        }
    }

    /// Overwrites the window of a pair.
    pub fn set_bounds(
        &mut self,
        i: AtomIndex,
        j: AtomIndex,
        bounds: ValueBounds,
    ) -> Result<(), BoundsError> {
        let n = self.num_atoms();
        for index in [i, j] {
            if index >= n {
                return Err(BoundsError::AtomOutOfRange {
                    index,
                    num_atoms: n,
                });
            }
        }
        if !bounds.lower.is_finite() || !bounds.upper.is_finite() {
            return Err(BoundsError::NotFinite {
                first: i,
                second: j,
            });
        }
        if bounds.lower > bounds.upper || i == j {
            return Err(BoundsError::Inconsistent {
                first: i,
                second: j,
                lower: bounds.lower,
                upper: bounds.upper,
            });
        }
        self.lower[(i, j)] = bounds.lower;
        self.lower[(j, i)] = bounds.lower;
        self.upper[(i, j)] = bounds.upper;
        self.upper[(j, i)] = bounds.upper;
        Ok(())
    }

    /// Fixes the distance of a pair to a single value.
    pub fn set_distance(&mut self, i: AtomIndex, j: AtomIndex, distance: f64) -> Result<(), BoundsError> {
        self.set_bounds(i, j, ValueBounds::new(distance, distance))
    }

    /// Tightens all windows until they obey the triangle inequalities.
    ///
    /// Uppers are shortened along shortest paths and lowers raised by the
    /// inverse triangle inequality. A single pass over all intermediate atoms
    /// reaches the fixpoint.
    #[instrument(level = "trace", skip_all, fields(atoms = self.num_atoms()))]
    pub fn smooth(&mut self) -> Result<(), BoundsError> {
        let n = self.num_atoms();
        for k in 0..n {
            for i in 0..n {
                if i == k {
                    continue;
                }
                let upper_ik = self.upper[(i, k)];
                let lower_ik = self.lower[(i, k)];
                for j in (i + 1)..n {
                    if j == k {
                        continue;
                    }
                    let upper_kj = self.upper[(k, j)];
                    let lower_kj = self.lower[(k, j)];

                    let mut upper_ij = self.upper[(i, j)];
                    if upper_ij > upper_ik + upper_kj {
                        upper_ij = upper_ik + upper_kj;
                    }

                    let mut lower_ij = self.lower[(i, j)];
                    if lower_ij < lower_ik - upper_kj {
                        lower_ij = lower_ik - upper_kj;
                    } else if lower_ij < lower_kj - upper_ik {
                        lower_ij = lower_kj - upper_ik;
                    }

                    if lower_ij > upper_ij {
                        if lower_ij - upper_ij <= INCONSISTENCY_TOLERANCE {
                            lower_ij = upper_ij;
                        } else {
                            trace!(i, j, k, lower_ij, upper_ij, "Triangle smoothing failed");
                            return Err(BoundsError::Inconsistent {
                                first: i,
                                second: j,
                                lower: lower_ij,
                                upper: upper_ij,
                            });
                        }
                    }

                    self.upper[(i, j)] = upper_ij;
                    self.upper[(j, i)] = upper_ij;
                    self.lower[(i, j)] = lower_ij;
                    self.lower[(j, i)] = lower_ij;
                }
            }
        }
        Ok(())
    }

    /// Number of pairs whose lower bound exceeds the upper bound.
    pub fn bound_inconsistencies(&self) -> usize {
        let n = self.num_atoms();
        (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .filter(|&(i, j)| self.lower(i, j) > self.upper(i, j))
            .count()
    }

    /// Whether every triple satisfies both triangle inequalities within `tolerance`.
    pub fn satisfies_triangle_inequalities(&self, tolerance: f64) -> bool {
        let n = self.num_atoms();
        (0..n).all(|i| {
            (0..n).all(|j| {
                i == j
                    || (0..n).all(|k| {
                        k == i
                            || k == j
                            || (self.upper(i, j) <= self.upper(i, k) + self.upper(k, j) + tolerance
                                && self.lower(i, j) + tolerance
                                    >= self.lower(i, k) - self.upper(k, j))
                    })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::element::Element;
    use crate::core::models::molecule::MoleculeBuilder;
    use crate::core::models::topology::BondType;
    use crate::engine::config::Configuration;
    use crate::engine::spatial_model::SpatialModel;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn hydrogen_cluster(n: usize) -> Molecule {
        let mut builder = MoleculeBuilder::new();
        for _ in 0..n {
            builder.add_atom(Element::H);
        }
        builder.build().unwrap()
    }

    fn list(entries: &[([usize; 2], f64, f64)]) -> BoundsList {
        entries
            .iter()
            .map(|&(pair, lower, upper)| (pair, ValueBounds::new(lower, upper)))
            .collect()
    }

    #[test]
    fn defaults_use_van_der_waals_radii() {
        let matrix = DistanceBoundsMatrix::new(&hydrogen_cluster(2), &BoundsList::new()).unwrap();
        let expected = 2.0 * Element::H.vdw_radius();
        assert!((matrix.lower(0, 1) - expected).abs() < 1e-12);
        assert_eq!(matrix.upper(1, 0), DEFAULT_UPPER);
        assert_eq!(matrix.lower(0, 0), 0.0);
    }

    #[test]
    fn smoothing_shortens_uppers_and_raises_lowers() {
        let molecule = hydrogen_cluster(3);
        let bounds = list(&[([0, 1], 1.0, 1.0), ([1, 2], 1.0, 1.0), ([0, 2], 0.0, 50.0)]);
        let mut matrix = DistanceBoundsMatrix::new(&molecule, &bounds).unwrap();
        matrix.smooth().unwrap();
        assert!((matrix.upper(0, 2) - 2.0).abs() < 1e-12);
        assert_eq!(matrix.lower(0, 2), 0.0);

        let bounds = list(&[([0, 1], 5.0, 5.0), ([1, 2], 1.0, 1.0)]);
        let mut matrix = DistanceBoundsMatrix::new(&molecule, &bounds).unwrap();
        matrix.smooth().unwrap();
        assert!((matrix.lower(0, 2) - 4.0).abs() < 1e-12);
        assert!((matrix.upper(0, 2) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn smoothed_bounds_obey_triangle_inequalities() {
        let mut builder = MoleculeBuilder::new();
        let carbons: Vec<_> = (0..6).map(|_| builder.add_atom(Element::C)).collect();
        for i in 0..6 {
            builder
                .add_bond(carbons[i], carbons[(i + 1) % 6], BondType::Single)
                .unwrap();
        }
        let molecule = builder.build().unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let model = SpatialModel::new(&molecule, &Configuration::default(), &mut rng);

        let mut matrix = DistanceBoundsMatrix::new(&molecule, &model.make_bounds_list()).unwrap();
        matrix.smooth().unwrap();
        assert_eq!(matrix.bound_inconsistencies(), 0);
        assert!(matrix.satisfies_triangle_inequalities(1e-9));
    }

    #[test]
    fn contradictory_bounds_fail_to_smooth() {
        let molecule = hydrogen_cluster(3);
        let bounds = list(&[([0, 1], 1.0, 1.0), ([1, 2], 1.0, 1.0), ([0, 2], 3.0, 3.0)]);
        let mut matrix = DistanceBoundsMatrix::new(&molecule, &bounds).unwrap();
        assert!(matches!(matrix.smooth(), Err(BoundsError::Inconsistent { .. })));
    }

    #[test]
    fn invalid_entries_are_rejected() {
        let molecule = hydrogen_cluster(2);
        let out_of_range = list(&[([0, 4], 1.0, 2.0)]);
        assert!(matches!(
            DistanceBoundsMatrix::new(&molecule, &out_of_range),
            Err(BoundsError::AtomOutOfRange { index: 4, .. })
        ));
        let not_finite: BoundsList = [([0, 1], ValueBounds { lower: 1.0, upper: f64::INFINITY })]
            .into_iter()
            .collect();
        assert!(matches!(
            DistanceBoundsMatrix::new(&molecule, &not_finite),
            Err(BoundsError::NotFinite { .. })
        ));
    }
}
