use super::bounds::DistanceBoundsMatrix;
use crate::core::models::ids::AtomIndex;
use crate::core::stereo::constraints::{ChiralityPrototype, ChiralityTarget};
use crate::core::utils::geometry::signed_volume;
use nalgebra::{Matrix3, Vector3};

/// A window on the signed volume `(p_i - p_l) · ((p_j - p_l) × (p_k - p_l))`
/// of four atoms, in Å³.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChiralityConstraint {
    pub atoms: [AtomIndex; 4],
    pub lower: f64,
    pub upper: f64,
}

impl ChiralityConstraint {
    pub fn is_flat(&self) -> bool {
        self.lower == 0.0 && self.upper == 0.0
    }

    /// Target sign of the volume: `1`, `-1`, or `0` for flat constraints.
    pub fn target_sign(&self) -> f64 {
        let center = (self.lower + self.upper) / 2.0;
        if self.is_flat() { 0.0 } else { center.signum() }
    }

    pub fn volume(&self, positions: &[Vector3<f64>]) -> f64 {
        let [i, j, k, l] = self.atoms;
        signed_volume(&positions[i], &positions[j], &positions[k], &positions[l])
    }
}

/// Magnitude of the triple product spanned by a tetrahedron with the given
/// edge lengths, or zero if the lengths cannot close a tetrahedron.
///
/// `edges` holds `d(i,l), d(j,l), d(k,l), d(i,j), d(i,k), d(j,k)`.
pub fn volume_from_edges(edges: [f64; 6]) -> f64 {
    let [il, jl, kl, ij, ik, jk] = edges;
    let dot = |a: f64, b: f64, across: f64| (a * a + b * b - across * across) / 2.0;
    let gram = Matrix3::new(
        il * il,
        dot(il, jl, ij),
        dot(il, kl, ik),
        dot(il, jl, ij),
        jl * jl,
        dot(jl, kl, jk),
        dot(il, kl, ik),
        dot(jl, kl, jk),
        kl * kl,
    );
    gram.determinant().max(0.0).sqrt()
}

/// Turns prototypes into volume windows using the pair distance bounds.
///
/// The magnitude window spans the volumes of the all-lower and the all-upper
/// tetrahedra; the target sign decides which side of zero it lies on.
pub fn realize(prototypes: &[ChiralityPrototype], bounds: &DistanceBoundsMatrix) -> Vec<ChiralityConstraint> {
    prototypes
        .iter()
        .map(|prototype| {
            let atoms = prototype.atoms;
            if prototype.target == ChiralityTarget::Flat {
                return ChiralityConstraint {
                    atoms,
                    lower: 0.0,
                    upper: 0.0,
                };
            }

            let [i, j, k, l] = atoms;
            let pairs = [(i, l), (j, l), (k, l), (i, j), (i, k), (j, k)];
            let lower_volume = volume_from_edges(pairs.map(|(a, b)| bounds.lower(a, b)));
            let upper_volume = volume_from_edges(pairs.map(|(a, b)| bounds.upper(a, b)));
            let (smaller, larger) = if lower_volume <= upper_volume {
                (lower_volume, upper_volume)
            } else {
                (upper_volume, lower_volume)
            };

            match prototype.target {
                ChiralityTarget::Positive => ChiralityConstraint {
                    atoms,
                    lower: smaller,
                    upper: larger,
                },
                _ => ChiralityConstraint {
                    atoms,
                    lower: -larger,
                    upper: -smaller,
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::element::Element;
    use crate::core::models::molecule::MoleculeBuilder;
    use crate::core::models::value_bounds::ValueBounds;
    use crate::core::shapes::Shape;
    use crate::engine::spatial_model::BoundsList;

    /// Bounds matrix over a center (atom 0) and the vertices of `shape`
    /// (atoms 1..), with windows of ±1% around the ideal distances.
    fn ideal_bounds(shape: Shape, bond: f64) -> (DistanceBoundsMatrix, Vec<Vector3<f64>>) {
        let mut positions: Vec<Vector3<f64>> = vec![Vector3::zeros()];
        positions.extend(shape.coordinates().into_iter().map(|p| p * bond));

        let mut builder = MoleculeBuilder::new();
        for _ in 0..positions.len() {
            builder.add_atom(Element::C);
        }
        let molecule = builder.build().unwrap();

        let mut list = BoundsList::new();
        for a in 0..positions.len() {
            for b in (a + 1)..positions.len() {
                let d = (positions[a] - positions[b]).norm();
                list.insert([a, b], ValueBounds::relative(d, 0.01));
            }
        }
        (DistanceBoundsMatrix::new(&molecule, &list).unwrap(), positions)
    }

    fn atoms_of(tetrahedron: &[Option<usize>; 4]) -> [AtomIndex; 4] {
        tetrahedron.map(|vertex| vertex.map_or(0, |v| v + 1))
    }

    #[test]
    fn edge_volume_matches_triple_product() {
        let p = [
            Vector3::new(0.3, 0.1, 1.2),
            Vector3::new(1.4, 0.0, 0.1),
            Vector3::new(0.0, 1.1, -0.2),
            Vector3::new(0.0, 0.0, 0.0),
        ];
        let d = |a: usize, b: usize| (p[a] - p[b]).norm();
        let magnitude = volume_from_edges([d(0, 3), d(1, 3), d(2, 3), d(0, 1), d(0, 2), d(1, 2)]);
        assert!((magnitude - signed_volume(&p[0], &p[1], &p[2], &p[3]).abs()).abs() < 1e-9);
    }

    #[test]
    fn realized_signs_round_trip_through_ideal_shapes() {
        for shape in [Shape::Tetrahedral, Shape::TrigonalPyramidal, Shape::Octahedral, Shape::Seesaw] {
            let (bounds, positions) = ideal_bounds(shape, 1.5);
            for tetrahedron in shape.tetrahedra() {
                let ideal = shape.ideal_volume(tetrahedron);
                let target = ChiralityTarget::from_volume(ideal, 0.1);
                if target == ChiralityTarget::Flat {
                    continue;
                }
                let prototype = ChiralityPrototype {
                    atoms: atoms_of(tetrahedron),
                    target,
                };
                let constraint = realize(&[prototype], &bounds)[0];
                let volume = constraint.volume(&positions);
                assert_eq!(volume.signum(), constraint.target_sign(), "{shape}");
                assert!(constraint.lower <= volume && volume <= constraint.upper, "{shape}");
            }
        }
    }

    #[test]
    fn flat_targets_have_vanishing_volume() {
        let (bounds, positions) = ideal_bounds(Shape::SquarePlanar, 2.0);
        for tetrahedron in Shape::SquarePlanar.tetrahedra() {
            let prototype = ChiralityPrototype {
                atoms: atoms_of(tetrahedron),
                target: ChiralityTarget::Flat,
            };
            let constraint = realize(&[prototype], &bounds)[0];
            assert!(constraint.is_flat());
            assert_eq!(constraint.target_sign(), 0.0);
            assert!(constraint.volume(&positions).abs() < 1e-9);
        }
    }
}
