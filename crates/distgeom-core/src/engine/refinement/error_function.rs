use super::RefinementStage;
use crate::core::stereo::constraints::DihedralConstraint;
use crate::core::utils::geometry::{dihedral, signed_volume};
use crate::engine::bounds::DistanceBoundsMatrix;
use crate::engine::chirality::ChiralityConstraint;
use crate::engine::config::ModelConstants;
use crate::engine::error::DgError;
use nalgebra::{DVector, Vector3, Vector4};
use std::f64::consts::PI;

const DIMENSIONS: usize = 4;

#[inline]
fn point(x: &DVector<f64>, atom: usize) -> Vector3<f64> {
    Vector3::new(x[DIMENSIONS * atom], x[DIMENSIONS * atom + 1], x[DIMENSIONS * atom + 2])
}

#[inline]
fn add_full(gradient: &mut DVector<f64>, atom: usize, value: &Vector4<f64>) {
    for c in 0..DIMENSIONS {
        gradient[DIMENSIONS * atom + c] += value[c];
    }
}

#[inline]
fn add_spatial(gradient: &mut DVector<f64>, atom: usize, value: &Vector3<f64>) {
    for c in 0..3 {
        gradient[DIMENSIONS * atom + c] += value[c];
    }
}

/// Wraps an angle difference into `(-π, π]`.
fn wrap_angle(mut angle: f64) -> f64 {
    while angle > PI {
        angle -= 2.0 * PI;
    }
    while angle <= -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Signed deviation of a dihedral from its window, zero inside it.
fn dihedral_excess(phi: f64, constraint: &DihedralConstraint) -> f64 {
    let center = (constraint.lower + constraint.upper) / 2.0;
    let half_width = (constraint.upper - constraint.lower) / 2.0;
    let difference = wrap_angle(phi - center);
    let excess = difference.abs() - half_width;
    if excess > 0.0 { excess * difference.signum() } else { 0.0 }
}

/// Penalty over four dimensional positions, laid out as `[x, y, z, w]` per
/// atom.
///
/// - Distance terms over all pairs: `(d²/u² - 1)²` above the upper bound and
///   `(2l²/(l² + d²) - 1)²` below the lower bound.
/// - Chirality terms: squared distance of the signed volume from its window.
/// - Dihedral terms, compress stage only: squared angular excess beyond the
///   window, with wraparound.
/// - Fourth dimension term, compress stage only: `Σ w²`.
pub struct ErrorFunction<'a> {
    bounds: &'a DistanceBoundsMatrix,
    chiralities: &'a [ChiralityConstraint],
    dihedrals: &'a [DihedralConstraint],
    stage: RefinementStage,
}

impl<'a> ErrorFunction<'a> {
    pub fn new(
        bounds: &'a DistanceBoundsMatrix,
        chiralities: &'a [ChiralityConstraint],
        dihedrals: &'a [DihedralConstraint],
        stage: RefinementStage,
    ) -> Self {
        Self {
            bounds,
            chiralities,
            dihedrals,
            stage,
        }
    }

    /// Value and gradient at `x`.
    ///
    /// # Errors
    ///
    /// Returns [`DgError::RefinementException`] if any term or gradient
    /// contribution is not finite.
    pub fn evaluate(&self, x: &DVector<f64>) -> Result<(f64, DVector<f64>), DgError> {
        let mut gradient = DVector::zeros(x.len());
        let mut value = self.distance_terms(x, &mut gradient);
        value += self.chirality_terms(x, &mut gradient);
        if self.stage == RefinementStage::Compress {
            value += self.dihedral_terms(x, &mut gradient)?;
            value += fourth_dimension_terms(x, &mut gradient);
        }

        if !value.is_finite() {
            return Err(DgError::RefinementException(format!(
                "error function value is {value}"
            )));
        }
        if let Some(index) = gradient.iter().position(|g| !g.is_finite()) {
            return Err(DgError::RefinementException(format!(
                "gradient component {index} of atom {} is not finite",
                index / DIMENSIONS
            )));
        }
        Ok((value, gradient))
    }

    pub fn value(&self, x: &DVector<f64>) -> Result<f64, DgError> {
        self.evaluate(x).map(|(value, _)| value)
    }

    fn distance_terms(&self, x: &DVector<f64>, gradient: &mut DVector<f64>) -> f64 {
        let n = x.len() / DIMENSIONS;
        let mut value = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let difference: Vector4<f64> = x.fixed_rows::<DIMENSIONS>(DIMENSIONS * i)
                    - x.fixed_rows::<DIMENSIONS>(DIMENSIONS * j);
                let squared = difference.norm_squared();

                let upper = self.bounds.upper(i, j);
                let upper_squared = upper * upper;
                let stretch = squared / upper_squared - 1.0;
                if stretch > 0.0 {
                    value += stretch * stretch;
                    let factor = 4.0 * stretch / upper_squared;
                    let contribution = difference * factor;
                    add_full(gradient, i, &contribution);
                    add_full(gradient, j, &-contribution);
                }

                let lower = self.bounds.lower(i, j);
                let lower_squared = lower * lower;
                if squared < lower_squared {
                    let denominator = lower_squared + squared;
                    let compression = 2.0 * lower_squared / denominator - 1.0;
                    value += compression * compression;
                    let factor = -8.0 * compression * lower_squared / (denominator * denominator);
                    let contribution = difference * factor;
                    add_full(gradient, i, &contribution);
                    add_full(gradient, j, &-contribution);
                }
            }
        }
        value
    }

    fn chirality_terms(&self, x: &DVector<f64>, gradient: &mut DVector<f64>) -> f64 {
        let mut value = 0.0;
        for constraint in self.chiralities {
            let [i, j, k, l] = constraint.atoms;
            let (pi, pj, pk, pl) = (point(x, i), point(x, j), point(x, k), point(x, l));
            let volume = signed_volume(&pi, &pj, &pk, &pl);

            let deviation = if volume < constraint.lower {
                volume - constraint.lower
            } else if volume > constraint.upper {
                volume - constraint.upper
            } else {
                continue;
            };
            value += deviation * deviation;

            let (a, b, c) = (pi - pl, pj - pl, pk - pl);
            let factor = 2.0 * deviation;
            let di = b.cross(&c) * factor;
            let dj = c.cross(&a) * factor;
            let dk = a.cross(&b) * factor;
            let dl = -(di + dj + dk);
            add_spatial(gradient, i, &di);
            add_spatial(gradient, j, &dj);
            add_spatial(gradient, k, &dk);
            add_spatial(gradient, l, &dl);
        }
        value
    }

    fn dihedral_terms(&self, x: &DVector<f64>, gradient: &mut DVector<f64>) -> Result<f64, DgError> {
        let mut value = 0.0;
        for constraint in self.dihedrals {
            let [i, j, k, l] = constraint.atoms;
            let (pi, pj, pk, pl) = (point(x, i), point(x, j), point(x, k), point(x, l));
            let excess = dihedral_excess(dihedral(&pi, &pj, &pk, &pl), constraint);
            if excess == 0.0 {
                continue;
            }
            value += excess * excess;

            let f = pi - pj;
            let g = pj - pk;
            let h = pl - pk;
            let a = f.cross(&g);
            let b = h.cross(&g);
            let g_norm = g.norm();
            let (a_squared, b_squared) = (a.norm_squared(), b.norm_squared());
            if a_squared == 0.0 || b_squared == 0.0 || g_norm == 0.0 {
                return Err(DgError::RefinementException(format!(
                    "dihedral {i}-{j}-{k}-{l} is undefined for collinear atoms"
                )));
            }

            let fg = f.dot(&g) / (a_squared * g_norm);
            let hg = h.dot(&g) / (b_squared * g_norm);
            let d_i = a * (-g_norm / a_squared);
            let d_l = b * (g_norm / b_squared);
            let d_j = a * (g_norm / a_squared) + a * fg - b * hg;
            let d_k = b * (-g_norm / b_squared) - a * fg + b * hg;

            let factor = 2.0 * excess;
            add_spatial(gradient, i, &(d_i * factor));
            add_spatial(gradient, j, &(d_j * factor));
            add_spatial(gradient, k, &(d_k * factor));
            add_spatial(gradient, l, &(d_l * factor));
        }
        Ok(value)
    }
}

fn fourth_dimension_terms(x: &DVector<f64>, gradient: &mut DVector<f64>) -> f64 {
    let mut value = 0.0;
    for atom in 0..x.len() / DIMENSIONS {
        let w = x[DIMENSIONS * atom + 3];
        value += w * w;
        gradient[DIMENSIONS * atom + 3] += 2.0 * w;
    }
    value
}

/// Fraction of non-flat chirality constraints whose volume has the target
/// sign. One if there are none.
pub fn proportion_correct_chiralities(constraints: &[ChiralityConstraint], x: &DVector<f64>) -> f64 {
    let mut considered = 0usize;
    let mut correct = 0usize;
    for constraint in constraints.iter().filter(|c| !c.is_flat()) {
        let [i, j, k, l] = constraint.atoms;
        let volume = signed_volume(&point(x, i), &point(x, j), &point(x, k), &point(x, l));
        considered += 1;
        if volume.signum() == constraint.target_sign() {
            correct += 1;
        }
    }
    if considered == 0 {
        1.0
    } else {
        correct as f64 / considered as f64
    }
}

/// Whether a refined structure keeps every distance, chirality and dihedral
/// within tolerance of its bounds.
pub fn final_structure_acceptable(
    bounds: &DistanceBoundsMatrix,
    chiralities: &[ChiralityConstraint],
    dihedrals: &[DihedralConstraint],
    x: &DVector<f64>,
    constants: &ModelConstants,
) -> bool {
    let n = x.len() / DIMENSIONS;
    for i in 0..n {
        let pi = point(x, i);
        for j in (i + 1)..n {
            let distance = (pi - point(x, j)).norm();
            if distance < bounds.lower(i, j) - constants.distance_tolerance
                || distance > bounds.upper(i, j) + constants.distance_tolerance
            {
                return false;
            }
        }
    }

    let chiralities_ok = chiralities.iter().all(|constraint| {
        let [i, j, k, l] = constraint.atoms;
        let volume = signed_volume(&point(x, i), &point(x, j), &point(x, k), &point(x, l));
        volume >= constraint.lower - constants.chirality_tolerance
            && volume <= constraint.upper + constants.chirality_tolerance
    });

    chiralities_ok
        && dihedrals.iter().all(|constraint| {
            let [i, j, k, l] = constraint.atoms;
            let phi = dihedral(&point(x, i), &point(x, j), &point(x, k), &point(x, l));
            dihedral_excess(phi, constraint).abs() <= constants.dihedral_tolerance
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::element::Element;
    use crate::core::models::molecule::MoleculeBuilder;
    use crate::core::models::value_bounds::ValueBounds;
    use crate::engine::spatial_model::BoundsList;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn setup() -> (DistanceBoundsMatrix, Vec<ChiralityConstraint>, Vec<DihedralConstraint>) {
        let mut builder = MoleculeBuilder::new();
        for _ in 0..5 {
            builder.add_atom(Element::C);
        }
        let molecule = builder.build().unwrap();
        let list: BoundsList = [
            ([0, 1], ValueBounds::new(1.4, 1.6)),
            ([1, 2], ValueBounds::new(1.4, 1.6)),
            ([2, 3], ValueBounds::new(1.4, 1.6)),
            ([0, 2], ValueBounds::new(2.4, 2.6)),
            ([1, 4], ValueBounds::new(1.4, 1.6)),
        ]
        .into_iter()
        .collect();
        let bounds = DistanceBoundsMatrix::new(&molecule, &list).unwrap();
        let chiralities = vec![
            ChiralityConstraint {
                atoms: [0, 2, 4, 1],
                lower: 1.0,
                upper: 2.0,
            },
            ChiralityConstraint {
                atoms: [0, 1, 2, 3],
                lower: 0.0,
                upper: 0.0,
            },
        ];
        let dihedrals = vec![DihedralConstraint {
            atoms: [0, 1, 2, 3],
            lower: PI - 0.1,
            upper: PI + 0.1,
        }];
        (bounds, chiralities, dihedrals)
    }

    fn random_positions(seed: u64) -> DVector<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        DVector::from_fn(5 * DIMENSIONS, |_, _| rng.gen_range(-2.0..2.0))
    }

    fn check_gradient(stage: RefinementStage) {
        let (bounds, chiralities, dihedrals) = setup();
        let function = ErrorFunction::new(&bounds, &chiralities, &dihedrals, stage);
        for seed in 0..5 {
            let x = random_positions(seed);
            let (value, gradient) = function.evaluate(&x).unwrap();
            assert!(value > 0.0);
            let step = 1e-6;
            for index in 0..x.len() {
                let mut forward = x.clone();
                forward[index] += step;
                let mut backward = x.clone();
                backward[index] -= step;
                let numeric =
                    (function.value(&forward).unwrap() - function.value(&backward).unwrap()) / (2.0 * step);
                assert!(
                    (numeric - gradient[index]).abs() < 1e-4 * (1.0 + numeric.abs()),
                    "{stage:?} seed {seed} component {index}: numeric {numeric}, analytic {}",
                    gradient[index]
                );
            }
        }
    }

    #[test]
    fn invert_stage_gradient_matches_finite_differences() {
        check_gradient(RefinementStage::Invert);
    }

    #[test]
    fn compress_stage_gradient_matches_finite_differences() {
        check_gradient(RefinementStage::Compress);
    }

    #[test]
    fn compress_stage_penalizes_the_fourth_dimension() {
        let (bounds, _, _) = setup();
        let mut x = random_positions(1);
        let invert = ErrorFunction::new(&bounds, &[], &[], RefinementStage::Invert);
        let compress = ErrorFunction::new(&bounds, &[], &[], RefinementStage::Compress);
        let before = compress.value(&x).unwrap() - invert.value(&x).unwrap();
        assert!(before > 0.0);
        for atom in 0..5 {
            x[DIMENSIONS * atom + 3] = 0.0;
        }
        assert!((compress.value(&x).unwrap() - invert.value(&x).unwrap()).abs() < 1e-12);
    }

    #[test]
    fn dihedral_windows_wrap_around() {
        let constraint = DihedralConstraint {
            atoms: [0, 1, 2, 3],
            lower: PI - 0.1,
            upper: PI + 0.1,
        };
        assert_eq!(dihedral_excess(-PI + 0.05, &constraint), 0.0);
        assert!((dihedral_excess(PI - 0.3, &constraint) + 0.2).abs() < 1e-12);
        assert!((dihedral_excess(-PI + 0.3, &constraint) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn chirality_proportion_ignores_flat_constraints() {
        let (_, chiralities, _) = setup();
        let mut x = DVector::zeros(5 * DIMENSIONS);
        let place = |x: &mut DVector<f64>, atom: usize, p: [f64; 3]| {
            for c in 0..3 {
                x[DIMENSIONS * atom + c] = p[c];
            }
        };
        place(&mut x, 1, [0.0, 0.0, 0.0]);
        place(&mut x, 0, [1.0, 0.0, 0.0]);
        place(&mut x, 2, [0.0, 1.0, 0.0]);
        place(&mut x, 4, [0.0, 0.0, 1.0]);
        assert_eq!(proportion_correct_chiralities(&chiralities, &x), 1.0);
        place(&mut x, 4, [0.0, 0.0, -1.0]);
        assert_eq!(proportion_correct_chiralities(&chiralities, &x), 0.0);
        assert_eq!(proportion_correct_chiralities(&[], &x), 1.0);
    }
}
