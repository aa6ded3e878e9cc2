use nalgebra::{Matrix3, Point3, Vector3};
use std::f64::consts::PI;

/// Signed triple product `(i - l) · ((j - l) × (k - l))`.
///
/// Equals six times the signed volume of the tetrahedron spanned by the four
/// points.
pub fn signed_volume(
    i: &Vector3<f64>,
    j: &Vector3<f64>,
    k: &Vector3<f64>,
    l: &Vector3<f64>,
) -> f64 {
    (i - l).dot(&(j - l).cross(&(k - l)))
}

/// Dihedral angle of the sequence `i-j-k-l`, normalized to `(-π, π]`.
pub fn dihedral(i: &Vector3<f64>, j: &Vector3<f64>, k: &Vector3<f64>, l: &Vector3<f64>) -> f64 {
    let f = i - j;
    let g = j - k;
    let h = l - k;
    let a = f.cross(&g);
    let b = h.cross(&g);
    let g_norm = g.norm();
    let value = (b.cross(&a).dot(&g) / g_norm).atan2(a.dot(&b));
    if value <= -PI { value + 2.0 * PI } else { value }
}

/// Angle at `center` between `a` and `b`, in radians.
pub fn angle(a: &Vector3<f64>, center: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    let u = a - center;
    let v = b - center;
    let cosine = u.dot(&v) / (u.norm() * v.norm());
    cosine.clamp(-1.0, 1.0).acos()
}

/// Weighted centroid of a point set. Returns the origin if all weights vanish.
pub fn weighted_centroid(points: &[Vector3<f64>], weights: &[f64]) -> Vector3<f64> {
    let total: f64 = weights.iter().sum();
    if total <= f64::EPSILON {
        return Vector3::zeros();
    }
    points
        .iter()
        .zip(weights)
        .fold(Vector3::zeros(), |acc, (p, w)| acc + p * *w)
        / total
}

/// Proper rotation `R` minimizing `Σ w_i |R p_i - q_i|²` for centered point sets.
///
/// Reflections are excluded by flipping the axis of the smallest singular value,
/// so the result always has determinant `+1`. Degenerate inputs (no spread)
/// yield the identity.
pub fn kabsch_rotation(from: &[Vector3<f64>], to: &[Vector3<f64>], weights: &[f64]) -> Matrix3<f64> {
    let covariance = from
        .iter()
        .zip(to)
        .zip(weights)
        .fold(Matrix3::zeros(), |acc, ((p, q), w)| acc + p * q.transpose() * *w);

    if covariance.norm() < 1e-12 {
        return Matrix3::identity();
    }

    let svd = covariance.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Matrix3::identity();
    };

    let mut correction = Matrix3::identity();
    if (v_t.transpose() * u.transpose()).determinant() < 0.0 {
        let smallest = svd
            .singular_values
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map_or(2, |(index, _)| index);
        correction[(smallest, smallest)] = -1.0;
    }

    v_t.transpose() * correction * u.transpose()
}

/// A rigid-body transform mapping a mobile point set onto a target.
#[derive(Debug, Clone, PartialEq)]
pub struct Superposition {
    pub rotation: Matrix3<f64>,
    pub mobile_centroid: Vector3<f64>,
    pub target_centroid: Vector3<f64>,
}

impl Superposition {
    pub fn fit(mobile: &[Vector3<f64>], target: &[Vector3<f64>], weights: &[f64]) -> Self {
        let mobile_centroid = weighted_centroid(mobile, weights);
        let target_centroid = weighted_centroid(target, weights);
        let centered_mobile: Vec<Vector3<f64>> = mobile.iter().map(|p| p - mobile_centroid).collect();
        let centered_target: Vec<Vector3<f64>> = target.iter().map(|p| p - target_centroid).collect();

        Self {
            rotation: kabsch_rotation(&centered_mobile, &centered_target, weights),
            mobile_centroid,
            target_centroid,
        }
    }

    pub fn apply(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * (point - self.mobile_centroid) + self.target_centroid
    }
}

pub fn calculate_rmsd(coords1: &[Point3<f64>], coords2: &[Point3<f64>]) -> Option<f64> {
    if coords1.len() != coords2.len() || coords1.is_empty() {
        return None;
    }
    let n = coords1.len() as f64;
    let squared_dist_sum: f64 = coords1
        .iter()
        .zip(coords2.iter())
        .map(|(p1, p2)| (p1 - p2).norm_squared())
        .sum();
    Some((squared_dist_sum / n).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Unit};

    fn assert_vec_eq(a: &Vector3<f64>, b: &Vector3<f64>, tol: f64) {
        assert!((a - b).norm() < tol, "{a:?} != {b:?}");
    }

    #[test]
    fn signed_volume_of_right_handed_frame_is_positive() {
        let origin = Vector3::zeros();
        let v = signed_volume(&Vector3::x(), &Vector3::y(), &Vector3::z(), &origin);
        assert!((v - 1.0).abs() < 1e-12);
        let swapped = signed_volume(&Vector3::y(), &Vector3::x(), &Vector3::z(), &origin);
        assert!((swapped + 1.0).abs() < 1e-12);
    }

    #[test]
    fn dihedral_matches_cis_and_trans_arrangements() {
        let j = Vector3::new(0.0, 0.0, 0.0);
        let k = Vector3::new(1.0, 0.0, 0.0);
        let i = Vector3::new(0.0, 1.0, 0.0);
        let cis = Vector3::new(1.0, 1.0, 0.0);
        let trans = Vector3::new(1.0, -1.0, 0.0);
        let gauche = Vector3::new(1.0, 0.0, 1.0);

        assert!(dihedral(&i, &j, &k, &cis).abs() < 1e-12);
        assert!((dihedral(&i, &j, &k, &trans) - PI).abs() < 1e-12);
        assert!((dihedral(&i, &j, &k, &gauche).abs() - PI / 2.0).abs() < 1e-12);
        assert!(
            (dihedral(&i, &j, &k, &gauche) + dihedral(&i, &j, &k, &Vector3::new(1.0, 0.0, -1.0)))
                .abs()
                < 1e-12
        );
    }

    #[test]
    fn angle_between_orthogonal_vectors_is_right_angle() {
        let a = angle(&Vector3::x(), &Vector3::zeros(), &Vector3::y());
        assert!((a - PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn kabsch_recovers_known_rotation() {
        let rotation = Rotation3::from_axis_angle(&Unit::new_normalize(Vector3::new(1.0, 2.0, 3.0)), 0.7);
        let points = vec![
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 2.0, 0.0),
            Vector3::new(0.0, 0.0, 3.0),
            Vector3::new(-1.0, -2.0, -3.0),
        ];
        let rotated: Vec<Vector3<f64>> = points.iter().map(|p| rotation * p).collect();
        let r = kabsch_rotation(&points, &rotated, &[1.0; 4]);
        assert!((r - rotation.matrix()).norm() < 1e-9);
        assert!((r.determinant() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn kabsch_never_returns_a_reflection() {
        let points: Vec<Vector3<f64>> = vec![Vector3::x(), Vector3::y(), Vector3::z()];
        let mirrored: Vec<Vector3<f64>> = points
            .iter()
            .map(|p: &Vector3<f64>| Vector3::new(-p.x, p.y, p.z))
            .collect();
        let r = kabsch_rotation(&points, &mirrored, &[1.0; 3]);
        assert!((r.determinant() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn superposition_maps_translated_and_rotated_points() {
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), PI / 3.0);
        let shift = Vector3::new(3.0, -1.0, 2.0);
        let mobile = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.5, 0.0, 0.0),
            Vector3::new(0.0, 1.5, 0.5),
        ];
        let target: Vec<Vector3<f64>> = mobile.iter().map(|p| rotation * p + shift).collect();
        let fit = Superposition::fit(&mobile, &target, &[1.0; 3]);
        for (m, t) in mobile.iter().zip(&target) {
            assert_vec_eq(&fit.apply(m), t, 1e-9);
        }
    }

    #[test]
    fn single_point_superposition_is_pure_translation() {
        let fit = Superposition::fit(&[Vector3::new(1.0, 2.0, 3.0)], &[Vector3::zeros()], &[1.0]);
        assert_vec_eq(&fit.apply(&Vector3::new(1.0, 2.0, 3.0)), &Vector3::zeros(), 1e-12);
        assert_vec_eq(&fit.apply(&Vector3::new(2.0, 2.0, 3.0)), &Vector3::x(), 1e-12);
    }

    #[test]
    fn calculate_rmsd_rejects_mismatched_lengths() {
        let a = vec![Point3::origin()];
        let b = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        assert!(calculate_rmsd(&a, &b).is_none());
        assert_eq!(calculate_rmsd(&a, &a), Some(0.0));
    }
}
