//! Idealized local coordination shapes.
//!
//! Every shape is a set of unit vectors around a central atom at the origin.
//! Angles between vertices, the proper rotations of the vertex set and the
//! tetrahedra used for chirality constraints are all derived from these
//! coordinates; rotations and tetrahedra are computed once per shape and cached.

use super::utils::geometry::{kabsch_rotation, signed_volume};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

const BENT_ANGLE_DEGREES: f64 = 107.0;
const PYRAMIDAL_ANGLE_DEGREES: f64 = 107.0;
const FLAT_VOLUME_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Shape {
    Line,
    Bent,
    TrigonalPlanar,
    TrigonalPyramidal,
    TShaped,
    Tetrahedral,
    SquarePlanar,
    Seesaw,
    TrigonalBipyramidal,
    SquarePyramidal,
    Octahedral,
}

pub const ALL_SHAPES: [Shape; 11] = [
    Shape::Line,
    Shape::Bent,
    Shape::TrigonalPlanar,
    Shape::TrigonalPyramidal,
    Shape::TShaped,
    Shape::Tetrahedral,
    Shape::SquarePlanar,
    Shape::Seesaw,
    Shape::TrigonalBipyramidal,
    Shape::SquarePyramidal,
    Shape::Octahedral,
];

/// A shape vertex, or the central atom itself.
pub type TetrahedronVertex = Option<usize>;

static ROTATIONS: [OnceLock<Vec<Vec<usize>>>; 11] = [const { OnceLock::new() }; 11];
static TETRAHEDRA: [OnceLock<Vec<[TetrahedronVertex; 4]>>; 11] = [const { OnceLock::new() }; 11];

impl Shape {
    pub fn size(self) -> usize {
        match self {
            Self::Line => 2,
            Self::Bent => 2,
            Self::TrigonalPlanar | Self::TrigonalPyramidal | Self::TShaped => 3,
            Self::Tetrahedral | Self::SquarePlanar | Self::Seesaw => 4,
            Self::TrigonalBipyramidal | Self::SquarePyramidal => 5,
            Self::Octahedral => 6,
        }
    }

    /// Whether all vertices and the center are coplanar.
    pub fn is_planar(self) -> bool {
        matches!(
            self,
            Self::Line | Self::Bent | Self::TrigonalPlanar | Self::TShaped | Self::SquarePlanar
        )
    }

    pub fn coordinates(self) -> Vec<Vector3<f64>> {
        let v = Vector3::new;
        let s3 = 3f64.sqrt();
        match self {
            Self::Line => vec![v(1.0, 0.0, 0.0), v(-1.0, 0.0, 0.0)],
            Self::Bent => {
                let theta = BENT_ANGLE_DEGREES.to_radians();
                vec![v(1.0, 0.0, 0.0), v(theta.cos(), theta.sin(), 0.0)]
            }
            Self::TrigonalPlanar => vec![
                v(1.0, 0.0, 0.0),
                v(-0.5, s3 / 2.0, 0.0),
                v(-0.5, -s3 / 2.0, 0.0),
            ],
            Self::TrigonalPyramidal => {
                let cos_theta = PYRAMIDAL_ANGLE_DEGREES.to_radians().cos();
                let cos_alpha = ((2.0 * cos_theta + 1.0) / 3.0).sqrt();
                let sin_alpha = (1.0 - cos_alpha * cos_alpha).sqrt();
                (0..3)
                    .map(|k| {
                        let phi = 2.0 * PI * k as f64 / 3.0;
                        v(sin_alpha * phi.cos(), sin_alpha * phi.sin(), -cos_alpha)
                    })
                    .collect()
            }
            Self::TShaped => vec![v(1.0, 0.0, 0.0), v(0.0, 1.0, 0.0), v(-1.0, 0.0, 0.0)],
            Self::Tetrahedral => {
                let f = 1.0 / s3;
                vec![
                    v(f, f, f),
                    v(f, -f, -f),
                    v(-f, f, -f),
                    v(-f, -f, f),
                ]
            }
            Self::SquarePlanar => vec![
                v(1.0, 0.0, 0.0),
                v(0.0, 1.0, 0.0),
                v(-1.0, 0.0, 0.0),
                v(0.0, -1.0, 0.0),
            ],
            Self::Seesaw => vec![
                v(0.0, 0.0, 1.0),
                v(1.0, 0.0, 0.0),
                v(-0.5, s3 / 2.0, 0.0),
                v(0.0, 0.0, -1.0),
            ],
            Self::TrigonalBipyramidal => vec![
                v(1.0, 0.0, 0.0),
                v(-0.5, s3 / 2.0, 0.0),
                v(-0.5, -s3 / 2.0, 0.0),
                v(0.0, 0.0, 1.0),
                v(0.0, 0.0, -1.0),
            ],
            Self::SquarePyramidal => vec![
                v(1.0, 0.0, 0.0),
                v(0.0, 1.0, 0.0),
                v(-1.0, 0.0, 0.0),
                v(0.0, -1.0, 0.0),
                v(0.0, 0.0, 1.0),
            ],
            Self::Octahedral => vec![
                v(1.0, 0.0, 0.0),
                v(0.0, 1.0, 0.0),
                v(-1.0, 0.0, 0.0),
                v(0.0, -1.0, 0.0),
                v(0.0, 0.0, 1.0),
                v(0.0, 0.0, -1.0),
            ],
        }
    }

    /// Position of a vertex, or the origin for the central atom.
    pub fn vertex_position(self, vertex: TetrahedronVertex) -> Vector3<f64> {
        match vertex {
            Some(index) => self.coordinates()[index],
            None => Vector3::zeros(),
        }
    }

    /// Idealized angle in radians between two vertices, as seen from the center.
    pub fn angle(self, a: usize, b: usize) -> f64 {
        if a == b {
            return 0.0;
        }
        let coordinates = self.coordinates();
        coordinates[a]
            .dot(&coordinates[b])
            .clamp(-1.0, 1.0)
            .acos()
    }

    pub fn smallest_angle(self) -> f64 {
        let n = self.size();
        (0..n)
            .flat_map(|a| (a + 1..n).map(move |b| (a, b)))
            .map(|(a, b)| self.angle(a, b))
            .fold(PI, f64::min)
    }

    /// All proper rotations of the shape, each given as a vertex permutation:
    /// the vertex at index `i` moves to `rotation[i]`. The identity is included.
    pub fn rotations(self) -> &'static [Vec<usize>] {
        ROTATIONS[self as usize].get_or_init(|| compute_rotations(self))
    }

    /// Vertex quadruples whose signed volume encodes the handedness of an
    /// arrangement, with `None` standing in for the central atom.
    ///
    /// Four-vertex non-planar shapes use their vertices directly. Planar shapes
    /// use flat quadruples of consecutive vertices and the center. All other
    /// shapes use vertex triples with the center that span a non-negligible
    /// volume.
    pub fn tetrahedra(self) -> &'static [[TetrahedronVertex; 4]] {
        TETRAHEDRA[self as usize].get_or_init(|| compute_tetrahedra(self))
    }

    pub fn ideal_volume(self, tetrahedron: &[TetrahedronVertex; 4]) -> f64 {
        let p: Vec<Vector3<f64>> = tetrahedron.iter().map(|v| self.vertex_position(*v)).collect();
        signed_volume(&p[0], &p[1], &p[2], &p[3])
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Bent => "bent",
            Self::TrigonalPlanar => "trigonal-planar",
            Self::TrigonalPyramidal => "trigonal-pyramidal",
            Self::TShaped => "t-shaped",
            Self::Tetrahedral => "tetrahedral",
            Self::SquarePlanar => "square-planar",
            Self::Seesaw => "seesaw",
            Self::TrigonalBipyramidal => "trigonal-bipyramidal",
            Self::SquarePyramidal => "square-pyramidal",
            Self::Octahedral => "octahedral",
        }
    }
}

fn permutations(n: usize) -> Vec<Vec<usize>> {
    fn extend(current: &mut Vec<usize>, used: &mut [bool], out: &mut Vec<Vec<usize>>) {
        if current.len() == used.len() {
            out.push(current.clone());
            return;
        }
        for i in 0..used.len() {
            if !used[i] {
                used[i] = true;
                current.push(i);
                extend(current, used, out);
                current.pop();
                used[i] = false;
            }
        }
    }

    let mut out = Vec::new();
    extend(&mut Vec::with_capacity(n), &mut vec![false; n], &mut out);
    out
}

pub(crate) fn all_permutations(n: usize) -> Vec<Vec<usize>> {
    permutations(n)
}

fn compute_rotations(shape: Shape) -> Vec<Vec<usize>> {
    let coordinates = shape.coordinates();
    let weights = vec![1.0; coordinates.len()];

    permutations(coordinates.len())
        .into_iter()
        .filter(|permutation| {
            let target: Vec<Vector3<f64>> = permutation.iter().map(|&p| coordinates[p]).collect();
            let rotation = kabsch_rotation(&coordinates, &target, &weights);
            let residual: f64 = coordinates
                .iter()
                .zip(&target)
                .map(|(c, t)| (rotation * c - t).norm_squared())
                .sum();
            residual < 1e-8
        })
        .collect()
}

fn compute_tetrahedra(shape: Shape) -> Vec<[TetrahedronVertex; 4]> {
    let n = shape.size();

    if n == 4 && !shape.is_planar() {
        return vec![[Some(0), Some(1), Some(2), Some(3)]];
    }

    if shape.is_planar() {
        if n < 3 {
            return Vec::new();
        }
        if n == 3 {
            return vec![[Some(0), Some(1), Some(2), None]];
        }
        return (0..n)
            .map(|i| [Some(i), Some((i + 1) % n), Some((i + 2) % n), None])
            .collect();
    }

    let mut tetrahedra = Vec::new();
    for a in 0..n {
        for b in a + 1..n {
            for c in b + 1..n {
                let candidate = [Some(a), Some(b), Some(c), None];
                if shape.ideal_volume(&candidate).abs() > FLAT_VOLUME_THRESHOLD {
                    tetrahedra.push(candidate);
                }
            }
        }
    }
    tetrahedra
}

#[derive(Debug, Error)]
#[error("Unknown shape name: '{0}'")]
pub struct ParseShapeError(pub String);

impl FromStr for Shape {
    type Err = ParseShapeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', ' '], "-");
        ALL_SHAPES
            .iter()
            .copied()
            .find(|shape| shape.name() == normalized)
            .ok_or_else(|| ParseShapeError(s.to_string()))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
