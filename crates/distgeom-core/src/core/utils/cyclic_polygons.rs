//! Maximum-area cyclic polygons with given edge lengths.
//!
//! For a polygon whose vertices lie on a common circle, every edge `a_i`
//! subtends a central angle `θ_i = 2 asin(a_i / 2R)`. The circumradius `R` is
//! the root of the deviation of these angles from a full turn. When the
//! circumcenter lies outside the polygon the longest edge subtends its angle in
//! the opposite sense, which changes the root equation.

use std::f64::consts::PI;

const BISECTION_ITERATIONS: usize = 200;
const MAX_BRACKET_DOUBLINGS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circumradius {
    pub radius: f64,
    /// Whether the circumcenter lies inside the polygon.
    pub center_inside: bool,
}

/// A convex polygon with these edge lengths exists iff the longest edge is
/// shorter than the sum of all others.
pub fn exists(edges: &[f64]) -> bool {
    if edges.len() < 3 || edges.iter().any(|&a| !(a > 0.0)) {
        return false;
    }
    let (longest, sum) = longest_and_sum(edges);
    longest < sum - longest
}

/// Sum of central angles minus `2π` for a circumcenter inside the polygon.
pub fn inside_deviation(edges: &[f64], radius: f64) -> f64 {
    edges.iter().map(|&a| central_angle(a, radius)).sum::<f64>() - 2.0 * PI
}

/// Central-angle balance for a circumcenter outside the polygon: the longest
/// edge's angle equals the sum of all other edges' angles at the root.
pub fn outside_deviation(edges: &[f64], radius: f64) -> f64 {
    let longest_index = longest_index(edges);
    edges
        .iter()
        .enumerate()
        .map(|(i, &a)| {
            if i == longest_index {
                -central_angle(a, radius)
            } else {
                central_angle(a, radius)
            }
        })
        .sum()
}

pub fn circumradius(edges: &[f64]) -> Option<Circumradius> {
    if !exists(edges) {
        return None;
    }

    let n = edges.len() as f64;
    let (longest, _) = longest_and_sum(edges);
    let lower = longest / 2.0;

    if inside_deviation(edges, lower) >= 0.0 {
        let upper = longest / (2.0 * (PI / n).sin());
        let radius = bisect(lower, upper, |r| inside_deviation(edges, r) > 0.0);
        return Some(Circumradius {
            radius,
            center_inside: true,
        });
    }

    let mut upper = 2.0 * lower;
    let mut doublings = 0;
    while outside_deviation(edges, upper) <= 0.0 {
        upper *= 2.0;
        doublings += 1;
        if doublings > MAX_BRACKET_DOUBLINGS {
            return None;
        }
    }
    let radius = bisect(lower, upper, |r| outside_deviation(edges, r) < 0.0);
    Some(Circumradius {
        radius,
        center_inside: false,
    })
}

/// Internal angles of the maximum-area cyclic polygon.
///
/// The angle at index `i` lies between edge `i` and edge `i + 1`, with the last
/// angle lying between the final edge and edge `0`.
pub fn internal_angles(edges: &[f64]) -> Option<Vec<f64>> {
    let solution = circumradius(edges)?;
    let longest_index = longest_index(edges);

    let base_angles: Vec<f64> = edges
        .iter()
        .enumerate()
        .map(|(i, &a)| {
            let base = (PI - central_angle(a, solution.radius)) / 2.0;
            if !solution.center_inside && i == longest_index {
                -base
            } else {
                base
            }
        })
        .collect();

    let n = edges.len();
    Some(
        (0..n)
            .map(|i| base_angles[i] + base_angles[(i + 1) % n])
            .collect(),
    )
}

fn central_angle(edge: f64, radius: f64) -> f64 {
    2.0 * (edge / (2.0 * radius)).clamp(-1.0, 1.0).asin()
}

fn longest_index(edges: &[f64]) -> usize {
    edges
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map_or(0, |(i, _)| i)
}

fn longest_and_sum(edges: &[f64]) -> (f64, f64) {
    let longest = edges.iter().copied().fold(0.0, f64::max);
    (longest, edges.iter().sum())
}

/// Bisects `[lower, upper]` where `below_root(r)` holds left of the root.
fn bisect(mut lower: f64, mut upper: f64, below_root: impl Fn(f64) -> bool) -> f64 {
    for _ in 0..BISECTION_ITERATIONS {
        let mid = 0.5 * (lower + upper);
        if below_root(mid) {
            lower = mid;
        } else {
            upper = mid;
        }
        if upper - lower <= f64::EPSILON * upper {
            break;
        }
    }
    0.5 * (lower + upper)
}
