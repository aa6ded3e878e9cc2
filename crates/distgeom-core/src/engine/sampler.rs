use super::bounds::DistanceBoundsMatrix;
use super::config::Partiality;
use super::error::DgError;
use nalgebra::DMatrix;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{instrument, trace};

/// Picks a concrete distance for every atom pair within its window.
///
/// Atoms are visited in random order and each of their undetermined pairs is
/// fixed to a uniformly drawn distance. After every choice involving one of
/// the first `partiality.resmoothed_atoms(n)` visited atoms the whole matrix
/// is re-smoothed, so later choices respect earlier ones.
#[instrument(level = "debug", skip_all, fields(atoms = bounds.num_atoms(), %partiality))]
pub fn sample_distance_matrix(
    bounds: &DistanceBoundsMatrix,
    partiality: Partiality,
    rng: &mut impl Rng,
) -> Result<DMatrix<f64>, DgError> {
    let n = bounds.num_atoms();
    let mut working = bounds.clone();
    let mut distances = DMatrix::zeros(n, n);
    let mut determined = vec![false; n * n];

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    let resmoothed = partiality.resmoothed_atoms(n);

    for (position, &i) in order.iter().enumerate() {
        let mut partners: Vec<usize> = (0..n).filter(|&j| j != i && !determined[i * n + j]).collect();
        partners.shuffle(rng);

        for j in partners {
            let (lower, upper) = (working.lower(i, j), working.upper(i, j));
            let distance = if upper > lower {
                rng.gen_range(lower..=upper)
            } else {
                upper
            };
            distances[(i, j)] = distance;
            distances[(j, i)] = distance;
            determined[i * n + j] = true;
            determined[j * n + i] = true;

            working
                .set_distance(i, j, distance)
                .map_err(DgError::DistanceMatrix)?;
            if position < resmoothed {
                working.smooth().map_err(DgError::DistanceMatrix)?;
            }
        }
    }

    trace!(resmoothed, "Distance matrix sampled");
    Ok(distances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::element::Element;
    use crate::core::models::molecule::MoleculeBuilder;
    use crate::core::models::value_bounds::ValueBounds;
    use crate::engine::spatial_model::BoundsList;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Zigzag carbon chain: bonded pairs at 1.5 to 1.6 Å, 1-3 pairs at 2.4 to
    /// 2.6 Å, everything farther apart left to the van der Waals defaults.
    fn smoothed_bounds(n: usize) -> DistanceBoundsMatrix {
        let mut builder = MoleculeBuilder::new();
        for _ in 0..n {
            builder.add_atom(Element::C);
        }
        let molecule = builder.build().unwrap();
        let bonds = (0..n - 1).map(|i| ([i, i + 1], ValueBounds::new(1.5, 1.6)));
        let angles = (0..n.saturating_sub(2)).map(|i| ([i, i + 2], ValueBounds::new(2.4, 2.6)));
        let list: BoundsList = bonds.chain(angles).collect();
        let mut matrix = DistanceBoundsMatrix::new(&molecule, &list).unwrap();
        matrix.smooth().unwrap();
        matrix
    }

    #[test]
    fn sampled_distances_lie_within_smoothed_bounds() {
        let bounds = smoothed_bounds(6);
        for partiality in [Partiality::None, Partiality::FourAtom, Partiality::All] {
            let mut rng = StdRng::seed_from_u64(5);
            let distances = sample_distance_matrix(&bounds, partiality, &mut rng).unwrap();
            for i in 0..6 {
                assert_eq!(distances[(i, i)], 0.0);
                for j in (i + 1)..6 {
                    assert_eq!(distances[(i, j)], distances[(j, i)]);
                    let window = bounds.bounds(i, j);
                    assert!(
                        window.lower - 1e-9 <= distances[(i, j)]
                            && distances[(i, j)] <= window.upper + 1e-9,
                        "{partiality}: d({i},{j}) = {} outside {window}",
                        distances[(i, j)]
                    );
                }
            }
        }
    }

    #[test]
    fn full_metrization_yields_a_metric() {
        let bounds = smoothed_bounds(5);
        let mut rng = StdRng::seed_from_u64(9);
        let d = sample_distance_matrix(&bounds, Partiality::All, &mut rng).unwrap();
        for i in 0..5 {
            for j in 0..5 {
                for k in 0..5 {
                    assert!(d[(i, j)] <= d[(i, k)] + d[(k, j)] + 1e-6);
                }
            }
        }
    }

    #[test]
    fn chain_bounds_smooth_consistently() {
        let bounds = smoothed_bounds(6);
        assert_eq!(bounds.bound_inconsistencies(), 0);
        assert!(bounds.satisfies_triangle_inequalities(1e-9));
        assert_eq!(bounds.upper(0, 2), 2.6);
        assert!(bounds.upper(0, 3) <= 1.6 + 2.6 + 1e-12);
    }

    #[test]
    fn sampling_is_reproducible_for_a_seed() {
        let bounds = smoothed_bounds(4);
        let first = sample_distance_matrix(&bounds, Partiality::FourAtom, &mut StdRng::seed_from_u64(1));
        let second = sample_distance_matrix(&bounds, Partiality::FourAtom, &mut StdRng::seed_from_u64(1));
        assert_eq!(first.unwrap(), second.unwrap());
    }
}
