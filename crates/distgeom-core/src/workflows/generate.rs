use crate::core::models::molecule::Molecule;
use crate::core::stereo::constraints::{ChiralityPrototype, DihedralConstraint};
use crate::core::stereo::list::StereocenterKey;
use crate::core::utils::geometry::Superposition;
use crate::engine::bounds::DistanceBoundsMatrix;
use crate::engine::chirality;
use crate::engine::config::{Configuration, FixedPosition};
use crate::engine::error::DgError;
use crate::engine::metric;
use crate::engine::progress::{GenerationMode, Progress, ProgressReporter};
use crate::engine::refinement::{RefinementProblem, RefinementStep, refine};
use crate::engine::sampler::sample_distance_matrix;
use crate::engine::spatial_model::{BoundsList, SpatialModel};
use crate::engine::units::{ANGSTROM_PER_BOHR, AngstromPositions};
use nalgebra::{DVector, Point3, Vector3};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Everything the numerical pipeline needs to know about a molecule.
#[derive(Debug, Clone, PartialEq)]
pub struct DgInformation {
    pub bounds: BoundsList,
    pub chiralities: Vec<ChiralityPrototype>,
    pub dihedrals: Vec<DihedralConstraint>,
}

/// Builds the spatial model of `molecule` and collects its pair bounds and
/// constraints.
///
/// `rng` only matters for stereocenters that are unassigned or added during
/// modelling; a fully assigned molecule always yields the same information.
#[instrument(level = "debug", skip_all, fields(atoms = molecule.num_atoms()))]
pub fn gather_dg_information(
    molecule: &Molecule,
    config: &Configuration,
    rng: &mut impl Rng,
) -> DgInformation {
    let model = SpatialModel::new(molecule, config, rng);
    let information = DgInformation {
        bounds: model.make_bounds_list(),
        chiralities: model.chirality_prototypes(),
        dihedrals: model.dihedral_constraints(),
    };
    debug!(
        pairs = information.bounds.len(),
        chiralities = information.chiralities.len(),
        dihedrals = information.dihedrals.len(),
        "Gathered distance geometry information"
    );
    information
}

/// A copy of `molecule` with every unassigned stereocenter given a weighted
/// random assignment.
///
/// Stereocenters are settled one at a time, atoms before bonds, picking
/// randomly among those still unassigned. The pending set is collected again
/// after every assignment. Stereocenters without any feasible assignment stay
/// unassigned.
pub fn narrow(molecule: &Molecule, rng: &mut impl Rng) -> Molecule {
    let mut narrowed = molecule.clone();
    let mut infeasible = BTreeSet::new();
    loop {
        let stereocenters = narrowed.stereocenters_mut();
        let (atoms, bonds): (Vec<StereocenterKey>, Vec<StereocenterKey>) = stereocenters
            .iter()
            .filter(|s| !s.is_assigned())
            .map(|s| s.key())
            .filter(|key| !infeasible.contains(key))
            .partition(|key| matches!(key, StereocenterKey::Atom(_)));
        let candidates = if atoms.is_empty() { bonds } else { atoms };
        let Some(&key) = candidates.choose(rng) else {
            break;
        };
        let assigned = stereocenters
            .get_mut(key)
            .and_then(|stereocenter| stereocenter.assign_random(rng));
        if assigned.is_none() {
            infeasible.insert(key);
        }
    }
    narrowed
}

/// Generates a single conformer.
///
/// With `shared` information the model is reused as is. Without it, the
/// molecule is narrowed and modelled afresh, which is required whenever it
/// has unassigned stereocenters.
pub fn generate_conformer(
    molecule: &Molecule,
    config: &Configuration,
    shared: Option<&DgInformation>,
    rng: &mut impl Rng,
) -> Result<AngstromPositions, DgError> {
    attempt(molecule, config, shared, rng, None)
}

pub(crate) fn attempt(
    molecule: &Molecule,
    config: &Configuration,
    shared: Option<&DgInformation>,
    rng: &mut impl Rng,
    recorder: Option<&mut Vec<RefinementStep>>,
) -> Result<AngstromPositions, DgError> {
    let regenerated;
    let information = match shared {
        Some(information) => information,
        None => {
            let narrowed = narrow(molecule, rng);
            if narrowed.stereocenters().has_zero_assignment() {
                return Err(DgError::ZeroAssignmentStereopermutators);
            }
            regenerated = gather_dg_information(&narrowed, config, rng);
            &regenerated
        }
    };

    let mut bounds = DistanceBoundsMatrix::new(molecule, &information.bounds)?;
    bounds.smooth()?;
    let chiralities = chirality::realize(&information.chiralities, &bounds);

    let distances = sample_distance_matrix(&bounds, config.partiality, rng)?;
    let embedded = metric::embed(&distances)?;

    let problem = RefinementProblem {
        bounds: &bounds,
        chiralities: &chiralities,
        dihedrals: &information.dihedrals,
    };
    let refined = refine(
        DVector::from_column_slice(embedded.as_slice()),
        &problem,
        config,
        recorder,
    )?;

    let points: Vec<Vector3<f64>> = refined
        .as_slice()
        .chunks_exact(metric::EMBEDDING_DIMENSIONS)
        .map(|c| Vector3::new(c[0], c[1], c[2]))
        .collect();
    let placed = place_fixed_atoms(points, &config.fixed_positions);
    Ok(AngstromPositions::new(
        placed.into_iter().map(Point3::from).collect(),
    ))
}

/// Superimposes the structure onto the fixed atom targets and then moves the
/// fixed atoms exactly onto them.
fn place_fixed_atoms(points: Vec<Vector3<f64>>, fixed: &[FixedPosition]) -> Vec<Vector3<f64>> {
    if fixed.is_empty() {
        return points;
    }
    let targets: Vec<Vector3<f64>> = fixed
        .iter()
        .map(|f| Vector3::from(f.position) * ANGSTROM_PER_BOHR)
        .collect();
    let mobile: Vec<Vector3<f64>> = fixed.iter().map(|f| points[f.atom]).collect();
    let fit = Superposition::fit(&mobile, &targets, &vec![1.0; fixed.len()]);

    let mut placed: Vec<Vector3<f64>> = points.iter().map(|p| fit.apply(p)).collect();
    for (f, target) in fixed.iter().zip(targets) {
        placed[f.atom] = target;
    }
    placed
}

pub(crate) fn master_rng(config: &Configuration) -> StdRng {
    match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Refusals that apply to every attempt alike.
pub(crate) fn check_preconditions(molecule: &Molecule, config: &Configuration) -> Result<(), DgError> {
    if molecule.stereocenters().has_zero_assignment() {
        return Err(DgError::ZeroAssignmentStereopermutators);
    }
    SpatialModel::check_fixed_positions(molecule, config)
}

/// Information shared by all attempts, if the molecule needs no narrowing.
pub(crate) fn shared_information(
    molecule: &Molecule,
    config: &Configuration,
    rng: &mut impl Rng,
) -> Option<DgInformation> {
    if molecule.stereocenters().has_unassigned() {
        None
    } else {
        Some(gather_dg_information(molecule, config, rng))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "attempt panicked".to_string()
    }
}

/// Runs one attempt per seed, in parallel when the `parallel` feature is on.
/// Attempts are numbered from `first_attempt` in seed order.
pub(crate) fn run_attempts(
    molecule: &Molecule,
    config: &Configuration,
    shared: Option<&DgInformation>,
    seeds: &[u64],
    first_attempt: usize,
    reporter: &ProgressReporter,
) -> Vec<Result<AngstromPositions, DgError>> {
    #[cfg(not(feature = "parallel"))]
    let iterator = seeds.iter().enumerate();

    #[cfg(feature = "parallel")]
    let iterator = seeds.par_iter().enumerate();

    iterator
        .map(|(offset, &seed)| {
            let attempt = first_attempt + offset;
            let mut rng = StdRng::seed_from_u64(seed);
            let result = catch_unwind(AssertUnwindSafe(|| {
                generate_conformer(molecule, config, shared, &mut rng)
            }))
            .unwrap_or_else(|payload| Err(DgError::Unknown(panic_message(payload.as_ref()))));

            if let Err(error) = &result {
                warn!(attempt, %error, "Conformer generation attempt failed");
            }
            reporter.report_attempt(attempt, &result);
            result
        })
        .collect()
}

/// Generates `num_conformers` conformers, one result slot per request.
///
/// Attempts are independent: a failed attempt occupies its slot with the
/// error and does not affect the others. Each attempt draws from its own
/// generator seeded from `config.seed` (or entropy), so results are
/// reproducible for a fixed seed regardless of thread count.
#[instrument(skip_all, name = "conformer_generation", fields(conformers = num_conformers, atoms = molecule.num_atoms()))]
pub fn run(
    molecule: &Molecule,
    num_conformers: usize,
    config: &Configuration,
    reporter: &ProgressReporter,
) -> Vec<Result<AngstromPositions, DgError>> {
    if let Err(error) = check_preconditions(molecule, config) {
        warn!(%error, "Refusing to generate conformers");
        return vec![Err(error); num_conformers];
    }

    let mut master = master_rng(config);
    let shared = shared_information(molecule, config, &mut master);
    if shared.is_none() {
        info!("Molecule has unassigned stereocenters; modelling each conformer separately.");
    }
    let seeds: Vec<u64> = (0..num_conformers).map(|_| master.r#gen()).collect();

    reporter.report(Progress::GenerationStart {
        mode: GenerationMode::Batch,
        requested: num_conformers,
        per_attempt_models: shared.is_none(),
    });
    let results = run_attempts(molecule, config, shared.as_ref(), &seeds, 0, reporter);
    let successes = results.iter().filter(|r| r.is_ok()).count();
    reporter.report(Progress::GenerationFinish {
        generated: successes,
        failed: num_conformers - successes,
    });

    info!(
        successes,
        failures = num_conformers - successes,
        "Conformer generation finished."
    );
    results
}

/// Successful conformers of an ensemble together with the failed attempts.
#[derive(Debug, Clone)]
pub struct Ensemble {
    pub conformers: Vec<AngstromPositions>,
    pub failures: Vec<DgError>,
}

impl Ensemble {
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}

/// Generates conformers until `num_conformers` succeed or the failures exceed
/// `config.failure_ratio × num_conformers`.
///
/// # Errors
///
/// Returns the refusal directly if no attempt can succeed: zero-assignment
/// stereocenters or invalid fixed positions.
#[instrument(skip_all, name = "ensemble_generation", fields(conformers = num_conformers))]
pub fn generate_ensemble(
    molecule: &Molecule,
    num_conformers: usize,
    config: &Configuration,
    reporter: &ProgressReporter,
) -> Result<Ensemble, DgError> {
    check_preconditions(molecule, config)?;

    let mut master = master_rng(config);
    let shared = shared_information(molecule, config, &mut master);
    let failure_limit = config.failure_ratio * num_conformers as f64;
    let mut ensemble = Ensemble {
        conformers: Vec::with_capacity(num_conformers),
        failures: Vec::new(),
    };

    reporter.report(Progress::GenerationStart {
        mode: GenerationMode::Ensemble,
        requested: num_conformers,
        per_attempt_models: shared.is_none(),
    });
    let mut attempts = 0;
    while ensemble.conformers.len() < num_conformers
        && ensemble.failures.len() as f64 <= failure_limit
    {
        let remaining = num_conformers - ensemble.conformers.len();
        let seeds: Vec<u64> = (0..remaining).map(|_| master.r#gen()).collect();
        let results = run_attempts(molecule, config, shared.as_ref(), &seeds, attempts, reporter);
        attempts += seeds.len();
        for result in results {
            match result {
                Ok(conformer) if ensemble.conformers.len() < num_conformers => {
                    ensemble.conformers.push(conformer)
                }
                Ok(_) => {}
                Err(error) => ensemble.failures.push(error),
            }
        }
    }
    reporter.report(Progress::GenerationFinish {
        generated: ensemble.conformers.len(),
        failed: ensemble.failure_count(),
    });

    if ensemble.conformers.len() < num_conformers {
        warn!(
            generated = ensemble.conformers.len(),
            requested = num_conformers,
            failures = ensemble.failure_count(),
            "Failure ratio exceeded before the ensemble was complete"
        );
    } else {
        info!(
            failures = ensemble.failure_count(),
            "Ensemble generation finished."
        );
    }
    Ok(ensemble)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::element::Element;
    use crate::core::models::molecule::MoleculeBuilder;
    use crate::core::models::topology::BondType;
    use crate::core::shapes::Shape;
    use crate::engine::config::ConfigurationBuilder;

    fn ethane() -> Molecule {
        let mut builder = MoleculeBuilder::new();
        let c1 = builder.add_atom(Element::C);
        let c2 = builder.add_atom(Element::C);
        builder.add_bond(c1, c2, BondType::Single).unwrap();
        for carbon in [c1, c2] {
            for _ in 0..3 {
                let h = builder.add_atom(Element::H);
                builder.add_bond(carbon, h, BondType::Single).unwrap();
            }
        }
        builder.build().unwrap()
    }

    #[test]
    fn ethane_conformers_have_reasonable_bond_lengths() {
        let molecule = ethane();
        let config = ConfigurationBuilder::new().seed(7).build().unwrap();
        let results = run(&molecule, 3, &config, &ProgressReporter::new());
        assert_eq!(results.len(), 3);
        let conformer = results.into_iter().find_map(Result::ok).expect("a conformer");
        let p = conformer.positions();
        let cc = (p[0] - p[1]).norm();
        assert!((cc - 1.5).abs() < 0.15, "C-C {cc}");
        let ch = (p[0] - p[2]).norm();
        assert!((ch - 1.1).abs() < 0.15, "C-H {ch}");
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let molecule = ethane();
        let config = ConfigurationBuilder::new().seed(3).build().unwrap();
        let first = run(&molecule, 2, &config, &ProgressReporter::new());
        let second = run(&molecule, 2, &config, &ProgressReporter::new());
        assert_eq!(first, second);
    }

    #[test]
    fn out_of_range_fixed_positions_fail_every_slot() {
        let molecule = ethane();
        let config = ConfigurationBuilder::new()
            .fixed_position(42, [0.0, 0.0, 0.0])
            .build()
            .unwrap();
        let results = run(&molecule, 3, &config, &ProgressReporter::new());
        assert_eq!(results.len(), 3);
        assert!(
            results
                .iter()
                .all(|r| matches!(r, Err(DgError::InvalidFixedPositions(_))))
        );
    }

    #[test]
    fn fixed_atoms_land_on_their_targets() {
        let points = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
        ];
        let fixed = [
            FixedPosition {
                atom: 0,
                position: [0.0, 0.0, 5.0],
            },
            FixedPosition {
                atom: 1,
                position: [0.0, 0.0, 5.0 + 1.0 / ANGSTROM_PER_BOHR],
            },
        ];
        let placed = place_fixed_atoms(points, &fixed);
        assert!((placed[0] - Vector3::new(0.0, 0.0, 5.0 * ANGSTROM_PER_BOHR)).norm() < 1e-9);
        assert!((placed[1] - Vector3::new(0.0, 0.0, 5.0 * ANGSTROM_PER_BOHR + 1.0)).norm() < 1e-9);
        // The free atom keeps its distances to the fixed ones
        assert!(((placed[2] - placed[1]).norm() - 1.0).abs() < 1e-9);
        assert!(((placed[2] - placed[0]).norm() - 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn narrowing_assigns_every_stereocenter() {
        let mut builder = MoleculeBuilder::new();
        let center = builder.add_atom(Element::C);
        for element in [Element::F, Element::Cl, Element::Br, Element::I] {
            let ligand = builder.add_atom(element);
            builder.add_bond(center, ligand, BondType::Single).unwrap();
        }
        let molecule = builder.build().unwrap();
        assert!(molecule.stereocenters().has_unassigned());

        let narrowed = narrow(&molecule, &mut StdRng::seed_from_u64(1));
        assert!(!narrowed.stereocenters().has_unassigned());
        assert!(molecule.stereocenters().has_unassigned());
    }

    #[test]
    fn narrowing_skips_stereocenters_without_assignments() {
        let mut builder = MoleculeBuilder::new();
        let center = builder.add_atom(Element::C);
        let a = builder.add_atom(Element::C);
        let b = builder.add_atom(Element::C);
        builder.add_bond(center, a, BondType::Single).unwrap();
        builder.add_bond(center, b, BondType::Single).unwrap();
        builder.add_bond(a, b, BondType::Single).unwrap();
        builder.set_shape(center, Shape::Line);
        let chiral = builder.add_atom(Element::C);
        for element in [Element::F, Element::Cl, Element::Br, Element::I] {
            let ligand = builder.add_atom(element);
            builder.add_bond(chiral, ligand, BondType::Single).unwrap();
        }
        let molecule = builder.build().unwrap();
        assert!(molecule.stereocenters().has_zero_assignment());

        for seed in 0..8 {
            let narrowed = narrow(&molecule, &mut StdRng::seed_from_u64(seed));
            let stereocenters = narrowed.stereocenters();
            assert!(stereocenters.atom(chiral).unwrap().assignment().is_some());
            assert!(stereocenters.atom(center).unwrap().assignment().is_none());
            assert!(stereocenters.has_zero_assignment());
        }
    }

    #[test]
    fn ensembles_stop_after_the_requested_count() {
        let molecule = ethane();
        let config = ConfigurationBuilder::new().seed(11).build().unwrap();
        let ensemble = generate_ensemble(&molecule, 2, &config, &ProgressReporter::new()).unwrap();
        assert_eq!(ensemble.conformers.len(), 2);
    }
}
