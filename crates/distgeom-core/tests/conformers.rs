use distgeom::core::models::element::Element;
use distgeom::core::models::molecule::{Molecule, MoleculeBuilder};
use distgeom::core::models::topology::BondType;
use distgeom::core::shapes::Shape;
use distgeom::engine::config::ConfigurationBuilder;
use distgeom::engine::error::DgError;
use distgeom::engine::progress::{GenerationMode, Progress, ProgressReporter};
use distgeom::engine::units::AngstromPositions;
use distgeom::workflows;
use nalgebra::Point3;
use std::sync::Mutex;

/// Linear C18H38 with the carbons at indices 0 to 17.
fn octadecane() -> Molecule {
    let mut builder = MoleculeBuilder::new();
    let carbons: Vec<_> = (0..18).map(|_| builder.add_atom(Element::C)).collect();
    for pair in carbons.windows(2) {
        builder.add_bond(pair[0], pair[1], BondType::Single).unwrap();
    }
    for (index, &carbon) in carbons.iter().enumerate() {
        let hydrogens = if index == 0 || index == 17 { 3 } else { 2 };
        for _ in 0..hydrogens {
            let h = builder.add_atom(Element::H);
            builder.add_bond(carbon, h, BondType::Single).unwrap();
        }
    }
    builder.build().unwrap()
}

fn assert_fixed(results: &[Result<AngstromPositions, DgError>], fixed: &[(usize, [f64; 3])]) {
    let successes: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert!(!successes.is_empty(), "no conformer succeeded: {results:?}");
    for conformer in successes {
        let bohr = conformer.to_bohr();
        for &(atom, target) in fixed {
            let distance = (bohr[atom] - Point3::from(target)).norm();
            assert!(distance < 1e-2, "atom {atom} is {distance} bohr off its target");
        }
    }
}

#[test]
fn single_fixed_atom_sits_at_the_origin() {
    let molecule = octadecane();
    let config = ConfigurationBuilder::new()
        .fixed_position(13, [0.0, 0.0, 0.0])
        .seed(1013)
        .build()
        .unwrap();
    let results = workflows::run(&molecule, 4, &config, &ProgressReporter::new());
    assert_eq!(results.len(), 4);
    assert_fixed(&results, &[(13, [0.0, 0.0, 0.0])]);
}

#[test]
fn chain_ends_can_be_pulled_together() {
    let molecule = octadecane();
    let fixed = [(0, [-3.0, 0.0, 0.0]), (17, [3.0, 0.0, 0.0])];
    let config = ConfigurationBuilder::new()
        .fixed_position(fixed[0].0, fixed[0].1)
        .fixed_position(fixed[1].0, fixed[1].1)
        .seed(4017)
        .build()
        .unwrap();
    let results = workflows::run(&molecule, 4, &config, &ProgressReporter::new());
    assert_eq!(results.len(), 4);
    assert_fixed(&results, &fixed);
}

#[test]
fn zero_assignment_stereocenters_refuse_every_conformer() {
    let mut builder = MoleculeBuilder::new();
    let center = builder.add_atom(Element::C);
    let a = builder.add_atom(Element::C);
    let b = builder.add_atom(Element::C);
    builder.add_bond(center, a, BondType::Single).unwrap();
    builder.add_bond(center, b, BondType::Single).unwrap();
    builder.add_bond(a, b, BondType::Single).unwrap();
    builder.set_shape(center, Shape::Line);
    let molecule = builder.build().unwrap();

    let events = Mutex::new(Vec::new());
    let reporter = ProgressReporter::with_callback(Box::new(|event| {
        events.lock().unwrap().push(event);
    }));
    let config = ConfigurationBuilder::new().build().unwrap();
    let results = workflows::run(&molecule, 5, &config, &reporter);
    drop(reporter);

    assert_eq!(results.len(), 5);
    assert!(
        results
            .iter()
            .all(|r| matches!(r, Err(DgError::ZeroAssignmentStereopermutators)))
    );
    // Refused up front: no embedding attempt is ever started
    assert!(
        !events
            .into_inner()
            .unwrap()
            .iter()
            .any(|e| matches!(e, Progress::GenerationStart { .. }))
    );

    assert!(matches!(
        workflows::generate_ensemble(&molecule, 2, &config, &ProgressReporter::new()),
        Err(DgError::ZeroAssignmentStereopermutators)
    ));
}

#[test]
fn progress_is_reported_once_per_attempt() {
    let mut builder = MoleculeBuilder::new();
    let n = builder.add_atom(Element::N);
    for _ in 0..3 {
        let h = builder.add_atom(Element::H);
        builder.add_bond(n, h, BondType::Single).unwrap();
    }
    let ammonia = builder.build().unwrap();

    let events = Mutex::new(Vec::new());
    let reporter = ProgressReporter::with_callback(Box::new(|event| {
        events.lock().unwrap().push(event);
    }));
    let config = ConfigurationBuilder::new().seed(5).build().unwrap();
    let results = workflows::run(&ammonia, 6, &config, &reporter);
    drop(reporter);
    let events = events.into_inner().unwrap();

    assert_eq!(results.len(), 6);
    assert!(matches!(
        events.first(),
        Some(Progress::GenerationStart {
            mode: GenerationMode::Batch,
            requested: 6,
            per_attempt_models: false,
        })
    ));

    let mut attempts: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            Progress::AttemptSucceeded { attempt } | Progress::AttemptFailed { attempt, .. } => {
                Some(*attempt)
            }
            _ => None,
        })
        .collect();
    attempts.sort_unstable();
    assert_eq!(attempts, (0..6).collect::<Vec<_>>());

    let failures: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            Progress::AttemptFailed { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    for attempt in &failures {
        assert!(results[*attempt].is_err());
    }
    let generated = results.iter().filter(|r| r.is_ok()).count();
    assert!(matches!(
        events.last(),
        Some(&Progress::GenerationFinish { generated: g, failed: f }) if g == generated && f == failures.len()
    ));
}

#[test]
fn ensemble_attempts_are_numbered_across_retries() {
    let config = ConfigurationBuilder::new()
        .seed(11)
        .refinement_step_limit(5)
        .failure_ratio(2.0)
        .build()
        .unwrap();
    let events = Mutex::new(Vec::new());
    let reporter = ProgressReporter::with_callback(Box::new(|event| {
        events.lock().unwrap().push(event);
    }));
    let ensemble = workflows::generate_ensemble(&octadecane(), 3, &config, &reporter).unwrap();
    drop(reporter);
    let events = events.into_inner().unwrap();

    let mut attempts: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            Progress::AttemptSucceeded { attempt } | Progress::AttemptFailed { attempt, .. } => {
                Some(*attempt)
            }
            _ => None,
        })
        .collect();
    attempts.sort_unstable();
    let total = ensemble.conformers.len() + ensemble.failure_count();
    assert!(total >= 3);
    assert_eq!(attempts, (0..total).collect::<Vec<_>>());
    assert!(matches!(
        events.first(),
        Some(Progress::GenerationStart {
            mode: GenerationMode::Ensemble,
            ..
        })
    ));
}

/// Benzene with alternating single and double bonds, hydrogens 6 to 11.
fn kekule_benzene() -> Molecule {
    let mut builder = MoleculeBuilder::new();
    let ring: Vec<_> = (0..6).map(|_| builder.add_atom(Element::C)).collect();
    for i in 0..6 {
        let bond_type = if i % 2 == 0 { BondType::Double } else { BondType::Single };
        builder.add_bond(ring[i], ring[(i + 1) % 6], bond_type).unwrap();
    }
    for &carbon in &ring {
        let h = builder.add_atom(Element::H);
        builder.add_bond(carbon, h, BondType::Single).unwrap();
    }
    builder.build().unwrap()
}

#[test]
fn ring_double_bonds_embed_reliably() {
    let benzene = kekule_benzene();
    assert!(!benzene.stereocenters().has_unassigned());

    let config = ConfigurationBuilder::new().seed(5).build().unwrap();
    let results = workflows::run(&benzene, 20, &config, &ProgressReporter::new());
    let successes: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert!(successes.len() >= 18, "only {} of 20 succeeded: {results:?}", successes.len());

    for conformer in successes {
        let p = conformer.positions();
        for i in 0..6 {
            let length = (p[i] - p[(i + 1) % 6]).norm();
            assert!((1.2..1.65).contains(&length), "ring bond {i} is {length} Å");
        }
        // Para carbons sit across a flat hexagon
        let para = (p[0] - p[3]).norm();
        assert!((2.5..3.1).contains(&para), "para distance {para} Å");
    }
}

#[test]
fn cyclobutene_is_fully_determined() {
    let mut builder = MoleculeBuilder::new();
    let ring: Vec<_> = (0..4).map(|_| builder.add_atom(Element::C)).collect();
    builder.add_bond(ring[0], ring[1], BondType::Double).unwrap();
    for i in 1..4 {
        builder.add_bond(ring[i], ring[(i + 1) % 4], BondType::Single).unwrap();
    }
    for (i, &carbon) in ring.iter().enumerate() {
        let hydrogens = if i < 2 { 1 } else { 2 };
        for _ in 0..hydrogens {
            let h = builder.add_atom(Element::H);
            builder.add_bond(carbon, h, BondType::Single).unwrap();
        }
    }
    let cyclobutene = builder.build().unwrap();
    assert!(!cyclobutene.stereocenters().has_unassigned());

    let config = ConfigurationBuilder::new().seed(5).build().unwrap();
    let results = workflows::run(&cyclobutene, 20, &config, &ProgressReporter::new());
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert!(successes >= 18, "only {successes} of 20 succeeded: {results:?}");
}
