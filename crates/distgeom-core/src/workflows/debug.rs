use super::generate::{attempt, check_preconditions, master_rng, shared_information};
use crate::core::models::molecule::Molecule;
use crate::engine::config::Configuration;
use crate::engine::error::DgError;
use crate::engine::refinement::RefinementStep;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, instrument};

/// Optimizer trace of one conformer generation attempt.
#[derive(Debug, Clone)]
pub struct RefinementData {
    pub steps: Vec<RefinementStep>,
    pub loosening: f64,
    pub is_failure: bool,
    /// Why the attempt failed, if it did.
    pub error: Option<DgError>,
}

/// Runs `num_conformers` attempts sequentially and records every refinement
/// step of each.
///
/// Attempts that fail before refinement starts yield an empty trace.
///
/// # Errors
///
/// Returns the refusal directly if no attempt can succeed: zero-assignment
/// stereocenters or invalid fixed positions.
#[instrument(skip_all, name = "refinement_debugging", fields(conformers = num_conformers))]
pub fn debug_refinement(
    molecule: &Molecule,
    num_conformers: usize,
    config: &Configuration,
) -> Result<Vec<RefinementData>, DgError> {
    check_preconditions(molecule, config)?;

    let mut master = master_rng(config);
    let shared = shared_information(molecule, config, &mut master);

    let data = (0..num_conformers)
        .map(|index| {
            let mut rng = StdRng::seed_from_u64(master.r#gen());
            let mut steps = Vec::new();
            let result = attempt(molecule, config, shared.as_ref(), &mut rng, Some(&mut steps));
            debug!(attempt = index, steps = steps.len(), ok = result.is_ok(), "Refinement traced");
            let error = result.err();
            RefinementData {
                steps,
                loosening: config.spatial_model_loosening,
                is_failure: error.is_some(),
                error,
            }
        })
        .collect();
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::element::Element;
    use crate::core::models::molecule::MoleculeBuilder;
    use crate::core::models::topology::BondType;
    use crate::engine::config::ConfigurationBuilder;
    use crate::engine::refinement::RefinementStage;

    #[test]
    fn traces_are_recorded_per_attempt() {
        let mut builder = MoleculeBuilder::new();
        let o = builder.add_atom(Element::O);
        for _ in 0..2 {
            let h = builder.add_atom(Element::H);
            builder.add_bond(o, h, BondType::Single).unwrap();
        }
        let molecule = builder.build().unwrap();
        let config = ConfigurationBuilder::new()
            .seed(2)
            .spatial_model_loosening(1.5)
            .build()
            .unwrap();

        let data = debug_refinement(&molecule, 2, &config).unwrap();
        assert_eq!(data.len(), 2);
        for attempt in &data {
            assert_eq!(attempt.loosening, 1.5);
            assert_eq!(attempt.is_failure, attempt.error.is_some());
            if !attempt.is_failure {
                assert!(attempt.steps.iter().any(|s| s.stage == RefinementStage::Compress));
            }
        }
    }
}
