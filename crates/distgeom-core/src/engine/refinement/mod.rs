//! # Refinement
//!
//! Two-stage minimization of embedded four dimensional positions against the
//! distance bounds, chirality constraints and dihedral constraints of a
//! spatial model.
//!
//! ## Overview
//!
//! Metric embedding produces positions whose distances only approximately
//! honour the bounds and whose chiralities are right only by chance. Refinement
//! fixes both with a quasi-Newton descent on a penalty function
//! ([`error_function::ErrorFunction`]) minimized by [`lbfgs::minimize`].
//!
//! ## Stages
//!
//! - **Invert** runs only if some chirality constraint has the wrong sign after
//!   embedding. Distance and chirality terms are minimized while the fourth
//!   dimension is free, which lets atoms pass around each other to flip
//!   handedness. It ends once every chirality is correct.
//! - **Compress** adds dihedral terms and a penalty on the fourth coordinate,
//!   squeezing the structure back into three dimensions. It ends once the
//!   gradient norm falls below the configured target.
//!
//! Before either stage, if fewer than half of the chiralities are correct the
//! structure is mirrored, which turns a mostly wrong structure into a mostly
//! right one for free.

pub mod error_function;
pub mod lbfgs;

use crate::core::stereo::constraints::DihedralConstraint;
use crate::engine::bounds::DistanceBoundsMatrix;
use crate::engine::chirality::ChiralityConstraint;
use crate::engine::config::Configuration;
use crate::engine::error::DgError;
use error_function::{ErrorFunction, final_structure_acceptable, proportion_correct_chiralities};
use lbfgs::{Iteration, LbfgsOptions};
use nalgebra::DVector;
use std::fmt;
use std::ops::ControlFlow;
use tracing::{debug, instrument, trace};

/// Longest optimizer step per atom, in Å. The step cap scales with the square
/// root of the atom count.
const MAX_STEP_PER_ATOM: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefinementStage {
    Invert,
    Compress,
}

impl fmt::Display for RefinementStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invert => f.write_str("invert"),
            Self::Compress => f.write_str("compress"),
        }
    }
}

/// One recorded optimizer iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefinementStep {
    pub stage: RefinementStage,
    pub iteration: usize,
    pub value: f64,
    pub gradient_norm: f64,
    pub proportion_correct_chiralities: f64,
}

/// Constraints a structure is refined against.
#[derive(Debug, Clone, Copy)]
pub struct RefinementProblem<'a> {
    pub bounds: &'a DistanceBoundsMatrix,
    pub chiralities: &'a [ChiralityConstraint],
    pub dihedrals: &'a [DihedralConstraint],
}

/// Refines `positions` (`[x, y, z, w]` per atom) and returns the refined
/// positions.
///
/// If `recorder` is given, every optimizer iteration of both stages is
/// appended to it.
///
/// # Errors
///
/// - [`DgError::RefinementException`] if the penalty becomes non-finite.
/// - [`DgError::RefinementMaxIterationsReached`] if a stage exhausts
///   `refinement_step_limit` iterations.
/// - [`DgError::RefinedChiralsWrong`] if chiralities remain incorrect.
/// - [`DgError::RefinedStructureInacceptable`] if the final structure is out
///   of tolerance of its bounds.
#[instrument(level = "debug", skip_all, fields(atoms = problem.bounds.num_atoms()))]
pub fn refine(
    mut positions: DVector<f64>,
    problem: &RefinementProblem<'_>,
    config: &Configuration,
    mut recorder: Option<&mut Vec<RefinementStep>>,
) -> Result<DVector<f64>, DgError> {
    let num_atoms = problem.bounds.num_atoms();
    let limit = config.refinement_step_limit;
    let options = LbfgsOptions {
        max_step: MAX_STEP_PER_ATOM * (num_atoms.max(1) as f64).sqrt(),
        ..LbfgsOptions::default()
    };

    if proportion_correct_chiralities(problem.chiralities, &positions) < 0.5 {
        for atom in 0..num_atoms {
            positions[4 * atom + 1] = -positions[4 * atom + 1];
        }
        trace!("Mirrored embedded structure to correct the majority of chiralities");
    }

    if proportion_correct_chiralities(problem.chiralities, &positions) < 1.0 {
        let function = ErrorFunction::new(
            problem.bounds,
            problem.chiralities,
            problem.dihedrals,
            RefinementStage::Invert,
        );
        let result = lbfgs::minimize(
            &mut positions,
            &options,
            |x| function.evaluate(x),
            |state| {
                let proportion = proportion_correct_chiralities(problem.chiralities, state.x);
                record(&mut recorder, RefinementStage::Invert, state, proportion);
                if proportion >= 1.0 || state.iteration >= limit {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
        )?;
        debug!(
            iterations = result.iterations,
            value = result.value,
            "Chirality inversion stage finished"
        );

        if proportion_correct_chiralities(problem.chiralities, &positions) < 1.0 {
            return Err(if result.iterations >= limit {
                DgError::RefinementMaxIterationsReached
            } else {
                DgError::RefinedChiralsWrong
            });
        }
    }

    let function = ErrorFunction::new(
        problem.bounds,
        problem.chiralities,
        problem.dihedrals,
        RefinementStage::Compress,
    );
    let target = config.refinement_gradient_target;
    let result = lbfgs::minimize(
        &mut positions,
        &options,
        |x| function.evaluate(x),
        |state| {
            if recorder.is_some() {
                let proportion = proportion_correct_chiralities(problem.chiralities, state.x);
                record(&mut recorder, RefinementStage::Compress, state, proportion);
            }
            if state.gradient_norm < target || state.iteration >= limit {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        },
    )?;
    debug!(
        iterations = result.iterations,
        value = result.value,
        gradient_norm = result.gradient_norm,
        stalled = result.stalled,
        "Compression stage finished"
    );

    if result.iterations >= limit && result.gradient_norm >= target {
        return Err(DgError::RefinementMaxIterationsReached);
    }
    if proportion_correct_chiralities(problem.chiralities, &positions) < 1.0 {
        return Err(DgError::RefinedChiralsWrong);
    }
    if !final_structure_acceptable(
        problem.bounds,
        problem.chiralities,
        problem.dihedrals,
        &positions,
        &config.constants,
    ) {
        return Err(DgError::RefinedStructureInacceptable);
    }

    Ok(positions)
}

fn record(
    recorder: &mut Option<&mut Vec<RefinementStep>>,
    stage: RefinementStage,
    state: &Iteration<'_>,
    proportion: f64,
) {
    if let Some(steps) = recorder.as_deref_mut() {
        steps.push(RefinementStep {
            stage,
            iteration: state.iteration,
            value: state.value,
            gradient_norm: state.gradient_norm,
            proportion_correct_chiralities: proportion,
        });
    }
}
