//! # Workflows Module
//!
//! High-level entry points that run the complete distance geometry pipeline
//! for a molecule.
//!
//! ## Overview
//!
//! Workflows validate the request, decide whether the spatial model can be
//! shared across attempts, seed one random generator per attempt and collect
//! the outcomes. A molecule whose stereocenters are all assigned is modelled
//! once; otherwise every attempt narrows its own copy of the molecule to a
//! random assignment and models that.
//!
//! ## Architecture
//!
//! - **Generation** ([`generate`]) - `run`, `generate_conformer`, `generate_ensemble` and the shared model data
//! - **Debugging** ([`debug`]) - Sequential attempts with recorded refinement traces
//!
//! ## Key Capabilities
//!
//! - **Independent attempts** with one result slot per requested conformer
//! - **Reproducible parallelism** through per-attempt seeds drawn from a master generator
//! - **Panic isolation** converting a crashing attempt into an error result
//! - **Failure ratio** bounding the work spent on hard molecules

pub mod debug;
pub mod generate;

pub use debug::{RefinementData, debug_refinement};
pub use generate::{
    DgInformation, Ensemble, gather_dg_information, generate_conformer, generate_ensemble, narrow, run,
};
