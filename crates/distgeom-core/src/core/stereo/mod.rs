//! # Stereocenters
//!
//! ## Overview
//!
//! A stereocenter describes a local spatial arrangement that the molecular
//! graph alone leaves open. Atom stereocenters place ranked ligands on the
//! vertices of an idealized [`Shape`](crate::core::shapes::Shape); bond
//! stereocenters fix the relative orientation of substituents across a double
//! bond.
//!
//! ## Architecture
//!
//! - **Perception** ([`inference`], [`list::StereocenterList::detect`]): local
//!   shapes are inferred and every center with more or fewer than one feasible
//!   arrangement is recorded.
//! - **Enumeration** ([`permutations`]): arrangements are reduced to
//!   rotationally unique stereopermutations with occurrence weights.
//! - **Emission** ([`constraints`]): assigned stereocenters contribute angle,
//!   dihedral and haptic bond bounds to the spatial model, plus chirality
//!   prototypes and dihedral windows used during refinement.

pub mod atom;
pub mod bond;
pub mod constraints;
pub mod inference;
pub mod list;
pub mod permutations;

pub use list::{Stereocenter, StereocenterKey, StereocenterList};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("assignment {assignment} is out of range ({num_assignments} feasible assignments)")]
pub struct AssignmentError {
    pub assignment: usize,
    pub num_assignments: usize,
}
