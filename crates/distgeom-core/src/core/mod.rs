//! # Core Module
//!
//! Stateless data models and pure algorithms on which the distance geometry
//! engine is built.
//!
//! ## Overview
//!
//! Everything in this module is deterministic and free of numerical
//! optimization: molecules are described as graphs, rings are perceived,
//! local coordination shapes are looked up and stereocenters enumerate the
//! spatially distinct arrangements of their substituents.
//!
//! ## Architecture
//!
//! - **Molecular Representation** ([`models`]) - Elements, bonds and the molecular graph
//! - **Ring Perception** ([`cycles`]) - Relevant cycles ignoring multi-center bonds
//! - **Shape Oracle** ([`shapes`]) - Idealized coordination polyhedra, their rotations and tetrahedra
//! - **Stereochemistry** ([`stereo`]) - Atom and bond stereocenters and their constraints
//! - **File I/O** ([`io`]) - TOML molecule descriptions and XYZ coordinates
//! - **Math Utilities** ([`utils`]) - Signed volumes, dihedrals, superposition and cyclic polygons

pub mod cycles;
pub mod io;
pub mod models;
pub mod shapes;
pub mod stereo;
pub mod utils;
