//! # Engine Module
//!
//! The numerical machinery of distance geometry: from a molecular graph with
//! stereocenter assignments to refined Cartesian coordinates.
//!
//! ## Overview
//!
//! A conformer is produced in five steps. The spatial model translates the
//! graph and its stereocenters into bond, angle and dihedral bounds. Those are
//! turned into a triangle-consistent matrix of pairwise distance bounds. A
//! concrete distance matrix is sampled from it and embedded in four
//! dimensions through its metric matrix. Finally the embedded positions are
//! refined against all distance, chirality and dihedral constraints.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Pipeline settings, empirical model constants and fixed positions
//! - **Spatial Model** ([`spatial_model`]) - Bond, angle and dihedral bounds from graph and stereocenters
//! - **Bounds Matrix** ([`bounds`]) - Pairwise distance bounds and triangle smoothing
//! - **Sampling** ([`sampler`]) - Random distance matrices within the bounds
//! - **Embedding** ([`metric`]) - Metric matrix eigendecomposition into four dimensions
//! - **Chirality** ([`chirality`]) - Signed volume windows from chirality prototypes
//! - **Refinement** ([`refinement`]) - Two-stage L-BFGS minimization of constraint violations
//! - **Units** ([`units`]) - Length units at the library boundary
//! - **Progress Monitoring** ([`progress`]) - Progress reporting for ensemble generation
//! - **Error Handling** ([`error`]) - Per-attempt failure taxonomy
//!
//! ## Key Capabilities
//!
//! - **Exact flat ring geometry** for three- and four-membered rings via cyclic polygons
//! - **Spiro center cross angles** for atoms joining two small rings
//! - **Partial metrization** trading sampling accuracy for speed
//! - **Chirality inversion** through a temporary fourth spatial dimension
//! - **Fixed atom positions** honoured through tight pair bounds and a final superposition

pub mod bounds;
pub mod chirality;
pub mod config;
pub mod error;
pub mod metric;
pub mod progress;
pub mod refinement;
pub mod sampler;
pub mod spatial_model;
pub mod units;
