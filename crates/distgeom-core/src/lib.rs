//! # distgeom
//!
//! A distance geometry conformer generator: three dimensional coordinates for
//! molecular graphs with stereochemical annotations.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture.
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Molecule`, elements,
//!   bond types), ring perception, the coordination shape oracle and
//!   stereocenters with their spatial constraints, plus file I/O.
//!
//! - **[`engine`]: The Numerical Core.** The spatial model turning graphs into
//!   bounds, triangle smoothing, distance matrix sampling, metric embedding and
//!   the two-stage refinement with its penalty function.
//!
//! - **[`workflows`]: The Public API.** Complete conformer generation runs:
//!   single conformers, parallel ensembles with one result per request,
//!   failure-ratio bounded ensembles and refinement traces for debugging.
//!
//! ## Example
//!
//! ```no_run
//! use distgeom::core::models::element::Element;
//! use distgeom::core::models::molecule::MoleculeBuilder;
//! use distgeom::core::models::topology::BondType;
//! use distgeom::engine::config::ConfigurationBuilder;
//! use distgeom::engine::progress::ProgressReporter;
//! use distgeom::workflows;
//!
//! let mut builder = MoleculeBuilder::new();
//! let oxygen = builder.add_atom(Element::O);
//! for _ in 0..2 {
//!     let hydrogen = builder.add_atom(Element::H);
//!     builder.add_bond(oxygen, hydrogen, BondType::Single).unwrap();
//! }
//! let water = builder.build().unwrap();
//!
//! let config = ConfigurationBuilder::new().seed(42).build().unwrap();
//! for result in workflows::run(&water, 4, &config, &ProgressReporter::new()) {
//!     match result {
//!         Ok(positions) => println!("{:?}", positions.positions()),
//!         Err(error) => eprintln!("attempt failed: {error}"),
//!     }
//! }
//! ```

pub mod core;
pub mod engine;
pub mod workflows;
