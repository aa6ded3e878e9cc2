//! # Core Models Module
//!
//! Data structures describing a molecule as a graph: elements, atom and bond
//! identifiers, bond types, the [`molecule::Molecule`] itself and the
//! topological ranking of substituents used by stereocenter perception.
//!
//! ## Key Components
//!
//! - [`element`] - Element table with bond radii, electronegativities and
//!   van der Waals radii, plus the idealized bond length model
//! - [`ids`] - Dense atom indices and canonical bond indices
//! - [`topology`] - Bond types and their bond-length orders
//! - [`molecule`] - The molecular graph, its builder and its stereocenters
//! - [`ranking`] - Symmetry classes of atoms and ranked ligands of a center
//! - [`value_bounds`] - Closed intervals over distances and angles
//!
//! ## Usage
//!
//! ```ignore
//! use distgeom::core::models::{element::Element, molecule::MoleculeBuilder, topology::BondType};
//!
//! let mut builder = MoleculeBuilder::new();
//! let c = builder.add_atom(Element::C);
//! let o = builder.add_atom(Element::O);
//! builder.add_bond(c, o, BondType::Double)?;
//! let molecule = builder.build()?;
//! ```

pub mod element;
pub mod ids;
pub mod molecule;
pub mod ranking;
pub mod topology;
pub mod value_bounds;
