//! Reading and writing molecules.
//!
//! Molecules are described in a small TOML format listing atoms, bonds,
//! requested shapes and stereocenter assignments. Generated conformers are
//! written as XYZ coordinate files.

pub mod description;
pub mod traits;
pub mod xyz;
