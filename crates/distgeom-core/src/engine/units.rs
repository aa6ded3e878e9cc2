//! Length units at the library boundary.
//!
//! All internal computation is carried out in Ångström. Fixed positions are
//! supplied in bohr and generated conformers are handed out as
//! [`AngstromPositions`], so every function receiving positions states the
//! unit it expects in its signature.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const BOHR_PER_ANGSTROM: f64 = 1.889_726_125_457_828;
pub const ANGSTROM_PER_BOHR: f64 = 1.0 / BOHR_PER_ANGSTROM;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LengthUnit {
    #[default]
    Angstrom,
    Bohr,
}

impl LengthUnit {
    /// Multiplier converting a length in Ångström into this unit.
    pub fn per_angstrom(self) -> f64 {
        match self {
            Self::Angstrom => 1.0,
            Self::Bohr => BOHR_PER_ANGSTROM,
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown length unit: '{0}'")]
pub struct ParseLengthUnitError(pub String);

impl FromStr for LengthUnit {
    type Err = ParseLengthUnitError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "angstrom" | "a" | "å" => Ok(Self::Angstrom),
            "bohr" | "au" => Ok(Self::Bohr),
            _ => Err(ParseLengthUnitError(s.to_string())),
        }
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Angstrom => "angstrom",
            Self::Bohr => "bohr",
        })
    }
}

/// Atom positions known to be in Ångström.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AngstromPositions {
    positions: Vec<Point3<f64>>,
}

impl AngstromPositions {
    pub fn new(positions: Vec<Point3<f64>>) -> Self {
        Self { positions }
    }

    pub fn from_bohr(positions: &[Point3<f64>]) -> Self {
        Self {
            positions: positions.iter().map(|p| p * ANGSTROM_PER_BOHR).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    pub fn get(&self, atom: usize) -> Option<&Point3<f64>> {
        self.positions.get(atom)
    }

    pub fn into_inner(self) -> Vec<Point3<f64>> {
        self.positions
    }

    pub fn to_bohr(&self) -> Vec<Point3<f64>> {
        self.in_unit(LengthUnit::Bohr)
    }

    pub fn in_unit(&self, unit: LengthUnit) -> Vec<Point3<f64>> {
        let factor = unit.per_angstrom();
        self.positions.iter().map(|p| p * factor).collect()
    }
}
