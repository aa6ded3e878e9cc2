use super::ids::{AtomIndex, BondIndex};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BondType {
    Single,
    Double,
    Triple,
    Quadruple,
    Quintuple,
    Sextuple,
    Aromatic,
    /// Multi-center bond between a central atom and one atom of a haptic ligand.
    Eta,
}

impl Default for BondType {
    fn default() -> Self {
        BondType::Single
    }
}

impl BondType {
    /// Electron-counting weight of the bond. Eta bonds do not consume
    /// electrons of the central atom for the purpose of shape inference.
    pub fn weight(self) -> f64 {
        match self {
            Self::Single => 1.0,
            Self::Double => 2.0,
            Self::Triple => 3.0,
            Self::Quadruple => 4.0,
            Self::Quintuple => 5.0,
            Self::Sextuple => 6.0,
            Self::Aromatic => 1.5,
            Self::Eta => 0.0,
        }
    }

    /// Fractional bond order used by the bond length model.
    pub fn length_order(self) -> f64 {
        match self {
            Self::Eta => 0.5,
            other => other.weight(),
        }
    }

    pub fn is_eta(self) -> bool {
        matches!(self, Self::Eta)
    }

    /// Whether a bond of this type forces its ring to be planar.
    pub fn enforces_planarity(self) -> bool {
        matches!(self, Self::Double)
    }
}

#[derive(Debug, Error)]
#[error("Invalid bond type string")]
pub struct ParseBondTypeError;

impl FromStr for BondType {
    type Err = ParseBondTypeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1" | "s" | "single" => Ok(Self::Single),
            "2" | "d" | "double" => Ok(Self::Double),
            "3" | "t" | "triple" => Ok(Self::Triple),
            "4" | "quadruple" => Ok(Self::Quadruple),
            "5" | "quintuple" => Ok(Self::Quintuple),
            "6" | "sextuple" => Ok(Self::Sextuple),
            "ar" | "aromatic" => Ok(Self::Aromatic),
            "eta" => Ok(Self::Eta),
            _ => Err(ParseBondTypeError),
        }
    }
}

impl fmt::Display for BondType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Single => "Single",
                Self::Double => "Double",
                Self::Triple => "Triple",
                Self::Quadruple => "Quadruple",
                Self::Quintuple => "Quintuple",
                Self::Sextuple => "Sextuple",
                Self::Aromatic => "Aromatic",
                Self::Eta => "Eta",
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bond {
    pub index: BondIndex,
    pub bond_type: BondType,
}

impl Bond {
    pub fn new(a: AtomIndex, b: AtomIndex, bond_type: BondType) -> Self {
        Self {
            index: BondIndex::new(a, b),
            bond_type,
        }
    }

    pub fn contains(&self, atom: AtomIndex) -> bool {
        self.index.contains(atom)
    }
}
