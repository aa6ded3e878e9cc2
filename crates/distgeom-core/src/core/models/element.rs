use phf::{Map, phf_map};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Element {
    H = 1,
    Li = 3,
    B = 5,
    C = 6,
    N = 7,
    O = 8,
    F = 9,
    Na = 11,
    Mg = 12,
    Al = 13,
    Si = 14,
    P = 15,
    S = 16,
    Cl = 17,
    K = 19,
    Ca = 20,
    Fe = 26,
    Co = 27,
    Ni = 28,
    Cu = 29,
    Zn = 30,
    Br = 35,
    Pd = 46,
    I = 53,
    Pt = 78,
}

/// Tabulated per-element constants used by the spatial model.
///
/// Bond radii and electronegativities are the UFF values (Rappé et al.),
/// van der Waals radii are CRC handbook values. All lengths in Ångström.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementData {
    pub symbol: &'static str,
    pub bond_radius: f64,
    pub electronegativity: f64,
    pub vdw_radius: f64,
    pub valence_electrons: u8,
    pub main_group: bool,
}

#[rustfmt::skip]
static ELEMENT_SYMBOLS: Map<&'static str, Element> = phf_map! {
    "H" => Element::H, "Li" => Element::Li, "B" => Element::B, "C" => Element::C,
    "N" => Element::N, "O" => Element::O, "F" => Element::F, "Na" => Element::Na,
    "Mg" => Element::Mg, "Al" => Element::Al, "Si" => Element::Si, "P" => Element::P,
    "S" => Element::S, "Cl" => Element::Cl, "K" => Element::K, "Ca" => Element::Ca,
    "Fe" => Element::Fe, "Co" => Element::Co, "Ni" => Element::Ni, "Cu" => Element::Cu,
    "Zn" => Element::Zn, "Br" => Element::Br, "Pd" => Element::Pd, "I" => Element::I,
    "Pt" => Element::Pt,
};

macro_rules! element_data {
    ($sym:literal, $r:expr, $chi:expr, $vdw:expr, $ve:expr, $main:expr) => {
        ElementData {
            symbol: $sym,
            bond_radius: $r,
            electronegativity: $chi,
            vdw_radius: $vdw,
            valence_electrons: $ve,
            main_group: $main,
        }
    };
}

#[rustfmt::skip]
const fn lookup(element: Element) -> ElementData {
    match element {
        Element::H  => element_data!("H",  0.354, 4.528,  1.10, 1, true),
        Element::Li => element_data!("Li", 1.336, 3.006,  1.81, 1, true),
        Element::B  => element_data!("B",  0.838, 5.110,  1.92, 3, true),
        Element::C  => element_data!("C",  0.757, 5.343,  1.70, 4, true),
        Element::N  => element_data!("N",  0.700, 6.899,  1.55, 5, true),
        Element::O  => element_data!("O",  0.658, 8.741,  1.52, 6, true),
        Element::F  => element_data!("F",  0.668, 10.874, 1.47, 7, true),
        Element::Na => element_data!("Na", 1.539, 2.843,  2.27, 1, true),
        Element::Mg => element_data!("Mg", 1.421, 3.951,  1.73, 2, true),
        Element::Al => element_data!("Al", 1.244, 4.060,  1.84, 3, true),
        Element::Si => element_data!("Si", 1.117, 4.168,  2.10, 4, true),
        Element::P  => element_data!("P",  1.101, 5.463,  1.80, 5, true),
        Element::S  => element_data!("S",  1.064, 6.928,  1.80, 6, true),
        Element::Cl => element_data!("Cl", 1.044, 8.564,  1.75, 7, true),
        Element::K  => element_data!("K",  1.953, 2.421,  2.75, 1, true),
        Element::Ca => element_data!("Ca", 1.761, 3.231,  2.31, 2, true),
        Element::Fe => element_data!("Fe", 1.285, 4.294,  2.04, 8, false),
        Element::Co => element_data!("Co", 1.241, 4.105,  2.00, 9, false),
        Element::Ni => element_data!("Ni", 1.164, 4.465,  1.63, 10, false),
        Element::Cu => element_data!("Cu", 1.302, 4.200,  1.40, 11, false),
        Element::Zn => element_data!("Zn", 1.193, 5.106,  1.39, 12, false),
        Element::Br => element_data!("Br", 1.192, 7.790,  1.83, 7, true),
        Element::Pd => element_data!("Pd", 1.338, 4.320,  1.63, 10, false),
        Element::I  => element_data!("I",  1.382, 6.822,  1.98, 7, true),
        Element::Pt => element_data!("Pt", 1.364, 5.170,  1.75, 10, false),
    }
}

impl Element {
    pub fn data(self) -> ElementData {
        lookup(self)
    }

    pub fn atomic_number(self) -> u8 {
        self as u8
    }

    pub fn symbol(self) -> &'static str {
        lookup(self).symbol
    }

    pub fn vdw_radius(self) -> f64 {
        lookup(self).vdw_radius
    }

    pub fn is_main_group(self) -> bool {
        lookup(self).main_group
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown element symbol: '{0}'")]
pub struct ParseElementError(pub String);

impl FromStr for Element {
    type Err = ParseElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let normalized: String = match chars.next() {
            Some(first) => first
                .to_uppercase()
                .chain(chars.flat_map(|c| c.to_lowercase()))
                .collect(),
            None => String::new(),
        };
        ELEMENT_SYMBOLS
            .get(normalized.as_str())
            .copied()
            .ok_or_else(|| ParseElementError(s.to_string()))
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Idealized bond length in Ångström between two elements for a given
/// fractional bond order, following the UFF bond-radius combination rule:
/// `r_ij = r_i + r_j + r_BO - r_EN`.
pub fn bond_length(a: Element, b: Element, bond_order: f64) -> f64 {
    let da = a.data();
    let db = b.data();
    let radius_sum = da.bond_radius + db.bond_radius;

    let order_correction = -0.1332 * radius_sum * bond_order.ln();

    let chi_diff = da.electronegativity.sqrt() - db.electronegativity.sqrt();
    let electronegativity_correction = da.bond_radius * db.bond_radius * chi_diff * chi_diff
        / (da.electronegativity * da.bond_radius + db.electronegativity * db.bond_radius);

    radius_sum + order_correction - electronegativity_correction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_from_str_is_case_insensitive() {
        assert_eq!(Element::from_str("C"), Ok(Element::C));
        assert_eq!(Element::from_str("cl"), Ok(Element::Cl));
        assert_eq!(Element::from_str(" BR "), Ok(Element::Br));
        assert!(Element::from_str("Xx").is_err());
        assert!(Element::from_str("").is_err());
    }

    #[test]
    fn display_roundtrips_through_symbol() {
        for element in [Element::H, Element::Fe, Element::Pt, Element::Cl] {
            assert_eq!(Element::from_str(&element.to_string()), Ok(element));
        }
    }

    #[test]
    fn atomic_numbers_match_periodic_table() {
        assert_eq!(Element::H.atomic_number(), 1);
        assert_eq!(Element::C.atomic_number(), 6);
        assert_eq!(Element::Pt.atomic_number(), 78);
    }

    #[test]
    fn carbon_carbon_bond_lengths_are_reasonable() {
        let single = bond_length(Element::C, Element::C, 1.0);
        let aromatic = bond_length(Element::C, Element::C, 1.5);
        let double = bond_length(Element::C, Element::C, 2.0);
        let triple = bond_length(Element::C, Element::C, 3.0);

        assert!((single - 1.514).abs() < 1e-3);
        assert!(single > aromatic && aromatic > double && double > triple);
    }

    #[test]
    fn bond_length_is_symmetric() {
        let ch = bond_length(Element::C, Element::H, 1.0);
        let hc = bond_length(Element::H, Element::C, 1.0);
        assert!((ch - hc).abs() < 1e-12);
        assert!(ch > 1.0 && ch < 1.2);
    }
}
