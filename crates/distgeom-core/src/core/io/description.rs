use super::traits::MoleculeFile;
use crate::core::models::element::{Element, ParseElementError};
use crate::core::models::ids::BondIndex;
use crate::core::models::molecule::{Molecule, MoleculeBuilder, MoleculeError};
use crate::core::models::topology::BondType;
use crate::core::shapes::Shape;
use crate::core::stereo::{Stereocenter, StereocenterKey};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct AtomRecord {
    element: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    charge: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shape: Option<Shape>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct BondRecord {
    atoms: [usize; 2],
    #[serde(rename = "type", default = "default_bond_type")]
    bond_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct StereocenterRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    atom: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bond: Option<[usize; 2]>,
    assignment: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DescriptionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    atoms: Vec<AtomRecord>,
    #[serde(default)]
    bonds: Vec<BondRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    stereocenters: Vec<StereocenterRecord>,
}

fn is_zero(value: &i32) -> bool {
    *value == 0
}

fn default_bond_type() -> String {
    "single".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptionMetadata {
    pub name: Option<String>,
}

#[derive(Debug, Error)]
pub enum DescriptionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("TOML parsing error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Atom {index}: {source}")]
    Element {
        index: usize,
        #[source]
        source: ParseElementError,
    },
    #[error("Bond {index} has unknown type '{value}'")]
    BondType { index: usize, value: String },
    #[error("Stereocenter entry {index} must name exactly one of 'atom' or 'bond'")]
    StereocenterTarget { index: usize },
    #[error("Invalid molecule: {0}")]
    Molecule(#[from] MoleculeError),
}

/// Molecule descriptions in TOML.
///
/// ```toml
/// name = "bromochlorofluoromethane"
///
/// [[atoms]]
/// element = "C"
///
/// [[atoms]]
/// element = "Br"
///
/// [[bonds]]
/// atoms = [0, 1]
/// type = "single"
///
/// [[stereocenters]]
/// atom = 0
/// assignment = 1
/// ```
///
/// Atoms may carry a formal `charge` and an explicit `shape`. Stereocenter
/// entries select an assignment for a perceived atom or bond stereocenter.
pub struct DescriptionFile;

impl DescriptionFile {
    pub fn parse(content: &str) -> Result<(Molecule, DescriptionMetadata), DescriptionError> {
        let record: DescriptionRecord = toml::from_str(content)?;

        let mut builder = MoleculeBuilder::new();
        for (index, atom) in record.atoms.iter().enumerate() {
            let element: Element = atom
                .element
                .parse()
                .map_err(|source| DescriptionError::Element { index, source })?;
            builder.add_charged_atom(element, atom.charge);
        }
        for (index, bond) in record.bonds.iter().enumerate() {
            let bond_type: BondType =
                bond.bond_type
                    .parse()
                    .map_err(|_| DescriptionError::BondType {
                        index,
                        value: bond.bond_type.clone(),
                    })?;
            builder.add_bond(bond.atoms[0], bond.atoms[1], bond_type)?;
        }
        for (index, atom) in record.atoms.iter().enumerate() {
            if let Some(shape) = atom.shape {
                builder.set_shape(index, shape);
            }
        }

        let mut molecule = builder.build()?;
        for (index, entry) in record.stereocenters.iter().enumerate() {
            let key = match (entry.atom, entry.bond) {
                (Some(atom), None) => StereocenterKey::Atom(atom),
                (None, Some([a, b])) => StereocenterKey::Bond(BondIndex::new(a, b)),
                _ => return Err(DescriptionError::StereocenterTarget { index }),
            };
            molecule.assign_stereocenter(key, Some(entry.assignment))?;
        }

        Ok((molecule, DescriptionMetadata { name: record.name }))
    }

    pub fn render(
        molecule: &Molecule,
        metadata: &DescriptionMetadata,
    ) -> Result<String, DescriptionError> {
        let atoms = molecule
            .atoms()
            .iter()
            .enumerate()
            .map(|(index, atom)| AtomRecord {
                element: atom.element.symbol().to_string(),
                charge: atom.charge,
                shape: molecule.shape_override(index),
            })
            .collect();
        let bonds = molecule
            .bonds()
            .iter()
            .map(|bond| BondRecord {
                atoms: [bond.index.first, bond.index.second],
                bond_type: bond.bond_type.to_string().to_lowercase(),
            })
            .collect();
        let stereocenters = molecule
            .stereocenters()
            .iter()
            .filter(|s| s.num_assignments() > 1)
            .filter_map(|s| {
                let assignment = s.assignment()?;
                Some(match s {
                    Stereocenter::Atom(atom) => StereocenterRecord {
                        atom: Some(atom.central()),
                        bond: None,
                        assignment,
                    },
                    Stereocenter::Bond(bond) => StereocenterRecord {
                        atom: None,
                        bond: Some([bond.bond().first, bond.bond().second]),
                        assignment,
                    },
                })
            })
            .collect();

        let record = DescriptionRecord {
            name: metadata.name.clone(),
            atoms,
            bonds,
            stereocenters,
        };
        Ok(toml::to_string(&record)?)
    }
}

impl MoleculeFile for DescriptionFile {
    type Metadata = DescriptionMetadata;
    type Error = DescriptionError;

    fn read_from(reader: &mut impl BufRead) -> Result<(Molecule, Self::Metadata), Self::Error> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        Self::parse(&content)
    }

    fn write_to(
        molecule: &Molecule,
        metadata: &Self::Metadata,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error> {
        writer.write_all(Self::render(molecule, metadata)?.as_bytes())?;
        Ok(())
    }
}
