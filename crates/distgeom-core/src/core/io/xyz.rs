use super::traits::MoleculeFile;
use crate::core::models::element::Element;
use crate::core::models::molecule::{Molecule, MoleculeBuilder, MoleculeError};
use nalgebra::Point3;
use std::io::{self, BufRead, Write};
use thiserror::Error;

/// Title line and Ångström positions of an XYZ file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XyzMetadata {
    pub comment: String,
    pub positions: Vec<Point3<f64>>,
}

#[derive(Debug, Error)]
pub enum XyzError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Expected {expected} positions, found {found}")]
    PositionCount { expected: usize, found: usize },
    #[error("Invalid molecule: {0}")]
    Molecule(#[from] MoleculeError),
}

/// XYZ coordinate files. Only elements and positions are stored, so reading
/// yields a molecule without bonds.
pub struct XyzFile;

impl MoleculeFile for XyzFile {
    type Metadata = XyzMetadata;
    type Error = XyzError;

    fn read_from(reader: &mut impl BufRead) -> Result<(Molecule, Self::Metadata), Self::Error> {
        let mut lines = reader.lines();
        let parse_error = |line: usize, message: &str| XyzError::Parse {
            line,
            message: message.to_string(),
        };

        let count_line = lines.next().ok_or_else(|| parse_error(1, "missing atom count"))??;
        let count: usize = count_line
            .trim()
            .parse()
            .map_err(|_| parse_error(1, "atom count is not an integer"))?;
        let comment = lines.next().transpose()?.unwrap_or_default();

        let mut builder = MoleculeBuilder::new();
        let mut positions = Vec::with_capacity(count);
        for index in 0..count {
            let line_number = index + 3;
            let line = lines
                .next()
                .ok_or_else(|| parse_error(line_number, "missing atom line"))??;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return Err(parse_error(line_number, "expected element and three coordinates"));
            }
            let element: Element = fields[0]
                .parse()
                .map_err(|_| parse_error(line_number, "unknown element"))?;
            let mut coordinates = [0.0; 3];
            for (slot, field) in coordinates.iter_mut().zip(&fields[1..4]) {
                *slot = field
                    .parse()
                    .map_err(|_| parse_error(line_number, "coordinate is not a number"))?;
            }
            builder.add_atom(element);
            positions.push(Point3::from(coordinates));
        }

        Ok((
            builder.build()?,
            XyzMetadata {
                comment: comment.trim_end().to_string(),
                positions,
            },
        ))
    }

    fn write_to(
        molecule: &Molecule,
        metadata: &Self::Metadata,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error> {
        if metadata.positions.len() != molecule.num_atoms() {
            return Err(XyzError::PositionCount {
                expected: molecule.num_atoms(),
                found: metadata.positions.len(),
            });
        }
        writeln!(writer, "{}", molecule.num_atoms())?;
        writeln!(writer, "{}", metadata.comment.replace('\n', " "))?;
        for (atom, position) in molecule.atoms().iter().zip(&metadata.positions) {
            writeln!(
                writer,
                "{:<2} {:>14.8} {:>14.8} {:>14.8}",
                atom.element.symbol(),
                position.x,
                position.y,
                position.z
            )?;
        }
        Ok(())
    }
}
