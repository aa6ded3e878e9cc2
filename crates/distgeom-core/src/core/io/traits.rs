use crate::core::models::molecule::Molecule;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Common interface for molecule file formats.
///
/// Each format carries its own metadata alongside the molecular graph, such
/// as a title line or atom positions.
pub trait MoleculeFile {
    /// Format-specific data that is not part of the molecular graph.
    type Metadata;

    type Error: Error + From<io::Error>;

    /// Reads a molecule and its metadata from a buffered reader.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails or the graph it describes is invalid.
    fn read_from(reader: &mut impl BufRead) -> Result<(Molecule, Self::Metadata), Self::Error>;

    /// Writes a molecule and its metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata does not fit the molecule or writing
    /// fails.
    fn write_to(
        molecule: &Molecule,
        metadata: &Self::Metadata,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error>;

    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<(Molecule, Self::Metadata), Self::Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    fn write_to_path<P: AsRef<Path>>(
        molecule: &Molecule,
        metadata: &Self::Metadata,
        path: P,
    ) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(molecule, metadata, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}
