use crate::core::models::ids::AtomIndex;
use crate::core::models::molecule::Molecule;
use crate::core::shapes::{ALL_SHAPES, Shape};
use tracing::trace;

/// Chooses a local shape for an atom from its ligand count.
///
/// Main-group atoms follow VSEPR: the number of nonbonding electron pairs is
/// estimated from valence electrons, formal charge and bond weights. Other
/// atoms get the first shape of matching size. Returns `None` for fewer than
/// two or more than six ligands.
pub fn infer_shape(molecule: &Molecule, atom: AtomIndex, num_ligands: usize) -> Option<Shape> {
    if !(2..=6).contains(&num_ligands) {
        return None;
    }

    let element = molecule.element(atom);
    if !element.is_main_group() {
        return ALL_SHAPES.iter().copied().find(|s| s.size() == num_ligands);
    }

    let charge = molecule.atoms()[atom].charge;
    let remaining = f64::from(element.data().valence_electrons) - f64::from(charge)
        - molecule.valence(atom);
    let lone_pairs = (remaining / 2.0).floor().max(0.0) as usize;

    let shape = match (num_ligands, lone_pairs) {
        (2, 0) => Shape::Line,
        (2, 1 | 2) => Shape::Bent,
        (2, _) => Shape::Line,
        (3, 0) => Shape::TrigonalPlanar,
        (3, 1) => Shape::TrigonalPyramidal,
        (3, _) => Shape::TShaped,
        (4, 0) => Shape::Tetrahedral,
        (4, 1) => Shape::Seesaw,
        (4, _) => Shape::SquarePlanar,
        (5, 0) => Shape::TrigonalBipyramidal,
        (5, _) => Shape::SquarePyramidal,
        _ => Shape::Octahedral,
    };
    trace!(atom, lone_pairs, shape = %shape, "Inferred local shape");
    Some(shape)
}

/// The explicitly requested shape of an atom, or the inferred one.
pub fn resolve_shape(molecule: &Molecule, atom: AtomIndex) -> Option<Shape> {
    molecule
        .shape_override(atom)
        .or_else(|| infer_shape(molecule, atom, molecule.ligands(atom).len()))
}
