use crate::core::models::ids::AtomIndex;
use thiserror::Error;

/// Failure of a single conformer generation attempt.
///
/// Every variant is recoverable: an ensemble keeps going after any of them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DgError {
    #[error("Molecule has stereocenters without any feasible assignment")]
    ZeroAssignmentStereopermutators,

    #[error("Distance bounds could not be constructed: {0}")]
    DistanceBounds(#[from] BoundsError),

    #[error("Distance matrix sampling failed: {0}")]
    DistanceMatrix(#[source] BoundsError),

    #[error("Metric matrix has only {positive_eigenvalues} positive eigenvalues; cannot embed")]
    Embedding { positive_eigenvalues: usize },

    #[error("Non-finite contribution to the refinement gradient: {0}")]
    RefinementException(String),

    #[error("Refinement did not converge within the step limit")]
    RefinementMaxIterationsReached,

    #[error("Refined structure has chirality constraints with the wrong sign")]
    RefinedChiralsWrong,

    #[error("Refined structure violates its bounds beyond tolerance")]
    RefinedStructureInacceptable,

    #[error("Invalid fixed positions: {0}")]
    InvalidFixedPositions(String),

    #[error("Unexpected failure: {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoundsError {
    #[error("Lower bound {lower:.4} exceeds upper bound {upper:.4} between atoms {first} and {second}")]
    Inconsistent {
        first: AtomIndex,
        second: AtomIndex,
        lower: f64,
        upper: f64,
    },

    #[error("Bound between atoms {first} and {second} is not finite")]
    NotFinite { first: AtomIndex, second: AtomIndex },

    #[error("Atom index {index} is out of range for {num_atoms} atoms")]
    AtomOutOfRange { index: AtomIndex, num_atoms: usize },
}
