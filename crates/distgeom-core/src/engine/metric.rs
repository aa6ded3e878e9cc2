use super::error::DgError;
use nalgebra::{DMatrix, SymmetricEigen};
use tracing::{instrument, trace};

/// Spatial dimensions of the initial embedding. The fourth one gives
/// refinement room to pass atoms through each other to fix chirality.
pub const EMBEDDING_DIMENSIONS: usize = 4;

/// Eigenvalues below this fraction of the largest one count as zero.
const RELATIVE_EIGENVALUE_CUTOFF: f64 = 1e-10;

/// Gram matrix of the points relative to their centroid, built from squared
/// distances alone.
pub fn metric_matrix(distances: &DMatrix<f64>) -> DMatrix<f64> {
    let n = distances.nrows();
    let squared = distances.map(|d| d * d);
    let total: f64 = squared.iter().sum::<f64>() / 2.0;
    let nf = n as f64;

    let from_centroid: Vec<f64> = (0..n)
        .map(|i| squared.row(i).sum() / nf - total / (nf * nf))
        .collect();

    DMatrix::from_fn(n, n, |i, j| {
        (from_centroid[i] + from_centroid[j] - squared[(i, j)]) / 2.0
    })
}

/// Embeds a distance matrix into four dimensions by the leading eigenpairs of
/// its metric matrix.
///
/// Returns a `4 × n` matrix with one column per atom. Dimensions with a
/// negative eigenvalue are left at zero; fewer positive eigenvalues than a
/// three dimensional embedding of the atoms needs is an error.
#[instrument(level = "debug", skip_all, fields(atoms = distances.nrows()))]
pub fn embed(distances: &DMatrix<f64>) -> Result<DMatrix<f64>, DgError> {
    let n = distances.nrows();
    let mut positions = DMatrix::zeros(EMBEDDING_DIMENSIONS, n);
    if n < 2 {
        return Ok(positions);
    }

    let eigen = SymmetricEigen::new(metric_matrix(distances));
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let leading: Vec<usize> = order.into_iter().take(EMBEDDING_DIMENSIONS).collect();
    let cutoff = RELATIVE_EIGENVALUE_CUTOFF * eigen.eigenvalues[leading[0]].abs().max(1.0);
    let required = (n - 1).min(3);
    let positive_eigenvalues = leading
        .iter()
        .take(3)
        .filter(|&&index| eigen.eigenvalues[index] > cutoff)
        .count();
    if positive_eigenvalues < required {
        return Err(DgError::Embedding {
            positive_eigenvalues,
        });
    }

    for (dimension, &index) in leading.iter().enumerate() {
        let value = eigen.eigenvalues[index];
        if value <= cutoff {
            continue;
        }
        let scale = value.sqrt();
        let vector = eigen.eigenvectors.column(index);
        for atom in 0..n {
            positions[(dimension, atom)] = scale * vector[atom];
        }
    }

    trace!(
        eigenvalues = ?leading.iter().map(|&i| eigen.eigenvalues[i]).collect::<Vec<_>>(),
        "Metric matrix embedded"
    );
    Ok(positions)
}
