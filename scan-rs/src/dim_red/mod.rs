#![allow(non_snake_case)]

//! Matrix constraints for the SVD routines
//! The SVD routines are written against a small set of constraints on the data matrix rather than
//! a concrete type: for data matrix `A` and a dense query matrix `b` they only need `A * b` and
//! `b * A` through `ndarray::linalg::Dot`. Dense arrays and views satisfy them directly, and any
//! structured representation (e.g. sparse + rank-1 offset) can be plugged in by implementing
//! `Dot` both ways plus `DataMat`. The constraints are spelled out on each method because
//! combining them into `DataMat` collapses the overloads into a single `dot`.

use anyhow::Error;
use ndarray::{Array1, Array2, ArrayView2};

/// Principal component analysis of a dataset
pub mod pca;

/// Randomized SVD method
pub mod rand_svd;

type PcaResult = (Array2<f64>, Array1<f64>, Array2<f64>);

/// Trait for getting the dimensions of a matrix
pub trait DataMat {
    /// Get the shape of the matrxix
    fn shape(&self) -> [usize; 2];
}

impl DataMat for ArrayView2<'_, f64> {
    fn shape(&self) -> [usize; 2] {
        [self.nrows(), self.ncols()]
    }
}

impl DataMat for Array2<f64> {
    fn shape(&self) -> [usize; 2] {
        [self.nrows(), self.ncols()]
    }
}

/// Perform a SVD of a `matrix`, retaining `k` components. Returns `(U, S, V)` with the singular
/// vectors in the columns of `U` and `V`, in decreasing order of singular value.
/// This trait always performs the pure SVD of the matrix. Special cases of SVD
/// such as PCA can be achieved by the appropriate shifts and scaling of `matrix`
pub trait Pca<T, N> {
    /// Compute a rank `k` SVD of `matrix`
    fn run_pca(&self, matrix: &T, k: usize) -> Result<PcaResult, Error>;
}

/// Root-mean-square value of the cells in `a`
pub fn frobenius(a: &ArrayView2<f64>) -> f64 {
    let acc = a.iter().map(|v| v * v).sum::<f64>();
    let sz = (a.nrows() * a.ncols()) as f64;
    (acc / sz).sqrt()
}
