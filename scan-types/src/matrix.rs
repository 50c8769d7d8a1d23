use anyhow::{bail, Error};
use ndarray::{Array2, Axis};
use rayon::prelude::*;
use sprs::CsMat;

/// Sparse observation-by-feature matrix, stored row-major (CSR).
pub type SparseExpr = CsMat<f64>;

/// Observation-by-feature expression matrix. Raw counts are usually held sparse; the
/// matrix becomes dense once it is standardized.
#[derive(Clone, Debug)]
pub enum ExprMatrix {
    /// CSR matrix, one outer vector per observation
    Sparse(SparseExpr),
    /// Row-major dense matrix
    Dense(Array2<f64>),
}

impl ExprMatrix {
    /// Build a CSR matrix from raw parts, validating the structure.
    pub fn from_csr(
        shape: (usize, usize),
        indptr: Vec<usize>,
        indices: Vec<usize>,
        data: Vec<f64>,
    ) -> Result<ExprMatrix, Error> {
        let (rows, cols) = shape;
        if indptr.len() != rows + 1 {
            bail!("indptr has length {} but the matrix has {} rows", indptr.len(), rows);
        }
        if indices.len() != data.len() {
            bail!("indices ({}) and data ({}) lengths differ", indices.len(), data.len());
        }
        if let Some(&c) = indices.iter().find(|&&c| c >= cols) {
            bail!("column index {} out of bounds for {} columns", c, cols);
        }

        // CsMat requires sorted indices within each row, which writers do not guarantee
        let mut sorted_indices = Vec::with_capacity(indices.len());
        let mut sorted_data = Vec::with_capacity(data.len());
        for r in 0..rows {
            let (start, end) = (indptr[r], indptr[r + 1]);
            if start > end || end > indices.len() {
                bail!("indptr is not monotone at row {}", r);
            }
            let mut entries = (start..end).map(|i| (indices[i], data[i])).collect::<Vec<_>>();
            entries.sort_by_key(|e| e.0);
            for (c, v) in entries {
                sorted_indices.push(c);
                sorted_data.push(v);
            }
        }

        let mat = CsMat::try_new(shape, indptr, sorted_indices, sorted_data)
            .map_err(|(_, _, _, e)| anyhow::format_err!("invalid CSR matrix: {}", e))?;
        Ok(ExprMatrix::Sparse(mat))
    }

    /// Number of observations
    pub fn rows(&self) -> usize {
        match self {
            ExprMatrix::Sparse(m) => m.rows(),
            ExprMatrix::Dense(m) => m.nrows(),
        }
    }

    /// Number of features
    pub fn cols(&self) -> usize {
        match self {
            ExprMatrix::Sparse(m) => m.cols(),
            ExprMatrix::Dense(m) => m.ncols(),
        }
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    /// True if the matrix has no rows or no columns.
    pub fn is_empty(&self) -> bool {
        self.rows() == 0 || self.cols() == 0
    }

    /// Count of non-zero entries in each row (genes detected per cell).
    pub fn nonzero_per_row(&self) -> Vec<usize> {
        match self {
            ExprMatrix::Sparse(m) => m
                .outer_iterator()
                .map(|row| row.iter().filter(|(_, &v)| v != 0.0).count())
                .collect(),
            ExprMatrix::Dense(m) => m
                .axis_iter(Axis(0))
                .map(|row| row.iter().filter(|&&v| v != 0.0).count())
                .collect(),
        }
    }

    /// Count of non-zero entries in each column (cells expressing each gene).
    pub fn nonzero_per_col(&self) -> Vec<usize> {
        match self {
            ExprMatrix::Sparse(m) => {
                let mut counts = vec![0; m.cols()];
                for row in m.outer_iterator() {
                    for (c, &v) in row.iter() {
                        if v != 0.0 {
                            counts[c] += 1;
                        }
                    }
                }
                counts
            }
            ExprMatrix::Dense(m) => m
                .axis_iter(Axis(1))
                .map(|col| col.iter().filter(|&&v| v != 0.0).count())
                .collect(),
        }
    }

    /// Sum of each row.
    pub fn row_sums(&self) -> Vec<f64> {
        match self {
            ExprMatrix::Sparse(m) => m.outer_iterator().map(|row| row.iter().map(|(_, &v)| v).sum()).collect(),
            ExprMatrix::Dense(m) => m.sum_axis(Axis(1)).to_vec(),
        }
    }

    /// Multiply every entry of row `i` by `factors[i]`.
    pub fn scale_rows(&mut self, factors: &[f64]) {
        assert_eq!(factors.len(), self.rows());
        match self {
            ExprMatrix::Sparse(m) => {
                let mut row_of_entry = Vec::with_capacity(m.nnz());
                for (r, row) in m.outer_iterator().enumerate() {
                    row_of_entry.extend(std::iter::repeat(r).take(row.nnz()));
                }
                for (v, r) in m.data_mut().iter_mut().zip(row_of_entry) {
                    *v *= factors[r];
                }
            }
            ExprMatrix::Dense(m) => {
                for (mut row, &f) in m.axis_iter_mut(Axis(0)).zip(factors) {
                    row.mapv_inplace(|v| v * f);
                }
            }
        }
    }

    /// Apply `f` to every stored value. `f(0.0)` must be `0.0` for the sparse layout to stay valid.
    pub fn map_inplace(&mut self, f: impl Fn(f64) -> f64 + Sync + Send) {
        match self {
            ExprMatrix::Sparse(m) => m.data_mut().par_iter_mut().for_each(|v| *v = f(*v)),
            ExprMatrix::Dense(m) => m.par_mapv_inplace(f),
        }
    }

    /// Keep only the rows in `idx`, in that order.
    pub fn select_rows(&self, idx: &[usize]) -> ExprMatrix {
        match self {
            ExprMatrix::Sparse(m) => {
                let mut indptr = Vec::with_capacity(idx.len() + 1);
                let mut indices = Vec::new();
                let mut data = Vec::new();
                indptr.push(0);
                for &r in idx {
                    if let Some(row) = m.outer_view(r) {
                        for (c, &v) in row.iter() {
                            indices.push(c);
                            data.push(v);
                        }
                    }
                    indptr.push(indices.len());
                }
                ExprMatrix::Sparse(CsMat::new((idx.len(), m.cols()), indptr, indices, data))
            }
            ExprMatrix::Dense(m) => ExprMatrix::Dense(m.select(Axis(0), idx)),
        }
    }

    /// Keep only the columns in `idx`, in that order.
    pub fn select_cols(&self, idx: &[usize]) -> ExprMatrix {
        match self {
            ExprMatrix::Sparse(m) => {
                let mut remap = vec![usize::MAX; m.cols()];
                for (new, &old) in idx.iter().enumerate() {
                    remap[old] = new;
                }

                let mut indptr = Vec::with_capacity(m.rows() + 1);
                let mut indices = Vec::new();
                let mut data = Vec::new();
                indptr.push(0);
                for row in m.outer_iterator() {
                    let mut entries = row
                        .iter()
                        .filter(|(c, _)| remap[*c] != usize::MAX)
                        .map(|(c, &v)| (remap[c], v))
                        .collect::<Vec<_>>();
                    entries.sort_by_key(|e| e.0);
                    for (c, v) in entries {
                        indices.push(c);
                        data.push(v);
                    }
                    indptr.push(indices.len());
                }
                ExprMatrix::Sparse(CsMat::new((m.rows(), idx.len()), indptr, indices, data))
            }
            ExprMatrix::Dense(m) => ExprMatrix::Dense(m.select(Axis(1), idx)),
        }
    }

    /// Dense copy of the matrix.
    pub fn to_dense(&self) -> Array2<f64> {
        match self {
            ExprMatrix::Sparse(m) => {
                let mut out = Array2::zeros((m.rows(), m.cols()));
                for (r, row) in m.outer_iterator().enumerate() {
                    for (c, &v) in row.iter() {
                        out[(r, c)] = v;
                    }
                }
                out
            }
            ExprMatrix::Dense(m) => m.clone(),
        }
    }

    /// Convert to the dense layout, consuming the matrix.
    pub fn into_dense(self) -> Array2<f64> {
        match self {
            ExprMatrix::Dense(m) => m,
            sparse => sparse.to_dense(),
        }
    }

    /// Value at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        match self {
            ExprMatrix::Sparse(m) => m.get(row, col).copied().unwrap_or(0.0),
            ExprMatrix::Dense(m) => m[(row, col)],
        }
    }

    /// Evaluate `f` on the dense values of every column, in parallel. The closure receives the
    /// column index and a buffer holding the column's value for each row.
    pub fn par_map_columns<T, F>(&self, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize, &[f64]) -> T + Sync + Send,
    {
        match self {
            ExprMatrix::Sparse(m) => {
                let csc = m.to_csc();
                let rows = m.rows();
                (0..m.cols())
                    .into_par_iter()
                    .map_init(
                        || vec![0.0; rows],
                        |buf, c| {
                            buf.iter_mut().for_each(|v| *v = 0.0);
                            if let Some(col) = csc.outer_view(c) {
                                for (r, &v) in col.iter() {
                                    buf[r] = v;
                                }
                            }
                            f(c, buf)
                        },
                    )
                    .collect()
            }
            ExprMatrix::Dense(m) => (0..m.ncols())
                .into_par_iter()
                .map(|c| {
                    let col = m.column(c).to_vec();
                    f(c, &col)
                })
                .collect(),
        }
    }

    /// Dense values of a single column.
    pub fn column(&self, col: usize) -> Vec<f64> {
        match self {
            ExprMatrix::Sparse(m) => {
                let mut out = vec![0.0; m.rows()];
                for (r, row) in m.outer_iterator().enumerate() {
                    if let Some(&v) = row.get(col) {
                        out[r] = v;
                    }
                }
                out
            }
            ExprMatrix::Dense(m) => m.column(col).to_vec(),
        }
    }
}

/// Restrict a square observation-by-observation graph to the observations in `idx`.
pub fn select_square(graph: &CsMat<f64>, idx: &[usize]) -> CsMat<f64> {
    let mut remap = vec![usize::MAX; graph.cols()];
    for (new, &old) in idx.iter().enumerate() {
        remap[old] = new;
    }

    let mut indptr = Vec::with_capacity(idx.len() + 1);
    let mut indices = Vec::new();
    let mut data = Vec::new();
    indptr.push(0);
    for &r in idx {
        if let Some(row) = graph.outer_view(r) {
            let mut entries = row
                .iter()
                .filter(|(c, _)| remap[*c] != usize::MAX)
                .map(|(c, &v)| (remap[c], v))
                .collect::<Vec<_>>();
            entries.sort_by_key(|e| e.0);
            for (c, v) in entries {
                indices.push(c);
                data.push(v);
            }
        }
        indptr.push(indices.len());
    }
    CsMat::new((idx.len(), idx.len()), indptr, indices, data)
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::array;

    fn small() -> ExprMatrix {
        // [[1, 0, 2],
        //  [0, 0, 0],
        //  [0, 3, 4]]
        ExprMatrix::from_csr((3, 3), vec![0, 2, 2, 4], vec![2, 0, 1, 2], vec![2.0, 1.0, 3.0, 4.0]).unwrap()
    }

    #[test]
    fn test_unsorted_indices_are_sorted() {
        let m = small();
        assert_eq!(m.to_dense(), array![[1.0, 0.0, 2.0], [0.0, 0.0, 0.0], [0.0, 3.0, 4.0]]);
    }

    #[test]
    fn test_bad_csr_rejected() {
        assert!(ExprMatrix::from_csr((2, 2), vec![0, 1], vec![0], vec![1.0]).is_err());
        assert!(ExprMatrix::from_csr((1, 2), vec![0, 1], vec![5], vec![1.0]).is_err());
    }

    #[test]
    fn test_counts_and_sums() {
        let m = small();
        assert_eq!(m.nonzero_per_row(), vec![2, 0, 2]);
        assert_eq!(m.nonzero_per_col(), vec![1, 1, 2]);
        assert_eq!(m.row_sums(), vec![3.0, 0.0, 7.0]);

        let d = ExprMatrix::Dense(m.to_dense());
        assert_eq!(d.nonzero_per_row(), vec![2, 0, 2]);
        assert_eq!(d.nonzero_per_col(), vec![1, 1, 2]);
    }

    #[test]
    fn test_select() {
        let m = small();
        let r = m.select_rows(&[2, 0]);
        assert_eq!(r.to_dense(), array![[0.0, 3.0, 4.0], [1.0, 0.0, 2.0]]);
        let c = m.select_cols(&[2, 1]);
        assert_eq!(c.to_dense(), array![[2.0, 0.0], [0.0, 0.0], [4.0, 3.0]]);
    }

    #[test]
    fn test_scale_rows_and_columns() {
        let mut m = small();
        m.scale_rows(&[2.0, 1.0, 0.5]);
        assert_eq!(m.column(2), vec![4.0, 0.0, 2.0]);

        let sums = m.par_map_columns(|_, col| col.iter().sum::<f64>());
        assert_eq!(sums, vec![2.0, 1.5, 6.0]);
    }

    #[test]
    fn test_select_square() {
        let g = CsMat::new((3, 3), vec![0, 1, 3, 4], vec![1, 0, 2, 1], vec![0.5, 0.5, 0.25, 0.25]);
        let s = select_square(&g, &[1, 2]);
        assert_eq!(s.rows(), 2);
        assert_eq!(s.nnz(), 2);
        assert_eq!(s.get(0, 1), Some(&0.25));
    }
}
