use anyhow::Error;
use log::info;
use scan_types::{ColumnData, Dataset};

/// Remove observations with fewer than `min_genes` detected features. The detected-feature count
/// of each kept observation is stored in `obs["n_genes"]`.
pub fn filter_cells(ds: &mut Dataset, min_genes: u32) -> Result<(), Error> {
    let detected = ds.x.nonzero_per_row();
    let keep = (0..detected.len())
        .filter(|&i| detected[i] >= min_genes as usize)
        .collect::<Vec<_>>();

    let removed = ds.n_obs() - keep.len();
    if removed > 0 {
        info!(
            "filtered out {} observations with fewer than {} detected genes",
            removed, min_genes
        );
    }

    ds.subset_obs(&keep);
    let n_genes = keep.iter().map(|&i| detected[i] as i64).collect();
    ds.obs.insert("n_genes", ColumnData::Integer(n_genes))
}

/// Remove features detected in fewer than `min_cells` observations. The detection count of each
/// kept feature is stored in `var["n_cells"]`.
pub fn filter_genes(ds: &mut Dataset, min_cells: u32) -> Result<(), Error> {
    let detected = ds.x.nonzero_per_col();
    let keep = (0..detected.len())
        .filter(|&j| detected[j] >= min_cells as usize)
        .collect::<Vec<_>>();

    let removed = ds.n_vars() - keep.len();
    if removed > 0 {
        info!(
            "filtered out {} genes detected in fewer than {} observations",
            removed, min_cells
        );
    }

    ds.subset_features(&keep);
    let n_cells = keep.iter().map(|&j| detected[j] as i64).collect();
    ds.var.insert("n_cells", ColumnData::Integer(n_cells))
}

#[cfg(test)]
mod test {
    use super::*;
    use scan_types::{ExprMatrix, MetaTable};

    fn dataset() -> Dataset {
        // genes detected per cell: 3, 1, 0, 2
        let x = ExprMatrix::from_csr(
            (4, 3),
            vec![0, 3, 4, 4, 6],
            vec![0, 1, 2, 1, 1, 2],
            vec![1.0, 2.0, 3.0, 5.0, 1.0, 1.0],
        )
        .unwrap();
        Dataset::new(x, MetaTable::with_default_index(4), MetaTable::with_default_index(3)).unwrap()
    }

    #[test]
    fn test_filter_cells() {
        let mut ds = dataset();
        filter_cells(&mut ds, 2).unwrap();
        assert_eq!(ds.obs.index, vec!["0", "3"]);
        assert_eq!(ds.obs.get("n_genes"), Some(&ColumnData::Integer(vec![3, 2])));
        ds.check_shape().unwrap();
    }

    #[test]
    fn test_filter_cells_zero_keeps_everything() {
        let mut ds = dataset();
        filter_cells(&mut ds, 0).unwrap();
        assert_eq!(ds.n_obs(), 4);
    }

    #[test]
    fn test_filter_genes() {
        let mut ds = dataset();
        filter_genes(&mut ds, 2).unwrap();
        // gene 0 is only seen in the first cell
        assert_eq!(ds.var.index, vec!["1", "2"]);
        assert_eq!(ds.var.get("n_cells"), Some(&ColumnData::Integer(vec![3, 2])));
        ds.check_shape().unwrap();
    }
}
