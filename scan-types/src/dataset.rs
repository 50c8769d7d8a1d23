use crate::analysis::RankGenesResult;
use crate::matrix::{select_square, ExprMatrix};
use crate::meta::MetaTable;
use anyhow::{bail, Error};
use ndarray::{Array2, Axis};
use sprs::CsMat;
use std::collections::BTreeMap;

/// Unstructured analysis results.
#[derive(Clone, Debug, PartialEq)]
pub enum Uns {
    Scalar(f64),
    Text(String),
    Vector(Vec<f64>),
    Matrix(Array2<f64>),
    Map(BTreeMap<String, Uns>),
    RankGenes(RankGenesResult),
}

impl Uns {
    /// Build a `Map` from `(key, value)` pairs.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Uns)>) -> Uns {
        Uns::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn get(&self, key: &str) -> Option<&Uns> {
        match self {
            Uns::Map(m) => m.get(key),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Uns::Scalar(v) => Some(*v),
            _ => None,
        }
    }
}

/// The feature-complete expression state kept before features are subset.
#[derive(Clone, Debug)]
pub struct RawSnapshot {
    pub x: ExprMatrix,
    pub var: MetaTable,
}

/// Annotated observations × features matrix.
#[derive(Clone, Debug)]
pub struct Dataset {
    pub x: ExprMatrix,
    pub obs: MetaTable,
    pub var: MetaTable,
    pub obsm: BTreeMap<String, Array2<f64>>,
    pub varm: BTreeMap<String, Array2<f64>>,
    pub obsp: BTreeMap<String, CsMat<f64>>,
    pub uns: BTreeMap<String, Uns>,
    pub raw: Option<RawSnapshot>,
}

impl Dataset {
    pub fn new(x: ExprMatrix, obs: MetaTable, var: MetaTable) -> Result<Dataset, Error> {
        let ds = Dataset {
            x,
            obs,
            var,
            obsm: BTreeMap::new(),
            varm: BTreeMap::new(),
            obsp: BTreeMap::new(),
            uns: BTreeMap::new(),
            raw: None,
        };
        ds.check_shape()?;
        Ok(ds)
    }

    pub fn n_obs(&self) -> usize {
        self.obs.len()
    }

    pub fn n_vars(&self) -> usize {
        self.var.len()
    }

    /// Verify that every component agrees with the observation and feature counts.
    pub fn check_shape(&self) -> Result<(), Error> {
        let (n_obs, n_vars) = (self.n_obs(), self.n_vars());
        if self.x.shape() != (n_obs, n_vars) {
            bail!(
                "matrix is {}x{} but there are {} observations and {} features",
                self.x.rows(),
                self.x.cols(),
                n_obs,
                n_vars
            );
        }
        for (k, m) in &self.obsm {
            if m.nrows() != n_obs {
                bail!("obsm[{}] has {} rows, expected {}", k, m.nrows(), n_obs);
            }
        }
        for (k, m) in &self.varm {
            if m.nrows() != n_vars {
                bail!("varm[{}] has {} rows, expected {}", k, m.nrows(), n_vars);
            }
        }
        for (k, g) in &self.obsp {
            if g.shape() != (n_obs, n_obs) {
                bail!("obsp[{}] is {:?}, expected {}x{}", k, g.shape(), n_obs, n_obs);
            }
        }
        if let Some(raw) = &self.raw {
            if raw.x.rows() != n_obs || raw.x.cols() != raw.var.len() {
                bail!(
                    "raw matrix is {}x{} for {} observations and {} raw features",
                    raw.x.rows(),
                    raw.x.cols(),
                    n_obs,
                    raw.var.len()
                );
            }
        }
        Ok(())
    }

    /// Keep the observations in `idx`, in that order, across every observation-aligned component.
    pub fn subset_obs(&mut self, idx: &[usize]) {
        self.x = self.x.select_rows(idx);
        self.obs = self.obs.select(idx);
        for m in self.obsm.values_mut() {
            *m = m.select(Axis(0), idx);
        }
        for g in self.obsp.values_mut() {
            *g = select_square(g, idx);
        }
        if let Some(raw) = self.raw.as_mut() {
            raw.x = raw.x.select_rows(idx);
        }
    }

    /// Keep the features in `idx`, in that order. The raw snapshot is untouched.
    pub fn subset_features(&mut self, idx: &[usize]) {
        self.x = self.x.select_cols(idx);
        self.var = self.var.select(idx);
        for m in self.varm.values_mut() {
            *m = m.select(Axis(0), idx);
        }
    }

    /// Store the current matrix and feature table as the raw snapshot.
    pub fn snapshot_raw(&mut self) {
        self.raw = Some(RawSnapshot {
            x: self.x.clone(),
            var: self.var.clone(),
        });
    }

    /// Matrix and feature names used for differential expression: the raw snapshot when present.
    pub fn expression_source(&self) -> (&ExprMatrix, &[String]) {
        match &self.raw {
            Some(raw) => (&raw.x, &raw.var.index),
            None => (&self.x, &self.var.index),
        }
    }

    pub fn rank_genes(&self) -> Option<&RankGenesResult> {
        match self.uns.get("rank_genes_groups") {
            Some(Uns::RankGenes(r)) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::ColumnData;
    use ndarray::array;

    fn dataset() -> Dataset {
        let x = ExprMatrix::Dense(array![[1.0, 0.0, 3.0], [0.0, 2.0, 0.0], [4.0, 5.0, 6.0]]);
        let mut obs = MetaTable::new(vec!["a".into(), "b".into(), "c".into()]);
        obs.insert("group", ColumnData::Strings(vec![Some("x".into()), None, Some("y".into())]))
            .unwrap();
        let var = MetaTable::new(vec!["g1".into(), "g2".into(), "g3".into()]);
        Dataset::new(x, obs, var).unwrap()
    }

    #[test]
    fn test_shape_mismatch() {
        let x = ExprMatrix::Dense(Array2::zeros((2, 2)));
        assert!(Dataset::new(x, MetaTable::with_default_index(3), MetaTable::with_default_index(2)).is_err());

        let mut ds = dataset();
        ds.obsm.insert("X_pca".into(), Array2::zeros((2, 2)));
        assert!(ds.check_shape().is_err());
    }

    #[test]
    fn test_subsets_keep_shape() {
        let mut ds = dataset();
        ds.obsm.insert("X_pca".into(), Array2::zeros((3, 2)));
        ds.varm.insert("PCs".into(), Array2::zeros((3, 2)));
        ds.obsp.insert("distances".into(), CsMat::eye(3));
        ds.snapshot_raw();

        ds.subset_features(&[2, 0]);
        ds.check_shape().unwrap();
        assert_eq!(ds.var.index, vec!["g3", "g1"]);
        assert_eq!(ds.raw.as_ref().unwrap().var.len(), 3);

        ds.subset_obs(&[0, 2]);
        ds.check_shape().unwrap();
        assert_eq!(ds.x.to_dense(), array![[3.0, 1.0], [6.0, 4.0]]);
        assert_eq!(ds.obsp["distances"].nnz(), 2);

        let (src, names) = ds.expression_source();
        assert_eq!(src.shape(), (2, 3));
        assert_eq!(names.len(), 3);
    }
}
