use anyhow::{bail, Error};
use log::info;
use scan_types::{Dataset, Uns};
use umap_rs::Umap;

/// Effective minimum distance between embedded points
pub const DEFAULT_MIN_DIST: f64 = 0.5;
/// Effective scale of embedded points
pub const DEFAULT_SPREAD: f64 = 1.0;

/// Two-dimensional UMAP layout of `obsp["connectivities"]`. Writes `obsm["X_umap"]` and the
/// fitted curve parameters to `uns["umap"]`.
pub fn umap(ds: &mut Dataset, min_dist: f64, spread: f64, seed: u64) -> Result<(), Error> {
    let graph = match ds.obsp.get("connectivities") {
        Some(g) => g,
        None => bail!("no neighbor graph to embed"),
    };

    let umap = Umap::new(2, min_dist, spread);
    let embedding = umap.embed_graph(graph, seed);
    if embedding.iter().any(|v| !v.is_finite()) {
        bail!("UMAP layout diverged");
    }
    let (a, b) = umap.ab();
    info!("embedded {} observations in 2 dimensions", embedding.nrows());

    ds.obsm.insert("X_umap".to_string(), embedding);
    ds.uns.insert(
        "umap".to_string(),
        Uns::map([("a", Uns::Scalar(a)), ("b", Uns::Scalar(b))]),
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::Array2;
    use scan_types::{ExprMatrix, MetaTable};
    use sprs::CsMat;

    #[test]
    fn test_umap_writes_embedding() {
        let x = ExprMatrix::Dense(Array2::zeros((3, 1)));
        let mut ds = Dataset::new(x, MetaTable::with_default_index(3), MetaTable::with_default_index(1)).unwrap();
        let graph = CsMat::new((3, 3), vec![0, 1, 3, 4], vec![1, 0, 2, 1], vec![1.0, 1.0, 0.5, 0.5]);
        ds.obsp.insert("connectivities".into(), graph);

        umap(&mut ds, DEFAULT_MIN_DIST, DEFAULT_SPREAD, 0).unwrap();
        assert_eq!(ds.obsm["X_umap"].dim(), (3, 2));
        ds.check_shape().unwrap();
        let a = ds.uns["umap"].get("a").and_then(Uns::as_scalar).unwrap();
        assert!((a - 0.583).abs() < 0.02);
    }

    #[test]
    fn test_umap_requires_graph() {
        let x = ExprMatrix::Dense(Array2::zeros((3, 1)));
        let mut ds = Dataset::new(x, MetaTable::with_default_index(3), MetaTable::with_default_index(1)).unwrap();
        assert!(umap(&mut ds, DEFAULT_MIN_DIST, DEFAULT_SPREAD, 0).is_err());
    }
}
