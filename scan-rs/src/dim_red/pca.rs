use super::rand_svd::RandSvd;
use super::Pca;
use anyhow::{bail, Error};
use log::info;
use ndarray::{Array1, Array2, Axis, Zip};
use scan_types::{Dataset, ExprMatrix, Uns};

/// Largest number of components computed by default
pub const DEFAULT_N_COMPS: usize = 50;

/// Output of a principal component analysis.
#[derive(Clone, Debug)]
pub struct PcaFit {
    /// Observation coordinates, `n_obs x k`
    pub coords: Array2<f64>,
    /// Feature loadings, `n_vars x k`
    pub loadings: Array2<f64>,
    /// Variance explained by each component
    pub variance: Array1<f64>,
    /// Fraction of the total variance explained by each component
    pub variance_ratio: Array1<f64>,
}

/// Number of components to compute: the request, or the default, capped one below the smaller
/// matrix dimension.
pub fn n_components(requested: Option<usize>, shape: (usize, usize)) -> usize {
    let cap = shape.0.min(shape.1).saturating_sub(1);
    requested.unwrap_or(DEFAULT_N_COMPS).min(cap)
}

/// Flip the sign of each component so that the largest absolute entry of its column in `u` is
/// positive, applying the same flip to `v`. Makes the decomposition deterministic.
pub fn svd_flip(u: &mut Array2<f64>, v: &mut Array2<f64>) {
    for (mut u_col, mut v_col) in u.axis_iter_mut(Axis(1)).zip(v.axis_iter_mut(Axis(1))) {
        let largest = u_col
            .iter()
            .copied()
            .fold(0.0f64, |acc, x| if x.abs() > acc.abs() { x } else { acc });
        if largest < 0.0 {
            u_col.mapv_inplace(|x| -x);
            v_col.mapv_inplace(|x| -x);
        }
    }
}

/// Centered PCA of an observation-by-feature matrix.
pub fn fit(x: &Array2<f64>, n_comps: usize, seed: u64) -> Result<PcaFit, Error> {
    let (n_obs, n_vars) = x.dim();
    if n_comps == 0 {
        bail!("cannot compute principal components of a {}x{} matrix", n_obs, n_vars);
    }

    let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_vars));
    let mut centered = x.to_owned();
    Zip::from(centered.lanes_mut(Axis(0)))
        .and(&mean)
        .par_for_each(|mut col, &m| col -= m);

    let total_variance = centered.var_axis(Axis(0), 1.0).sum();

    let svd = RandSvd {
        seed,
        ..RandSvd::default()
    };
    let (mut u, s, mut v) = svd.run_pca(&centered, n_comps)?;
    svd_flip(&mut u, &mut v);

    let coords = &u * &s;
    let variance = s.mapv(|s| s * s / (n_obs as f64 - 1.0));
    let variance_ratio = if total_variance > 0.0 {
        &variance / total_variance
    } else {
        Array1::zeros(n_comps)
    };

    Ok(PcaFit {
        coords,
        loadings: v,
        variance,
        variance_ratio,
    })
}

/// Principal components of the current matrix. Writes `obsm["X_pca"]`, `varm["PCs"]` and
/// `uns["pca"]` with the explained variance and variance ratio.
pub fn pca(ds: &mut Dataset, n_comps: Option<usize>, seed: u64) -> Result<(), Error> {
    let k = n_components(n_comps, ds.x.shape());
    let result = match &ds.x {
        ExprMatrix::Dense(x) => fit(x, k, seed)?,
        sparse => fit(&sparse.to_dense(), k, seed)?,
    };
    info!(
        "computed {} principal components, explaining {:.1}% of the variance",
        k,
        100.0 * result.variance_ratio.sum()
    );

    ds.obsm.insert("X_pca".to_string(), result.coords);
    ds.varm.insert("PCs".to_string(), result.loadings);
    ds.uns.insert(
        "pca".to_string(),
        Uns::map([
            ("variance", Uns::Vector(result.variance.to_vec())),
            ("variance_ratio", Uns::Vector(result.variance_ratio.to_vec())),
        ]),
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_rand::RandomExt;
    use rand::SeedableRng;
    use rand_distr::StandardNormal;
    use rand_pcg::Pcg64Mcg;
    use scan_types::MetaTable;

    #[test]
    fn test_n_components() {
        assert_eq!(n_components(None, (1000, 2000)), 50);
        assert_eq!(n_components(None, (49, 30)), 29);
        assert_eq!(n_components(Some(5), (49, 30)), 5);
        assert_eq!(n_components(None, (1, 30)), 0);
    }

    #[test]
    fn test_svd_flip() {
        let mut u = array![[0.5, -0.2], [-0.9, 0.1]];
        let mut v = array![[1.0, 1.0]];
        svd_flip(&mut u, &mut v);
        assert_eq!(u, array![[-0.5, 0.2], [0.9, -0.1]]);
        assert_eq!(v, array![[-1.0, -1.0]]);
    }

    #[test]
    fn test_pca_of_rank_two_data() {
        let mut rng = Pcg64Mcg::seed_from_u64(1);
        let scores = Array2::<f64>::random_using((40, 2), StandardNormal, &mut rng);
        let basis = Array2::<f64>::random_using((2, 12), StandardNormal, &mut rng);
        let x = scores.dot(&basis) + 3.0;

        let res = fit(&x, 5, 0).unwrap();
        assert_eq!(res.coords.dim(), (40, 5));
        assert_eq!(res.loadings.dim(), (12, 5));
        assert_abs_diff_eq!(res.variance_ratio.slice(ndarray::s![..2]).sum(), 1.0, epsilon = 1e-8);
        assert!(res.variance[0] >= res.variance[1]);

        // component scores carry the explained variance
        for c in 0..2 {
            assert_abs_diff_eq!(res.coords.column(c).var(1.0), res.variance[c], epsilon = 1e-8);
        }
    }

    #[test]
    fn test_pca_writes_dataset() {
        let mut rng = Pcg64Mcg::seed_from_u64(2);
        let x = Array2::<f64>::random_using((10, 6), StandardNormal, &mut rng);
        let mut ds = Dataset::new(
            ExprMatrix::Dense(x),
            MetaTable::with_default_index(10),
            MetaTable::with_default_index(6),
        )
        .unwrap();
        pca(&mut ds, None, 0).unwrap();
        assert_eq!(ds.obsm["X_pca"].dim(), (10, 5));
        assert_eq!(ds.varm["PCs"].dim(), (6, 5));
        ds.check_shape().unwrap();
        let ratio = match ds.uns["pca"].get("variance_ratio") {
            Some(Uns::Vector(v)) => v.clone(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(ratio.len(), 5);
        assert!(ratio.iter().sum::<f64>() <= 1.0 + 1e-12);
    }
}
