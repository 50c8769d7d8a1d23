use anyhow::{bail, Error};
use ball_tree::{BallTree, Point};
use log::{info, warn};
use ndarray::parallel::prelude::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use ndarray::{Array2, ArrayView2, Axis};
use scan_types::{Dataset, Uns};
use sprs::{CsMat, TriMat};

/// Default neighborhood size, counting the point itself
pub const DEFAULT_N_NEIGHBORS: usize = 15;

#[derive(PartialEq)]
struct Pt(Vec<f64>);

impl Point for Pt {
    fn distance(&self, other: &Self) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|p| (p.1 - p.0).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    fn move_towards(&self, other: &Self, d: f64) -> Self {
        let total_dist = self.distance(other);
        let frac = if total_dist == 0.0 { 0.0 } else { d / total_dist };

        Pt(self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(&s, &o)| s + frac * (o - s))
            .collect())
    }
}

/// Compute the `k` nearest neighbors of each row in `v` using Euclidean distance, counting the row
/// itself. Column 0 of both outputs is the row itself at distance 0; the remaining columns hold
/// the `k - 1` nearest other rows in increasing distance. Returns `(indices, distances)`.
pub fn knn(v: &ArrayView2<f64>, k: usize) -> (Array2<usize>, Array2<f64>) {
    let (cells, _) = v.dim();
    let row = |i: usize| Pt(v.row(i).iter().copied().collect());

    info!("constructing ball tree of {} points", cells);
    let points = (0..cells).map(row).collect::<Vec<_>>();
    let values = (0..cells).collect::<Vec<_>>();
    let ball_tree = BallTree::new(points, values);

    info!("querying points for {} neighbors", k);
    let mut indices = Array2::from_elem((cells, k), usize::MAX);
    let mut distances = Array2::from_elem((cells, k), f64::INFINITY);
    indices
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(distances.axis_iter_mut(Axis(0)).into_par_iter())
        .enumerate()
        .for_each_init(
            || ball_tree.query(),
            |query, (cell, (mut idx, mut dist))| {
                if k == 0 {
                    return;
                }
                idx[0] = cell;
                dist[0] = 0.0;
                let mut ind = 1;
                let pt = row(cell);
                for (_, d, &other) in query.nn(&pt).take(k) {
                    if other != cell && ind < k {
                        idx[ind] = other;
                        dist[ind] = d;
                        ind += 1;
                    }
                }
            },
        );
    (indices, distances)
}

/// Sparse matrix of the distances to each row's neighbors, excluding the row itself.
pub fn distance_matrix(indices: &Array2<usize>, distances: &Array2<f64>) -> CsMat<f64> {
    let n = indices.nrows();
    let mut tri = TriMat::new((n, n));
    for (i, (idx, dist)) in indices.outer_iter().zip(distances.outer_iter()).enumerate() {
        for (&j, &d) in idx.iter().zip(dist.iter()) {
            if j != i && j != usize::MAX {
                tri.add_triplet(i, j, d);
            }
        }
    }
    tri.to_csr()
}

/// Neighborhood size to use for `n_obs` observations: the request, reduced to `1 + n_obs / 2`
/// when there are fewer observations than requested neighbors.
pub fn effective_n_neighbors(n_neighbors: usize, n_obs: usize) -> usize {
    if n_neighbors > n_obs {
        let k = 1 + n_obs / 2;
        warn!(
            "n_obs ({}) is smaller than n_neighbors ({}), using n_neighbors = {}",
            n_obs, n_neighbors, k
        );
        k
    } else {
        n_neighbors
    }
}

/// Nearest-neighbor graph in PCA space. Writes `obsp["distances"]`, the fuzzy-union
/// `obsp["connectivities"]` and `uns["neighbors"]`.
pub fn neighbors(ds: &mut Dataset, n_neighbors: usize) -> Result<(), Error> {
    let rep = match ds.obsm.get("X_pca") {
        Some(rep) => rep,
        None => bail!("no PCA representation to compute neighbors from"),
    };
    if rep.nrows() < 2 {
        bail!("cannot compute neighbors of {} observations", rep.nrows());
    }
    let k = effective_n_neighbors(n_neighbors, rep.nrows());

    let (indices, distances) = knn(&rep.view(), k);
    let connectivities = umap_rs::fuzzy_simplicial_set(&indices, &distances, 1.0, 1.0);
    let distances = distance_matrix(&indices, &distances);
    info!(
        "neighbor graph: {} observations, {} edges",
        connectivities.rows(),
        connectivities.nnz()
    );

    ds.obsp.insert("distances".to_string(), distances);
    ds.obsp.insert("connectivities".to_string(), connectivities);
    ds.uns.insert(
        "neighbors".to_string(),
        Uns::map([
            ("n_neighbors", Uns::Scalar(k as f64)),
            ("method", Uns::Text("umap".to_string())),
            ("metric", Uns::Text("euclidean".to_string())),
        ]),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;
    use ndarray_rand::RandomExt;
    use noisy_float::types::{n64, N64};
    use rand::SeedableRng;
    use rand_distr::Normal;
    use rand_pcg::Pcg64Mcg;
    use scan_types::{ExprMatrix, MetaTable};

    fn distance(v1: &[f64], other: &[f64]) -> N64 {
        let d = v1.iter().zip(other).map(|(a, b)| (b - a).powi(2)).sum::<f64>();
        n64(d.sqrt())
    }

    // Basic n^2 knn algorithm, for testing purposes. Excludes the point itself.
    fn exhaustive_knn(v: &ArrayView2<f64>, k: usize) -> Array2<usize> {
        let cells = v.nrows();
        assert!(k < cells);
        let mut output = Array2::zeros((cells, k));

        for cell in 0..cells {
            let me = v.row(cell).to_vec();
            let mut nns = (0..cells)
                .filter(|&other| other != cell)
                .map(|other| (distance(&me, &v.row(other).to_vec()), other))
                .collect::<Vec<_>>();
            nns.sort();
            for i in 0..k {
                output[(cell, i)] = nns[i].1;
            }
        }
        output
    }

    #[test]
    fn test_knn() {
        let mut rng = Pcg64Mcg::seed_from_u64(0);

        for ncells in &[3, 5, 50, 100] {
            for d in &[1, 2, 5, 20] {
                let dist = Normal::new(0.0f64, 1.0f64).unwrap();
                let v = Array2::<f64>::random_using((*ncells, *d), dist, &mut rng);
                let full = exhaustive_knn(&v.view(), ncells - 1);

                for k in &[2, 5, 15] {
                    if *k > *ncells {
                        continue;
                    }
                    let (idx, dist) = knn(&v.view(), *k);
                    assert_eq!(idx.column(0).to_vec(), (0..*ncells).collect::<Vec<_>>());
                    assert!(dist.column(0).iter().all(|&d| d == 0.0));
                    assert_eq!(idx.slice(s![.., 1..]), full.slice(s![.., ..k - 1]));
                    for row in dist.outer_iter() {
                        assert!(row.windows(2).into_iter().all(|w| w[0] <= w[1]));
                    }
                }
            }
        }
    }

    #[test]
    fn test_duplicate_points_keep_self_first() {
        let v = ndarray::arr2(&[[0.0, 0.0], [0.0, 0.0], [5.0, 5.0]]);
        let (idx, dist) = knn(&v.view(), 2);
        assert_eq!(idx.column(0).to_vec(), vec![0, 1, 2]);
        assert_eq!(idx[(0, 1)], 1);
        assert_eq!(idx[(1, 1)], 0);
        assert_eq!(dist[(0, 1)], 0.0);
    }

    #[test]
    fn test_effective_n_neighbors() {
        assert_eq!(effective_n_neighbors(15, 49), 15);
        assert_eq!(effective_n_neighbors(15, 10), 6);
    }

    #[test]
    fn test_neighbors_graph() {
        let mut rng = Pcg64Mcg::seed_from_u64(3);
        let pcs = Array2::<f64>::random_using((30, 4), Normal::new(0.0, 1.0).unwrap(), &mut rng);
        let x = ExprMatrix::Dense(Array2::zeros((30, 2)));
        let mut ds = Dataset::new(x, MetaTable::with_default_index(30), MetaTable::with_default_index(2)).unwrap();
        ds.obsm.insert("X_pca".into(), pcs);

        neighbors(&mut ds, 15).unwrap();
        ds.check_shape().unwrap();

        let dist = &ds.obsp["distances"];
        for row in dist.outer_iterator() {
            assert_eq!(row.nnz(), 14);
        }
        let conn = &ds.obsp["connectivities"];
        for (&v, (i, j)) in conn.iter() {
            assert_ne!(i, j);
            assert!(v > 0.0 && v <= 1.0);
            assert_eq!(conn.get(j, i), Some(&v));
        }
    }

    #[test]
    fn test_neighbors_requires_pca() {
        let x = ExprMatrix::Dense(Array2::zeros((3, 2)));
        let mut ds = Dataset::new(x, MetaTable::with_default_index(3), MetaTable::with_default_index(2)).unwrap();
        assert!(neighbors(&mut ds, 15).is_err());
    }
}
