use crate::Q;
use log::debug;
use ndarray::{Array2, ArrayView1};
use sprs::{CsMat, TriMat};

const BANDWIDTH: Q = 1.0;
const NITER: usize = 64;
const SMOOTH_K_TOLERANCE: Q = 1e-5;
const MIN_K_DIST_SCALE: Q = 1e-3;

/// Fuzzy simplicial set of a k-nearest-neighbor graph, as a symmetric sparse matrix of
/// membership strengths. Row `i` of `knn_indices`/`knn_distances` lists the neighbors of point `i`
/// in increasing distance, normally starting with the point itself at distance 0; `usize::MAX`
/// marks a missing neighbor.
///
/// The local sets are combined with `set_op_mix_ratio * (A + A' - A∘A') + (1 - set_op_mix_ratio) * A∘A'`,
/// so a ratio of 1 is a pure fuzzy union.
pub fn fuzzy_simplicial_set(
    knn_indices: &Array2<usize>,
    knn_distances: &Array2<Q>,
    local_connectivity: Q,
    set_op_mix_ratio: Q,
) -> CsMat<Q> {
    let n_points = knn_indices.nrows();
    let (sigmas, rhos) = smooth_knn_distances(knn_distances, local_connectivity);

    let mut tri = TriMat::new((n_points, n_points));
    for i in 0..n_points {
        for (&nb, &d) in knn_indices.row(i).iter().zip(knn_distances.row(i)) {
            if nb == usize::MAX || nb == i {
                continue;
            }
            let val = if d - rhos[i] <= 0.0 || sigmas[i] == 0.0 {
                1.0
            } else {
                (-(d - rhos[i]) / sigmas[i]).exp()
            };
            tri.add_triplet(i, nb, val);
        }
    }
    let a: CsMat<Q> = tri.to_csr();
    let at: CsMat<Q> = a.transpose_view().to_csr();

    let prod = sprs::binop::mul_mat_same_storage(&a, &at);
    let union = &(&a + &at) - &prod;
    let combined = &(&union * set_op_mix_ratio) + &(&prod * (1.0 - set_op_mix_ratio));

    let graph = drop_zeros(&combined);
    debug!("fuzzy simplicial set: {} points, {} edges", n_points, graph.nnz());
    graph
}

fn drop_zeros(m: &CsMat<Q>) -> CsMat<Q> {
    let mut tri = TriMat::new(m.shape());
    for (&v, (i, j)) in m.iter() {
        if v != 0.0 {
            tri.add_triplet(i, j, v);
        }
    }
    tri.to_csr()
}

/// Per-point normalizing distance `sigma` and distance to the nearest neighbor `rho`.
fn smooth_knn_distances(knn_distances: &Array2<Q>, local_connectivity: Q) -> (Vec<Q>, Vec<Q>) {
    let (n_points, k) = knn_distances.dim();
    let mean_all = if knn_distances.is_empty() {
        0.0
    } else {
        knn_distances.sum() / knn_distances.len() as Q
    };

    let mut sigmas = vec![0.0; n_points];
    let mut rhos = vec![0.0; n_points];

    for i in 0..n_points {
        let row = knn_distances.row(i);
        let non_zero = row.iter().copied().filter(|&d| d > 0.0).collect::<Vec<_>>();

        if non_zero.len() as Q >= local_connectivity {
            let index = local_connectivity.floor() as usize;
            let interpolation = local_connectivity - local_connectivity.floor();
            if index > 0 {
                rhos[i] = non_zero[index - 1];
                if interpolation > SMOOTH_K_TOLERANCE {
                    rhos[i] += interpolation * (non_zero[index] - non_zero[index - 1]);
                }
            } else {
                rhos[i] = interpolation * non_zero[0];
            }
        } else if !non_zero.is_empty() {
            rhos[i] = non_zero.iter().copied().fold(Q::MIN, Q::max);
        }

        let mut sigma = smooth_knn_dist(row, rhos[i], k);
        let floor = if rhos[i] > 0.0 {
            MIN_K_DIST_SCALE * row.sum() / k as Q
        } else {
            MIN_K_DIST_SCALE * mean_all
        };
        if sigma < floor {
            sigma = floor;
        }
        sigmas[i] = sigma;
    }
    (sigmas, rhos)
}

/// Binary search for the sigma at which the smoothed neighbor weights sum to `log2(k)`.
fn smooth_knn_dist(distances: ArrayView1<Q>, rho: Q, k: usize) -> Q {
    let target = (k as Q).log2() * BANDWIDTH;
    let mut lo = 0.0;
    let mut mid = 1.0;
    let mut hi = Q::INFINITY;

    for _ in 0..NITER {
        // the first entry is the point itself
        let psum = distances
            .iter()
            .skip(1)
            .map(|&d| {
                let d = d - rho;
                if d > 0.0 {
                    (-d / mid).exp()
                } else {
                    1.0
                }
            })
            .sum::<Q>();

        if (psum - target).abs() < SMOOTH_K_TOLERANCE {
            break;
        }
        if psum > target {
            hi = mid;
            mid = (lo + hi) / 2.0;
        } else {
            lo = mid;
            mid = if hi.is_infinite() { mid * 2.0 } else { (lo + hi) / 2.0 };
        }
    }
    mid
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_graph_is_symmetric() {
        let knns = arr2(&[[0, 1, 2], [1, 0, 2], [2, 1, 0]]);
        let dists = arr2(&[[0.0, 1.5, 2.5], [0.0, 1.5, 2.0], [0.0, 2.0, 2.5]]);
        let g = fuzzy_simplicial_set(&knns, &dists, 1.0, 1.0);
        assert_eq!(g.shape(), (3, 3));
        for (&v, (i, j)) in g.iter() {
            assert!(i != j);
            assert!(v > 0.0 && v <= 1.0);
            assert!((g.get(j, i).copied().unwrap_or(0.0) - v).abs() < 1e-12);
        }
        // nearest neighbors are at full strength
        assert!((g.get(0, 1).copied().unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_smooth_knn_dist_hits_target() {
        let dists = arr1(&[0., 1., 2., 3., 4., 5.]);
        let rho = 1.0;
        let sigma = smooth_knn_dist(dists.view(), rho, 6);
        let psum = dists
            .iter()
            .skip(1)
            .map(|&d| if d - rho > 0.0 { (-(d - rho) / sigma).exp() } else { 1.0 })
            .sum::<Q>();
        assert!((psum - 6f64.log2()).abs() < 1e-4);
    }

    #[test]
    fn test_rhos() {
        let knn_distances = arr2(&[[0., 0., 0.0], [0., 1., 2.], [0., 2., 3.]]);
        let (_, rhos) = smooth_knn_distances(&knn_distances, 1.0);
        assert_eq!(rhos, vec![0., 1., 2.]);
        let (_, rhos) = smooth_knn_distances(&knn_distances, 1.5);
        assert_eq!(rhos, vec![0., 1.5, 2.5]);
    }

    #[test]
    fn test_missing_neighbors_skipped() {
        let knns = arr2(&[[0, 1], [1, usize::MAX]]);
        let dists = arr2(&[[0.0, 1.0], [0.0, 0.0]]);
        let g = fuzzy_simplicial_set(&knns, &dists, 1.0, 1.0);
        assert_eq!(g.nnz(), 2);
    }
}
