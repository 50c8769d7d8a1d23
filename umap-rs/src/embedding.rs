use crate::Q;
use log::{debug, warn};
use ndarray::linalg::Dot;
use ndarray::prelude::*;
use ndarray_linalg::lobpcg::LobpcgResult;
use ndarray_linalg::{self as na, Eigh, UPLO};
use rand::distributions::Standard;
use rand::Rng;
use rand_distr::StandardNormal;
use sprs::{CsMat, TriMat};
use std::time::Instant;

/// Graphs up to this size get a dense eigendecomposition, larger ones use LOBPCG.
const DENSE_EIGEN_MAX: usize = 2000;

/// Initial embedding of the graph: the spectral layout scaled so the largest coordinate is 10,
/// with a little noise added. Falls back to a uniform random layout in [-10, 10] when the graph is
/// too small or the eigensolver fails.
pub fn initialize_embedding(graph: &CsMat<Q>, embedding_dim: usize, random: &mut impl Rng) -> Array2<Q> {
    let n = graph.rows();
    match spectral_layout(graph, embedding_dim, random) {
        Some(mut embedding) => {
            let max = embedding.iter().fold(0.0, |acc: Q, &v| acc.max(v.abs()));
            if max > 0.0 {
                embedding *= 10.0 / max;
            }
            embedding.map_inplace(|v| *v += 1e-4 * random.sample::<Q, _>(StandardNormal));
            embedding
        }
        None => {
            if n > embedding_dim + 1 {
                warn!("spectral initialization failed, using a random layout");
            }
            Array2::from_shape_fn((n, embedding_dim), |_| random.gen_range(-10.0..10.0))
        }
    }
}

/// Drop edges too weak to be sampled even once in `n_epochs`. Returns the surviving edges as
/// `(head, tail, epochs_per_sample)`.
pub fn initialize_simplicial_set_embedding(graph: &CsMat<Q>, n_epochs: usize) -> (Vec<usize>, Vec<usize>, Vec<Q>) {
    let graph_max = graph.iter().fold(0.0_f64, |acc, (&value, _)| acc.max(value));
    let threshold = graph_max / n_epochs as Q;

    let mut weights = Vec::<Q>::new();
    let mut head = Vec::<usize>::new();
    let mut tail = Vec::<usize>::new();
    for (&value, (row, col)) in graph.iter() {
        if value > 0.0 && value >= threshold {
            weights.push(value);
            head.push(row);
            tail.push(col);
        }
    }
    debug!("{} of {} edges kept for optimization", weights.len(), graph.nnz());

    let epochs_per_sample = make_epochs_per_sample(&weights, n_epochs as Q);
    (head, tail, epochs_per_sample)
}

fn make_epochs_per_sample(weights: &[Q], n_epochs: Q) -> Vec<Q> {
    let mut result = vec![-1.0; weights.len()];
    let max = weights.iter().fold(Q::MIN, |a, &b| a.max(b));
    weights.iter().enumerate().for_each(|(i, &w)| {
        let n = (w / max) * n_epochs;
        if n > 0.0 {
            result[i] = n_epochs / n;
        }
    });
    result
}

/// Rescale every column to span [0, 10].
pub fn normalize_columns(embedding: &mut Array2<Q>) {
    for mut col in embedding.columns_mut() {
        let min = col.iter().copied().fold(Q::INFINITY, Q::min);
        let max = col.iter().copied().fold(Q::NEG_INFINITY, Q::max);
        let range = max - min;
        if range > 0.0 && range.is_finite() {
            col.map_inplace(|v| *v = 10.0 * (*v - min) / range);
        } else {
            col.fill(0.0);
        }
    }
}

/// Symmetric normalized Laplacian `I - D^-1/2 W D^-1/2`. Isolated nodes keep a unit diagonal.
fn normalized_laplacian(graph: &CsMat<Q>) -> CsMat<Q> {
    let n = graph.rows();
    let inv_sqrt_degree = graph
        .outer_iterator()
        .map(|row| {
            let deg = row.data().iter().sum::<Q>();
            if deg > 0.0 {
                1.0 / deg.sqrt()
            } else {
                0.0
            }
        })
        .collect::<Vec<_>>();

    let mut tri = TriMat::new((n, n));
    for i in 0..n {
        tri.add_triplet(i, i, 1.0);
    }
    for (&w, (i, j)) in graph.iter() {
        tri.add_triplet(i, j, -w * inv_sqrt_degree[i] * inv_sqrt_degree[j]);
    }
    tri.to_csr()
}

/// Eigenvectors 1..=embedding_dim of the normalized Laplacian, skipping the trivial one.
fn spectral_layout(graph: &CsMat<Q>, embedding_dim: usize, random: &mut impl Rng) -> Option<Array2<Q>> {
    let tick = Instant::now();
    let dim = graph.rows();
    let k = embedding_dim + 1;
    if dim <= k {
        return None;
    }
    let l = normalized_laplacian(graph);

    let (values, vecs) = if dim <= DENSE_EIGEN_MAX {
        match l.to_dense().eigh(UPLO::Lower) {
            Ok(res) => res,
            Err(err) => {
                warn!("dense eigendecomposition failed: {}", err);
                return None;
            }
        }
    } else {
        let initial = (&mut *random).sample_iter(Standard).take(dim * k).collect::<Vec<Q>>();
        let x = Array2::from_shape_vec((dim, k), initial).ok()?;
        let order = na::TruncatedOrder::Smallest;
        match na::lobpcg::lobpcg(|y| l.dot(&y), x, |_| {}, None, 1e-8, 100, order) {
            LobpcgResult::NoResult(err) => {
                warn!("eigensolver did not converge: {:?}", err);
                return None;
            }
            LobpcgResult::Ok(values, vecs, r_norms) | LobpcgResult::Err(values, vecs, r_norms, _) => {
                for (i, norm) in r_norms.into_iter().enumerate() {
                    if norm > 1e-5 {
                        warn!("eigenvalue {} residual norm {} > 1e-5", i, norm);
                    }
                }
                (values, vecs)
            }
        }
    };

    let mut sorted = values.iter().copied().enumerate().collect::<Vec<(usize, Q)>>();
    sorted.sort_by(|a, b| a.1.total_cmp(&b.1));
    let indices = sorted[1..k].iter().map(|(i, _)| *i).collect::<Vec<usize>>();
    debug!(
        "spectral initialization for {} samples took {:.3}s",
        dim,
        tick.elapsed().as_millis() as f64 / 1000.0
    );
    Some(vecs.select(Axis(1), &indices).as_standard_layout().into_owned())
}
