use crate::curve_fit::find_ab_params;
use crate::optimize::{LayoutParams, State};
use crate::{embedding, Q};
use log::info;
use ndarray::Array2;
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use sprs::CsMat;

/// UMAP layout of a precomputed fuzzy neighbor graph.
#[derive(Clone, Debug)]
pub struct Umap {
    pub(crate) learning_rate: Q,
    pub(crate) min_dist: Q,
    pub(crate) negative_sample_rate: usize,
    pub(crate) repulsion_strength: Q,
    pub(crate) spread: Q,
    a: Q,
    b: Q,
    embedded_dim: usize,
    custom_number_of_epochs: Option<usize>,
}

impl Umap {
    pub fn new(dimensions: usize, min_dist: Q, spread: Q) -> Umap {
        let (a, b) = find_ab_params(spread, min_dist);
        Umap {
            learning_rate: 1.0,
            min_dist,
            negative_sample_rate: 5,
            repulsion_strength: 1.0,
            spread,
            a,
            b,
            embedded_dim: dimensions,
            custom_number_of_epochs: None,
        }
    }

    /// Use a fixed number of epochs instead of the size-dependent default
    pub fn with_epochs(mut self, n_epochs: usize) -> Umap {
        assert!(n_epochs > 0, "number of epochs must be greater than 0");
        self.custom_number_of_epochs = Some(n_epochs);
        self
    }

    /// Fitted parameters of the low-dimensional membership curve
    pub fn ab(&self) -> (Q, Q) {
        (self.a, self.b)
    }

    /// Gets the number of epochs for optimizing the projection
    pub fn num_epochs(&self, rows: usize) -> usize {
        if let Some(n) = self.custom_number_of_epochs {
            return n;
        }
        if rows <= 10_000 {
            500
        } else {
            200
        }
    }

    /// Embed the nodes of a symmetric membership graph. Coordinates of each output column span
    /// [0, 10].
    pub fn embed_graph(&self, graph: &CsMat<Q>, seed: u64) -> Array2<Q> {
        let n = graph.rows();
        if n == 0 {
            return Array2::zeros((0, self.embedded_dim));
        }
        let mut random = Pcg64Mcg::seed_from_u64(seed);
        let n_epochs = self.num_epochs(n);
        info!(
            "umap: {} points, {} epochs, min_dist={} spread={} a={:.4} b={:.4}",
            n, n_epochs, self.min_dist, self.spread, self.a, self.b
        );

        let (head, tail, epochs_per_sample) = embedding::initialize_simplicial_set_embedding(graph, n_epochs);
        let init = embedding::initialize_embedding(graph, self.embedded_dim, &mut random);

        let params = LayoutParams {
            a: self.a,
            b: self.b,
            gamma: self.repulsion_strength,
            initial_alpha: self.learning_rate,
            negative_sample_rate: self.negative_sample_rate,
            move_other: true,
        };
        let mut state = State::new(params, seed, init, n_epochs, head, tail, epochs_per_sample);
        state.optimize();

        let mut result = state.into_embedding();
        embedding::normalize_columns(&mut result);
        result
    }
}
