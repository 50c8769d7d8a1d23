//! Layout optimization by stochastic gradient descent over the graph edges. A single seeded
//! generator drives negative sampling and edges are visited in a fixed order, so a given seed
//! always yields the same embedding.

use crate::Q;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

const GRAD_CLIP: Q = 4.0;

/// Optimization hyper-parameters
#[derive(Clone, Debug)]
pub struct LayoutParams {
    pub a: Q,
    pub b: Q,
    pub gamma: Q,
    pub initial_alpha: Q,
    pub negative_sample_rate: usize,
    pub move_other: bool,
}

pub struct State {
    pub params: LayoutParams,
    pub n_epochs: usize,
    pub current_epoch: usize,
    pub alpha: Q,

    pub head: Vec<usize>,
    pub tail: Vec<usize>,
    pub epochs_per_sample: Vec<Q>,
    pub epochs_per_negative_sample: Vec<Q>,
    pub epoch_of_next_sample: Vec<Q>,
    pub epoch_of_next_negative_sample: Vec<Q>,

    pub embedding: Array2<Q>,
    random: Pcg64Mcg,
}

impl State {
    pub fn new(
        params: LayoutParams,
        seed: u64,
        embedding: Array2<Q>,
        n_epochs: usize,
        head: Vec<usize>,
        tail: Vec<usize>,
        epochs_per_sample: Vec<Q>,
    ) -> State {
        assert_eq!(head.len(), tail.len());
        assert_eq!(head.len(), epochs_per_sample.len());

        let epochs_per_negative_sample = epochs_per_sample
            .iter()
            .map(|&e| e / params.negative_sample_rate as Q)
            .collect::<Vec<_>>();

        State {
            alpha: params.initial_alpha,
            params,
            n_epochs,
            current_epoch: 0,
            epoch_of_next_sample: epochs_per_sample.clone(),
            epoch_of_next_negative_sample: epochs_per_negative_sample.clone(),
            head,
            tail,
            epochs_per_sample,
            epochs_per_negative_sample,
            embedding,
            random: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    pub fn num_samples(&self) -> usize {
        self.head.len()
    }

    pub fn num_points(&self) -> usize {
        self.embedding.nrows()
    }

    /// Run one epoch. Returns false once all epochs are done.
    pub fn step(&mut self) -> bool {
        if self.current_epoch >= self.n_epochs {
            return false;
        }
        for i in 0..self.num_samples() {
            self.iterate(i);
        }
        self.alpha = self.params.initial_alpha * (1.0 - self.current_epoch as Q / self.n_epochs as Q);
        self.current_epoch += 1;
        true
    }

    pub fn optimize(&mut self) {
        while self.step() {}
    }

    pub fn into_embedding(self) -> Array2<Q> {
        self.embedding
    }

    fn iterate(&mut self, i: usize) {
        let epoch = self.current_epoch as Q;
        if self.epoch_of_next_sample[i] > epoch {
            return;
        }

        let LayoutParams {
            a,
            b,
            gamma,
            move_other,
            ..
        } = self.params;
        let alpha = self.alpha;
        let dim = self.embedding.ncols();
        let j = self.head[i];
        let k = self.tail[i];

        // attraction along the edge
        let dist_sq = euclidean_sq(&self.embedding, j, k);
        let grad_coeff = if dist_sq > 0.0 {
            (-2.0 * a * b * dist_sq.powf(b - 1.0)) / (1.0 + a * dist_sq.powf(b))
        } else {
            0.0
        };
        for d in 0..dim {
            let grad_d = (grad_coeff * (self.embedding[[j, d]] - self.embedding[[k, d]])).clamp(-GRAD_CLIP, GRAD_CLIP);
            self.embedding[[j, d]] += grad_d * alpha;
            if move_other {
                self.embedding[[k, d]] -= grad_d * alpha;
            }
        }
        self.epoch_of_next_sample[i] += self.epochs_per_sample[i];

        // repulsion from random points
        let n_neg_samples =
            ((epoch - self.epoch_of_next_negative_sample[i]) / self.epochs_per_negative_sample[i]).floor();
        let n_points = self.num_points();
        for _ in 0..n_neg_samples.max(0.0) as usize {
            let k = self.random.gen_range(0..n_points);
            let dist_sq = euclidean_sq(&self.embedding, j, k);
            let grad_coeff = if dist_sq > 0.0 {
                (2.0 * gamma * b) / ((1e-3 + dist_sq) * (1.0 + a * dist_sq.powf(b)))
            } else if j == k {
                continue;
            } else {
                0.0
            };
            for d in 0..dim {
                let grad_d = if grad_coeff > 0.0 {
                    (grad_coeff * (self.embedding[[j, d]] - self.embedding[[k, d]])).clamp(-GRAD_CLIP, GRAD_CLIP)
                } else {
                    GRAD_CLIP
                };
                self.embedding[[j, d]] += grad_d * alpha;
            }
        }
        self.epoch_of_next_negative_sample[i] += n_neg_samples * self.epochs_per_negative_sample[i];
    }
}

/// Squared Euclidean distance
#[inline]
fn euclidean_sq(embedding: &Array2<Q>, j: usize, k: usize) -> Q {
    let x = embedding.row(j);
    let y = embedding.row(k);
    x.iter().zip(y).map(|(&x, &y)| x - y).fold(0.0, |acc, s| acc + s * s)
}
