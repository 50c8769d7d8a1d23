use crate::local_moving::FastLocalMoving;
use crate::refinement::Refinement;
use crate::{Network, SimpleClustering};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Upper bound on outer iterations when running to convergence.
const MAX_ITERATIONS: usize = 100;

/// Modularity-based Leiden community detection.
pub struct Leiden {
    resolution: f64,
    randomness: f64,
    rng: ChaCha20Rng,
    local_moving: FastLocalMoving,
}

impl Leiden {
    /// Initialize the Leiden algorithm with the given resolution and randomness parameters.
    /// An optional random seed can be supplied, otherwise a seed of 0 will be used.
    pub fn new(resolution: f64, randomness: f64, seed: Option<u64>) -> Leiden {
        Leiden {
            resolution,
            randomness,
            rng: ChaCha20Rng::seed_from_u64(seed.unwrap_or_default()),
            local_moving: FastLocalMoving::new(resolution),
        }
    }

    /// Cluster `n` starting from singletons, iterating until no node moves. Cluster 0 is the largest.
    pub fn run(&mut self, n: &Network) -> SimpleClustering {
        let mut c = SimpleClustering::singletons(n.nodes());
        for _ in 0..MAX_ITERATIONS {
            if !self.iterate(n, &mut c) {
                break;
            }
        }
        c.order_by_size();
        c
    }

    /// One pass of the algorithm: local moving, refinement, aggregation and recursion on the
    /// aggregate network. Returns true if any label changed.
    pub fn iterate(&mut self, n: &Network, c: &mut SimpleClustering) -> bool {
        let mut update = self.local_moving.iterate(n, c, &mut self.rng);
        if c.num_clusters() == n.nodes() {
            return update;
        }

        let m = n.total_edge_weight();
        let refinement = Refinement::new(self.resolution / (2.0 * m), self.randomness);

        // refine each cluster independently
        let members = c.nodes_per_cluster();
        let mut refined = SimpleClustering::singletons(n.nodes());
        let mut parent = Vec::new();
        let mut next = 0;
        for (cluster, nodes) in members.iter().enumerate() {
            let sub = refinement.run(&n.subnetwork(nodes), &mut self.rng);
            for (k, &node) in nodes.iter().enumerate() {
                refined.set(node, next + sub.get(k));
            }
            parent.extend(std::iter::repeat(cluster).take(sub.num_clusters()));
            next += sub.num_clusters();
        }
        refined.remove_empty_clusters();

        // without any merge the refined partition would not shrink the network
        let (aggregate_by, mut coarse) = if refined.num_clusters() == n.nodes() {
            (c.clone(), SimpleClustering::singletons(c.num_clusters()))
        } else {
            (refined, SimpleClustering::from_labels(&parent))
        };

        let reduced = n.aggregate(&aggregate_by);
        update |= self.iterate(&reduced, &mut coarse);

        let mut merged = aggregate_by;
        merged.merge(&coarse);
        *c = merged;
        update
    }
}
