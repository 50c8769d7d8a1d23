use crate::{Network, SimpleClustering};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::VecDeque;

/// Queue-based local moving of nodes between clusters. A node whose cluster changes re-queues
/// its neighbors that ended up outside the new cluster.
#[derive(Default)]
pub(crate) struct FastLocalMoving {
    resolution: f64,
    cluster_weights: Vec<f64>,
    nodes_per_cluster: Vec<usize>,
    unused_clusters: Vec<usize>,
    edge_weight_per_cluster: Vec<f64>,
    neighboring_clusters: Vec<usize>,
    queued: Vec<bool>,
}

fn reset<T: Clone + Default>(v: &mut Vec<T>, len: usize) {
    v.clear();
    v.resize(len, T::default());
}

impl FastLocalMoving {
    pub fn new(resolution: f64) -> Self {
        FastLocalMoving {
            resolution,
            ..FastLocalMoving::default()
        }
    }

    /// Move nodes until no move improves modularity. Returns true if any node changed cluster.
    pub fn iterate(&mut self, n: &Network, c: &mut SimpleClustering, rng: &mut impl Rng) -> bool {
        let nodes = n.nodes();
        let m = n.total_edge_weight();
        if nodes == 0 || m <= 0.0 {
            return false;
        }
        let scale = self.resolution / (2.0 * m);

        reset(&mut self.cluster_weights, nodes);
        reset(&mut self.nodes_per_cluster, nodes);
        for i in 0..nodes {
            self.cluster_weights[c.get(i)] += n.weight(i);
            self.nodes_per_cluster[c.get(i)] += 1;
        }

        self.unused_clusters.clear();
        self.unused_clusters
            .extend((0..nodes).rev().filter(|&l| self.nodes_per_cluster[l] == 0));

        let mut order = (0..nodes).collect::<Vec<_>>();
        order.shuffle(rng);
        let mut queue = VecDeque::from(order);
        reset(&mut self.queued, nodes);
        self.queued.iter_mut().for_each(|q| *q = true);

        reset(&mut self.edge_weight_per_cluster, nodes);
        self.neighboring_clusters.clear();

        let mut update = false;
        while let Some(j) = queue.pop_front() {
            self.queued[j] = false;
            let current = c.get(j);
            let wj = n.weight(j);

            self.cluster_weights[current] -= wj;
            self.nodes_per_cluster[current] -= 1;
            if self.nodes_per_cluster[current] == 0 {
                self.unused_clusters.push(current);
            }

            // an empty cluster is always a candidate
            self.neighboring_clusters.clear();
            if let Some(&empty) = self.unused_clusters.last() {
                self.neighboring_clusters.push(empty);
            }
            for (k, w) in n.neighbors(j) {
                let l = c.get(k);
                if self.edge_weight_per_cluster[l] == 0.0 {
                    self.neighboring_clusters.push(l);
                }
                self.edge_weight_per_cluster[l] += w;
            }

            let mut best = current;
            let mut best_gain = self.edge_weight_per_cluster[current] - wj * self.cluster_weights[current] * scale;
            for &l in &self.neighboring_clusters {
                let gain = self.edge_weight_per_cluster[l] - wj * self.cluster_weights[l] * scale;
                if gain > best_gain {
                    best = l;
                    best_gain = gain;
                }
            }
            for &l in &self.neighboring_clusters {
                self.edge_weight_per_cluster[l] = 0.0;
            }
            self.edge_weight_per_cluster[current] = 0.0;

            self.cluster_weights[best] += wj;
            self.nodes_per_cluster[best] += 1;
            if self.unused_clusters.last() == Some(&best) {
                self.unused_clusters.pop();
            }

            if best != current {
                c.set(j, best);
                update = true;
                for (k, _) in n.neighbors(j) {
                    if !self.queued[k] && c.get(k) != best {
                        self.queued[k] = true;
                        queue.push_back(k);
                    }
                }
            }
        }

        if update {
            c.remove_empty_clusters();
        }
        update
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_separates_components() {
        let net = Network::from_edges(
            6,
            vec![(0, 1, 1.0), (1, 2, 1.0), (0, 2, 1.0), (3, 4, 1.0), (4, 5, 1.0), (3, 5, 1.0)],
        );
        let mut c = SimpleClustering::singletons(6);
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        assert!(FastLocalMoving::new(1.0).iterate(&net, &mut c, &mut rng));
        assert_eq!(c.num_clusters(), 2);
        assert_eq!(c.get(0), c.get(2));
        assert_ne!(c.get(0), c.get(3));
    }

    #[test]
    fn test_no_edges() {
        let net = Network::from_edges(3, vec![]);
        let mut c = SimpleClustering::singletons(3);
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        assert!(!FastLocalMoving::new(1.0).iterate(&net, &mut c, &mut rng));
    }
}
