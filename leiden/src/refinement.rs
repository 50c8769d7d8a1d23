use crate::{Network, SimpleClustering};
use rand::seq::SliceRandom;
use rand::Rng;

/// Refinement phase of Leiden: starting from singletons inside one cluster, nodes that are still
/// singletons may merge into well-connected neighboring clusters, chosen at random with
/// probability growing exponentially with the modularity gain.
pub(crate) struct Refinement {
    /// Resolution already divided by twice the total edge weight of the full network
    scaled_resolution: f64,
    randomness: f64,
}

impl Refinement {
    pub fn new(scaled_resolution: f64, randomness: f64) -> Self {
        Refinement {
            scaled_resolution,
            randomness,
        }
    }

    pub fn run(&self, n: &Network, rng: &mut impl Rng) -> SimpleClustering {
        let nodes = n.nodes();
        let mut c = SimpleClustering::singletons(nodes);
        if nodes <= 1 {
            return c;
        }

        let total_node_weight = n.total_node_weight();
        let mut cluster_weights = (0..nodes).map(|i| n.weight(i)).collect::<Vec<_>>();
        let mut external_edge_weight = n.edge_weight_per_node();
        let mut non_singleton = vec![false; nodes];
        let mut edge_weight_per_cluster = vec![0.0; nodes];
        let mut candidates = Vec::new();
        let mut cumulative = Vec::new();

        let well_connected =
            |weight: f64, external: f64| external >= weight * (total_node_weight - weight) * self.scaled_resolution;

        let mut order = (0..nodes).collect::<Vec<_>>();
        order.shuffle(rng);

        let mut update = false;
        for j in order {
            if non_singleton[j] || !well_connected(cluster_weights[j], external_edge_weight[j]) {
                continue;
            }
            let wj = n.weight(j);

            // j leaves its singleton cluster, which becomes empty
            cluster_weights[j] = 0.0;
            external_edge_weight[j] = 0.0;

            candidates.clear();
            candidates.push(j);
            for (k, w) in n.neighbors(j) {
                let l = c.get(k);
                if edge_weight_per_cluster[l] == 0.0 {
                    candidates.push(l);
                }
                edge_weight_per_cluster[l] += w;
            }

            let mut best = j;
            let mut best_gain = 0.0;
            let mut total = 0.0;
            cumulative.clear();
            for &l in &candidates {
                if well_connected(cluster_weights[l], external_edge_weight[l]) {
                    let gain = edge_weight_per_cluster[l] - wj * cluster_weights[l] * self.scaled_resolution;
                    if gain > best_gain {
                        best = l;
                        best_gain = gain;
                    }
                    if gain >= 0.0 {
                        total += (gain / self.randomness).exp();
                    }
                }
                cumulative.push(total);
                edge_weight_per_cluster[l] = 0.0;
            }

            let chosen = if total.is_finite() {
                let r = total * rng.gen::<f64>();
                let idx = cumulative.partition_point(|&cum| cum < r).min(candidates.len() - 1);
                candidates[idx]
            } else {
                best
            };

            cluster_weights[chosen] += wj;
            for (k, w) in n.neighbors(j) {
                if c.get(k) == chosen {
                    external_edge_weight[chosen] -= w;
                } else {
                    external_edge_weight[chosen] += w;
                }
            }

            if chosen != j {
                c.set(j, chosen);
                non_singleton[chosen] = true;
                update = true;
            }
        }

        if update {
            c.remove_empty_clusters();
        }
        c
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_refinement_merges_clique() {
        let net = Network::from_edges(4, vec![(0, 1, 1.0), (0, 2, 1.0), (0, 3, 1.0), (1, 2, 1.0), (1, 3, 1.0), (2, 3, 1.0)]);
        let scaled = 1.0 / (2.0 * net.total_edge_weight());
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let c = Refinement::new(scaled, 0.01).run(&net, &mut rng);
        assert!(c.num_clusters() < 4);
    }

    #[test]
    fn test_single_node() {
        let net = Network::from_edges(1, vec![]);
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        assert_eq!(Refinement::new(1.0, 0.01).run(&net, &mut rng).num_clusters(), 1);
    }
}
