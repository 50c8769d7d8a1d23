use crate::{Network, SimpleClustering};

/// Newman-Girvan modularity with a resolution parameter:
/// `Q = 1/(2m) * sum_ij [A_ij - resolution * k_i k_j / (2m)] delta(c_i, c_j)`.
/// Returns 0 for a network without edges.
pub fn modularity(resolution: f64, network: &Network, clustering: &SimpleClustering) -> f64 {
    let m = network.total_edge_weight();
    if m <= 0.0 {
        return 0.0;
    }

    let mut internal = 0.0;
    let mut cluster_weights = vec![0.0; clustering.num_clusters()];
    for i in 0..network.nodes() {
        let ci = clustering.get(i);
        cluster_weights[ci] += network.weight(i);
        internal += network.self_loop(i);
        for (j, w) in network.neighbors(i) {
            if j > i && clustering.get(j) == ci {
                internal += w;
            }
        }
    }

    let expected = cluster_weights.iter().map(|k| k * k).sum::<f64>() * resolution / (4.0 * m * m);
    internal / m - expected
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_two_triangles() {
        let net = Network::from_edges(
            6,
            vec![(0, 1, 1.0), (1, 2, 1.0), (0, 2, 1.0), (3, 4, 1.0), (4, 5, 1.0), (3, 5, 1.0), (2, 3, 1.0)],
        );
        let split = SimpleClustering::from_labels(&[0, 0, 0, 1, 1, 1]);
        let q = modularity(1.0, &net, &split);
        // internal 6/7, each cluster has degree 7
        let expected = 6.0 / 7.0 - 2.0 * 49.0 / 196.0;
        assert!((q - expected).abs() < 1e-12);

        let one = SimpleClustering::single_cluster(6);
        assert!(modularity(1.0, &net, &one).abs() < 1e-12);

        // aggregation preserves the objective
        let agg = net.aggregate(&split);
        let q_agg = modularity(1.0, &agg, &SimpleClustering::singletons(2));
        assert!((q - q_agg).abs() < 1e-12);
    }
}
