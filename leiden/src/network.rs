use crate::SimpleClustering;
use fxhash::FxHashMap;

/// Weighted, undirected graph in compressed adjacency form. Each undirected edge appears in the
/// adjacency of both of its endpoints. Edges collapsed inside a node by aggregation are kept as
/// self-loop weight so that the total edge weight is preserved across levels.
#[derive(Debug, Clone)]
pub struct Network {
    indptr: Vec<usize>,
    targets: Vec<usize>,
    weights: Vec<f64>,
    node_weights: Vec<f64>,
    self_loops: Vec<f64>,
    total_edge_weight: f64,
}

impl Network {
    /// Build a network on `num_nodes` nodes from undirected edges. Repeated edges are summed,
    /// so a symmetric matrix should contribute each pair once. Self-loops and non-positive weights
    /// are ignored. Node weights are the weighted degrees.
    pub fn from_edges(num_nodes: usize, edges: impl IntoIterator<Item = (usize, usize, f64)>) -> Network {
        let mut adjacency = vec![Vec::new(); num_nodes];
        for (i, j, w) in edges {
            if i == j || w <= 0.0 || w.is_nan() {
                continue;
            }
            adjacency[i].push((j, w));
            adjacency[j].push((i, w));
        }

        let mut net = Network::from_adjacency(adjacency, vec![0.0; num_nodes]);
        net.node_weights = (0..num_nodes).map(|i| net.neighbors(i).map(|(_, w)| w).sum()).collect();
        net.total_edge_weight = net.weights.iter().sum::<f64>() / 2.0;
        net
    }

    fn from_adjacency(mut adjacency: Vec<Vec<(usize, f64)>>, self_loops: Vec<f64>) -> Network {
        let mut indptr = Vec::with_capacity(adjacency.len() + 1);
        let mut targets = Vec::new();
        let mut weights = Vec::new();
        indptr.push(0);

        for row in adjacency.iter_mut() {
            row.sort_by_key(|e| e.0);
            let mut last = usize::MAX;
            for &(t, w) in row.iter() {
                if t == last {
                    if let Some(prev) = weights.last_mut() {
                        *prev += w;
                    }
                } else {
                    targets.push(t);
                    weights.push(w);
                    last = t;
                }
            }
            indptr.push(targets.len());
        }

        Network {
            indptr,
            targets,
            weights,
            node_weights: Vec::new(),
            self_loops,
            total_edge_weight: 0.0,
        }
    }

    /// Number of nodes
    pub fn nodes(&self) -> usize {
        self.indptr.len() - 1
    }

    /// Weight of `node`
    pub fn weight(&self, node: usize) -> f64 {
        self.node_weights[node]
    }

    /// Weight of the edges collapsed into `node`
    pub fn self_loop(&self, node: usize) -> f64 {
        self.self_loops[node]
    }

    /// Pairs of (adjacent node, edge weight) for every neighbor of `node`.
    pub fn neighbors(&self, node: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.indptr[node]..self.indptr[node + 1];
        self.targets[range.clone()].iter().copied().zip(self.weights[range].iter().copied())
    }

    /// Sum of node weights
    pub fn total_node_weight(&self) -> f64 {
        self.node_weights.iter().sum()
    }

    /// Sum of undirected edge weights, including collapsed edges
    pub fn total_edge_weight(&self) -> f64 {
        self.total_edge_weight
    }

    /// Weight of the edges leaving each node
    pub fn edge_weight_per_node(&self) -> Vec<f64> {
        (0..self.nodes()).map(|i| self.neighbors(i).map(|(_, w)| w).sum()).collect()
    }

    /// Collapse each cluster into a single node. Node weights are summed, edges between clusters
    /// are summed, edges within a cluster become self-loop weight.
    pub fn aggregate(&self, clustering: &SimpleClustering) -> Network {
        let k = clustering.num_clusters();
        let mut node_weights = vec![0.0; k];
        let mut self_loops = vec![0.0; k];
        let mut memo: FxHashMap<(usize, usize), f64> = FxHashMap::default();

        for i in 0..self.nodes() {
            let ci = clustering.get(i);
            node_weights[ci] += self.weight(i);
            self_loops[ci] += self.self_loop(i);
            for (j, w) in self.neighbors(i) {
                // each undirected edge once
                if j < i {
                    continue;
                }
                let cj = clustering.get(j);
                if ci == cj {
                    self_loops[ci] += w;
                } else {
                    *memo.entry((ci.min(cj), ci.max(cj))).or_insert(0.0) += w;
                }
            }
        }

        let mut adjacency = vec![Vec::new(); k];
        for ((a, b), w) in memo {
            adjacency[a].push((b, w));
            adjacency[b].push((a, w));
        }

        let mut net = Network::from_adjacency(adjacency, self_loops);
        net.node_weights = node_weights;
        net.total_edge_weight = self.total_edge_weight;
        net
    }

    /// Network induced by `nodes`, keeping their weights. Node `k` of the result is `nodes[k]`.
    pub fn subnetwork(&self, nodes: &[usize]) -> Network {
        let mut local = FxHashMap::default();
        for (k, &n) in nodes.iter().enumerate() {
            local.insert(n, k);
        }

        let adjacency = nodes
            .iter()
            .map(|&n| {
                self.neighbors(n)
                    .filter_map(|(t, w)| local.get(&t).map(|&lt| (lt, w)))
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut net = Network::from_adjacency(adjacency, vec![0.0; nodes.len()]);
        net.node_weights = nodes.iter().map(|&n| self.weight(n)).collect();
        net.total_edge_weight = net.weights.iter().sum::<f64>() / 2.0;
        net
    }
}
