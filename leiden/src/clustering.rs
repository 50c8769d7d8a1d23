/// Assignment of every node to a single integer cluster label. Labels are kept below
/// `num_clusters`, which never exceeds the number of nodes after `remove_empty_clusters`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimpleClustering {
    labels: Vec<usize>,
    num_clusters: usize,
}

impl SimpleClustering {
    /// Each node in its own cluster
    pub fn singletons(num_nodes: usize) -> Self {
        SimpleClustering {
            labels: (0..num_nodes).collect(),
            num_clusters: num_nodes,
        }
    }

    /// All nodes in cluster 0
    pub fn single_cluster(num_nodes: usize) -> Self {
        SimpleClustering {
            labels: vec![0; num_nodes],
            num_clusters: usize::from(num_nodes > 0),
        }
    }

    /// Clustering with the given labels, renumbered to remove gaps.
    pub fn from_labels(labels: &[usize]) -> Self {
        let mut c = SimpleClustering {
            labels: labels.to_vec(),
            num_clusters: labels.iter().max().map_or(0, |&m| m + 1),
        };
        c.remove_empty_clusters();
        c
    }

    /// Label of `node`
    pub fn get(&self, node: usize) -> usize {
        self.labels[node]
    }

    /// Assign `node` to `cluster`.
    pub fn set(&mut self, node: usize, cluster: usize) {
        self.labels[node] = cluster;
        self.num_clusters = self.num_clusters.max(cluster + 1);
    }

    /// Number of nodes
    pub fn nodes(&self) -> usize {
        self.labels.len()
    }

    /// Number of cluster labels in use (upper bound until `remove_empty_clusters` runs)
    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    /// Per-node labels
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Member nodes of each cluster
    pub fn nodes_per_cluster(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.num_clusters];
        for (node, &label) in self.labels.iter().enumerate() {
            members[label].push(node);
        }
        members
    }

    /// Renumber labels to `0..k` preserving their relative order.
    pub fn remove_empty_clusters(&mut self) {
        let mut used = vec![false; self.num_clusters];
        for &l in &self.labels {
            used[l] = true;
        }

        let mut remap = vec![usize::MAX; self.num_clusters];
        let mut next = 0;
        for (old, _) in used.iter().enumerate().filter(|(_, &u)| u) {
            remap[old] = next;
            next += 1;
        }

        for l in self.labels.iter_mut() {
            *l = remap[*l];
        }
        self.num_clusters = next;
    }

    /// Relabel nodes by the clustering of their clusters: node `i` moves to `coarse.get(self.get(i))`.
    pub fn merge(&mut self, coarse: &SimpleClustering) {
        for l in self.labels.iter_mut() {
            *l = coarse.get(*l);
        }
        self.num_clusters = coarse.num_clusters();
        self.remove_empty_clusters();
    }

    /// Renumber clusters so that cluster 0 is the largest. Equal sizes keep their current order.
    pub fn order_by_size(&mut self) {
        let mut sizes = vec![0usize; self.num_clusters];
        for &l in &self.labels {
            sizes[l] += 1;
        }

        let mut order = (0..self.num_clusters).collect::<Vec<_>>();
        order.sort_by_key(|&c| std::cmp::Reverse(sizes[c]));

        let mut remap = vec![0; self.num_clusters];
        for (new, &old) in order.iter().enumerate() {
            remap[old] = new;
        }
        for l in self.labels.iter_mut() {
            *l = remap[*l];
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_labels() {
        let c = SimpleClustering::from_labels(&[1, 2, 3, 4, 5]);
        assert_eq!(c.num_clusters(), 5);
        assert_eq!(c.labels(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_set_and_compact() {
        let mut c = SimpleClustering::singletons(10);
        c.set(8, 0);
        c.set(7, 0);
        c.remove_empty_clusters();
        assert_eq!(c.num_clusters(), 8);
        assert_eq!(c.get(9), 7);
        assert_eq!(c.nodes_per_cluster()[0], vec![0, 7, 8]);
    }

    #[test]
    fn test_merge() {
        let mut fine = SimpleClustering::from_labels(&[0, 0, 1, 2, 2]);
        let coarse = SimpleClustering::from_labels(&[1, 0, 1]);
        fine.merge(&coarse);
        assert_eq!(fine.labels(), &[1, 1, 0, 1, 1]);
        assert_eq!(fine.num_clusters(), 2);
    }

    #[test]
    fn test_order_by_size() {
        let mut c = SimpleClustering::from_labels(&[0, 1, 1, 2, 2, 2, 3]);
        c.order_by_size();
        assert_eq!(c.labels(), &[2, 1, 1, 0, 0, 0, 3]);
    }
}
