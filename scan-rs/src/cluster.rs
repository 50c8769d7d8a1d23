use anyhow::{bail, Error};
use leiden::{objective, Leiden, Network, SimpleClustering};
use log::info;
use scan_types::{ColumnData, Dataset, Uns};
use sprs::CsMat;

/// Default resolution of the modularity objective
pub const DEFAULT_RESOLUTION: f64 = 1.0;
/// Randomness of the refinement step
pub const DEFAULT_RANDOMNESS: f64 = 1e-2;

/// Undirected network over the upper triangle of a symmetric weighted graph.
pub fn network_from_graph(graph: &CsMat<f64>) -> Network {
    let edges = graph
        .iter()
        .filter(|(_, (i, j))| i < j)
        .map(|(&w, (i, j))| (i, j, w))
        .collect::<Vec<_>>();
    Network::from_edges(graph.rows(), edges)
}

/// Cluster labels `"0"`, `"1"`, ... in decreasing order of cluster size.
pub fn cluster_labels(clustering: &SimpleClustering) -> (Vec<String>, Vec<String>) {
    let categories = (0..clustering.num_clusters()).map(|c| c.to_string()).collect::<Vec<_>>();
    let labels = clustering.labels().iter().map(|c| c.to_string()).collect();
    (labels, categories)
}

/// Leiden clustering of `obsp["connectivities"]`. Writes the categorical `obs["leiden"]` and
/// `uns["leiden"]`.
pub fn leiden(ds: &mut Dataset, resolution: f64, seed: u64) -> Result<(), Error> {
    let graph = match ds.obsp.get("connectivities") {
        Some(g) => g,
        None => bail!("no neighbor graph to cluster"),
    };

    let network = network_from_graph(graph);
    let clustering = Leiden::new(resolution, DEFAULT_RANDOMNESS, Some(seed)).run(&network);
    let quality = objective::modularity(resolution, &network, &clustering);
    info!(
        "leiden: {} clusters, modularity {:.4}",
        clustering.num_clusters(),
        quality
    );

    let (labels, categories) = cluster_labels(&clustering);
    ds.obs
        .insert("leiden", ColumnData::categorical_from_labels(&labels, categories)?)?;
    ds.uns.insert(
        "leiden".to_string(),
        Uns::map([
            ("resolution", Uns::Scalar(resolution)),
            ("random_state", Uns::Scalar(seed as f64)),
            ("modularity", Uns::Scalar(quality)),
        ]),
    );
    Ok(())
}
