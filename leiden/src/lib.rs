//! Leiden community detection algorithm
#![deny(missing_docs)]
#![deny(warnings)]

/// Data structure for storing a clustering of nodes
pub mod clustering;

/// Data structure for storing a weighted, undirected graph (aka network)
pub mod network;

/// Leiden clustering algorithm
pub mod leiden;

/// Clustering objective functions
pub mod objective;

mod local_moving;
mod refinement;

pub use clustering::SimpleClustering;
pub use leiden::Leiden;
pub use network::Network;
