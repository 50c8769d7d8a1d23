//! # scan-rs: Single Cell Analysis in Rust
//!
//! Interactive analysis of annotated single-cell expression matrices: a fixed preprocessing
//! pipeline ending in Leiden clusters and a UMAP layout, differential expression between groups
//! of observations, and publication figures of the result. [`Session`] ties the stages together.

#![deny(missing_docs)]
#![deny(warnings)]

#[allow(unused_extern_crates)]
extern crate blas_src;

#[macro_use]
extern crate smart_default;

/// Leiden community detection on the neighbor graph
pub mod cluster;

/// Dimensionality reduction methods
pub mod dim_red;

/// Two-dimensional embedding of the neighbor graph
pub mod embed;

/// Errors reported by the analysis stages
pub mod error;

/// Highly variable gene selection
pub mod hvg;

/// Nearest-neighbor graphs
pub mod nn;

/// Count matrix normalization methods
pub mod normalization;

/// The fixed preprocessing pipeline
pub mod pipeline;

/// Figures of differential expression results
pub mod plot;

/// Quality filtering of observations and genes
pub mod qc;

/// Differential expression between groups of observations
pub mod rank_genes;

/// Per-gene standardization
pub mod scale;

/// The per-analyst dataset store
pub mod session;

/// Statistics functions
pub mod stats;

#[cfg(test)]
mod test;

pub use error::{StageError, StageResult};
pub use pipeline::PreprocessParams;
pub use plot::PlotKind;
pub use rank_genes::GroupingSelection;
pub use session::Session;
