//! UMAP for single-cell embeddings: fuzzy simplicial sets over a kNN graph, spectral
//! initialization and a seeded stochastic layout optimization.
#![deny(warnings)]

#[allow(unused_extern_crates)]
extern crate blas_src;

pub mod curve_fit;
pub mod embedding;
pub mod fuzzy;
pub mod optimize;
pub mod umap;

/// Floating point type used throughout the embedding
pub type Q = f64;

pub use fuzzy::fuzzy_simplicial_set;
pub use umap::Umap;
