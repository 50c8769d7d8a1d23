#![deny(warnings)]

//! Reading and writing AnnData `.h5ad` containers as [`scan_types::Dataset`]s.

/// Attribute and string helpers shared by the reader and writer
mod encoding;
/// Parse an `.h5ad` file into a dataset
pub mod read;
/// Persist a dataset as an `.h5ad` file
pub mod write;

pub use read::read_h5ad;
pub use write::write_h5ad;
