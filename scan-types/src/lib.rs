//! Core data types shared by the single-cell analysis crates: the annotated expression
//! dataset, its metadata tables, observation groupings and differential expression results.

pub mod analysis;
pub mod dataset;
pub mod label_class;
pub mod matrix;
pub mod meta;

pub use analysis::{GroupRanking, Method, RankGenesResult, Reference};
pub use dataset::{Dataset, RawSnapshot, Uns};
pub use label_class::LabelClass;
pub use matrix::ExprMatrix;
pub use meta::{ColumnData, MetaTable};
