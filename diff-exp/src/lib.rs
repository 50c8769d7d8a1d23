//! Differential expression between groups of observations: Wilcoxon rank-sum, Welch t-test and
//! logistic regression rankings of genes.

/// gene ranking driver
#[allow(clippy::module_inception)]
pub mod diff_exp;
/// distribution tails and multiple testing correction
pub mod dist;
/// logistic regression
pub mod logreg;
/// statistics extension
pub mod stat;
/// Welch t-test
pub mod ttest;
/// Wilcoxon rank-sum test
pub mod wilcoxon;

pub use crate::diff_exp::{log_fold_change, rank_genes_groups};
pub use scan_types::{GroupRanking, Method, RankGenesResult, Reference};
