//! Steps run in order: quality filtering, normalization, feature selection, scaling, PCA,
//! neighbor graph, clustering and embedding.

use crate::dim_red::pca;
use crate::{cluster, embed, hvg, nn, normalization, qc, scale};
use anyhow::{bail, Context, Error};
use log::{info, warn};
use scan_types::{ColumnData, Dataset};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Number of highly variable genes kept for the downstream steps
pub const N_TOP_GENES: usize = 2000;

/// Seed of every randomized step
pub const RANDOM_SEED: u64 = 0;

/// Accepted values of `min_genes`
pub const MIN_GENES_RANGE: RangeInclusive<u32> = 0..=1000;

/// Accepted values of `min_cells`
pub const MIN_CELLS_RANGE: RangeInclusive<u32> = 1..=20;

/// User-chosen preprocessing parameters.
#[derive(Clone, Debug, PartialEq, Eq, SmartDefault, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessParams {
    /// Minimum number of detected genes for an observation to be kept
    #[default = 200]
    pub min_genes: u32,
    /// Minimum number of observations a gene must be detected in to be kept
    #[default = 3]
    pub min_cells: u32,
}

impl PreprocessParams {
    /// Copy of the parameters with each value clamped to its accepted range.
    pub fn clamped(&self) -> PreprocessParams {
        fn clamp(name: &str, v: u32, range: &RangeInclusive<u32>) -> u32 {
            let c = v.clamp(*range.start(), *range.end());
            if c != v {
                warn!(
                    "{} = {} is outside [{}, {}], using {}",
                    name,
                    v,
                    range.start(),
                    range.end(),
                    c
                );
            }
            c
        }
        PreprocessParams {
            min_genes: clamp("min_genes", self.min_genes, &MIN_GENES_RANGE),
            min_cells: clamp("min_cells", self.min_cells, &MIN_CELLS_RANGE),
        }
    }
}

/// One step of the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Drop observations with too few detected genes
    FilterCells,
    /// Drop genes detected in too few observations
    FilterGenes,
    /// Scale observation totals to their median
    NormalizeTotal,
    /// Natural log of one plus the value
    Log1p,
    /// Keep the normalized full-feature matrix for differential expression
    SnapshotRaw,
    /// Flag the most dispersed genes
    HighlyVariableGenes,
    /// Keep only the flagged genes
    SubsetFeatures,
    /// Zero mean, unit variance per gene
    Scale,
    /// Principal components
    Pca,
    /// Nearest-neighbor graph
    Neighbors,
    /// Community detection
    Leiden,
    /// Two-dimensional layout
    Umap,
}

impl Step {
    /// Every step, in execution order
    pub const ALL: [Step; 12] = [
        Step::FilterCells,
        Step::FilterGenes,
        Step::NormalizeTotal,
        Step::Log1p,
        Step::SnapshotRaw,
        Step::HighlyVariableGenes,
        Step::SubsetFeatures,
        Step::Scale,
        Step::Pca,
        Step::Neighbors,
        Step::Leiden,
        Step::Umap,
    ];

    /// Short name used in logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Step::FilterCells => "filter_cells",
            Step::FilterGenes => "filter_genes",
            Step::NormalizeTotal => "normalize_total",
            Step::Log1p => "log1p",
            Step::SnapshotRaw => "raw",
            Step::HighlyVariableGenes => "highly_variable_genes",
            Step::SubsetFeatures => "subset_highly_variable",
            Step::Scale => "scale",
            Step::Pca => "pca",
            Step::Neighbors => "neighbors",
            Step::Leiden => "leiden",
            Step::Umap => "umap",
        }
    }

    fn apply(&self, ds: &mut Dataset, params: &PreprocessParams) -> Result<(), Error> {
        match self {
            Step::FilterCells => qc::filter_cells(ds, params.min_genes),
            Step::FilterGenes => qc::filter_genes(ds, params.min_cells),
            Step::NormalizeTotal => normalization::normalize_total(ds, None),
            Step::Log1p => {
                normalization::log1p(ds);
                Ok(())
            }
            Step::SnapshotRaw => {
                ds.snapshot_raw();
                Ok(())
            }
            Step::HighlyVariableGenes => hvg::highly_variable_genes(ds, N_TOP_GENES).map(|_| ()),
            Step::SubsetFeatures => {
                let flags = match ds.var.get("highly_variable") {
                    Some(ColumnData::Boolean(flags)) => flags.clone(),
                    _ => bail!("genes have not been flagged as highly variable"),
                };
                let keep = (0..flags.len()).filter(|&j| flags[j]).collect::<Vec<_>>();
                ds.subset_features(&keep);
                Ok(())
            }
            Step::Scale => scale::scale(ds, None),
            Step::Pca => pca::pca(ds, None, RANDOM_SEED),
            Step::Neighbors => nn::neighbors(ds, nn::DEFAULT_N_NEIGHBORS),
            Step::Leiden => cluster::leiden(ds, cluster::DEFAULT_RESOLUTION, RANDOM_SEED),
            Step::Umap => embed::umap(ds, embed::DEFAULT_MIN_DIST, embed::DEFAULT_SPREAD, RANDOM_SEED),
        }
    }
}

/// Run every step on `ds` in place. On error `ds` is left partially processed; callers that need
/// atomicity run the pipeline on a copy.
pub fn run(ds: &mut Dataset, params: &PreprocessParams) -> Result<(), Error> {
    info!(
        "preprocessing {} observations x {} genes with min_genes={} min_cells={}",
        ds.n_obs(),
        ds.n_vars(),
        params.min_genes,
        params.min_cells
    );
    for step in Step::ALL {
        step.apply(ds, params)
            .and_then(|_| ds.check_shape())
            .with_context(|| format!("step {} failed", step.name()))?;
        info!("{}: {} observations x {} genes", step.name(), ds.n_obs(), ds.n_vars());
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = PreprocessParams::default();
        assert_eq!(p.min_genes, 200);
        assert_eq!(p.min_cells, 3);
    }

    #[test]
    fn test_clamped() {
        let p = PreprocessParams {
            min_genes: 5000,
            min_cells: 0,
        };
        assert_eq!(
            p.clamped(),
            PreprocessParams {
                min_genes: 1000,
                min_cells: 1
            }
        );
        let ok = PreprocessParams {
            min_genes: 10,
            min_cells: 20,
        };
        assert_eq!(ok.clamped(), ok);
    }

    #[test]
    fn test_step_order() {
        let names = Step::ALL.iter().map(Step::name).collect::<Vec<_>>();
        assert_eq!(names.first(), Some(&"filter_cells"));
        assert_eq!(names.last(), Some(&"umap"));
        let raw = names.iter().position(|&n| n == "raw");
        let hvg = names.iter().position(|&n| n == "highly_variable_genes");
        assert!(raw < hvg);
    }
}
