//! A [`Session`] holds the current dataset and the most recent differential expression
//! analysis. Every stage is a method that either commits its result or leaves the store exactly
//! as it was.

use crate::error::{StageError, StageResult};
use crate::pipeline::{self, PreprocessParams};
use crate::plot::{self, PlotKind, EXPORT_DPI};
use crate::rank_genes::{self, GroupingSelection};
use anyhow::Context;
use log::info;
use scan_types::{Dataset, RankGenesResult, Reference};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Rows shown in the observation preview
pub const PREVIEW_ROWS: usize = 5;

/// What was loaded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Number of observations
    pub n_obs: usize,
    /// Number of genes
    pub n_vars: usize,
    /// Observation metadata columns
    pub obs_columns: Vec<String>,
    /// First observations, as (column, value) pairs
    pub obs_preview: Vec<Vec<(String, String)>>,
}

impl IngestSummary {
    fn of(ds: &Dataset) -> IngestSummary {
        IngestSummary {
            n_obs: ds.n_obs(),
            n_vars: ds.n_vars(),
            obs_columns: ds.obs.column_names().into_iter().map(String::from).collect(),
            obs_preview: ds.obs.head(PREVIEW_ROWS),
        }
    }
}

/// Shape of the dataset after preprocessing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PreprocessSummary {
    /// Observations kept
    pub n_obs: usize,
    /// Highly variable genes kept
    pub n_vars: usize,
    /// Leiden clusters found
    pub n_clusters: usize,
}

/// An exported figure.
#[derive(Clone, Debug)]
pub struct PlotExport {
    /// Suggested file name
    pub file_name: String,
    /// Media type of `bytes`
    pub mime: &'static str,
    /// Encoded image
    pub bytes: Vec<u8>,
}

fn stage_upload(bytes: &[u8]) -> std::io::Result<NamedTempFile> {
    let mut f = tempfile::Builder::new().prefix("upload-").suffix(".h5ad").tempfile()?;
    f.write_all(bytes)?;
    f.flush()?;
    Ok(f)
}

/// One analyst's working state.
#[derive(Default)]
pub struct Session {
    dataset: Option<Dataset>,
    analysis: Option<Dataset>,
}

impl Session {
    /// An empty session
    pub fn new() -> Session {
        Session::default()
    }

    /// The current dataset
    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    /// The dataset of the last differential expression run: the observations it kept and its
    /// result in `uns`
    pub fn analysis(&self) -> Option<&Dataset> {
        self.analysis.as_ref()
    }

    fn require_dataset(&self) -> StageResult<&Dataset> {
        self.dataset
            .as_ref()
            .ok_or_else(|| StageError::MissingPrerequisite("Please upload a dataset first".to_string()))
    }

    /// Replace the store with `ds`, discarding any earlier analysis.
    pub fn load(&mut self, ds: Dataset) -> StageResult<IngestSummary> {
        ds.check_shape().map_err(StageError::malformed)?;
        let summary = IngestSummary::of(&ds);
        info!(
            "loaded dataset: {} observations x {} genes, {} metadata columns",
            summary.n_obs,
            summary.n_vars,
            summary.obs_columns.len()
        );
        self.dataset = Some(ds);
        self.analysis = None;
        Ok(summary)
    }

    /// Parse an `.h5ad` file and make it the current dataset.
    pub fn ingest_path(&mut self, path: impl AsRef<Path>) -> StageResult<IngestSummary> {
        let path = path.as_ref();
        let ds = h5ad_io::read_h5ad(path)
            .with_context(|| format!("reading {}", path.display()))
            .map_err(StageError::malformed)?;
        self.load(ds)
    }

    /// Parse uploaded `.h5ad` bytes and make them the current dataset. The bytes are staged in a
    /// temporary file that is removed afterwards.
    pub fn ingest_bytes(&mut self, bytes: &[u8]) -> StageResult<IngestSummary> {
        if bytes.is_empty() {
            return Err(StageError::MalformedInput("the upload is empty".to_string()));
        }
        let staged = stage_upload(bytes)
            .context("staging the upload")
            .map_err(StageError::malformed)?;
        let ds = h5ad_io::read_h5ad(staged.path()).map_err(StageError::malformed)?;
        self.load(ds)
    }

    /// Run the preprocessing pipeline with `params` as given; callers collecting parameters from
    /// a user clamp them first with [`PreprocessParams::clamped`]. The store is updated only if
    /// every step succeeds.
    pub fn preprocess(&mut self, params: &PreprocessParams) -> StageResult<PreprocessSummary> {
        let mut ds = self.require_dataset()?.clone();
        pipeline::run(&mut ds, params).map_err(StageError::computation)?;

        let n_clusters = ds.obs.get("leiden").map_or(0, |c| c.unique_values().len());
        let summary = PreprocessSummary {
            n_obs: ds.n_obs(),
            n_vars: ds.n_vars(),
            n_clusters,
        };
        self.dataset = Some(ds);
        self.analysis = None;
        Ok(summary)
    }

    /// Columns that can group observations.
    pub fn grouping_columns(&self) -> Vec<String> {
        self.dataset
            .as_ref()
            .map(|ds| ds.obs.groupable_columns())
            .unwrap_or_default()
    }

    /// Choices of reference for `column`: `rest` followed by every value present in the column. A
    /// value literally named "rest" is listed twice; pass it as `Reference::Group` to pick the group.
    pub fn reference_options(&self, column: &str) -> StageResult<Vec<String>> {
        let ds = self.require_dataset()?;
        let col = ds
            .obs
            .get(column)
            .filter(|c| c.is_groupable())
            .ok_or_else(|| StageError::InvalidParameter(format!("'{}' is not a grouping column", column)))?;
        let mut options = vec![Reference::REST.to_string()];
        options.extend(col.unique_values());
        Ok(options)
    }

    /// Rank genes between the groups of `selection.groupby` and keep the result as the current
    /// analysis.
    pub fn rank_genes(&mut self, selection: &GroupingSelection) -> StageResult<&RankGenesResult> {
        let ds = self.require_dataset()?;
        let analysis = rank_genes::rank_genes(ds, selection)?;
        info!(
            "ranked genes for {} groups of '{}' against {} with {}",
            analysis.rank_genes().map_or(0, |r| r.groups.len()),
            selection.groupby,
            selection.reference,
            selection.method
        );
        let analysis = self.analysis.insert(analysis);
        analysis
            .rank_genes()
            .ok_or_else(|| StageError::Computation("the ranking was not stored".to_string()))
    }

    /// Render `kind` from the current analysis as a 300 DPI PNG.
    pub fn export_plot(&self, kind: PlotKind) -> StageResult<PlotExport> {
        let analysis = self.analysis.as_ref().ok_or_else(|| {
            StageError::MissingPrerequisite("Run the differential expression analysis first".to_string())
        })?;
        let bytes = plot::render(kind, analysis, EXPORT_DPI)
            .and_then(|out| out.into_figure())
            .and_then(|fig| fig.to_png(EXPORT_DPI))
            .with_context(|| format!("rendering the {} plot", kind))
            .map_err(StageError::computation)?;
        info!("exported {} ({} bytes)", kind.file_name(), bytes.len());
        Ok(PlotExport {
            file_name: kind.file_name(),
            mime: "image/png",
            bytes,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::Array2;
    use scan_types::{ColumnData, ExprMatrix, MetaTable, Method};

    fn small() -> Dataset {
        let x = Array2::from_shape_fn((4, 2), |(i, j)| (i + j) as f64);
        let mut obs = MetaTable::with_default_index(4);
        obs.insert(
            "kind",
            ColumnData::Strings(vec![Some("x".into()), Some("y".into()), None, Some("x".into())]),
        )
        .unwrap();
        obs.insert("depth", ColumnData::Numeric(vec![1.0, 2.0, 3.0, 4.0])).unwrap();
        Dataset::new(ExprMatrix::Dense(x), obs, MetaTable::with_default_index(2)).unwrap()
    }

    #[test]
    fn test_stages_need_a_dataset() {
        let mut s = Session::new();
        assert!(matches!(
            s.preprocess(&PreprocessParams::default()),
            Err(StageError::MissingPrerequisite(_))
        ));
        let sel = GroupingSelection {
            groupby: "kind".into(),
            reference: Reference::Rest,
            method: Method::Wilcoxon,
        };
        assert!(matches!(s.rank_genes(&sel), Err(StageError::MissingPrerequisite(_))));
        assert!(matches!(
            s.export_plot(PlotKind::Heatmap),
            Err(StageError::MissingPrerequisite(_))
        ));
        assert!(s.grouping_columns().is_empty());
    }

    #[test]
    fn test_load_summary() {
        let mut s = Session::new();
        let summary = s.load(small()).unwrap();
        assert_eq!((summary.n_obs, summary.n_vars), (4, 2));
        assert_eq!(summary.obs_columns, vec!["kind", "depth"]);
        assert_eq!(summary.obs_preview.len(), 4);
        assert_eq!(summary.obs_preview[2][0], ("kind".to_string(), "NaN".to_string()));
        assert_eq!(s.grouping_columns(), vec!["kind"]);
        assert_eq!(s.reference_options("kind").unwrap(), vec!["rest", "x", "y"]);
        assert!(matches!(
            s.reference_options("depth"),
            Err(StageError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_bad_upload_keeps_store() {
        let mut s = Session::new();
        s.load(small()).unwrap();
        assert!(matches!(s.ingest_bytes(b""), Err(StageError::MalformedInput(_))));
        assert!(matches!(
            s.ingest_bytes(b"definitely not hdf5"),
            Err(StageError::MalformedInput(_))
        ));
        assert_eq!(s.dataset().unwrap().n_obs(), 4);
    }

    #[test]
    fn test_export_needs_analysis() {
        let mut s = Session::new();
        s.load(small()).unwrap();
        let err = s.export_plot(PlotKind::Volcano).unwrap_err();
        assert_eq!(err.to_string(), "Run the differential expression analysis first");
    }
}
