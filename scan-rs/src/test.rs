//! End-to-end checks of the session: ingestion, preprocessing, differential expression and
//! plot export on a small synthetic count matrix.

use crate::error::StageError;
use crate::pipeline::PreprocessParams;
use crate::plot::{self, PlotKind};
use crate::qc;
use crate::rank_genes::GroupingSelection;
use crate::session::Session;
use ndarray::Array2;
use rand::SeedableRng;
use rand_distr::{Distribution, Poisson};
use rand_pcg::Pcg64Mcg;
use scan_types::{ColumnData, Dataset, ExprMatrix, Method, MetaTable, Reference};

const N_OBS: usize = 50;
const N_VARS: usize = 30;

/// Observations whose `cell_type` is missing
const MISSING: [usize; 3] = [3, 17, 40];

/// 50 x 30 counts: two populations marked by genes 0..10 and 10..20, genes 20..30 background,
/// and observation 49 without any counts.
fn synthetic() -> Dataset {
    let mut rng = Pcg64Mcg::seed_from_u64(42);
    let background = Poisson::new(1.0).unwrap();
    let marker = Poisson::new(8.0).unwrap();

    let x = Array2::from_shape_fn((N_OBS, N_VARS), |(i, j)| {
        if i == N_OBS - 1 {
            return 0.0;
        }
        let population = if i < 25 { 0 } else { 1 };
        if j < 20 && j / 10 == population {
            marker.sample(&mut rng)
        } else {
            background.sample(&mut rng)
        }
    });

    let mut obs = MetaTable::new((0..N_OBS).map(|i| format!("cell{}", i)).collect());
    let cell_type = (0..N_OBS)
        .map(|i| {
            if MISSING.contains(&i) {
                None
            } else if i < 25 {
                Some("alpha".to_string())
            } else {
                Some("beta".to_string())
            }
        })
        .collect();
    obs.insert("cell_type", ColumnData::Strings(cell_type)).unwrap();
    obs.insert("batch", ColumnData::Integer((0..N_OBS as i64).map(|i| i % 2).collect()))
        .unwrap();
    let var = MetaTable::new((0..N_VARS).map(|j| format!("gene{}", j)).collect());
    Dataset::new(ExprMatrix::Dense(x), obs, var).unwrap()
}

fn lenient() -> PreprocessParams {
    PreprocessParams {
        min_genes: 1,
        min_cells: 1,
    }
}

fn preprocessed() -> Session {
    let mut session = Session::new();
    session.load(synthetic()).unwrap();
    session.preprocess(&lenient()).unwrap();
    session
}

#[test]
fn test_ingest_shape() {
    let mut session = Session::new();
    let summary = session.load(synthetic()).unwrap();
    assert_eq!((summary.n_obs, summary.n_vars), (N_OBS, N_VARS));
    assert_eq!(summary.obs_preview.len(), 5);
    session.dataset().unwrap().check_shape().unwrap();
}

#[test]
fn test_ingest_h5ad_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("synthetic.h5ad");
    h5ad_io::write_h5ad(&synthetic(), &path).unwrap();
    let bytes = std::fs::read(&path).unwrap();

    let mut session = Session::new();
    let summary = session.ingest_bytes(&bytes).unwrap();
    assert_eq!((summary.n_obs, summary.n_vars), (N_OBS, N_VARS));
    assert!(summary.obs_columns.contains(&"cell_type".to_string()));
    session.dataset().unwrap().check_shape().unwrap();

    let summary = session.ingest_path(&path).unwrap();
    assert_eq!(summary.n_obs, N_OBS);
}

#[test]
fn test_end_to_end() {
    let session = preprocessed();
    let ds = session.dataset().unwrap();
    ds.check_shape().unwrap();
    // the empty observation is filtered out
    assert_eq!(ds.n_obs(), N_OBS - 1);
    assert!(ds.n_vars() <= N_VARS);

    let leiden = ds.obs.get("leiden").unwrap();
    assert!(!leiden.unique_values().is_empty());
    assert_eq!(ds.obsm["X_umap"].dim(), (N_OBS - 1, 2));
    assert_eq!(ds.obsm["X_pca"].nrows(), N_OBS - 1);
    assert!(ds.obsp.contains_key("connectivities"));
    // differential expression still sees every gene
    assert_eq!(ds.raw.as_ref().unwrap().x.cols(), N_VARS);
}

#[test]
fn test_filtering_is_monotone() {
    let ds = synthetic();
    let mut last = ds.n_obs();
    for min_genes in [0, 5, 15, 25, 30, 31] {
        let mut filtered = ds.clone();
        qc::filter_cells(&mut filtered, min_genes).unwrap();
        assert!(filtered.n_obs() <= last);
        filtered.check_shape().unwrap();
        last = filtered.n_obs();
    }
    assert_eq!(last, 0);

    // only the observation without counts falls below one detected gene
    let mut filtered = ds.clone();
    qc::filter_cells(&mut filtered, 1).unwrap();
    assert_eq!(filtered.n_obs(), N_OBS - 1);
    assert!(!filtered.obs.index.contains(&format!("cell{}", N_OBS - 1)));

    let mut last = ds.n_vars();
    for min_cells in [1, 10, 30, 49, 50] {
        let mut filtered = ds.clone();
        qc::filter_genes(&mut filtered, min_cells).unwrap();
        assert!(filtered.n_vars() <= last);
        last = filtered.n_vars();
    }

    // a threshold just above the rarest gene removes it
    let detected = ds.x.nonzero_per_col();
    let threshold = detected.iter().min().unwrap() + 1;
    let expected = detected.iter().filter(|&&n| n >= threshold).count();
    let mut filtered = ds.clone();
    qc::filter_genes(&mut filtered, threshold as u32).unwrap();
    assert!(filtered.n_vars() < ds.n_vars());
    assert_eq!(filtered.n_vars(), expected);
    filtered.check_shape().unwrap();
}

#[test]
fn test_failed_preprocess_keeps_store() {
    let mut session = Session::new();
    session.load(synthetic()).unwrap();

    // no observation has 1000 detected genes, so normalization has nothing to work on
    let strict = PreprocessParams {
        min_genes: 1000,
        min_cells: 1,
    };
    let err = session.preprocess(&strict).unwrap_err();
    assert!(matches!(err, StageError::Computation(_)));

    let ds = session.dataset().unwrap();
    assert_eq!((ds.n_obs(), ds.n_vars()), (N_OBS, N_VARS));
    assert!(!ds.obs.contains("leiden"));
    assert!(ds.raw.is_none());
}

#[test]
fn test_rerun_is_deterministic() {
    let mut a = Session::new();
    a.load(synthetic()).unwrap();
    let first = a.preprocess(&lenient()).unwrap();

    let mut b = Session::new();
    b.load(synthetic()).unwrap();
    let second = b.preprocess(&lenient()).unwrap();

    assert_eq!(first, second);
    let labels = |s: &Session| {
        let col = s.dataset().unwrap().obs.get("leiden").unwrap().clone();
        (0..col.len()).map(|i| col.value_string(i)).collect::<Vec<_>>()
    };
    assert_eq!(labels(&a), labels(&b));
}

#[test]
fn test_rank_genes_discards_missing() {
    let mut session = preprocessed();
    let n_obs = session.dataset().unwrap().n_obs();
    let sel = GroupingSelection {
        groupby: "cell_type".into(),
        reference: Reference::Rest,
        method: Method::Wilcoxon,
    };
    let result = session.rank_genes(&sel).unwrap().clone();
    assert_eq!(result.groups.len(), 2);

    let analysis = session.analysis().unwrap();
    assert_eq!(analysis.n_obs(), n_obs - MISSING.len());
    let kept = &analysis.obs.index;
    assert!(MISSING.iter().all(|i| !kept.contains(&format!("cell{}", i))));
    // the store keeps every observation
    assert_eq!(session.dataset().unwrap().n_obs(), n_obs);

    // population markers lead each ranking
    let alpha = result.group("alpha").unwrap();
    let top = alpha.names[0].trim_start_matches("gene").parse::<usize>().unwrap();
    assert!(top < 10);
    let beta = result.group("beta").unwrap();
    let top = beta.names[0].trim_start_matches("gene").parse::<usize>().unwrap();
    assert!((10..20).contains(&top));
}

#[test]
fn test_rank_genes_bad_selection() {
    let mut session = preprocessed();
    let sel = GroupingSelection {
        groupby: "batch".into(),
        reference: Reference::Rest,
        method: Method::TTest,
    };
    assert!(matches!(session.rank_genes(&sel), Err(StageError::InvalidParameter(_))));
    assert!(session.analysis().is_none());
    assert_eq!(session.grouping_columns(), vec!["cell_type", "leiden"]);
}

#[test]
fn test_volcano_math() {
    let pts = plot::volcano_points(&[1.0, -2.0], &[0.01, 0.1]).unwrap();
    let ys = pts.iter().map(|p| p.1).collect::<Vec<_>>();
    assert!((ys[0] - 2.0).abs() < 1e-12);
    assert!((ys[1] - 1.0).abs() < 1e-12);
}

#[test]
fn test_logreg_volcano_is_an_error() {
    let mut session = preprocessed();
    let sel = GroupingSelection {
        groupby: "cell_type".into(),
        reference: Reference::Rest,
        method: Method::LogReg,
    };
    // two categories are fitted as one binary model
    let result = session.rank_genes(&sel).unwrap();
    assert_eq!(result.groups.len(), 1);
    assert!(result.groups[0].pvals.is_none());
    assert!(result.groups[0].pvals_adj.is_none());

    let err = session.export_plot(PlotKind::Volcano).unwrap_err();
    assert!(matches!(err, StageError::Computation(_)));
    // the other figures only need scores
    assert!(session.export_plot(PlotKind::RankedGenes).is_ok());
}

#[test]
fn test_export_every_plot() {
    let mut session = preprocessed();
    let sel = GroupingSelection {
        groupby: "cell_type".into(),
        reference: Reference::Rest,
        method: Method::TTest,
    };
    session.rank_genes(&sel).unwrap();
    for kind in PlotKind::ALL {
        let export = session.export_plot(kind).unwrap();
        assert_eq!(export.file_name, format!("{}.png", kind.label()));
        assert_eq!(export.mime, "image/png");
        assert_eq!(&export.bytes[..8], b"\x89PNG\r\n\x1a\n");
    }
}
