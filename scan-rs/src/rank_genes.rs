use crate::error::{StageError, StageResult};
use log::info;
use scan_types::{ColumnData, Dataset, LabelClass, Method, Reference, Uns};
use serde::{Deserialize, Serialize};

/// Key of the differential expression result in `uns`
pub const RANK_GENES_KEY: &str = "rank_genes_groups";

/// Which column to group observations by, what to compare each group against, and how.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingSelection {
    /// Name of a groupable observation column
    pub groupby: String,
    /// `Rest` or one value of the column
    pub reference: Reference,
    /// Statistical test
    pub method: Method,
}

/// Check `selection` against the observation metadata of `ds`, returning the grouping column.
pub fn validate<'a>(ds: &'a Dataset, selection: &GroupingSelection) -> StageResult<&'a ColumnData> {
    let column = ds.obs.get(&selection.groupby).ok_or_else(|| {
        StageError::InvalidParameter(format!("'{}' is not an observation column", selection.groupby))
    })?;
    if !column.is_groupable() {
        return Err(StageError::InvalidParameter(format!(
            "'{}' is a {} column and cannot be used to group observations",
            selection.groupby,
            column.type_name()
        )));
    }

    let categories = column.unique_values();
    if let Reference::Group(name) = &selection.reference {
        if !categories.contains(name) {
            return Err(StageError::InvalidParameter(format!(
                "reference '{}' is not a value of '{}'",
                name, selection.groupby
            )));
        }
    }
    if categories.len() < 2 {
        return Err(StageError::InvalidParameter(format!(
            "'{}' needs at least two groups, found {}",
            selection.groupby,
            categories.len()
        )));
    }
    Ok(column)
}

/// Differential expression of every group of `selection.groupby`. Observations without a value
/// for the column are dropped; the returned copy of `ds` holds the surviving observations and the
/// result in `uns["rank_genes_groups"]`. `ds` itself is not modified.
pub fn rank_genes(ds: &Dataset, selection: &GroupingSelection) -> StageResult<Dataset> {
    let column = validate(ds, selection)?;
    let keep = (0..column.len()).filter(|&i| !column.is_missing(i)).collect::<Vec<_>>();
    let dropped = ds.n_obs() - keep.len();
    if dropped > 0 {
        info!(
            "discarding {} observations with no value for '{}'",
            dropped, selection.groupby
        );
    }

    let mut filtered = ds.clone();
    filtered.subset_obs(&keep);

    let labels = filtered
        .obs
        .get(&selection.groupby)
        .ok_or_else(|| StageError::InvalidParameter(format!("'{}' disappeared", selection.groupby)))
        .and_then(|col| LabelClass::from_column(col).map_err(StageError::computation))?;

    let (x, gene_names) = filtered.expression_source();
    let result = diff_exp::rank_genes_groups(
        x,
        gene_names,
        &labels,
        &selection.groupby,
        &selection.reference,
        selection.method,
    )
    .map_err(StageError::computation)?;

    filtered.uns.insert(RANK_GENES_KEY.to_string(), Uns::RankGenes(result));
    Ok(filtered)
}
