use crate::encoding::{unicode_array, write_encoding, write_str_attr};
use anyhow::{Context, Error};
use hdf5::{File, Group};
use log::{debug, info};
use ndarray::{arr0, Array1, Array2};
use scan_types::{ColumnData, Dataset, ExprMatrix, MetaTable, RankGenesResult, Uns};
use sprs::CsMat;
use std::path::Path;

/// Write `ds` to `path` using the current AnnData on-disk layout.
pub fn write_h5ad(ds: &Dataset, path: impl AsRef<Path>) -> Result<(), Error> {
    let path = path.as_ref();
    ds.check_shape()?;
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    write_encoding(&file, "anndata", "0.1.0")?;

    write_matrix(&file, "X", &ds.x)?;
    write_table(&file, "obs", &ds.obs)?;
    write_table(&file, "var", &ds.var)?;

    write_dense_members(&file, "obsm", ds.obsm.iter())?;
    write_dense_members(&file, "varm", ds.varm.iter())?;

    let obsp = file.create_group("obsp")?;
    write_encoding(&obsp, "dict", "0.1.0")?;
    for (name, g) in &ds.obsp {
        write_csr(&obsp, name, g)?;
    }

    let uns = file.create_group("uns")?;
    write_encoding(&uns, "dict", "0.1.0")?;
    for (name, v) in &ds.uns {
        write_uns(&uns, name, v)?;
    }

    if let Some(raw) = &ds.raw {
        let group = file.create_group("raw")?;
        write_encoding(&group, "raw", "0.1.0")?;
        write_matrix(&group, "X", &raw.x)?;
        write_table(&group, "var", &raw.var)?;
    }

    info!(
        "wrote {}: {} observations x {} features",
        path.display(),
        ds.n_obs(),
        ds.n_vars()
    );
    Ok(())
}

fn write_matrix(parent: &Group, name: &str, m: &ExprMatrix) -> Result<(), Error> {
    match m {
        ExprMatrix::Dense(a) => write_array(parent, name, a),
        ExprMatrix::Sparse(s) => write_csr(parent, name, s),
    }
}

fn write_array(parent: &Group, name: &str, a: &Array2<f64>) -> Result<(), Error> {
    let ds = parent.new_dataset_builder().with_data(a).create(name)?;
    write_encoding(&ds, "array", "0.2.0")
}

fn write_csr(parent: &Group, name: &str, m: &CsMat<f64>) -> Result<(), Error> {
    let group = parent.create_group(name)?;
    write_encoding(&group, "csr_matrix", "0.1.0")?;
    group
        .new_attr_builder()
        .with_data(&Array1::from(vec![m.rows() as i64, m.cols() as i64]))
        .create("shape")?;

    let indptr = m.proper_indptr().iter().map(|&v| v as i64).collect::<Vec<_>>();
    let indices = m.indices().iter().map(|&v| v as i64).collect::<Vec<_>>();
    group
        .new_dataset_builder()
        .with_data(&Array1::from(m.data().to_vec()))
        .create("data")?;
    group
        .new_dataset_builder()
        .with_data(&Array1::from(indices))
        .create("indices")?;
    group
        .new_dataset_builder()
        .with_data(&Array1::from(indptr))
        .create("indptr")?;
    Ok(())
}

fn write_table(parent: &Group, name: &str, table: &MetaTable) -> Result<(), Error> {
    let group = parent.create_group(name)?;
    write_encoding(&group, "dataframe", "0.2.0")?;
    write_str_attr(&group, "_index", "_index")?;
    let names = table.column_names();
    if !names.is_empty() {
        group
            .new_attr_builder()
            .with_data(&unicode_array(&names)?)
            .create("column-order")?;
    }

    group
        .new_dataset_builder()
        .with_data(&unicode_array(&table.index)?)
        .create("_index")?;

    for (col, data) in table.columns() {
        write_column(&group, col, data).with_context(|| format!("writing {}[{}]", name, col))?;
    }
    Ok(())
}

fn write_categorical(group: &Group, name: &str, codes: &[i32], categories: &[String]) -> Result<(), Error> {
    let sub = group.create_group(name)?;
    write_encoding(&sub, "categorical", "0.2.0")?;
    sub.new_attr_builder().with_data(&arr0(false)).create("ordered")?;
    sub.new_dataset_builder()
        .with_data(&unicode_array(categories)?)
        .create("categories")?;
    sub.new_dataset_builder()
        .with_data(&Array1::from(codes.to_vec()))
        .create("codes")?;
    Ok(())
}

fn write_column(group: &Group, name: &str, data: &ColumnData) -> Result<(), Error> {
    match data {
        ColumnData::Categorical { codes, categories } => write_categorical(group, name, codes, categories),
        // strings with gaps can only be expressed as a categorical
        ColumnData::Strings(values) if values.iter().any(Option::is_none) => {
            let categories = data.unique_values();
            let codes = values
                .iter()
                .map(|v| match v {
                    Some(s) => categories.binary_search(s).map_or(-1, |p| p as i32),
                    None => -1,
                })
                .collect::<Vec<_>>();
            write_categorical(group, name, &codes, &categories)
        }
        ColumnData::Strings(values) => {
            let values = values.iter().map(|v| v.as_deref().unwrap_or_default()).collect::<Vec<_>>();
            let ds = group
                .new_dataset_builder()
                .with_data(&unicode_array(&values)?)
                .create(name)?;
            write_encoding(&ds, "string-array", "0.2.0")
        }
        ColumnData::Numeric(v) => {
            let ds = group.new_dataset_builder().with_data(&Array1::from(v.clone())).create(name)?;
            write_encoding(&ds, "array", "0.2.0")
        }
        ColumnData::Boolean(v) => {
            let ds = group.new_dataset_builder().with_data(&Array1::from(v.clone())).create(name)?;
            write_encoding(&ds, "array", "0.2.0")
        }
        ColumnData::Integer(v) => {
            let ds = group.new_dataset_builder().with_data(&Array1::from(v.clone())).create(name)?;
            write_encoding(&ds, "array", "0.2.0")
        }
    }
}

fn write_dense_members<'a>(
    file: &File,
    name: &str,
    members: impl Iterator<Item = (&'a String, &'a Array2<f64>)>,
) -> Result<(), Error> {
    let group = file.create_group(name)?;
    write_encoding(&group, "dict", "0.1.0")?;
    for (key, m) in members {
        write_array(&group, key, m)?;
    }
    Ok(())
}

fn write_uns(parent: &Group, name: &str, v: &Uns) -> Result<(), Error> {
    match v {
        Uns::Scalar(s) => {
            parent.new_dataset_builder().with_data(&arr0(*s)).create(name)?;
        }
        Uns::Text(t) => {
            let s = crate::encoding::to_unicode(t)?;
            parent.new_dataset_builder().with_data(&arr0(s)).create(name)?;
        }
        Uns::Vector(values) => {
            parent
                .new_dataset_builder()
                .with_data(&Array1::from(values.clone()))
                .create(name)?;
        }
        Uns::Matrix(m) => write_array(parent, name, m)?,
        Uns::Map(entries) => {
            let group = parent.create_group(name)?;
            write_encoding(&group, "dict", "0.1.0")?;
            for (k, v) in entries {
                write_uns(&group, k, v)?;
            }
        }
        Uns::RankGenes(r) => write_rank_genes(parent, name, r)?,
    }
    Ok(())
}

/// Ranked genes are stored as one sub-group per compared group.
fn write_rank_genes(parent: &Group, name: &str, r: &RankGenesResult) -> Result<(), Error> {
    let group = parent.create_group(name)?;
    write_encoding(&group, "dict", "0.1.0")?;
    write_str_attr(&group, "groupby", &r.groupby)?;
    write_str_attr(&group, "reference", &r.reference.to_string())?;
    write_str_attr(&group, "method", r.method.as_str())?;

    for g in &r.groups {
        let sub = group.create_group(&g.group)?;
        sub.new_dataset_builder()
            .with_data(&unicode_array(&g.names)?)
            .create("names")?;
        let mut fields = vec![("scores", &g.scores), ("logfoldchanges", &g.logfoldchanges)];
        if let Some(p) = &g.pvals {
            fields.push(("pvals", p));
        }
        if let Some(p) = &g.pvals_adj {
            fields.push(("pvals_adj", p));
        }
        for (field, values) in fields {
            sub.new_dataset_builder()
                .with_data(&Array1::from(values.clone()))
                .create(field)?;
        }
    }
    debug!("wrote {} ranked groups under uns[{}]", r.groups.len(), name);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::read::read_h5ad;
    use scan_types::{GroupRanking, Method, Reference};

    #[test]
    fn test_rank_genes_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("de.h5ad");

        let x = ExprMatrix::Dense(Array2::zeros((2, 2)));
        let mut ds = Dataset::new(x, MetaTable::with_default_index(2), MetaTable::with_default_index(2)).unwrap();
        ds.uns.insert(
            "rank_genes_groups".into(),
            Uns::RankGenes(RankGenesResult {
                groupby: "leiden".into(),
                reference: Reference::Rest,
                method: Method::LogReg,
                groups: vec![GroupRanking {
                    group: "0".into(),
                    names: vec!["g1".into(), "g0".into()],
                    scores: vec![2.0, 1.0],
                    logfoldchanges: vec![0.5, -0.5],
                    pvals: None,
                    pvals_adj: None,
                }],
            }),
        );
        write_h5ad(&ds, &path).unwrap();

        let file = File::open(&path).unwrap();
        let group = file.group("uns/rank_genes_groups/0").unwrap();
        assert_eq!(group.dataset("scores").unwrap().read_raw::<f64>().unwrap(), vec![2.0, 1.0]);
        assert!(!group.link_exists("pvals"));

        let back = read_h5ad(&path).unwrap();
        assert_eq!(back.n_obs(), 2);
    }
}
