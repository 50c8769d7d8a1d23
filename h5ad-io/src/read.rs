use crate::encoding::{encoding_type, read_str_attr};
use anyhow::{bail, format_err, Context, Error};
use hdf5::types::{TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{File, Group};
use log::{debug, info, warn};
use scan_types::{ColumnData, Dataset, ExprMatrix, MetaTable, RawSnapshot, Uns};
use sprs::CsMat;
use std::path::Path;

/// Read an `.h5ad` file. `X`, `obs` and `var` must parse; optional members that cannot be
/// represented are skipped with a warning.
pub fn read_h5ad(path: impl AsRef<Path>) -> Result<Dataset, Error> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("cannot open {} as an HDF5 file", path.display()))?;

    let x = read_matrix(&file, "X").context("reading X")?;
    let obs = read_table(&file, "obs", x.rows()).context("reading obs")?;
    let var = read_table(&file, "var", x.cols()).context("reading var")?;
    let mut ds = Dataset::new(x, obs, var)?;

    if file.link_exists("raw") {
        match read_raw(&file.group("raw")?, ds.n_obs()) {
            Ok(raw) => ds.raw = Some(raw),
            Err(e) => warn!("skipping raw: {:#}", e),
        }
    }

    for (name, m) in read_dense_members(&file, "obsm")? {
        if m.nrows() == ds.n_obs() {
            ds.obsm.insert(name, m);
        } else {
            warn!("skipping obsm[{}]: {} rows for {} observations", name, m.nrows(), ds.n_obs());
        }
    }
    for (name, m) in read_dense_members(&file, "varm")? {
        if m.nrows() == ds.n_vars() {
            ds.varm.insert(name, m);
        } else {
            warn!("skipping varm[{}]: {} rows for {} features", name, m.nrows(), ds.n_vars());
        }
    }

    if file.link_exists("obsp") {
        let group = file.group("obsp")?;
        for name in group.member_names()? {
            match read_matrix(&group, &name) {
                Ok(ExprMatrix::Sparse(g)) if g.shape() == (ds.n_obs(), ds.n_obs()) => {
                    ds.obsp.insert(name, g);
                }
                Ok(_) => warn!("skipping obsp[{}]: not a square sparse graph", name),
                Err(e) => warn!("skipping obsp[{}]: {:#}", name, e),
            }
        }
    }

    if file.link_exists("uns") {
        let group = file.group("uns")?;
        for name in group.member_names()? {
            match read_uns(&group, &name) {
                Ok(v) => {
                    ds.uns.insert(name, v);
                }
                Err(e) => debug!("skipping uns[{}]: {:#}", name, e),
            }
        }
    }

    ds.check_shape()?;
    info!(
        "read {}: {} observations x {} features",
        path.display(),
        ds.n_obs(),
        ds.n_vars()
    );
    Ok(ds)
}

fn read_raw(group: &Group, n_obs: usize) -> Result<RawSnapshot, Error> {
    let x = read_matrix(group, "X")?;
    if x.rows() != n_obs {
        bail!("raw X has {} rows for {} observations", x.rows(), n_obs);
    }
    let var = read_table(group, "var", x.cols())?;
    Ok(RawSnapshot { x, var })
}

/// A matrix stored either as a 2-D dataset or as a CSR/CSC group.
fn read_matrix(parent: &Group, name: &str) -> Result<ExprMatrix, Error> {
    if let Ok(ds) = parent.dataset(name) {
        return Ok(ExprMatrix::Dense(ds.read_2d::<f64>()?));
    }

    let group = parent
        .group(name)
        .map_err(|_| format_err!("no dataset or group named {}", name))?;
    let encoding = encoding_type(&group);
    let data = group.dataset("data")?.read_raw::<f64>()?;
    let indices = read_usize(&group, "indices")?;
    let indptr = read_usize(&group, "indptr")?;
    let shape = group
        .attr("shape")
        .and_then(|a| a.read_raw::<i64>())
        .ok()
        .filter(|s| s.len() == 2 && s.iter().all(|&v| v >= 0))
        .map(|s| (s[0] as usize, s[1] as usize));

    match encoding.as_deref() {
        Some("csr_matrix") | None => {
            let shape = shape.unwrap_or_else(|| {
                (
                    indptr.len().saturating_sub(1),
                    indices.iter().max().map_or(0, |&m| m + 1),
                )
            });
            ExprMatrix::from_csr(shape, indptr, indices, data)
        }
        Some("csc_matrix") => {
            let shape = shape.ok_or_else(|| format_err!("csc matrix {} has no shape attribute", name))?;
            let csc = CsMat::try_new_csc(shape, indptr, indices, data)
                .map_err(|(_, _, _, e)| format_err!("invalid csc matrix {}: {}", name, e))?;
            Ok(ExprMatrix::Sparse(csc.to_csr()))
        }
        Some(other) => bail!("unsupported matrix encoding {} for {}", other, name),
    }
}

fn read_usize(group: &Group, name: &str) -> Result<Vec<usize>, Error> {
    group
        .dataset(name)?
        .read_raw::<i64>()?
        .into_iter()
        .map(|v| usize::try_from(v).map_err(|_| format_err!("negative value {} in {}", v, name)))
        .collect()
}

fn read_strings(ds: &hdf5::Dataset) -> Result<Vec<String>, Error> {
    match ds.dtype()?.to_descriptor()? {
        TypeDescriptor::VarLenUnicode => Ok(ds
            .read_raw::<VarLenUnicode>()?
            .iter()
            .map(|s| s.as_str().to_string())
            .collect()),
        TypeDescriptor::VarLenAscii => Ok(ds
            .read_raw::<VarLenAscii>()?
            .iter()
            .map(|s| s.as_str().to_string())
            .collect()),
        other => bail!("expected a variable-length string dataset, found {:?}", other),
    }
}

/// Observation or feature table. A missing group yields a table with a numeric index.
fn read_table(parent: &Group, name: &str, n: usize) -> Result<MetaTable, Error> {
    if !parent.link_exists(name) {
        return Ok(MetaTable::with_default_index(n));
    }
    let group = parent.group(name)?;

    let index_name = read_str_attr(&group, "_index").unwrap_or_else(|| "_index".to_string());
    let index = if group.link_exists(&index_name) {
        read_strings(&group.dataset(&index_name)?).with_context(|| format!("reading {} index", name))?
    } else {
        (0..n).map(|i| i.to_string()).collect()
    };
    if index.len() != n {
        bail!("{} index has {} entries, expected {}", name, index.len(), n);
    }

    let mut table = MetaTable::new(index);
    let order = group
        .attr("column-order")
        .and_then(|a| a.read_raw::<VarLenUnicode>())
        .map(|v| v.iter().map(|s| s.as_str().to_string()).collect::<Vec<_>>())
        .ok()
        .filter(|v| !v.is_empty());
    let columns = match order {
        Some(o) => o,
        None => group.member_names()?,
    };

    for col in columns {
        if col == index_name || col == "__categories" {
            continue;
        }
        match read_column(&group, &col) {
            Ok(data) if data.len() == n => table.insert(col, data)?,
            Ok(data) => warn!("skipping {}[{}]: {} values for {} rows", name, col, data.len(), n),
            Err(e) => warn!("skipping {}[{}]: {:#}", name, col, e),
        }
    }
    Ok(table)
}

fn read_column(group: &Group, name: &str) -> Result<ColumnData, Error> {
    if let Ok(sub) = group.group(name) {
        return match encoding_type(&sub).as_deref() {
            Some("categorical") => Ok(ColumnData::Categorical {
                codes: sub.dataset("codes")?.read_raw::<i32>()?,
                categories: read_strings(&sub.dataset("categories")?)?,
            }),
            Some("nullable-integer") => {
                let values = sub.dataset("values")?.read_raw::<f64>()?;
                let mask = sub.dataset("mask")?.read_raw::<bool>()?;
                Ok(ColumnData::Numeric(
                    values
                        .into_iter()
                        .zip(mask)
                        .map(|(v, missing)| if missing { f64::NAN } else { v })
                        .collect(),
                ))
            }
            other => bail!("unsupported column encoding {:?}", other),
        };
    }

    let ds = group.dataset(name)?;

    // pre-0.8 anndata keeps categories beside the codes
    if let Ok(cats) = group.dataset(&format!("__categories/{}", name)) {
        return Ok(ColumnData::Categorical {
            codes: ds.read_raw::<i32>()?,
            categories: read_strings(&cats)?,
        });
    }

    Ok(match ds.dtype()?.to_descriptor()? {
        TypeDescriptor::VarLenUnicode | TypeDescriptor::VarLenAscii => {
            ColumnData::Strings(read_strings(&ds)?.into_iter().map(Some).collect())
        }
        TypeDescriptor::Float(_) => ColumnData::Numeric(ds.read_raw::<f64>()?),
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => ColumnData::Integer(ds.read_raw::<i64>()?),
        TypeDescriptor::Boolean | TypeDescriptor::Enum(_) => ColumnData::Boolean(ds.read_raw::<bool>()?),
        other => bail!("unsupported column type {:?}", other),
    })
}

fn read_dense_members(file: &File, name: &str) -> Result<Vec<(String, ndarray::Array2<f64>)>, Error> {
    let mut out = Vec::new();
    if !file.link_exists(name) {
        return Ok(out);
    }
    let group = file.group(name)?;
    for member in group.member_names()? {
        match group.dataset(&member).and_then(|d| d.read_2d::<f64>()) {
            Ok(m) => out.push((member, m)),
            Err(e) => warn!("skipping {}[{}]: {}", name, member, e),
        }
    }
    Ok(out)
}

fn read_uns(group: &Group, name: &str) -> Result<Uns, Error> {
    if let Ok(sub) = group.group(name) {
        let mut entries = Vec::new();
        for member in sub.member_names()? {
            if let Ok(v) = read_uns(&sub, &member) {
                entries.push((member, v));
            }
        }
        return Ok(Uns::map(entries));
    }

    let ds = group.dataset(name)?;
    let descriptor = ds.dtype()?.to_descriptor()?;
    let is_text = matches!(descriptor, TypeDescriptor::VarLenUnicode | TypeDescriptor::VarLenAscii);
    Ok(match (ds.ndim(), is_text) {
        (0, true) => Uns::Text(read_strings(&ds)?.into_iter().next().unwrap_or_default()),
        (0, false) => Uns::Scalar(ds.read_scalar::<f64>()?),
        (1, false) => Uns::Vector(ds.read_raw::<f64>()?),
        (2, false) => Uns::Matrix(ds.read_2d::<f64>()?),
        (ndim, _) => bail!("unsupported {}-dimensional entry", ndim),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encoding::{unicode_array, write_encoding};
    use crate::write::write_h5ad;
    use ndarray::{array, Array1};

    #[test]
    fn test_missing_file() {
        assert!(read_h5ad("/nonexistent/path/file.h5ad").is_err());
    }

    #[test]
    fn test_not_hdf5() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.h5ad");
        std::fs::write(&path, b"this is not an hdf5 file").unwrap();
        assert!(read_h5ad(&path).is_err());
    }

    #[test]
    fn test_missing_x() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nox.h5ad");
        File::create(&path).unwrap().create_group("obs").unwrap();
        assert!(read_h5ad(&path).is_err());
    }

    /// Layout written by older anndata: `_index` dataset, codes beside `__categories`, CSC matrix.
    #[test]
    fn test_legacy_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.h5ad");
        {
            let file = File::create(&path).unwrap();

            // [[1, 0], [0, 2], [3, 0]] in CSC form
            let x = file.create_group("X").unwrap();
            write_encoding(&x, "csc_matrix", "0.1.0").unwrap();
            x.new_attr_builder()
                .with_data(&array![3i64, 2])
                .create("shape")
                .unwrap();
            x.new_dataset_builder()
                .with_data(&array![1.0f32, 3.0, 2.0])
                .create("data")
                .unwrap();
            x.new_dataset_builder()
                .with_data(&array![0i32, 2, 1])
                .create("indices")
                .unwrap();
            x.new_dataset_builder()
                .with_data(&array![0i32, 2, 3])
                .create("indptr")
                .unwrap();

            let obs = file.create_group("obs").unwrap();
            obs.new_dataset_builder()
                .with_data(&unicode_array(&["a", "b", "c"]).unwrap())
                .create("_index")
                .unwrap();
            obs.new_dataset_builder()
                .with_data(&array![1i8, 0, -1])
                .create("cell_type")
                .unwrap();
            obs.create_group("__categories")
                .unwrap()
                .new_dataset_builder()
                .with_data(&unicode_array(&["B", "T"]).unwrap())
                .create("cell_type")
                .unwrap();

            let var = file.create_group("var").unwrap();
            var.new_dataset_builder()
                .with_data(&unicode_array(&["g1", "g2"]).unwrap())
                .create("_index")
                .unwrap();
            var.new_dataset_builder()
                .with_data(&Array1::from(vec![4u32, 7]))
                .create("n_cells")
                .unwrap();
        }

        let ds = read_h5ad(&path).unwrap();
        assert_eq!(ds.x.shape(), (3, 2));
        assert_eq!(ds.x.to_dense(), array![[1.0, 0.0], [0.0, 2.0], [3.0, 0.0]]);
        assert_eq!(ds.obs.index, vec!["a", "b", "c"]);
        assert_eq!(
            ds.obs.get("cell_type"),
            Some(&ColumnData::Categorical {
                codes: vec![1, 0, -1],
                categories: vec!["B".into(), "T".into()]
            })
        );
        assert_eq!(ds.var.get("n_cells"), Some(&ColumnData::Integer(vec![4, 7])));
        assert_eq!(ds.obs.groupable_columns(), vec!["cell_type"]);
    }

    #[test]
    fn test_named_index_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("named.h5ad");
        {
            let file = File::create(&path).unwrap();
            file.new_dataset_builder()
                .with_data(&array![[1.0, 2.0], [3.0, 4.0]])
                .create("X")
                .unwrap();
            let obs = file.create_group("obs").unwrap();
            crate::encoding::write_str_attr(&obs, "_index", "barcode").unwrap();
            obs.new_dataset_builder()
                .with_data(&unicode_array(&["AAC", "GGT"]).unwrap())
                .create("barcode")
                .unwrap();
            obs.new_dataset_builder()
                .with_data(&array![0.5, 1.5])
                .create("score")
                .unwrap();
        }

        let ds = read_h5ad(&path).unwrap();
        assert_eq!(ds.obs.index, vec!["AAC", "GGT"]);
        assert_eq!(ds.obs.column_names(), vec!["score"]);
        assert_eq!(ds.var.index, vec!["0", "1"]);
    }

    #[test]
    fn test_written_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("written.h5ad");

        let x = ExprMatrix::from_csr((2, 3), vec![0, 2, 3], vec![0, 2, 1], vec![1.0, 2.0, 3.0]).unwrap();
        let mut obs = MetaTable::new(vec!["c1".into(), "c2".into()]);
        obs.insert("batch", ColumnData::Strings(vec![Some("b1".into()), None]))
            .unwrap();
        obs.insert("qc_pass", ColumnData::Boolean(vec![true, false])).unwrap();
        let mut var = MetaTable::new(vec!["g1".into(), "g2".into(), "g3".into()]);
        var.insert("means", ColumnData::Numeric(vec![0.1, f64::NAN, 0.3])).unwrap();
        let mut ds = Dataset::new(x, obs, var).unwrap();
        ds.snapshot_raw();
        ds.obsm.insert("X_umap".into(), array![[0.0, 1.0], [2.0, 3.0]]);
        ds.obsp.insert("connectivities".into(), CsMat::eye(2));
        ds.uns.insert("umap".into(), Uns::map(vec![("a", Uns::Scalar(1.5))]));
        write_h5ad(&ds, &path).unwrap();

        let back = read_h5ad(&path).unwrap();
        assert_eq!(back.x.to_dense(), ds.x.to_dense());
        assert_eq!(back.obs.index, vec!["c1", "c2"]);
        assert_eq!(back.obs.get("batch").unwrap().unique_values(), vec!["b1"]);
        assert!(back.obs.get("batch").unwrap().is_missing(1));
        assert_eq!(back.obs.get("qc_pass"), Some(&ColumnData::Boolean(vec![true, false])));
        match back.var.get("means") {
            Some(ColumnData::Numeric(v)) => assert!(v[1].is_nan() && v[2] == 0.3),
            other => panic!("unexpected means column {:?}", other),
        }
        assert_eq!(back.obsm["X_umap"], array![[0.0, 1.0], [2.0, 3.0]]);
        assert_eq!(back.obsp["connectivities"].nnz(), 2);
        assert_eq!(back.raw.as_ref().unwrap().var.index.len(), 3);
        assert_eq!(back.uns["umap"].get("a").and_then(Uns::as_scalar), Some(1.5));
    }
}
