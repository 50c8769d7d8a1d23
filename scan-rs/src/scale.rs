use anyhow::{bail, Error};
use log::info;
use ndarray::{Array1, Axis, Zip};
use scan_types::{ColumnData, Dataset, ExprMatrix};

/// Center every feature to zero mean and scale it to unit variance (ddof 1). Features with zero
/// variance are only centered. With `max_value`, entries are clipped to `[-max_value, max_value]`.
/// The matrix becomes dense; the per-feature mean and standard deviation are stored in
/// `var["mean"]` and `var["std"]`.
pub fn scale(ds: &mut Dataset, max_value: Option<f64>) -> Result<(), Error> {
    let (n_obs, n_vars) = ds.x.shape();
    if n_obs < 2 || n_vars == 0 {
        bail!("cannot scale a {}x{} matrix", n_obs, n_vars);
    }

    let dense = std::mem::replace(&mut ds.x, ExprMatrix::Dense(Default::default()));
    let mut x = dense.into_dense();

    let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_vars));
    let mut std = x.var_axis(Axis(0), 1.0).mapv(f64::sqrt);
    std.mapv_inplace(|s| if s == 0.0 { 1.0 } else { s });

    Zip::from(x.lanes_mut(Axis(0)))
        .and(&mean)
        .and(&std)
        .par_for_each(|mut col, &m, &s| {
            col.mapv_inplace(|v| {
                let z = (v - m) / s;
                match max_value {
                    Some(max) => z.clamp(-max, max),
                    None => z,
                }
            })
        });
    info!("scaled {} genes to unit variance", n_vars);

    ds.x = ExprMatrix::Dense(x);
    ds.var.insert("mean", ColumnData::Numeric(mean.to_vec()))?;
    ds.var.insert("std", ColumnData::Numeric(std.to_vec()))?;
    Ok(())
}
