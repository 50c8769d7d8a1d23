use crate::stats::median_positive;
use anyhow::{bail, Error};
use log::info;
use scan_types::Dataset;

/// Scale each observation so that its counts sum to `target_sum`. With `None` the target is the
/// median total of the observations that have any counts. Observations without counts stay zero.
pub fn normalize_total(ds: &mut Dataset, target_sum: Option<f64>) -> Result<(), Error> {
    let totals = ds.x.row_sums();
    let target = match target_sum {
        Some(t) => t,
        None => match median_positive(&totals) {
            Some(m) => m,
            None => bail!("cannot normalize: no observation has any counts"),
        },
    };
    info!("normalizing {} observations to a total of {}", totals.len(), target);

    let factors = totals
        .iter()
        .map(|&t| if t > 0.0 { target / t } else { 1.0 })
        .collect::<Vec<_>>();
    ds.x.scale_rows(&factors);
    Ok(())
}

/// Apply `x -> ln(1 + x)` to every entry. The sparsity pattern is preserved.
pub fn log1p(ds: &mut Dataset) {
    ds.x.map_inplace(f64::ln_1p);
}
