use crate::stats::column_mean_var;
use anyhow::{bail, Error};
use log::{debug, info};
use noisy_float::prelude::*;
use scan_types::{ColumnData, Dataset};

/// Number of equal-width mean-expression bins in which dispersions are standardized
pub const N_BINS: usize = 20;

/// Per-feature dispersion statistics of log-normalized data.
#[derive(Clone, Debug)]
pub struct Dispersions {
    /// `ln(1 + mean)` of the de-logged expression
    pub means: Vec<f64>,
    /// `ln(var / mean)`, NaN where the variance is zero
    pub dispersions: Vec<f64>,
    /// Dispersions z-scored within their mean bin
    pub dispersions_norm: Vec<f64>,
}

/// Seurat-style dispersion statistics. The matrix is expected to hold `ln(1 + x)` values.
pub fn dispersions(ds: &Dataset) -> Dispersions {
    let (mut means, var) = column_mean_var(&ds.x, f64::exp_m1);

    let dispersions = means
        .iter_mut()
        .zip(&var)
        .map(|(mean, &var)| {
            if *mean == 0.0 {
                *mean = 1e-12;
            }
            let d = var / *mean;
            if d == 0.0 {
                f64::NAN
            } else {
                d.ln()
            }
        })
        .collect::<Vec<_>>();
    means.iter_mut().for_each(|m| *m = m.ln_1p());

    let bins = mean_bins(&means, N_BINS);
    let dispersions_norm = normalize_in_bins(&dispersions, &bins, N_BINS);
    Dispersions {
        means,
        dispersions,
        dispersions_norm,
    }
}

/// Assign each value to one of `n_bins` equal-width intervals spanning the data, closed on the
/// right, with the lowest value falling into the first bin.
fn mean_bins(values: &[f64], n_bins: usize) -> Vec<usize> {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let width = (max - min) / n_bins as f64;
    values
        .iter()
        .map(|&v| {
            if !(width > 0.0) {
                return 0;
            }
            let pos = ((v - min) / width).ceil() as isize - 1;
            pos.clamp(0, n_bins as isize - 1) as usize
        })
        .collect()
}

/// Z-score `values` within each bin, skipping NaN. A bin with a single usable value gets that
/// value as its scale and zero as its center, so its gene scores exactly 1.
fn normalize_in_bins(values: &[f64], bins: &[usize], n_bins: usize) -> Vec<f64> {
    let mut members = vec![Vec::new(); n_bins];
    for (&v, &b) in values.iter().zip(bins) {
        if !v.is_nan() {
            members[b].push(v);
        }
    }

    let centers = members
        .iter()
        .map(|m| {
            if m.len() < 2 {
                let mean = m.first().copied().unwrap_or(f64::NAN);
                (0.0, mean)
            } else {
                let n = m.len() as f64;
                let mean = m.iter().sum::<f64>() / n;
                let sd = (m.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
                (mean, sd)
            }
        })
        .collect::<Vec<_>>();

    values
        .iter()
        .zip(bins)
        .map(|(&v, &b)| {
            let (center, scale) = centers[b];
            (v - center) / scale
        })
        .collect()
}

/// Flag the `n_top_genes` features with the highest normalized dispersion. NaN scores count as 0
/// and ties at the cutoff are all kept. Writes `var["highly_variable"]`, `var["means"]`,
/// `var["dispersions"]` and `var["dispersions_norm"]`, and returns the flagged feature indices.
pub fn highly_variable_genes(ds: &mut Dataset, n_top_genes: usize) -> Result<Vec<usize>, Error> {
    let n_vars = ds.n_vars();
    if n_vars == 0 || ds.n_obs() < 2 {
        bail!(
            "cannot select variable genes from {} observations and {} genes",
            ds.n_obs(),
            n_vars
        );
    }
    let n_top = if n_top_genes > n_vars {
        debug!("n_top_genes ({}) exceeds the {} genes, keeping all", n_top_genes, n_vars);
        n_vars
    } else {
        n_top_genes
    };

    let stats = dispersions(ds);
    let score = |v: f64| if v.is_nan() { n64(0.0) } else { N64::try_new(v).unwrap_or(n64(0.0)) };

    let mut sorted = stats.dispersions_norm.iter().map(|&v| score(v)).collect::<Vec<_>>();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    let cutoff = sorted[n_top - 1];

    let flags = stats
        .dispersions_norm
        .iter()
        .map(|&v| score(v) >= cutoff)
        .collect::<Vec<_>>();
    let selected = (0..n_vars).filter(|&j| flags[j]).collect::<Vec<_>>();
    info!("{} of {} genes are highly variable", selected.len(), n_vars);

    ds.var.insert("highly_variable", ColumnData::Boolean(flags))?;
    ds.var.insert("means", ColumnData::Numeric(stats.means))?;
    ds.var.insert("dispersions", ColumnData::Numeric(stats.dispersions))?;
    ds.var.insert("dispersions_norm", ColumnData::Numeric(stats.dispersions_norm))?;
    Ok(selected)
}
