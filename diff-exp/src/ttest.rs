use crate::dist::students_t_two_sided;

/// Welch's unequal-variance t-test from group summaries (means, ddof-1 variances and sizes).
/// A NaN statistic is reported as 0 and a NaN p-value as 1.
pub fn welch_t_test(mean_g: f64, var_g: f64, n_g: usize, mean_r: f64, var_r: f64, n_r: usize) -> (f64, f64) {
    let (ng, nr) = (n_g as f64, n_r as f64);
    let se_g = var_g / ng;
    let se_r = var_r / nr;
    let t = (mean_g - mean_r) / (se_g + se_r).sqrt();
    let df = (se_g + se_r).powi(2) / (se_g.powi(2) / (ng - 1.0) + se_r.powi(2) / (nr - 1.0));
    let p = students_t_two_sided(t, df);

    let t = if t.is_nan() { 0.0 } else { t };
    let p = if p.is_nan() { 1.0 } else { p };
    (t, p)
}
