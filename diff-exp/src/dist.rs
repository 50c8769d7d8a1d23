use statrs::distribution::{ContinuousCDF, Normal, StudentsT};
use std::cmp::Ordering;

/// Two-sided p-value of a standard normal statistic, `2 * sf(|z|)`.
#[inline]
pub fn normal_two_sided(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    match Normal::new(0.0, 1.0) {
        Ok(normal) => 2.0 * normal.cdf(-z.abs()),
        Err(_) => f64::NAN,
    }
}

/// Two-sided p-value of a Student-t statistic with `df` degrees of freedom.
/// NaN when the statistic or the degrees of freedom are not usable.
#[inline]
pub fn students_t_two_sided(t: f64, df: f64) -> f64 {
    if t.is_nan() || !(df > 0.0) {
        return f64::NAN;
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => 2.0 * dist.cdf(-t.abs()),
        Err(_) => f64::NAN,
    }
}

/// Benjamini-Hochberg adjusted p-values, in input order. NaN inputs stay NaN and don't count
/// toward the number of tests.
pub fn adjusted_pvalue_bh(pvalues: &[f64]) -> Vec<f64> {
    let mut order = (0..pvalues.len())
        .filter(|&i| !pvalues[i].is_nan())
        .collect::<Vec<_>>();
    // largest first
    order.sort_by(|&a, &b| pvalues[b].partial_cmp(&pvalues[a]).unwrap_or(Ordering::Equal));

    let mut adjusted = vec![f64::NAN; pvalues.len()];
    let len = order.len() as f64;
    let mut min = f64::MAX;
    for (idx, &i) in order.iter().enumerate() {
        let q = pvalues[i] * len / (len - idx as f64);
        if q < min {
            min = q;
        }
        adjusted[i] = min.min(1.0);
    }
    adjusted
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_adjusted_pvalue_bh() {
        let adj = adjusted_pvalue_bh(&[0.01, 0.04, 0.03, 0.2]);
        assert_approx_eq!(adj[0], 0.04, 1e-12);
        assert_approx_eq!(adj[1], 0.16 / 3.0, 1e-12);
        assert_approx_eq!(adj[2], 0.16 / 3.0, 1e-12);
        assert_approx_eq!(adj[3], 0.2, 1e-12);
    }

    #[test]
    fn test_adjusted_pvalue_bh_caps_and_nan() {
        let adj = adjusted_pvalue_bh(&[0.9, f64::NAN, 0.95]);
        assert_approx_eq!(adj[0], 0.95, 1e-12);
        assert!(adj[1].is_nan());
        assert_approx_eq!(adj[2], 0.95, 1e-12);
        assert!(adjusted_pvalue_bh(&[]).is_empty());
    }

    #[test]
    fn test_two_sided_tails() {
        assert_approx_eq!(normal_two_sided(0.0), 1.0, 1e-12);
        assert_approx_eq!(normal_two_sided(1.959963984540054), 0.05, 1e-9);
        assert_approx_eq!(normal_two_sided(-2.0), normal_two_sided(2.0), 1e-15);
        // heavier tails than the normal for few degrees of freedom
        assert!(students_t_two_sided(2.0, 3.0) > normal_two_sided(2.0));
        assert!(students_t_two_sided(f64::NAN, 3.0).is_nan());
        assert!(students_t_two_sided(1.0, f64::NAN).is_nan());
    }
}
