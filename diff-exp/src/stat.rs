//! Descriptive statistics over gene expression vectors.

/// Mean and sample variance (ddof 1) of the values at `idx`. The variance is NaN for fewer
/// than two values.
pub fn mean_var(values: &[f64], idx: &[usize]) -> (f64, f64) {
    let n = idx.len() as f64;
    if idx.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let mean = idx.iter().map(|&i| values[i]).sum::<f64>() / n;
    let ss = idx.iter().map(|&i| (values[i] - mean).powi(2)).sum::<f64>();
    (mean, ss / (n - 1.0))
}

/// Mean of the values at `idx`
pub fn mean(values: &[f64], idx: &[usize]) -> f64 {
    if idx.is_empty() {
        return f64::NAN;
    }
    idx.iter().map(|&i| values[i]).sum::<f64>() / idx.len() as f64
}

/// 1-based ranks of the values at `idx`, ties receiving their average rank. `out[k]` is the rank
/// of `values[idx[k]]`.
pub fn average_ranks(values: &[f64], idx: &[usize]) -> Vec<f64> {
    let mut order = (0..idx.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| values[idx[a]].total_cmp(&values[idx[b]]));

    let mut ranks = vec![0.0; idx.len()];
    let mut start = 0;
    while start < order.len() {
        let v = values[idx[order[start]]];
        let mut end = start + 1;
        while end < order.len() && values[idx[order[end]]] == v {
            end += 1;
        }
        // positions start..end share ranks start+1..=end
        let rank = (start + end + 1) as f64 / 2.0;
        for &k in &order[start..end] {
            ranks[k] = rank;
        }
        start = end;
    }
    ranks
}

/// Median with linear interpolation between the two middle values. NaN for an empty slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
