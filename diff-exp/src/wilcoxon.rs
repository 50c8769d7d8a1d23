use crate::dist::normal_two_sided;
use crate::stat::average_ranks;

/// Normal approximation of the rank-sum statistic: z-score of the summed ranks of a group of
/// `n_group` observations against `n_ref` others, without tie correction.
#[inline]
pub fn rank_sum_z(rank_sum: f64, n_group: usize, n_ref: usize) -> f64 {
    let (ng, nr) = (n_group as f64, n_ref as f64);
    let expected = ng * (ng + nr + 1.0) / 2.0;
    let std_dev = (ng * nr * (ng + nr + 1.0) / 12.0).sqrt();
    (rank_sum - expected) / std_dev
}

/// Wilcoxon rank-sum test of `group` against `reference` for one gene. Returns the z-score and
/// its two-sided p-value.
pub fn wilcoxon(values: &[f64], group: &[usize], reference: &[usize]) -> (f64, f64) {
    let combined = group.iter().chain(reference).copied().collect::<Vec<_>>();
    let ranks = average_ranks(values, &combined);
    let rank_sum = ranks[..group.len()].iter().sum::<f64>();
    let z = rank_sum_z(rank_sum, group.len(), reference.len());
    (z, normal_two_sided(z))
}
