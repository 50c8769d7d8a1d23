//! Ranking genes between groups of observations
//!
use crate::dist::{adjusted_pvalue_bh, normal_two_sided};
use crate::logreg::LogisticRegression;
use crate::stat::{average_ranks, mean, mean_var};
use crate::ttest::welch_t_test;
use crate::wilcoxon::{rank_sum_z, wilcoxon};
use anyhow::{bail, format_err, Error};
use log::info;
use ndarray::Axis;
use noisy_float::types::N64;
use scan_types::{ExprMatrix, GroupRanking, LabelClass, Method, RankGenesResult, Reference};
use std::cmp::Reverse;
use std::ops::Range;

/// Pseudo-count added to both means before taking the fold change
pub const FOLD_CHANGE_EPSILON: f64 = 1e-9;

/// One group compared against its reference observations
struct Contrast {
    label: usize,
    members: Vec<usize>,
    reference: Vec<usize>,
}

/// Per-gene statistics of one contrast
#[derive(Clone, Copy, Debug)]
struct GeneStat {
    score: f64,
    pval: f64,
    lfc: f64,
}

/// `log2((expm1(mean_group) + eps) / (expm1(mean_ref) + eps))` for log1p-transformed data
#[inline]
pub fn log_fold_change(mean_group: f64, mean_ref: f64) -> f64 {
    ((mean_group.exp_m1() + FOLD_CHANGE_EPSILON) / (mean_ref.exp_m1() + FOLD_CHANGE_EPSILON)).log2()
}

/// Rank the genes (columns of `x`) of every group in `labels` against `reference`.
///
/// Observations belonging to no group are ignored. Groups with no observation are dropped;
/// every remaining group needs at least two observations. With a named reference that group is
/// excluded from the output. Each ranking is sorted by decreasing score.
pub fn rank_genes_groups(
    x: &ExprMatrix,
    gene_names: &[String],
    labels: &LabelClass,
    groupby: &str,
    reference: &Reference,
    method: Method,
) -> Result<RankGenesResult, Error> {
    if gene_names.len() != x.cols() {
        bail!("{} gene names for {} matrix columns", gene_names.len(), x.cols());
    }
    let mut labels = labels.clone();
    labels.drop_empty();
    if labels.len() < 2 {
        bail!("need at least two groups in '{}' to rank genes, found {}", groupby, labels.len());
    }
    for idx in 0..labels.len() {
        if labels.group(idx).len() < 2 {
            bail!(
                "group '{}' of '{}' has only one observation",
                labels.labels[idx],
                groupby
            );
        }
    }

    let reference_idx = match reference {
        Reference::Rest => None,
        Reference::Group(name) => Some(
            labels
                .label_index(name)
                .ok_or_else(|| format_err!("reference '{}' is not a group of '{}'", name, groupby))?,
        ),
    };

    let contrasts = (0..labels.len())
        .filter(|&idx| Some(idx) != reference_idx)
        .map(|idx| {
            let members = labels.group(idx).to_vec();
            let reference = match reference_idx {
                Some(r) => labels.group(r).to_vec(),
                None => (0..labels.len())
                    .filter(|&other| other != idx)
                    .flat_map(|other| labels.group(other).iter().copied())
                    .collect(),
            };
            Contrast {
                label: idx,
                members,
                reference,
            }
        })
        .collect::<Vec<_>>();

    info!(
        "ranking {} genes for {} groups of '{}' vs {} with {}",
        x.cols(),
        contrasts.len(),
        groupby,
        reference,
        method
    );

    let per_gene = match method {
        Method::Wilcoxon => wilcoxon_stats(x, &labels, &contrasts, reference_idx.is_none()),
        Method::TTest => t_test_stats(x, &contrasts),
        Method::LogReg => logreg_stats(x, &labels, &contrasts),
    };

    // logreg on two groups yields a single coefficient vector
    let n_reported = per_gene.first().map_or(contrasts.len(), |g| g.len());

    let groups = contrasts
        .iter()
        .take(n_reported)
        .enumerate()
        .map(|(k, contrast)| {
            let stats = per_gene.iter().map(|g| g[k]).collect::<Vec<_>>();
            group_ranking(labels.labels[contrast.label].clone(), gene_names, &stats, method)
        })
        .collect();

    Ok(RankGenesResult {
        groupby: groupby.to_string(),
        reference: reference.clone(),
        method,
        groups,
    })
}

/// Sort one group's statistics by decreasing score and adjust its p-values.
fn group_ranking(group: String, gene_names: &[String], stats: &[GeneStat], method: Method) -> GroupRanking {
    let mut order = (0..stats.len()).collect::<Vec<_>>();
    order.sort_by_key(|&i| Reverse(N64::try_new(stats[i].score).unwrap_or_else(|| N64::unchecked_new(f64::MIN))));

    let (pvals, pvals_adj) = if method.has_pvals() {
        let raw = stats.iter().map(|s| s.pval).collect::<Vec<_>>();
        let adj = adjusted_pvalue_bh(&raw);
        (
            Some(order.iter().map(|&i| raw[i]).collect()),
            Some(order.iter().map(|&i| adj[i]).collect()),
        )
    } else {
        (None, None)
    };

    GroupRanking {
        group,
        names: order.iter().map(|&i| gene_names[i].clone()).collect(),
        scores: order.iter().map(|&i| stats[i].score).collect(),
        logfoldchanges: order.iter().map(|&i| stats[i].lfc).collect(),
        pvals,
        pvals_adj,
    }
}

/// Range of positions of each group inside `labels.indices`
fn group_ranges(labels: &LabelClass) -> Vec<Range<usize>> {
    (0..labels.len())
        .map(|idx| {
            let start = labels.offsets[idx];
            start..start + labels.group(idx).len()
        })
        .collect()
}

fn wilcoxon_stats(x: &ExprMatrix, labels: &LabelClass, contrasts: &[Contrast], vs_rest: bool) -> Vec<Vec<GeneStat>> {
    let ranges = group_ranges(labels);
    let grouped = labels.indices.as_slice();
    x.par_map_columns(|_, values| {
        // against rest, every contrast covers all grouped observations: rank them once
        let shared_ranks = if vs_rest {
            Some(average_ranks(values, grouped))
        } else {
            None
        };
        contrasts
            .iter()
            .map(|c| {
                let (score, pval) = match &shared_ranks {
                    Some(ranks) => {
                        let rank_sum = ranks[ranges[c.label].clone()].iter().sum::<f64>();
                        let z = rank_sum_z(rank_sum, c.members.len(), c.reference.len());
                        (z, normal_two_sided(z))
                    }
                    None => wilcoxon(values, &c.members, &c.reference),
                };
                GeneStat {
                    score,
                    pval,
                    lfc: log_fold_change(mean(values, &c.members), mean(values, &c.reference)),
                }
            })
            .collect()
    })
}

fn t_test_stats(x: &ExprMatrix, contrasts: &[Contrast]) -> Vec<Vec<GeneStat>> {
    x.par_map_columns(|_, values| {
        contrasts
            .iter()
            .map(|c| {
                let (mg, vg) = mean_var(values, &c.members);
                let (mr, vr) = mean_var(values, &c.reference);
                let (score, pval) = welch_t_test(mg, vg, c.members.len(), mr, vr, c.reference.len());
                GeneStat {
                    score,
                    pval,
                    lfc: log_fold_change(mg, mr),
                }
            })
            .collect()
    })
}

/// Logistic regression over all grouped observations, every group a class. Scores are the
/// coefficients of each reported group; with two groups a single binary model is fitted for the
/// first reported group.
fn logreg_stats(x: &ExprMatrix, labels: &LabelClass, contrasts: &[Contrast]) -> Vec<Vec<GeneStat>> {
    let grouped = labels.indices.as_slice();
    let design = x.select_rows(grouped).into_dense();
    let class_of = group_ranges(labels)
        .into_iter()
        .enumerate()
        .flat_map(|(idx, range)| std::iter::repeat(idx).take(range.len()))
        .collect::<Vec<_>>();

    let model = LogisticRegression::default();
    let coefs = if labels.len() == 2 {
        let positive = contrasts[0].label;
        let y = class_of.iter().map(|&c| c == positive).collect::<Vec<_>>();
        model.fit_binary(design.view(), &y).insert_axis(Axis(0))
    } else {
        model
            .fit_multinomial(design.view(), &class_of, labels.len())
            .select(Axis(0), &contrasts.iter().map(|c| c.label).collect::<Vec<_>>())
    };

    x.par_map_columns(|gene, values| {
        contrasts
            .iter()
            .zip(coefs.outer_iter())
            .map(|(c, row)| GeneStat {
                score: row[gene],
                pval: f64::NAN,
                lfc: log_fold_change(mean(values, &c.members), mean(values, &c.reference)),
            })
            .collect()
    })
}
