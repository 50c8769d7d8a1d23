//! Gene-by-group figures: the expression heatmap and the dot plot. Both show the top genes of
//! every ranked group side by side, bracketed by the group they were ranked for.

use super::figure::{draw_err, Canvas, PlotGrid};
use super::{GeneBlock, PlotData, N_GENES};
use anyhow::Error;
use ndarray::Array2;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{FontTransform, IntoTextStyle};

const VIRIDIS: [(u8, u8, u8); 9] = [
    (68, 1, 84),
    (71, 44, 122),
    (59, 81, 139),
    (44, 113, 142),
    (33, 144, 141),
    (39, 173, 129),
    (92, 200, 99),
    (170, 220, 50),
    (253, 231, 37),
];

const REDS: [(u8, u8, u8); 5] = [
    (255, 245, 240),
    (252, 187, 161),
    (251, 106, 74),
    (203, 24, 29),
    (103, 0, 13),
];

/// Piecewise linear interpolation between evenly spaced anchor colors, `t` in `[0, 1]`.
pub(super) fn gradient(anchors: &[(u8, u8, u8)], t: f64) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let last = anchors.len() - 1;
    let pos = t * last as f64;
    let i = (pos.floor() as usize).min(last.saturating_sub(1));
    let f = pos - i as f64;
    let (a, b) = (anchors[i], anchors[(i + 1).min(last)]);
    let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * f).round() as u8;
    RGBColor(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}

/// Finite min and max of `values`, widened when they coincide.
pub(super) fn value_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        (0.0, 1.0)
    } else if hi - lo < 1e-12 {
        (lo, lo + 1.0)
    } else {
        (lo, hi)
    }
}

/// Half-open `[start, end)` run of consecutive items sharing a label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct Run {
    pub label: String,
    pub start: usize,
    pub end: usize,
}

/// The genes of all blocks in order, their matrix columns, and the run each block spans.
pub(super) fn concat_blocks(blocks: &[GeneBlock]) -> (Vec<String>, Vec<usize>, Vec<Run>) {
    let mut genes = Vec::new();
    let mut columns = Vec::new();
    let mut runs = Vec::new();
    for b in blocks {
        let start = genes.len();
        genes.extend(b.genes.iter().cloned());
        columns.extend(b.columns.iter().copied());
        runs.push(Run {
            label: b.group.clone(),
            start,
            end: genes.len(),
        });
    }
    (genes, columns, runs)
}

/// Observations sorted by group with the run each group spans, and their expression of `columns`.
pub(super) fn heatmap_rows(data: &PlotData, columns: &[usize]) -> (Vec<Run>, Array2<f64>) {
    let mut order = Vec::new();
    let mut runs = Vec::new();
    for (g, label) in data.groups.labels.iter().enumerate() {
        let start = order.len();
        order.extend_from_slice(data.groups.group(g));
        runs.push(Run {
            label: label.clone(),
            start,
            end: order.len(),
        });
    }
    let values = Array2::from_shape_fn((order.len(), columns.len()), |(r, c)| data.x.get(order[r], columns[c]));
    (runs, values)
}

/// Per group (rows) and gene (columns): mean expression and fraction of observations expressing.
pub(super) fn dot_stats(data: &PlotData, columns: &[usize]) -> (Array2<f64>, Array2<f64>) {
    let n_groups = data.groups.len();
    let mut mean = Array2::zeros((n_groups, columns.len()));
    let mut fraction = Array2::zeros((n_groups, columns.len()));
    for g in 0..n_groups {
        let members = data.groups.group(g);
        if members.is_empty() {
            continue;
        }
        for (c, &col) in columns.iter().enumerate() {
            let values = data.values(members, col);
            let n = values.len() as f64;
            mean[[g, c]] = values.iter().sum::<f64>() / n;
            fraction[[g, c]] = values.iter().filter(|&&v| v > 0.0).count() as f64 / n;
        }
    }
    (mean, fraction)
}

/// Gene names under the x axis, and brackets naming the gene blocks above the plot.
pub(super) fn draw_gene_axis<F>(
    root: &DrawingArea<BitMapBackend<'_>, Shift>,
    canvas: &Canvas,
    genes: &[String],
    runs: &[Run],
    (bottom, top): (f64, f64),
    to_px: F,
) -> Result<(), Error>
where
    F: Fn(f64, f64) -> (i32, i32),
{
    let gene_style = canvas
        .font(7.0)
        .transform(FontTransform::Rotate270)
        .into_text_style(root)
        .pos(Pos::new(HPos::Right, VPos::Center));
    let gap = canvas.pt(3.0) as i32;
    for (c, gene) in genes.iter().enumerate() {
        let (x, y) = to_px(c as f64 + 0.5, bottom);
        root.draw(&Text::new(gene.clone(), (x, y + gap), gene_style.clone()))
            .map_err(draw_err)?;
    }

    let label_style = canvas
        .font(7.0)
        .into_text_style(root)
        .pos(Pos::new(HPos::Center, VPos::Bottom));
    let stroke = BLACK.stroke_width(canvas.pt(0.8));
    for run in runs {
        let (x0, y) = to_px(run.start as f64 + 0.15, top);
        let (x1, _) = to_px(run.end as f64 - 0.15, top);
        let y = y - gap;
        root.draw(&PathElement::new(
            vec![(x0, y + gap), (x0, y), (x1, y), (x1, y + gap)],
            stroke,
        ))
        .map_err(draw_err)?;
        root.draw(&Text::new(run.label.clone(), ((x0 + x1) / 2, y - gap), label_style.clone()))
            .map_err(draw_err)?;
    }
    Ok(())
}

/// Vertical color bar spanning `area`, labeled with the value range.
fn draw_color_bar(
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    canvas: &Canvas,
    anchors: &[(u8, u8, u8)],
    (lo, hi): (f64, f64),
    title: &str,
) -> Result<(), Error> {
    let h = area.dim_in_pixel().1 as i32;
    let bar_w = canvas.pt(8.0) as i32;
    let top = h / 4;
    let bottom = h - h / 4;
    let steps = 64;
    for s in 0..steps {
        let y0 = bottom - (bottom - top) * s / steps;
        let y1 = bottom - (bottom - top) * (s + 1) / steps;
        let color = gradient(anchors, (s as f64 + 0.5) / steps as f64);
        area.draw(&Rectangle::new([(0, y1), (bar_w, y0)], color.filled()))
            .map_err(draw_err)?;
    }
    area.draw(&Rectangle::new([(0, top), (bar_w, bottom)], BLACK.stroke_width(1)))
        .map_err(draw_err)?;

    let style = canvas
        .font(6.0)
        .into_text_style(area)
        .pos(Pos::new(HPos::Left, VPos::Center));
    let x = bar_w + canvas.pt(2.0) as i32;
    area.draw(&Text::new(format!("{:.2}", hi), (x, top), style.clone()))
        .map_err(draw_err)?;
    area.draw(&Text::new(format!("{:.2}", lo), (x, bottom), style))
        .map_err(draw_err)?;

    let title_style = canvas
        .font(6.0)
        .into_text_style(area)
        .pos(Pos::new(HPos::Left, VPos::Bottom));
    area.draw(&Text::new(title.to_string(), (0, top - canvas.pt(4.0) as i32), title_style))
        .map_err(draw_err)?;
    Ok(())
}

/// Expression of the top genes in every grouped observation, observations ordered by group.
pub(super) fn render_heatmap(data: &PlotData, dpi: u32) -> Result<PlotGrid, Error> {
    let blocks = data.gene_blocks(N_GENES)?;
    let (genes, columns, gene_runs) = concat_blocks(&blocks);
    let (row_runs, values) = heatmap_rows(data, &columns);
    let (n_rows, n_genes) = values.dim();
    let (lo, hi) = value_range(values.iter().copied());
    let norm = |v: f64| (v - lo) / (hi - lo);
    // first observation at the top
    let flip = |r: usize| (n_rows - r) as f64;

    let canvas = Canvas::new((3.0 + 0.22 * n_genes as f64).max(4.0), 5.0, dpi);
    let figure = canvas.render(|root| {
        let (w, _) = root.dim_in_pixel();
        let (main, legend) = root.split_horizontally(w.saturating_sub(canvas.pt(60.0)));

        let mut chart = ChartBuilder::on(&main)
            .margin_top(canvas.pt(30.0))
            .margin_bottom(canvas.pt(56.0))
            .margin_left(canvas.pt(48.0))
            .margin_right(canvas.pt(6.0))
            .build_cartesian_2d(-0.8..n_genes as f64, 0.0..n_rows.max(1) as f64)
            .map_err(draw_err)?;

        chart
            .draw_series(row_runs.iter().enumerate().map(|(g, run)| {
                Rectangle::new(
                    [(-0.7, flip(run.start)), (-0.15, flip(run.end))],
                    Palette99::pick(g).filled(),
                )
            }))
            .map_err(draw_err)?;
        let values = &values;
        chart
            .draw_series((0..n_rows).flat_map(|r| {
                (0..n_genes).map(move |c| {
                    Rectangle::new(
                        [(c as f64, flip(r)), (c as f64 + 1.0, flip(r + 1))],
                        gradient(&VIRIDIS, norm(values[[r, c]])).filled(),
                    )
                })
            }))
            .map_err(draw_err)?;

        let to_px = |x: f64, y: f64| chart.backend_coord(&(x, y));
        draw_gene_axis(root, &canvas, &genes, &gene_runs, (0.0, n_rows as f64), to_px)?;

        let group_style = canvas
            .font(7.0)
            .into_text_style(root)
            .pos(Pos::new(HPos::Right, VPos::Center));
        for run in &row_runs {
            let mid = flip(run.start) - (run.end - run.start) as f64 / 2.0;
            let (x, y) = chart.backend_coord(&(-0.7, mid));
            root.draw(&Text::new(run.label.clone(), (x - canvas.pt(3.0) as i32, y), group_style.clone()))
                .map_err(draw_err)?;
        }

        draw_color_bar(&legend, &canvas, &VIRIDIS, (lo, hi), "expression")
    })?;

    Ok(PlotGrid {
        figure,
        panels: vec![
            "heatmap".to_string(),
            "groups".to_string(),
            "gene groups".to_string(),
            "color legend".to_string(),
        ],
    })
}

/// One dot per group and gene: area grows with the fraction of expressing observations, color
/// with the mean expression.
pub(super) fn render_dotplot(data: &PlotData, dpi: u32) -> Result<PlotGrid, Error> {
    let blocks = data.gene_blocks(N_GENES)?;
    let (genes, columns, gene_runs) = concat_blocks(&blocks);
    let (mean, fraction) = dot_stats(data, &columns);
    let (n_groups, n_genes) = mean.dim();
    let (lo, hi) = value_range(mean.iter().copied());
    let flip = |g: usize| (n_groups - g) as f64 - 0.5;

    let canvas = Canvas::new(
        (3.0 + 0.3 * n_genes as f64).max(4.0),
        (1.8 + 0.3 * n_groups as f64).max(3.0),
        dpi,
    );
    let max_radius = canvas.pt(5.5) as f64;
    let radius = |f: f64| (max_radius * f.powf(0.75)).round() as i32;

    let figure = canvas.render(|root| {
        let (w, h) = root.dim_in_pixel();
        let (main, legend) = root.split_horizontally(w.saturating_sub(canvas.pt(72.0)));
        let (color_legend, size_legend) = legend.split_vertically(h / 2);

        let mut chart = ChartBuilder::on(&main)
            .margin_top(canvas.pt(30.0))
            .margin_bottom(canvas.pt(56.0))
            .margin_left(canvas.pt(48.0))
            .margin_right(canvas.pt(6.0))
            .build_cartesian_2d(0.0..n_genes as f64, 0.0..n_groups.max(1) as f64)
            .map_err(draw_err)?;
        chart
            .configure_mesh()
            .disable_x_axis()
            .disable_y_axis()
            .x_labels(n_genes)
            .y_labels(n_groups)
            .light_line_style(WHITE)
            .bold_line_style(RGBColor(230, 230, 230))
            .draw()
            .map_err(draw_err)?;

        let (mean, fraction) = (&mean, &fraction);
        chart
            .draw_series(
                (0..n_groups)
                    .flat_map(|g| (0..n_genes).map(move |c| (g, c)))
                    .filter(|&(g, c)| fraction[[g, c]] > 0.0)
                    .map(|(g, c)| {
                        let color = gradient(&REDS, (mean[[g, c]] - lo) / (hi - lo));
                        Circle::new(
                            (c as f64 + 0.5, flip(g)),
                            radius(fraction[[g, c]]).max(1),
                            color.filled(),
                        )
                    }),
            )
            .map_err(draw_err)?;

        let to_px = |x: f64, y: f64| chart.backend_coord(&(x, y));
        draw_gene_axis(root, &canvas, &genes, &gene_runs, (0.0, n_groups as f64), to_px)?;

        let group_style = canvas
            .font(7.0)
            .into_text_style(root)
            .pos(Pos::new(HPos::Right, VPos::Center));
        for (g, label) in data.groups.labels.iter().enumerate() {
            let (x, y) = chart.backend_coord(&(0.0, flip(g)));
            root.draw(&Text::new(label.clone(), (x - canvas.pt(3.0) as i32, y), group_style.clone()))
                .map_err(draw_err)?;
        }

        draw_color_bar(&color_legend, &canvas, &REDS, (lo, hi), "Mean expression in group")?;

        let style = canvas
            .font(6.0)
            .into_text_style(&size_legend)
            .pos(Pos::new(HPos::Left, VPos::Center));
        let step = canvas.pt(14.0) as i32;
        let x = canvas.pt(6.0) as i32;
        size_legend
            .draw(&Text::new("Fraction of cells (%)".to_string(), (0, step / 2), style.clone()))
            .map_err(draw_err)?;
        for (k, f) in [0.2, 0.4, 0.6, 0.8, 1.0].iter().enumerate() {
            let y = step * (k as i32 + 1) + step / 2;
            size_legend
                .draw(&Circle::new((x, y), radius(*f), RGBColor(120, 120, 120).filled()))
                .map_err(draw_err)?;
            size_legend
                .draw(&Text::new(
                    format!("{}", (f * 100.0).round()),
                    (x + max_radius as i32 + canvas.pt(3.0) as i32, y),
                    style.clone(),
                ))
                .map_err(draw_err)?;
        }
        Ok(())
    })?;

    Ok(PlotGrid {
        figure,
        panels: vec![
            "dot plot".to_string(),
            "gene groups".to_string(),
            "color legend".to_string(),
            "size legend".to_string(),
        ],
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::plot::test::ranked_dataset;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_gradient_endpoints() {
        assert_eq!(gradient(&VIRIDIS, 0.0), RGBColor(68, 1, 84));
        assert_eq!(gradient(&VIRIDIS, 1.0), RGBColor(253, 231, 37));
        assert_eq!(gradient(&VIRIDIS, 2.0), RGBColor(253, 231, 37));
        assert_eq!(gradient(&VIRIDIS, f64::NAN), RGBColor(68, 1, 84));
        // midway between the first two of five anchors
        assert_eq!(gradient(&REDS, 0.125), RGBColor(254, 216, 201));
    }

    #[test]
    fn test_value_range() {
        assert_eq!(value_range(vec![2.0, f64::NAN, -1.0].into_iter()), (-1.0, 2.0));
        assert_eq!(value_range(vec![3.0, 3.0].into_iter()), (3.0, 4.0));
        assert_eq!(value_range(vec![f64::NAN].into_iter()), (0.0, 1.0));
    }

    #[test]
    fn test_heatmap_rows() {
        let ds = ranked_dataset();
        let data = PlotData::from_dataset(&ds).unwrap();
        let blocks = data.gene_blocks(2).unwrap();
        let (genes, columns, runs) = concat_blocks(&blocks);
        assert_eq!(genes, vec!["g0", "g3", "g1", "g3", "g2", "g3"]);
        assert_eq!(columns, vec![0, 3, 1, 3, 2, 3]);
        assert_eq!(runs[1], Run { label: "b".into(), start: 2, end: 4 });

        let (row_runs, values) = heatmap_rows(&data, &columns);
        assert_eq!(values.dim(), (6, 6));
        assert_eq!(row_runs.iter().map(|r| r.end - r.start).collect::<Vec<_>>(), vec![2, 2, 2]);
        // observation 2 is the first of group b and expresses g1
        assert_eq!(values[[2, 2]], 4.0);
        assert_eq!(values[[2, 0]], 0.0);
    }

    #[test]
    fn test_dot_stats() {
        let ds = ranked_dataset();
        let data = PlotData::from_dataset(&ds).unwrap();
        let (mean, fraction) = dot_stats(&data, &[0, 1, 3]);
        assert_eq!(mean.dim(), (3, 3));
        assert_abs_diff_eq!(mean[[0, 0]], 2.5);
        assert_abs_diff_eq!(mean[[1, 1]], 4.5);
        assert_abs_diff_eq!(fraction[[0, 0]], 1.0);
        assert_abs_diff_eq!(fraction[[0, 1]], 0.0);
        assert_abs_diff_eq!(fraction[[2, 2]], 0.0);
    }
}
