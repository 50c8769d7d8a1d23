use super::figure::{draw_err, span, Canvas, Figure};
use super::matrix::draw_gene_axis;
use super::{PlotData, N_GENES};
use anyhow::Error;
use plotters::prelude::*;
use scan_types::Reference;

/// Points along each violin's outline
const N_GRID: usize = 64;
/// Widest half-violin, in units of the gene spacing
const HALF_WIDTH: f64 = 0.4;

/// Gaussian kernel density of `values` at each point of `grid`, with Scott's bandwidth.
/// None when the values have no spread.
pub(super) fn kde(values: &[f64], grid: &[f64]) -> Option<Vec<f64>> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let bw = var.sqrt() * (n as f64).powf(-0.2);
    if !(bw > 0.0) {
        return None;
    }
    let norm = 1.0 / (n as f64 * bw * (2.0 * std::f64::consts::PI).sqrt());
    Some(
        grid.iter()
            .map(|&y| {
                values
                    .iter()
                    .map(|&v| (-0.5 * ((y - v) / bw).powi(2)).exp())
                    .sum::<f64>()
                    * norm
            })
            .collect(),
    )
}

/// `n` evenly spaced points from `lo` to `hi`.
fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![lo];
    }
    (0..n).map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64).collect()
}

/// Outline of half a violin centered on `x`, extending left (`side = -1`) or right (`side = 1`),
/// clipped to the range of `values`. A constant sample is drawn as a flat tick.
pub(super) fn half_violin(values: &[f64], x: f64, side: f64) -> Vec<(f64, f64)> {
    let (lo, hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return Vec::new();
    }
    let grid = linspace(lo, hi, N_GRID);
    let density = match kde(values, &grid) {
        Some(d) => d,
        None => return vec![(x, lo), (x + side * HALF_WIDTH, lo), (x, lo)],
    };
    let peak = density.iter().cloned().fold(0.0, f64::max);
    let mut outline = grid
        .iter()
        .zip(&density)
        .map(|(&y, &d)| (x + side * HALF_WIDTH * d / peak, y))
        .collect::<Vec<_>>();
    outline.push((x, hi));
    outline.push((x, lo));
    outline
}

fn median(values: &[f64]) -> Option<f64> {
    let mut v = values.iter().copied().filter(|x| x.is_finite()).collect::<Vec<_>>();
    if v.is_empty() {
        return None;
    }
    v.sort_by(|a, b| a.total_cmp(b));
    let m = v.len() / 2;
    Some(if v.len() % 2 == 0 { (v[m - 1] + v[m]) / 2.0 } else { v[m] })
}

/// One figure per ranked group. Each top gene gets a split violin: the group on the left, the
/// observations it was compared with on the right.
pub(super) fn render(data: &PlotData, dpi: u32) -> Result<Vec<Figure>, Error> {
    let blocks = data.gene_blocks(N_GENES)?;
    let mut figures = Vec::with_capacity(blocks.len());

    for block in &blocks {
        let members = data.members(&block.group)?;
        let compared = match &data.result.reference {
            Reference::Rest => data.others(&block.group),
            Reference::Group(r) => data.members(r)?.to_vec(),
        };
        let halves = block
            .columns
            .iter()
            .map(|&col| (data.values(members, col), data.values(&compared, col)))
            .collect::<Vec<_>>();

        let n_genes = block.genes.len();
        let (y0, y1) = span(halves.iter().flat_map(|(a, b)| a.iter().chain(b.iter()).copied()), true);
        let canvas = Canvas::new((1.5 + 0.5 * n_genes as f64).max(4.0), 3.5, dpi);
        let group_color = Palette99::pick(0).to_rgba();
        let other_color = RGBColor(160, 160, 160);

        let figure = canvas.render(|root| {
            let mut chart = ChartBuilder::on(root)
                .caption(data.title(&block.group), canvas.font(10.0))
                .margin(canvas.pt(6.0))
                .margin_bottom(canvas.pt(56.0))
                .y_label_area_size(canvas.pt(32.0))
                .build_cartesian_2d(-0.6..(n_genes as f64 - 0.4), y0..y1)
                .map_err(draw_err)?;
            chart
                .configure_mesh()
                .disable_mesh()
                .disable_x_axis()
                .y_desc("expression")
                .label_style(canvas.font(7.0))
                .axis_desc_style(canvas.font(8.0))
                .draw()
                .map_err(draw_err)?;

            chart
                .draw_series(
                    halves
                        .iter()
                        .enumerate()
                        .map(|(i, (g, _))| Polygon::new(half_violin(g, i as f64, -1.0), group_color.mix(0.8).filled())),
                )
                .map_err(draw_err)?
                .label(block.group.clone())
                .legend(move |(x, y)| Rectangle::new([(x, y - 4), (x + 8, y + 4)], group_color.filled()));
            chart
                .draw_series(
                    halves
                        .iter()
                        .enumerate()
                        .map(|(i, (_, o))| Polygon::new(half_violin(o, i as f64, 1.0), other_color.mix(0.8).filled())),
                )
                .map_err(draw_err)?
                .label(data.result.reference.to_string())
                .legend(move |(x, y)| Rectangle::new([(x, y - 4), (x + 8, y + 4)], other_color.filled()));

            let stroke = BLACK.stroke_width(canvas.pt(0.6));
            chart
                .draw_series(halves.iter().enumerate().flat_map(|(i, (g, o))| {
                    let x = i as f64;
                    let left = median(g).map(|m| PathElement::new(vec![(x - 0.2, m), (x, m)], stroke));
                    let right = median(o).map(|m| PathElement::new(vec![(x, m), (x + 0.2, m)], stroke));
                    left.into_iter().chain(right)
                }))
                .map_err(draw_err)?;

            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperRight)
                .label_font(canvas.font(7.0))
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()
                .map_err(draw_err)?;

            let to_px = |x: f64, y: f64| chart.backend_coord(&(x - 0.5, y));
            draw_gene_axis(root, &canvas, &block.genes, &[], (y0, y1), to_px)
        })?;
        figures.push(figure);
    }
    Ok(figures)
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_kde_integrates_to_one() {
        let values = [0.0, 0.5, 1.0, 1.5, 4.0];
        let grid = linspace(-10.0, 15.0, 2501);
        let density = kde(&values, &grid).unwrap();
        let dx = grid[1] - grid[0];
        let area = density.iter().sum::<f64>() * dx;
        assert_approx_eq!(area, 1.0, 1e-3);
        assert!(density.iter().all(|&d| d >= 0.0));
    }

    #[test]
    fn test_kde_degenerate() {
        assert!(kde(&[1.0], &[1.0]).is_none());
        assert!(kde(&[2.0, 2.0, 2.0], &[2.0]).is_none());
    }

    #[test]
    fn test_half_violin() {
        let outline = half_violin(&[0.0, 1.0, 1.0, 2.0], 3.0, -1.0);
        assert_eq!(outline.len(), N_GRID + 2);
        assert!(outline.iter().all(|&(x, _)| (3.0 - HALF_WIDTH - 1e-9..=3.0).contains(&x)));
        assert!(outline.iter().any(|&(x, _)| (x - (3.0 - HALF_WIDTH)).abs() < 1e-9));
        assert!(half_violin(&[], 0.0, 1.0).is_empty());
        assert_eq!(half_violin(&[5.0, 5.0], 1.0, 1.0).len(), 3);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }
}
