use super::figure::{draw_err, span, Canvas, Figure};
use super::PlotData;
use anyhow::{bail, format_err, Error};
use plotters::prelude::*;

/// Volcano coordinates: x is the log fold change, y is `-log10` of the adjusted p-value.
pub fn volcano_points(logfoldchanges: &[f64], pvals_adj: &[f64]) -> Result<Vec<(f64, f64)>, Error> {
    if logfoldchanges.len() != pvals_adj.len() {
        bail!(
            "{} fold changes but {} adjusted p-values",
            logfoldchanges.len(),
            pvals_adj.len()
        );
    }
    Ok(logfoldchanges
        .iter()
        .zip(pvals_adj)
        .map(|(&lfc, &p)| (lfc, -p.log10()))
        .collect())
}

/// Every gene of the first ranked group.
pub(super) fn render(data: &PlotData, dpi: u32) -> Result<Figure, Error> {
    let ranking = &data.result.groups[0];
    let pvals_adj = ranking.pvals_adj.as_ref().ok_or_else(|| {
        format_err!(
            "the {} method does not produce p-values, so there is no volcano plot",
            data.result.method
        )
    })?;
    let points = volcano_points(&ranking.logfoldchanges, pvals_adj)?
        .into_iter()
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect::<Vec<_>>();

    let (x0, x1) = span(points.iter().map(|p| p.0), false);
    let (y0, y1) = span(points.iter().map(|p| p.1), true);

    let canvas = Canvas::new(6.0, 4.0, dpi);
    canvas.render(|root| {
        let mut chart = ChartBuilder::on(root)
            .caption("Volcano Plot", canvas.font(12.0))
            .margin(canvas.pt(6.0))
            .x_label_area_size(canvas.pt(28.0))
            .y_label_area_size(canvas.pt(36.0))
            .build_cartesian_2d(x0..x1, y0..y1)
            .map_err(draw_err)?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("logFC")
            .y_desc("-log10(p-adj)")
            .label_style(canvas.font(8.0))
            .axis_desc_style(canvas.font(10.0))
            .draw()
            .map_err(draw_err)?;

        let radius = canvas.pt(2.5) as i32;
        chart
            .draw_series(
                points
                    .iter()
                    .map(|&p| Circle::new(p, radius, BLUE.mix(0.6).filled())),
            )
            .map_err(draw_err)?;
        Ok(())
    })
}
