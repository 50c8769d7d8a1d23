use super::figure::{draw_err, span, Canvas, Figure};
use super::{PlotData, N_GENES};
use anyhow::Error;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{FontTransform, IntoTextStyle};

/// Panels per row
const N_COLS: usize = 4;

/// Rows and columns of a grid holding `n` panels.
pub(super) fn grid_shape(n: usize) -> (usize, usize) {
    let cols = n.clamp(1, N_COLS);
    let rows = (n + cols - 1) / cols;
    (rows.max(1), cols)
}

/// One panel per group: the scores of its top genes, each labeled with the gene name.
pub(super) fn render(data: &PlotData, dpi: u32) -> Result<Figure, Error> {
    let groups = &data.result.groups;
    let (rows, cols) = grid_shape(groups.len());
    let canvas = Canvas::new(3.2 * cols as f64, 3.2 * rows as f64, dpi);

    canvas.render(|root| {
        let panels = root.split_evenly((rows, cols));
        for (ranking, area) in groups.iter().zip(panels.iter()) {
            let n = ranking.len().min(N_GENES);
            let scores = &ranking.scores[..n];
            let (y0, y1) = span(scores.iter().copied(), false);
            // room above the highest score for the vertical gene names
            let y1 = y1 + (y1 - y0) * 0.35;

            let mut chart = ChartBuilder::on(area)
                .caption(data.title(&ranking.group), canvas.font(10.0))
                .margin(canvas.pt(4.0))
                .x_label_area_size(canvas.pt(18.0))
                .y_label_area_size(canvas.pt(28.0))
                .build_cartesian_2d(-0.9..(n as f64 - 0.1), y0..y1)
                .map_err(draw_err)?;
            chart
                .configure_mesh()
                .disable_mesh()
                .x_labels(0)
                .x_desc("ranking")
                .y_desc("score")
                .label_style(canvas.font(7.0))
                .axis_desc_style(canvas.font(8.0))
                .draw()
                .map_err(draw_err)?;

            let font = canvas
                .font(8.0)
                .transform(FontTransform::Rotate270)
                .into_text_style(area)
                .pos(Pos::new(HPos::Left, VPos::Center));
            chart
                .draw_series(
                    ranking.names[..n]
                        .iter()
                        .zip(scores)
                        .enumerate()
                        .map(|(i, (gene, &score))| Text::new(gene.clone(), (i as f64, score), font.clone())),
                )
                .map_err(draw_err)?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_grid_shape() {
        assert_eq!(grid_shape(1), (1, 1));
        assert_eq!(grid_shape(3), (1, 3));
        assert_eq!(grid_shape(4), (1, 4));
        assert_eq!(grid_shape(5), (2, 4));
        assert_eq!(grid_shape(9), (3, 4));
        assert_eq!(grid_shape(0), (1, 1));
    }
}
