//! Figures summarizing a differential expression result: ranked genes per group, expression
//! heatmap, dot plot, violins and a volcano plot. Figures are rendered to RGB rasters with
//! `plotters` and exported as PNG.

mod figure;
mod matrix;
mod ranked;
mod violin;
mod volcano;

pub use figure::{Canvas, Figure, PlotGrid};
pub use volcano::volcano_points;

use anyhow::{bail, format_err, Error};
use scan_types::{Dataset, ExprMatrix, LabelClass, RankGenesResult};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Genes shown per group
pub const N_GENES: usize = 10;

/// Resolution of exported figures
pub const EXPORT_DPI: u32 = 300;

/// The five figures a differential expression result can be drawn as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlotKind {
    /// Scores of the top genes, one panel per group
    RankedGenes,
    /// Expression of the top genes in every observation
    Heatmap,
    /// Fraction of expressing observations and mean expression per group
    DotPlot,
    /// Expression distribution of the top genes, one figure per group
    Violin,
    /// Log fold change against adjusted p-value for the first group
    Volcano,
}

impl PlotKind {
    /// Every plot kind, in menu order
    pub const ALL: [PlotKind; 5] = [
        PlotKind::RankedGenes,
        PlotKind::Heatmap,
        PlotKind::DotPlot,
        PlotKind::Violin,
        PlotKind::Volcano,
    ];

    /// Display label, also the stem of the exported file name
    pub fn label(&self) -> &'static str {
        match self {
            PlotKind::RankedGenes => "Ranked Genes",
            PlotKind::Heatmap => "Heatmap",
            PlotKind::DotPlot => "Dotplot",
            PlotKind::Violin => "Violin",
            PlotKind::Volcano => "Volcano",
        }
    }

    /// Name of the exported PNG
    pub fn file_name(&self) -> String {
        format!("{}.png", self.label())
    }
}

impl fmt::Display for PlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PlotKind {
    type Err = Error;

    /// Accepts the label in any case, with or without spaces, dashes or underscores.
    fn from_str(s: &str) -> Result<PlotKind, Error> {
        let key = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_lowercase();
        PlotKind::ALL
            .iter()
            .copied()
            .find(|k| k.label().replace(' ', "").to_lowercase() == key)
            .ok_or_else(|| {
                let labels = PlotKind::ALL.iter().map(|k| k.label()).collect::<Vec<_>>();
                format_err!("unknown plot {:?}, expected one of {}", s, labels.join(", "))
            })
    }
}

/// What a renderer produced: one figure, one figure per group, or a figure wrapped with its
/// panel layout.
#[derive(Clone, Debug)]
pub enum RenderOutput {
    /// A single figure
    Single(Figure),
    /// Several figures
    Many(Vec<Figure>),
    /// A multi-panel figure and its panel names
    Wrapped(PlotGrid),
}

impl RenderOutput {
    /// The figure to export: the first of a list, or the figure inside a grid.
    pub fn into_figure(self) -> Result<Figure, Error> {
        match self {
            RenderOutput::Single(fig) => Ok(fig),
            RenderOutput::Many(figs) => match figs.into_iter().next() {
                Some(fig) => Ok(fig),
                None => bail!("the plot produced no figure"),
            },
            RenderOutput::Wrapped(grid) => Ok(grid.figure),
        }
    }
}

/// Top genes of one ranked group with their columns in the expression matrix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneBlock {
    /// Group the genes were ranked for
    pub group: String,
    /// Gene names, best first
    pub genes: Vec<String>,
    /// Column of each gene in the expression matrix
    pub columns: Vec<usize>,
}

/// A differential expression result together with the expression values and grouping it was
/// computed from.
pub struct PlotData<'a> {
    /// The ranking
    pub result: &'a RankGenesResult,
    /// Expression the ranking was computed on
    pub x: &'a ExprMatrix,
    /// Names of the columns of `x`
    pub gene_names: &'a [String],
    /// Observations of each non-empty group of `result.groupby`
    pub groups: LabelClass,
}

impl<'a> PlotData<'a> {
    /// Collect the inputs of every plot from a dataset holding a ranking.
    pub fn from_dataset(ds: &'a Dataset) -> Result<PlotData<'a>, Error> {
        let result = ds
            .rank_genes()
            .ok_or_else(|| format_err!("the dataset holds no differential expression result"))?;
        let column = ds
            .obs
            .get(&result.groupby)
            .ok_or_else(|| format_err!("grouping column '{}' is missing", result.groupby))?;
        let mut groups = LabelClass::from_column(column)?;
        groups.drop_empty();
        let (x, gene_names) = ds.expression_source();
        Ok(PlotData {
            result,
            x,
            gene_names,
            groups,
        })
    }

    /// The `n` best genes of every ranked group.
    pub fn gene_blocks(&self, n: usize) -> Result<Vec<GeneBlock>, Error> {
        let lookup = self
            .gene_names
            .iter()
            .enumerate()
            .map(|(i, g)| (g.as_str(), i))
            .collect::<HashMap<_, _>>();
        self.result
            .groups
            .iter()
            .map(|ranking| {
                let genes = ranking.top(n).to_vec();
                let columns = genes
                    .iter()
                    .map(|g| {
                        lookup
                            .get(g.as_str())
                            .copied()
                            .ok_or_else(|| format_err!("ranked gene '{}' is not in the expression matrix", g))
                    })
                    .collect::<Result<Vec<_>, Error>>()?;
                Ok(GeneBlock {
                    group: ranking.group.clone(),
                    genes,
                    columns,
                })
            })
            .collect()
    }

    /// Expression of gene column `col` in the observations `obs`.
    pub fn values(&self, obs: &[usize], col: usize) -> Vec<f64> {
        obs.iter().map(|&i| self.x.get(i, col)).collect()
    }

    /// Observations of the named group.
    pub fn members(&self, group: &str) -> Result<&[usize], Error> {
        self.groups
            .get_indices(group)
            .ok_or_else(|| format_err!("group '{}' has no observations", group))
    }

    /// Grouped observations outside the named group.
    pub fn others(&self, group: &str) -> Vec<usize> {
        (0..self.groups.len())
            .filter(|&g| self.groups.labels[g] != group)
            .flat_map(|g| self.groups.group(g).iter().copied())
            .collect()
    }

    fn title(&self, group: &str) -> String {
        format!("{} vs. {}", group, self.result.reference)
    }
}

/// Draw `kind` from the ranking stored in `ds`, at `dpi` pixels per inch.
pub fn render(kind: PlotKind, ds: &Dataset, dpi: u32) -> Result<RenderOutput, Error> {
    let data = PlotData::from_dataset(ds)?;
    if data.result.groups.is_empty() {
        bail!("the differential expression result has no groups");
    }
    match kind {
        PlotKind::RankedGenes => ranked::render(&data, dpi).map(RenderOutput::Single),
        PlotKind::Heatmap => matrix::render_heatmap(&data, dpi).map(RenderOutput::Wrapped),
        PlotKind::DotPlot => matrix::render_dotplot(&data, dpi).map(RenderOutput::Wrapped),
        PlotKind::Violin => violin::render(&data, dpi).map(RenderOutput::Many),
        PlotKind::Volcano => volcano::render(&data, dpi).map(RenderOutput::Single),
    }
}
