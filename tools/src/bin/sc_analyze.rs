// Command line utility for running a single-cell analysis end to end

use anyhow::{bail, Context, Error};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use log::{info, LevelFilter};
use scan_rs::pipeline::{MIN_CELLS_RANGE, MIN_GENES_RANGE};
use scan_rs::{GroupingSelection, PlotKind, PreprocessParams, Session};
use scan_types::{Method, Reference};
use serde::Deserialize;
use std::fs::{create_dir_all, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Ranked genes printed per group
const N_SHOWN: usize = 5;

/// Settings that can also be given as a JSON file with `--params`. Flags on the command line
/// take precedence.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RunConfig {
    #[serde(flatten)]
    preprocess: PreprocessParams,
    groupby: Option<String>,
    reference: Option<String>,
    reference_group: Option<String>,
    method: Option<Method>,
    plots: Vec<String>,
}

impl RunConfig {
    fn from_json(path: &Path) -> Result<RunConfig, Error> {
        let reader = BufReader::new(File::open(path).with_context(|| path.display().to_string())?);
        serde_json::from_reader(reader).with_context(|| format!("parsing {}", path.display()))
    }

    fn merge_args(mut self, matches: &ArgMatches) -> Result<RunConfig, Error> {
        if let Some(&v) = matches.get_one::<u32>("MIN_GENES") {
            self.preprocess.min_genes = v;
        }
        if let Some(&v) = matches.get_one::<u32>("MIN_CELLS") {
            self.preprocess.min_cells = v;
        }
        if let Some(v) = matches.get_one::<String>("GROUPBY") {
            self.groupby = Some(v.clone());
        }
        if let Some(v) = matches.get_one::<String>("REFERENCE") {
            self.reference = Some(v.clone());
            self.reference_group = None;
        }
        if let Some(v) = matches.get_one::<String>("REFERENCE_GROUP") {
            self.reference_group = Some(v.clone());
            self.reference = None;
        }
        if let Some(v) = matches.get_one::<String>("METHOD") {
            self.method = Some(v.parse()?);
        }
        if let Some(v) = matches.get_many::<String>("PLOT") {
            self.plots = v.cloned().collect();
        }
        Ok(self)
    }

    /// `reference_group` always names a group, so a category literally called "rest" stays
    /// reachable.
    fn reference(&self) -> Reference {
        match (&self.reference_group, &self.reference) {
            (Some(group), _) => Reference::Group(group.clone()),
            (None, Some(r)) => Reference::from(r.as_str()),
            (None, None) => Reference::Rest,
        }
    }

    fn plot_kinds(&self) -> Result<Vec<PlotKind>, Error> {
        let mut kinds = Vec::new();
        for p in &self.plots {
            let requested = if p.eq_ignore_ascii_case("all") {
                PlotKind::ALL.to_vec()
            } else {
                vec![p.parse::<PlotKind>()?]
            };
            for kind in requested {
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
        }
        Ok(kinds)
    }
}

fn cli() -> Command {
    Command::new("sc-analyze")
        .about("Preprocess an .h5ad dataset, rank marker genes and export figures")
        .arg(
            Arg::new("INPUT")
                .help(".h5ad file to analyze")
                .required(true)
                .index(1)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("MIN_GENES")
                .help(format!(
                    "Minimum detected genes per cell [{}-{}, default 200]",
                    MIN_GENES_RANGE.start(),
                    MIN_GENES_RANGE.end()
                ))
                .long("min-genes")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("MIN_CELLS")
                .help(format!(
                    "Minimum cells expressing a gene [{}-{}, default 3]",
                    MIN_CELLS_RANGE.start(),
                    MIN_CELLS_RANGE.end()
                ))
                .long("min-cells")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("GROUPBY")
                .help("Observation column to compare groups of")
                .short('g')
                .long("groupby"),
        )
        .arg(
            Arg::new("REFERENCE")
                .help("Group to compare against, or 'rest' for all other observations")
                .short('r')
                .long("reference"),
        )
        .arg(
            Arg::new("REFERENCE_GROUP")
                .help("Group to compare against, even one named 'rest'")
                .long("reference-group")
                .conflicts_with("REFERENCE"),
        )
        .arg(
            Arg::new("METHOD")
                .help("Differential expression test")
                .short('m')
                .long("method")
                .value_parser(Method::ALL.map(|m| m.as_str())),
        )
        .arg(
            Arg::new("PLOT")
                .help("Figure to export: ranked_genes, heatmap, dotplot, violin, volcano or all")
                .short('p')
                .long("plot")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("OUT_DIR")
                .help("Output directory")
                .short('o')
                .long("out-dir")
                .default_value(".")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("PARAMS")
                .help("JSON file with min_genes, min_cells, groupby, reference, reference_group, method and plots")
                .long("params")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("SAVE")
                .help("Write the preprocessed dataset to this .h5ad file")
                .long("save")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("LIST_GROUPS")
                .help("List the grouping columns and their values, then exit")
                .long("list-groups")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("VERBOSE")
                .help("Log debug messages")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue),
        )
}

fn list_groups(session: &Session) -> Result<(), Error> {
    let columns = session.grouping_columns();
    if columns.is_empty() {
        println!("no column can group observations");
    }
    for column in columns {
        let options = session.reference_options(&column)?;
        println!("{}: {}", column, options.join(", "));
    }
    Ok(())
}

pub fn main() -> Result<(), Error> {
    let matches = cli().get_matches();

    let level = if matches.get_flag("VERBOSE") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();

    let input: &PathBuf = matches.get_one("INPUT").context("no input file")?;
    let out_dir: &PathBuf = matches.get_one("OUT_DIR").context("no output directory")?;
    let config = match matches.get_one::<PathBuf>("PARAMS") {
        Some(path) => RunConfig::from_json(path)?,
        None => RunConfig::default(),
    }
    .merge_args(&matches)?;
    let plots = config.plot_kinds()?;

    let mut session = Session::new();
    let summary = session.ingest_path(input)?;
    println!(
        "{}: {} cells x {} genes; metadata columns: {}",
        input.display(),
        summary.n_obs,
        summary.n_vars,
        summary.obs_columns.join(", ")
    );
    if matches.get_flag("LIST_GROUPS") {
        return list_groups(&session);
    }

    let pre = session.preprocess(&config.preprocess.clamped())?;
    println!(
        "preprocessed: {} cells x {} highly variable genes, {} leiden clusters",
        pre.n_obs, pre.n_vars, pre.n_clusters
    );

    if let Some(path) = matches.get_one::<PathBuf>("SAVE") {
        let ds = session.dataset().context("no dataset to save")?;
        h5ad_io::write_h5ad(ds, path)?;
        info!("saved preprocessed dataset to {}", path.display());
    }

    let groupby = match config.groupby {
        Some(g) => g,
        None => {
            if !plots.is_empty() {
                bail!("plots need a differential expression run: pass --groupby");
            }
            return Ok(());
        }
    };
    let selection = GroupingSelection {
        groupby,
        reference: config.reference(),
        method: config.method.unwrap_or(Method::Wilcoxon),
    };
    let result = session.rank_genes(&selection)?;
    for ranking in &result.groups {
        println!(
            "{} vs. {}: {}",
            ranking.group,
            result.reference,
            ranking.top(N_SHOWN).join(", ")
        );
    }

    if !plots.is_empty() && !out_dir.exists() {
        create_dir_all(out_dir).with_context(|| out_dir.display().to_string())?;
    }
    for kind in plots {
        let export = session.export_plot(kind)?;
        let path = out_dir.join(&export.file_name);
        std::fs::write(&path, &export.bytes).with_context(|| path.display().to_string())?;
        println!("wrote {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_flags_override_json() {
        let config: RunConfig =
            serde_json::from_str(r#"{"min_genes": 50, "groupby": "leiden", "method": "t-test"}"#).unwrap();
        assert_eq!(config.preprocess.min_genes, 50);
        assert_eq!(config.preprocess.min_cells, 3);
        assert_eq!(config.method, Some(Method::TTest));

        let matches = cli()
            .try_get_matches_from(["sc-analyze", "in.h5ad", "--min-cells", "5", "-p", "volcano", "-p", "all"])
            .unwrap();
        let config = config.merge_args(&matches).unwrap();
        assert_eq!(config.preprocess.min_genes, 50);
        assert_eq!(config.preprocess.min_cells, 5);
        assert_eq!(config.groupby.as_deref(), Some("leiden"));
        let kinds = config.plot_kinds().unwrap();
        assert_eq!(kinds.len(), 5);
        assert_eq!(kinds[0], PlotKind::Volcano);
    }

    #[test]
    fn test_reference_group_named_rest() {
        let parse = |args: &[&str]| {
            let matches = cli()
                .try_get_matches_from(["sc-analyze", "in.h5ad"].iter().chain(args))
                .unwrap();
            RunConfig::default().merge_args(&matches).unwrap().reference()
        };
        assert_eq!(parse(&[]), Reference::Rest);
        assert_eq!(parse(&["-r", "rest"]), Reference::Rest);
        assert_eq!(parse(&["-r", "T cell"]), Reference::Group("T cell".into()));
        assert_eq!(parse(&["--reference-group", "rest"]), Reference::Group("rest".into()));
        assert!(cli()
            .try_get_matches_from(["sc-analyze", "in.h5ad", "-r", "rest", "--reference-group", "rest"])
            .is_err());

        let config: RunConfig = serde_json::from_str(r#"{"reference_group": "rest"}"#).unwrap();
        assert_eq!(config.reference(), Reference::Group("rest".into()));
    }

    #[test]
    fn test_bad_plot_name() {
        let config = RunConfig {
            plots: vec!["pie".into()],
            ..RunConfig::default()
        };
        assert!(config.plot_kinds().is_err());
    }
}
