//! Run the command-line workflows: longitudinal updates, tree collapsing and ensemble summaries.

pub mod collapse;
pub mod summary;

pub use collapse::{collapse, CollapseArgs};
pub use summary::{summary, SummaryArgs};

use crate::longitudinal::{run_longitudinal, Longitudinal, LongitudinalConfig};
use crate::observation::read_panels;
use crate::stats::quadrature::QuadratureConfig;
use crate::update::{Method, UpdateConfig};
use crate::{utils, Ensemble, MarkerSelection};
use clap::Parser;
use color_eyre::eyre::{Report, Result, WrapErr};
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// File name of the resolved run arguments.
pub const ARGS_FILE: &str = "args.json";
/// File name of the per-timepoint reports.
pub const REPORTS_FILE: &str = "reports.json";

// ----------------------------------------------------------------------------
// UpdateArgs
// ----------------------------------------------------------------------------

/// Update a tree ensemble with longitudinal marker observations.
#[derive(Clone, Debug, Deserialize, Parser, PartialEq, Serialize)]
#[clap(verbatim_doc_comment)]
pub struct UpdateArgs {
    /// Prior tree ensemble (JSON, optionally zstd compressed).
    #[clap(short = 'e', long, required = true)]
    pub ensemble: PathBuf,

    /// Marker observations table (csv or tsv).
    ///
    /// Columns: date, gene, mutant_droplets, total_droplets
    #[clap(short = 'i', long, required = true)]
    pub observations: PathBuf,

    /// Markers to update with, comma separated.
    ///
    /// All observed markers are used if not given.
    #[clap(short = 'm', long, value_delimiter = ',')]
    pub markers: Vec<String>,

    /// Target read depth of the markers, shallower observations are reported.
    #[clap(short = 'd', long)]
    pub read_depth: Option<u64>,

    /// Update method.
    #[clap(long, value_enum, default_value_t = UpdateArgs::default().method)]
    pub method: Method,

    /// Significance level of the rejection methods (structure, fraction).
    #[clap(short = 'a', long, default_value_t = UpdateArgs::default().alpha)]
    pub alpha: f64,

    /// Sample index of the clonal prevalences (fraction), the mean of all samples if not given.
    #[clap(long)]
    pub sample: Option<usize>,

    /// Only update at these timepoints, comma separated.
    #[clap(long, value_delimiter = ',')]
    pub timepoints: Vec<String>,

    /// Maximum number of subintervals of the numerical integration (bayesian).
    #[clap(long, default_value_t = UpdateArgs::default().max_subdivisions)]
    pub max_subdivisions: usize,

    /// Output directory.
    ///
    /// If the directory does not exist, it will be created.
    #[clap(short = 'o', long, required = true)]
    pub output_dir: PathBuf,

    /// Number of CPU threads to use.
    #[clap(short = 't', long, default_value_t = UpdateArgs::default().threads)]
    #[serde(skip)]
    pub threads: usize,
}

impl Default for UpdateArgs {
    fn default() -> Self {
        UpdateArgs {
            ensemble: PathBuf::new(),
            observations: PathBuf::new(),
            markers: Vec::new(),
            read_depth: None,
            method: Method::default(),
            alpha: UpdateConfig::default().alpha,
            sample: None,
            timepoints: Vec::new(),
            max_subdivisions: QuadratureConfig::default().max_subdivisions,
            output_dir: PathBuf::new(),
            threads: 1,
        }
    }
}

impl UpdateArgs {
    /// Returns the [`LongitudinalConfig`] of these arguments.
    pub fn config(&self) -> LongitudinalConfig {
        let quadrature = QuadratureConfig { max_subdivisions: self.max_subdivisions, ..Default::default() };
        LongitudinalConfig {
            selection: MarkerSelection { markers: self.markers.clone(), read_depth: self.read_depth },
            overrides: Default::default(),
            timepoints: self.timepoints.clone(),
            update: UpdateConfig { method: self.method, alpha: self.alpha, sample: self.sample, quadrature },
            output_dir: Some(self.output_dir.clone()),
        }
    }

    /// Reads [`UpdateArgs`] from a JSON file.
    pub fn read<P>(path: &P) -> Result<UpdateArgs, Report>
    where
        P: AsRef<Path> + Debug,
    {
        let input = utils::read_text(path)?;
        serde_json::from_str(&input).wrap_err_with(|| format!("Failed to deserialize run arguments: {path:?}"))
    }

    /// Writes [`UpdateArgs`] to a JSON file.
    pub fn write<P>(&self, path: &P) -> Result<(), Report>
    where
        P: AsRef<Path> + Debug,
    {
        let output = serde_json::to_string_pretty(self)
            .wrap_err_with(|| format!("Failed to serialize run arguments: {self:?}"))?;
        utils::write_text(path, &output).wrap_err_with(|| format!("Failed to write run arguments: {path:?}"))
    }
}

// ----------------------------------------------------------------------------
// Run
// ----------------------------------------------------------------------------

/// Updates a tree ensemble with every timepoint of the marker observations.
///
/// Writes into the output directory:
///
/// - `args.json`: the resolved arguments.
/// - `<timepoint>.json`: the posterior ensemble of each timepoint.
/// - `trajectory.tsv`: the weight of each tree after each timepoint.
/// - `clone_frequencies.tsv`: the clone frequencies of the dominant tree at each timepoint.
/// - `reports.json`: a summary of each timepoint update.
pub fn update(args: &UpdateArgs) -> Result<Longitudinal, Report> {
    std::fs::create_dir_all(&args.output_dir)
        .wrap_err_with(|| format!("Failed to create output directory: {:?}", args.output_dir))?;
    args.write(&args.output_dir.join(ARGS_FILE))?;

    let prior = Ensemble::read(&args.ensemble)?;
    let panels = read_panels(&args.observations)?;
    info!("Updating {} trees with {} timepoints.", prior.len(), panels.len());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build()
        .wrap_err("Failed to create the thread pool.")?;
    let result = pool.install(|| run_longitudinal(&prior, &panels, &args.config()))?;

    let path = args.output_dir.join(REPORTS_FILE);
    info!("Writing timepoint reports: {path:?}");
    let reports = serde_json::to_string_pretty(&result.reports)
        .wrap_err_with(|| format!("Failed to serialize timepoint reports: {path:?}"))?;
    utils::write_text(&path, &reports)?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cli;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn parse_update_args() -> Result<(), Report> {
        let input = ["clonetrack", "update", "-e", "prior.json", "-i", "ddpcr.csv", "-m", "TP53,KRAS", "-o", "out"];
        let Cli { command: crate::cli::Command::Update(args), .. } = Cli::parse_from(input) else {
            return Err(color_eyre::eyre::eyre!("Expected the update command."));
        };
        assert_eq!(args.markers, ["TP53", "KRAS"]);
        assert_eq!(args.method, Method::Bayesian);
        assert_eq!(args.alpha, 0.05);
        assert_eq!(args.threads, 1);
        Ok(())
    }

    #[test]
    fn update_writes_outputs() -> Result<(), Report> {
        let dir = tempdir()?;
        let ensemble = dir.path().join("prior.json");
        fs::write(
            &ensemble,
            indoc::indoc! {r#"
                {
                  "tree_structure": [{"0": [1], "1": [2]}, {"0": [1, 2]}],
                  "node_dict_name": [{"1": ["TP53"], "2": ["KRAS"]}, {"1": ["TP53"], "2": ["KRAS"]}],
                  "freq": [10, 10]
                }
            "#},
        )?;
        let observations = dir.path().join("ddpcr.csv");
        fs::write(
            &observations,
            indoc::indoc! {"
                date,gene,mutant_droplets,total_droplets
                2021-03-01,TP53,800,1000
                2021-03-01,KRAS,500,1000
                2021-06-01,TP53,50,1000
                2021-06-01,KRAS,300,1000
            "},
        )?;

        let output_dir = dir.path().join("out");
        let args = UpdateArgs { ensemble, observations, output_dir: output_dir.clone(), method: Method::Structure, ..Default::default() };
        let result = update(&args)?;

        // the chain has TP53 above KRAS, rejected at the second timepoint
        // the siblings have no order constraint
        assert_eq!(result.members, [1]);
        for file in [ARGS_FILE, REPORTS_FILE, "trajectory.tsv", "clone_frequencies.tsv", "2021-03-01.json", "2021-06-01.json"] {
            assert!(output_dir.join(file).exists(), "{file}");
        }
        let written = UpdateArgs::read(&output_dir.join(ARGS_FILE))?;
        assert_eq!(written.method, Method::Structure);
        Ok(())
    }
}
