//! Sequential updates of a tree ensemble across timepoints.

pub mod clone_frequency;

use crate::ensemble::summary::{dominant, entropy};
use clone_frequency::{write_clone_frequencies, CloneFrequencies};
use crate::ensemble::normalize;
use crate::update::{update, UpdateConfig};
use crate::{Ensemble, MarkerSelection, Panel, Table};
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use structdoc::StructDoc;

/// File name of the weight trajectory table.
pub const TRAJECTORY_FILE: &str = "trajectory.tsv";

// ----------------------------------------------------------------------------
// Config
// ----------------------------------------------------------------------------

/// Settings of a [`run_longitudinal`] series.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct LongitudinalConfig {
    /// Markers used at every timepoint, all observed markers if empty.
    pub selection: MarkerSelection,
    /// Markers used at specific timepoints instead of the default `selection`.
    pub overrides: BTreeMap<String, MarkerSelection>,
    /// Only update at these timepoints, all timepoints if empty.
    pub timepoints: Vec<String>,
    pub update: UpdateConfig,
    /// Directory where each posterior ensemble is written.
    pub output_dir: Option<PathBuf>,
}

// ----------------------------------------------------------------------------
// Report
// ----------------------------------------------------------------------------

/// Summary of the update at one timepoint.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, StructDoc)]
pub struct TimepointReport {
    pub timepoint: String,
    /// Markers the ensemble was updated with.
    pub markers_used: Vec<String>,
    /// Selected markers that were not observed at this timepoint.
    pub markers_missing: Vec<String>,
    pub members_before: usize,
    pub members_after: usize,
    pub entropy_before: f64,
    pub entropy_after: f64,
    /// Index (in the initial prior) of the heaviest member after the update.
    pub dominant: Option<usize>,
    /// Weight of the dominant member, as a percentage.
    pub dominant_percent: f64,
    pub pairs_evaluated: usize,
    pub pairs_skipped: usize,
}

/// The weight of every initial member after each timepoint.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Trajectory {
    pub timepoints: Vec<String>,
    /// One row per initial member, one column per timepoint ([`None`] once rejected).
    pub weights: Vec<Vec<Option<f64>>>,
    /// Prior weights as percentages.
    pub prior: Vec<f64>,
}

impl Trajectory {
    fn new(prior: &Ensemble) -> Self {
        Trajectory {
            timepoints: Vec::new(),
            weights: vec![Vec::new(); prior.len()],
            prior: normalize(&prior.weights(), 100.0),
        }
    }

    /// Adds a timepoint column, `members` are the initial indices of the `posterior` members.
    fn push(&mut self, timepoint: &str, members: &[usize], posterior: &Ensemble) {
        self.timepoints.push(timepoint.to_string());
        let mut column = vec![None; self.weights.len()];
        for (member, weight) in members.iter().zip(posterior.weights()) {
            column[*member] = Some(weight);
        }
        self.weights.iter_mut().zip(column).for_each(|(row, weight)| row.push(weight));
    }

    /// Returns a table with one row per initial member, rejected members have an empty cell.
    pub fn to_table(&self) -> Result<Table<String>, Report> {
        let mut table = Table::new();
        table.headers = ["member", "prior"].iter().map(|h| h.to_string()).chain(self.timepoints.clone()).collect();
        for (i, (row, prior)) in self.weights.iter().zip(&self.prior).enumerate() {
            let cells = row.iter().map(|w| w.map(|w| format!("{w:.6}")).unwrap_or_default());
            table.add_row([i.to_string(), format!("{prior:.6}")].into_iter().chain(cells).collect())?;
        }
        Ok(table)
    }
}

/// The result of [`run_longitudinal`].
#[derive(Clone, Debug, PartialEq)]
pub struct Longitudinal {
    /// Ensemble after the last timepoint.
    pub posterior: Ensemble,
    /// Initial indices of the posterior members.
    pub members: Vec<usize>,
    pub reports: Vec<TimepointReport>,
    pub trajectory: Trajectory,
    /// Clone frequencies of the dominant member at each timepoint that has one.
    pub clone_frequencies: Vec<CloneFrequencies>,
}

// ----------------------------------------------------------------------------
// Run
// ----------------------------------------------------------------------------

/// Replaces characters of a timepoint that can not appear in a file name.
pub fn timepoint_file_name(timepoint: &str) -> String {
    let name = timepoint.replace(['/', '\\', ':'], "-");
    format!("{name}.json")
}

/// Updates the `prior` with the marker `panels` in timepoint order, each posterior is the next prior.
///
/// - With an `output_dir`, each posterior is written as `<timepoint>.json` before the next
///   timepoint starts, then the [`Trajectory`] as `trajectory.tsv` and the clone frequencies
///   as `clone_frequencies.tsv` at the end.
/// - Returns an error if a timepoint has none of its selected markers (no partial result is written).
/// - Returns an error if a requested timepoint was not observed.
pub fn run_longitudinal(prior: &Ensemble, panels: &[Panel], config: &LongitudinalConfig) -> Result<Longitudinal, Report> {
    let series = panels
        .iter()
        .filter(|p| config.timepoints.is_empty() || config.timepoints.contains(&p.timepoint))
        .sorted_by(|a, b| a.timepoint.cmp(&b.timepoint))
        .collect_vec();

    let missing = config.timepoints.iter().filter(|t| !series.iter().any(|p| p.timepoint == **t)).collect_vec();
    if !missing.is_empty() {
        return Err(eyre!("Timepoints were not found in the observations: {}", missing.iter().join(", "))
            .suggestion(format!("Observed: {}", panels.iter().map(|p| &p.timepoint).join(", "))));
    }
    if series.is_empty() {
        warn!("No timepoints to update with, the posterior is the prior.");
    }
    if let Some(dir) = &config.output_dir {
        std::fs::create_dir_all(dir).wrap_err_with(|| format!("Failed to create output directory: {dir:?}"))?;
    }

    let mut current = prior.clone();
    let mut members = (0..prior.len()).collect_vec();
    let mut reports = Vec::new();
    let mut trajectory = Trajectory::new(prior);
    let mut clone_frequencies = Vec::new();

    for panel in series {
        let selection = config.overrides.get(&panel.timepoint).unwrap_or(&config.selection);
        let selected = match selection.markers.is_empty() {
            true => panel.clone(),
            false => panel.select(selection).wrap_err("No usable marker evidence, the series can not continue.")?,
        };
        let markers_missing =
            selection.markers.iter().unique().filter(|m| panel.get(m).is_none()).cloned().collect_vec();

        let posterior = update(&current, &selected, &config.update)?;
        members = posterior.kept.iter().map(|k| members[*k]).collect();
        if posterior.ensemble.is_empty() && !current.is_empty() {
            warn!("Timepoint {}: no trees remain, later timepoints have nothing to update.", panel.timepoint);
        }

        let weights = posterior.ensemble.weights();
        let heaviest = dominant(&weights);
        let report = TimepointReport {
            timepoint: panel.timepoint.clone(),
            markers_used: selected.markers().iter().map(|m| m.to_string()).collect(),
            markers_missing,
            members_before: current.len(),
            members_after: posterior.ensemble.len(),
            entropy_before: entropy(&current.weights()),
            entropy_after: entropy(&weights),
            dominant: heaviest.map(|(i, _)| members[i]),
            dominant_percent: heaviest.map(|(i, _)| normalize(&weights, 100.0)[i]).unwrap_or_default(),
            pairs_evaluated: posterior.pairs_evaluated,
            pairs_skipped: posterior.pairs_skipped,
        };
        info!(
            "Timepoint {}: {} of {} trees, entropy {:.3} -> {:.3}",
            report.timepoint, report.members_after, report.members_before, report.entropy_before, report.entropy_after
        );

        if let Some((i, _)) = heaviest {
            clone_frequencies.push(CloneFrequencies::new(panel, members[i], &posterior.ensemble.members()[i]));
        }
        trajectory.push(&panel.timepoint, &members, &posterior.ensemble);
        if let Some(dir) = &config.output_dir {
            let path = dir.join(timepoint_file_name(&panel.timepoint));
            info!("Writing posterior ensemble: {path:?}");
            posterior.ensemble.write(&path)?;
        }
        reports.push(report);
        current = posterior.ensemble;
    }

    if let Some(dir) = &config.output_dir {
        write_trajectory(&trajectory, dir)?;
        write_clone_frequencies(&clone_frequencies, dir)?;
    }
    Ok(Longitudinal { posterior: current, members, reports, trajectory, clone_frequencies })
}

fn write_trajectory(trajectory: &Trajectory, dir: &Path) -> Result<(), Report> {
    let path = dir.join(TRAJECTORY_FILE);
    info!("Writing weight trajectory: {path:?}");
    trajectory.to_table()?.write(&path)
}
