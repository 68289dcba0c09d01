//! Clone frequencies of the dominant tree at each timepoint.

use crate::{Member, Panel, Table};
use color_eyre::eyre::{Report, Result};
use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// File name of the clone frequency table.
pub const CLONE_FREQUENCY_FILE: &str = "clone_frequencies.tsv";

/// Clone label of the [`CloneFrequencies::remainder`] in the clone frequency table.
pub const REMAINDER: &str = "remainder";

/// The frequency of every clone of one tree at one timepoint.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct CloneFrequencies {
    pub timepoint: String,
    /// Index (in the initial prior) of the member the clones belong to.
    pub member: usize,
    /// Mean marker fraction of every clone with assigned mutations.
    pub clones: BTreeMap<usize, f64>,
    /// Frequency of the internal clones, the total minus the leaf clones.
    pub remainder: f64,
}

impl CloneFrequencies {
    /// Returns the clone frequencies of `member` (initial index `index`) observed in `panel`.
    ///
    /// ```rust
    /// use clonetrack::{Member, Observation, Panel};
    /// use clonetrack::longitudinal::clone_frequency::CloneFrequencies;
    ///
    /// let (tree, assignment) = clonetrack_phylo::examples::chain()?;
    /// let panel = Panel::new("t1", vec![Observation::new("TP53", 60, 100)?, Observation::new("KRAS", 20, 100)?]);
    /// let frequencies = CloneFrequencies::new(&panel, 0, &Member::new(tree, assignment, 1.0));
    /// assert_eq!(frequencies.clones[&1], 0.6);
    /// assert!((frequencies.remainder - 0.6).abs() < 1e-12);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn new(panel: &Panel, index: usize, member: &Member) -> Self {
        let clones = clone_frequencies(member, panel);
        let remainder = subtree_remainder(member, &clones);
        debug!("Timepoint {}: clone frequencies of member {index}: {clones:?}, remainder {remainder:.6}", panel.timepoint);
        CloneFrequencies { timepoint: panel.timepoint.clone(), member: index, clones, remainder }
    }
}

/// Returns the mean fraction of the observed markers of each clone of `member`.
///
/// Clones whose mutations were not observed have a frequency of 0.
pub fn clone_frequencies(member: &Member, panel: &Panel) -> BTreeMap<usize, f64> {
    member
        .assignment
        .iter()
        .map(|(node, mutations)| {
            let fractions = mutations.iter().filter_map(|m| panel.get(m)).map(|o| o.fraction()).collect_vec();
            let frequency = match fractions.is_empty() {
                true => 0.0,
                false => fractions.iter().sum::<f64>() / fractions.len() as f64,
            };
            (node, frequency)
        })
        .collect()
}

/// Returns the summed frequency of the `clones` minus that of the leaf clones, at least 0.
pub fn subtree_remainder(member: &Member, clones: &BTreeMap<usize, f64>) -> f64 {
    let total: f64 = clones.values().sum();
    let leaves: f64 = clones.iter().filter(|(node, _)| member.tree.is_leaf(**node)).map(|(_, f)| f).sum();
    (total - leaves).max(0.0)
}

/// Returns a table with one row per timepoint and clone, the remainder last.
pub fn to_table(frequencies: &[CloneFrequencies]) -> Result<Table<String>, Report> {
    let mut table = Table::new();
    table.headers = ["timepoint", "member", "clone", "frequency"].iter().map(|h| h.to_string()).collect();
    for timepoint in frequencies {
        let clones = timepoint.clones.iter().map(|(node, f)| (node.to_string(), *f));
        for (clone, frequency) in clones.chain([(REMAINDER.to_string(), timepoint.remainder)]) {
            table.add_row(vec![timepoint.timepoint.clone(), timepoint.member.to_string(), clone, format!("{frequency:.6}")])?;
        }
    }
    Ok(table)
}

/// Writes the clone frequency table into `dir`.
pub fn write_clone_frequencies(frequencies: &[CloneFrequencies], dir: &Path) -> Result<(), Report> {
    let path = dir.join(CLONE_FREQUENCY_FILE);
    info!("Writing clone frequencies: {path:?}");
    to_table(frequencies)?.write(&path)
}
