//! Update a tree ensemble with the marker evidence of one timepoint.

pub mod bayesian;
pub mod rejection;
#[cfg(test)]
mod tests;

use crate::stats::quadrature::QuadratureConfig;
use crate::{Ensemble, Panel};
use clap::ValueEnum;
use color_eyre::eyre::{eyre, Report, Result};
use color_eyre::Help;
use itertools::Itertools;
use log::info;
use serde::{Deserialize, Serialize};
use structdoc::StructDoc;
use strum::{Display, EnumIter, EnumString};

// ----------------------------------------------------------------------------
// Method
// ----------------------------------------------------------------------------

/// The statistical [`Method`] used to update the ensemble.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    Eq,
    PartialEq,
    Serialize,
    StructDoc,
    ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Method {
    /// Reweight every tree by the likelihood of all marker pairs.
    #[default]
    Bayesian,
    /// Reject trees whose structure contradicts a marker pair (Wald test).
    Structure,
    /// Reject trees whose clonal prevalences contradict a marker count (chi-square test).
    Fraction,
}

// ----------------------------------------------------------------------------
// Config
// ----------------------------------------------------------------------------

/// Settings of a single timepoint update.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, StructDoc)]
pub struct UpdateConfig {
    /// Update method.
    pub method: Method,
    /// Significance level of the rejection methods, before multiple testing correction.
    pub alpha: f64,
    /// Sample index of the clonal prevalences (fraction method), the mean of all samples if absent.
    pub sample: Option<usize>,
    /// Numerical integration settings (bayesian method).
    pub quadrature: QuadratureConfig,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        UpdateConfig { method: Method::default(), alpha: 0.05, sample: None, quadrature: QuadratureConfig::default() }
    }
}

// ----------------------------------------------------------------------------
// Update
// ----------------------------------------------------------------------------

/// The posterior ensemble of one timepoint update.
#[derive(Clone, Debug, PartialEq)]
pub struct Update {
    /// Posterior ensemble, a new object, the prior is never modified.
    pub ensemble: Ensemble,
    /// Indices of the prior members kept in the posterior, in posterior order.
    pub kept: Vec<usize>,
    /// Marker pairs (or single markers) tested, summed over all trees.
    pub pairs_evaluated: usize,
    /// Marker pairs (or single markers) skipped because a marker was not in a tree.
    pub pairs_skipped: usize,
}

/// Returns every unordered pair `(i, j)` with `i < j < n`, in lexicographic order.
///
/// ```rust
/// use clonetrack::update::marker_pairs;
/// assert_eq!(marker_pairs(3), [(0, 1), (0, 2), (1, 2)]);
/// assert!(marker_pairs(1).is_empty());
/// ```
pub fn marker_pairs(n: usize) -> Vec<(usize, usize)> {
    (0..n).tuple_combinations().collect()
}

/// Updates the `prior` ensemble with the observations of one marker `panel`.
///
/// - [`Method::Bayesian`]: same trees, new weights that sum to 100.
/// - [`Method::Structure`] and [`Method::Fraction`]: the subset of trees that were
///   not rejected, with their prior weights.
///
/// Returns an error if the panel has no observations, or if none of them can be tested
/// against any tree (no marker is assigned to a node, or no pair of markers shares a tree).
pub fn update(prior: &Ensemble, panel: &Panel, config: &UpdateConfig) -> Result<Update, Report> {
    if panel.is_empty() {
        return Err(eyre!("Timepoint {} has no marker observations to update with.", panel.timepoint));
    }
    if !(config.alpha > 0.0 && config.alpha < 1.0) {
        return Err(eyre!("Significance level alpha must be within (0, 1), found {}.", config.alpha));
    }
    info!(
        "Updating {} trees at timepoint {} with method {} and markers: {}",
        prior.len(),
        panel.timepoint,
        config.method,
        panel.markers().join(", ")
    );
    if !prior.is_empty() {
        let matched = panel
            .observations
            .iter()
            .any(|o| prior.members().iter().any(|m| m.assignment.node_of(&o.marker).is_some()));
        if !matched {
            return Err(unmatched(prior, panel, "None of the observed markers are assigned to a node in any tree."));
        }
    }

    let result = match config.method {
        Method::Bayesian => bayesian::update(prior, panel, &config.quadrature)?,
        Method::Structure => rejection::structure_filter(prior, panel, config.alpha)?,
        Method::Fraction => rejection::fraction_filter(prior, panel, config.alpha, config.sample)?,
    };

    // a single marker carries no pairwise evidence
    let testable = config.method == Method::Fraction || panel.len() >= 2;
    if !prior.is_empty() && testable && result.pairs_evaluated == 0 {
        return Err(unmatched(prior, panel, "No observed marker could be tested against any tree."));
    }
    Ok(result)
}

/// The error of a timepoint whose markers do not match the trees.
fn unmatched(prior: &Ensemble, panel: &Panel, message: &'static str) -> Report {
    let mutations = prior
        .members()
        .iter()
        .flat_map(|m| m.assignment.iter().flat_map(|(_, names)| names.iter()))
        .unique()
        .sorted()
        .join(", ");
    eyre!("Timepoint {}: {message}", panel.timepoint)
        .suggestion(format!("Observed markers: {}", panel.markers().join(", ")))
        .suggestion(format!("Tree mutations: {mutations}"))
}
