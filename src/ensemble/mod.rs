//! The [Ensemble] of candidate trees and their weights.

pub mod summary;
#[cfg(test)]
mod tests;

use crate::utils;
use clonetrack_phylo::{CandidateTree, MutationAssignment};
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};
use std::path::Path;

// ----------------------------------------------------------------------------
// Member
// ----------------------------------------------------------------------------

/// A mutation identifier, as emitted by the aggregation stage (an index or a name).
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(untagged)]
pub enum MutationId {
    Index(u64),
    Name(String),
}

#[rustfmt::skip]
impl Display for MutationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self { MutationId::Index(i) => write!(f, "{i}"), MutationId::Name(n) => write!(f, "{n}") }
    }
}

/// One candidate tree of the [`Ensemble`].
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Member {
    pub tree: CandidateTree,
    /// Mutation identifiers on each node.
    pub mutation_ids: BTreeMap<usize, Vec<MutationId>>,
    /// Mutation names on each node, matched against marker names.
    pub assignment: MutationAssignment,
    /// Clonal prevalence of each node, one value per sample.
    pub clonal_freq: BTreeMap<usize, Vec<f64>>,
    /// Non-negative weight (raw counts, or percentages after an update).
    pub weight: f64,
}

impl Member {
    /// Returns a new [`Member`] without mutation ids or clonal frequencies.
    pub fn new(tree: CandidateTree, assignment: MutationAssignment, weight: f64) -> Self {
        Member { tree, mutation_ids: BTreeMap::new(), assignment, clonal_freq: BTreeMap::new(), weight }
    }

    /// Returns the clonal prevalence of `node`, the mean over samples unless a `sample` is given.
    ///
    /// Returns [`None`] if the node (or sample) has no prevalence.
    pub fn prevalence(&self, node: usize, sample: Option<usize>) -> Option<f64> {
        let values = self.clonal_freq.get(&node)?;
        match sample {
            Some(i) => values.get(i).copied(),
            None if values.is_empty() => None,
            None => Some(values.iter().sum::<f64>() / values.len() as f64),
        }
    }
}

// ----------------------------------------------------------------------------
// Ensemble
// ----------------------------------------------------------------------------

/// An [`Ensemble`] (tree distribution) of candidate trees, each with a weight.
///
/// On disk, an ensemble is a JSON object of parallel arrays, one entry per member:
///
/// - `tree_structure`: parent to children map.
/// - `node_dict`: node to mutation ids (optional).
/// - `node_dict_name`: node to mutation names.
/// - `clonal_freq`: node to per-sample prevalence (optional, `vaf_frac` is used when absent).
/// - `freq`: weights.
///
/// ```rust
/// use clonetrack::Ensemble;
/// let json = r#"{
///   "tree_structure": [{"0": [1], "1": [2]}, {"0": [1, 2]}],
///   "node_dict_name": [{"1": ["TP53"], "2": ["KRAS"]}, {"1": ["TP53"], "2": ["KRAS"]}],
///   "freq": [3, 1]
/// }"#;
/// let ensemble: Ensemble = serde_json::from_str(json)?;
/// assert_eq!(ensemble.len(), 2);
/// assert_eq!(ensemble.weights(), [3.0, 1.0]);
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(try_from = "EnsembleFile", into = "EnsembleFile")]
pub struct Ensemble {
    members: Vec<Member>,
}

impl Ensemble {
    /// Returns a new [`Ensemble`].
    ///
    /// - Returns an error if a weight is negative or not finite.
    /// - Returns an error if a member's mutation assignment refers to a node outside its tree.
    pub fn new(members: Vec<Member>) -> Result<Self, Report> {
        for (i, member) in members.iter().enumerate() {
            if !member.weight.is_finite() || member.weight < 0.0 {
                return Err(eyre!("Tree {i} has an invalid weight: {}", member.weight));
            }
            if let Some(max) = member.assignment.max_node() {
                if max >= member.tree.len() {
                    return Err(eyre!(
                        "Tree {i} assigns mutations to node {max}, but the tree only has {} nodes.",
                        member.tree.len()
                    ));
                }
            }
        }
        Ok(Ensemble { members })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn weights(&self) -> Vec<f64> {
        self.members.iter().map(|m| m.weight).collect()
    }

    /// Returns the weights scaled to sum to 1.
    ///
    /// If the weights sum to zero, every member gets an equal share.
    pub fn normalized_weights(&self) -> Vec<f64> {
        normalize(&self.weights(), 1.0)
    }

    /// Returns a new ensemble with only the members at `indices` (in that order).
    ///
    /// Weights are kept as they are, not redistributed.
    ///
    /// ```rust
    /// use clonetrack::{Ensemble, Member};
    /// use clonetrack_phylo::examples;
    /// let (tree, assignment) = examples::chain()?;
    /// let members = [10.0, 20.0, 30.0].map(|w| Member::new(tree.clone(), assignment.clone(), w));
    /// let ensemble = Ensemble::new(members.to_vec())?;
    /// assert_eq!(ensemble.filter(&[2, 0])?.weights(), [30.0, 10.0]);
    /// assert!(ensemble.filter(&[3]).is_err());
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn filter(&self, indices: &[usize]) -> Result<Ensemble, Report> {
        let members = indices
            .iter()
            .map(|i| {
                self.members
                    .get(*i)
                    .cloned()
                    .ok_or_else(|| eyre!("Tree {i} does not exist in an ensemble of {} trees.", self.len()))
            })
            .collect::<Result<Vec<_>, Report>>()?;
        Ok(Ensemble { members })
    }

    /// Returns a new ensemble with the same members, and new weights.
    pub fn with_weights(&self, weights: &[f64]) -> Result<Ensemble, Report> {
        if weights.len() != self.len() {
            return Err(eyre!("Found {} weights for an ensemble of {} trees.", weights.len(), self.len()));
        }
        let members = self
            .members
            .iter()
            .zip(weights)
            .map(|(member, weight)| Member { weight: *weight, ..member.clone() })
            .collect();
        Ensemble::new(members)
    }

    /// Reads an [`Ensemble`] from a JSON file (optionally `.zst` compressed).
    pub fn read<P>(path: &P) -> Result<Ensemble, Report>
    where
        P: AsRef<Path> + Debug,
    {
        info!("Reading tree ensemble: {path:?}");
        let text = utils::read_text(path)?;
        let ensemble: Ensemble = serde_json::from_str(&text)
            .wrap_err_with(|| format!("Failed to parse tree ensemble: {path:?}"))
            .suggestion("Expected a JSON object with the keys tree_structure, node_dict_name and freq.")?;
        debug!("Read {} trees from {path:?}", ensemble.len());
        Ok(ensemble)
    }

    /// Writes the [`Ensemble`] to a JSON file (compressed if the path ends in `.zst`).
    pub fn write<P>(&self, path: &P) -> Result<(), Report>
    where
        P: AsRef<Path> + Debug,
    {
        let output = serde_json::to_string_pretty(self)
            .wrap_err_with(|| format!("Failed to serialize tree ensemble: {path:?}"))?;
        utils::write_text(path, &output)
    }
}

/// Scales non-negative `values` to sum to `total`, or returns an equal share for
/// every value if they sum to zero (or are not finite).
///
/// ```rust
/// use clonetrack::ensemble::normalize;
/// assert_eq!(normalize(&[1.0, 3.0], 100.0), [25.0, 75.0]);
/// assert_eq!(normalize(&[0.0, 0.0], 100.0), [50.0, 50.0]);
/// ```
pub fn normalize(values: &[f64], total: f64) -> Vec<f64> {
    let sum: f64 = values.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        values.iter().map(|v| v / sum * total).collect()
    } else {
        vec![total / values.len() as f64; values.len()]
    }
}

// ----------------------------------------------------------------------------
// Ensemble File
// ----------------------------------------------------------------------------

/// Clonal prevalences are either a flat list of samples, or nested one level deeper.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
enum Prevalence {
    Flat(Vec<f64>),
    Nested(Vec<Vec<f64>>),
}

impl From<Prevalence> for Vec<f64> {
    fn from(prevalence: Prevalence) -> Self {
        match prevalence {
            Prevalence::Flat(values) => values,
            Prevalence::Nested(values) => values.into_iter().flatten().collect(),
        }
    }
}

type PrevalenceMap = BTreeMap<usize, Prevalence>;

/// The parallel-array layout of an [`Ensemble`] on disk.
#[derive(Clone, Debug, Deserialize, Serialize)]
struct EnsembleFile {
    tree_structure: Vec<CandidateTree>,
    #[serde(default)]
    node_dict: Vec<BTreeMap<usize, Vec<MutationId>>>,
    node_dict_name: Vec<MutationAssignment>,
    #[serde(default)]
    clonal_freq: Vec<PrevalenceMap>,
    #[serde(default, skip_serializing)]
    vaf_frac: Vec<PrevalenceMap>,
    freq: Vec<f64>,
}

impl TryFrom<EnsembleFile> for Ensemble {
    type Error = Report;
    fn try_from(file: EnsembleFile) -> Result<Self, Report> {
        let k = file.tree_structure.len();
        let clonal_freq = match file.clonal_freq.is_empty() {
            true => file.vaf_frac,
            false => file.clonal_freq,
        };
        let lengths = [
            ("node_dict_name", file.node_dict_name.len(), false),
            ("freq", file.freq.len(), false),
            ("node_dict", file.node_dict.len(), true),
            ("clonal_freq", clonal_freq.len(), true),
        ];
        for (key, n, optional) in lengths {
            if n != k && !(optional && n == 0) {
                return Err(eyre!("Ensemble has {k} tree_structure entries but {n} {key} entries."));
            }
        }

        let mut node_dict = file.node_dict.into_iter();
        let mut clonal_freq = clonal_freq.into_iter();
        let members = file
            .tree_structure
            .into_iter()
            .zip(file.node_dict_name)
            .zip(file.freq)
            .map(|((tree, assignment), weight)| Member {
                tree,
                mutation_ids: node_dict.next().unwrap_or_default(),
                assignment,
                clonal_freq: clonal_freq
                    .next()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(node, prevalence)| (node, prevalence.into()))
                    .collect(),
                weight,
            })
            .collect_vec();
        Ensemble::new(members)
    }
}

impl From<Ensemble> for EnsembleFile {
    fn from(ensemble: Ensemble) -> Self {
        let mut file = EnsembleFile {
            tree_structure: Vec::new(),
            node_dict: Vec::new(),
            node_dict_name: Vec::new(),
            clonal_freq: Vec::new(),
            vaf_frac: Vec::new(),
            freq: Vec::new(),
        };
        for member in ensemble.members {
            file.tree_structure.push(member.tree);
            file.node_dict.push(member.mutation_ids);
            file.node_dict_name.push(member.assignment);
            file.clonal_freq.push(
                member.clonal_freq.into_iter().map(|(node, values)| (node, Prevalence::Flat(values))).collect(),
            );
            file.freq.push(member.weight);
        }
        file
    }
}
