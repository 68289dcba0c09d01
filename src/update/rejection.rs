//! Frequentist rejection of trees that the marker panel contradicts.

use crate::ensemble::{Ensemble, Member};
use crate::stats::{chi_square_test, pair_count, wald_test};
use crate::update::{marker_pairs, Update};
use crate::Panel;
use clonetrack_phylo::Classifier;
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use log::{debug, info, warn};
use rayon::prelude::*;

/// The verdict on one tree.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Verdict {
    reject: bool,
    evaluated: usize,
    skipped: usize,
}

/// Keeps only the trees whose structure agrees with the marker fractions.
///
/// - Every marker pair is tested with a [`wald_test`] on the pair's relation in the tree,
///   at a significance level Bonferroni corrected by the number of pairs.
/// - A tree is rejected at its first rejecting pair, pairs with a marker missing
///   from the tree are skipped.
/// - Kept trees keep their prior weights, rejected weights are discarded.
///
/// ```rust
/// use clonetrack::{update::rejection::structure_filter, Ensemble, Member, Observation, Panel};
/// use clonetrack_phylo::examples;
/// let (tree, assignment) = examples::chain()?;
/// let prior = Ensemble::new(vec![Member::new(tree, assignment, 1.0)])?;
/// let panel = Panel::new("t1", vec![Observation::new("TP53", 50, 100)?, Observation::new("KRAS", 80, 100)?]);
/// assert!(structure_filter(&prior, &panel, 0.05)?.ensemble.is_empty());
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn structure_filter(prior: &Ensemble, panel: &Panel, alpha: f64) -> Result<Update, Report> {
    let pairs = marker_pairs(panel.len());
    if pairs.is_empty() {
        warn!("Timepoint {} has fewer than 2 markers, no tree can be rejected.", panel.timepoint);
    }
    let comparisons = pair_count(panel.len()) as f64;

    let verdicts = prior
        .members()
        .par_iter()
        .enumerate()
        .map(|(i, member)| {
            let classifier =
                Classifier::new(&member.tree, &member.assignment).wrap_err_with(|| format!("Tree {i}"))?;
            let mut verdict = Verdict::default();
            for (a, b) in &pairs {
                let (first, second) = (&panel.observations[*a], &panel.observations[*b]);
                let Some(relation) = classifier.classify(&first.marker, &second.marker) else {
                    verdict.skipped += 1;
                    continue;
                };
                verdict.evaluated += 1;
                let outcome = wald_test(first, second, relation, comparisons, alpha)?;
                if outcome.reject {
                    debug!(
                        "Tree {i} rejected by markers {} and {} ({relation}): W={:.3} > z={:.3}",
                        first.marker, second.marker, outcome.statistic, outcome.critical
                    );
                    verdict.reject = true;
                    break;
                }
            }
            Ok::<_, Report>(verdict)
        })
        .collect::<Result<Vec<_>, Report>>()?;

    keep_accepted(prior, panel, &verdicts)
}

/// Keeps only the trees whose clonal prevalences agree with the marker counts.
///
/// - Every marker is tested with a [`chi_square_test`] of its count against the prevalence of
///   its node, at a significance level Bonferroni corrected by the number of markers.
/// - The node prevalence is the mean over samples, or a single `sample` if given.
/// - Markers missing from a tree, or without a prevalence, are skipped.
///
/// Returns an error if no tree in the ensemble carries clonal prevalences.
pub fn fraction_filter(prior: &Ensemble, panel: &Panel, alpha: f64, sample: Option<usize>) -> Result<Update, Report> {
    if !prior.is_empty() && prior.members().iter().all(|m| m.clonal_freq.is_empty()) {
        return Err(eyre!("The tree ensemble has no clonal frequencies to compare marker counts against.")
            .suggestion("Use an ensemble with clonal_freq (or vaf_frac), or the structure method."));
    }
    let comparisons = panel.len() as f64;

    let verdicts = prior
        .members()
        .par_iter()
        .enumerate()
        .map(|(i, member)| fraction_verdict(i, member, panel, comparisons, alpha, sample))
        .collect::<Result<Vec<_>, Report>>()?;

    keep_accepted(prior, panel, &verdicts)
}

fn fraction_verdict(
    i: usize,
    member: &Member,
    panel: &Panel,
    comparisons: f64,
    alpha: f64,
    sample: Option<usize>,
) -> Result<Verdict, Report> {
    let mut verdict = Verdict::default();
    for observation in &panel.observations {
        let prevalence = member
            .assignment
            .node_of(&observation.marker)
            .and_then(|node| member.prevalence(node, sample));
        let Some(prevalence) = prevalence else {
            verdict.skipped += 1;
            continue;
        };
        verdict.evaluated += 1;
        let outcome = chi_square_test(observation, prevalence, comparisons, alpha)
            .wrap_err_with(|| format!("Tree {i}, marker {}", observation.marker))?;
        if outcome.reject {
            debug!(
                "Tree {i} rejected by marker {} at prevalence {prevalence:.3}: T={:.3} > {:.3}",
                observation.marker, outcome.statistic, outcome.critical
            );
            verdict.reject = true;
            break;
        }
    }
    Ok(verdict)
}

/// Filters the prior down to the trees that were not rejected.
fn keep_accepted(prior: &Ensemble, panel: &Panel, verdicts: &[Verdict]) -> Result<Update, Report> {
    let kept = verdicts.iter().positions(|v| !v.reject).collect_vec();
    let pairs_evaluated = verdicts.iter().map(|v| v.evaluated).sum();
    let pairs_skipped = verdicts.iter().map(|v| v.skipped).sum();
    if pairs_skipped > 0 {
        warn!(
            "Timepoint {}: skipped {pairs_skipped} tests, where a marker is not assigned to any node.",
            panel.timepoint
        );
    }
    info!("Timepoint {}: kept {} of {} trees.", panel.timepoint, kept.len(), prior.len());
    if kept.is_empty() && !prior.is_empty() {
        warn!("Timepoint {}: every tree was rejected.", panel.timepoint);
    }
    Ok(Update { ensemble: prior.filter(&kept)?, kept, pairs_evaluated, pairs_skipped })
}
