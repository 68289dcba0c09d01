//! Bayesian reweighting of an ensemble by marker pair likelihoods.

use crate::ensemble::{normalize, Ensemble};
use crate::stats::BinomialLikelihood;
use crate::stats::quadrature::{integrate, QuadratureConfig};
use crate::update::{marker_pairs, Update};
use crate::{Observation, Panel};
use clonetrack_phylo::{Classifier, Relation};
use color_eyre::eyre::{Report, Result, WrapErr};
use itertools::Itertools;
use log::{debug, warn};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Likelihood substituted when an integral is not finite or not positive.
pub const FALLBACK_LIKELIHOOD: f64 = 1e-10;

/// Log likelihoods are clamped to `[-LOG_CLAMP, LOG_CLAMP]` before exponentiating.
const LOG_CLAMP: f64 = 700.0;

/// Percentage scale of posterior weights.
const WEIGHT_TOTAL: f64 = 100.0;

// ----------------------------------------------------------------------------
// Pair Likelihood
// ----------------------------------------------------------------------------

/// Returns the likelihood of two marker observations, given the [`Relation`] of the
/// first marker's clone to the second marker's clone.
///
/// The product of the two binomial read count likelihoods is integrated over the
/// region of clone fractions `(f1, f2)` the relation allows:
///
/// | Relation                  | Region                                     |
/// |---------------------------|--------------------------------------------|
/// | [`Same`](Relation::Same)             | `f1 = f2`, `f1 in [0, 1]`        |
/// | [`Ancestor`](Relation::Ancestor)     | `f1 in [0, 1]`, `f2 in [0, f1]`  |
/// | [`Descendant`](Relation::Descendant) | `f1 in [0, 1]`, `f2 in [f1, 1]`  |
/// | [`Unrelated`](Relation::Unrelated)   | `f1 in [0, 1]`, `f2 in [0, 1 - f1]` |
///
/// The unrelated region assumes that two sibling clones can not jointly exceed the whole tumor.
///
/// A result that is not finite or not positive is replaced by [`FALLBACK_LIKELIHOOD`], with a warning.
///
/// ```rust
/// use clonetrack::{update::bayesian::pair_likelihood, Observation};
/// use clonetrack::stats::quadrature::QuadratureConfig;
/// use clonetrack_phylo::Relation;
/// let config = QuadratureConfig::default();
/// let tp53 = Observation::new("TP53", 80, 100)?;
/// let kras = Observation::new("KRAS", 30, 100)?;
/// let fits = pair_likelihood(&tp53, &kras, Relation::Ancestor, &config);
/// let violates = pair_likelihood(&tp53, &kras, Relation::Descendant, &config);
/// assert!(fits > violates);
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn pair_likelihood(first: &Observation, second: &Observation, relation: Relation, config: &QuadratureConfig) -> f64 {
    let (first_pmf, second_pmf) = (BinomialLikelihood::from(first), BinomialLikelihood::from(second));
    let ln_first = |f: f64| first_pmf.ln_pmf(f);
    let ln_second = |f: f64| second_pmf.ln_pmf(f);
    let peak_first = [first.fraction()];
    let peak_second = [second.fraction()];

    let integral = match relation {
        Relation::Same => {
            let f = |x: f64| (ln_first(x) + ln_second(x)).clamp(-LOG_CLAMP, LOG_CLAMP).exp();
            integrate(f, 0.0, 1.0, &[first.fraction(), second.fraction()], config)
        }
        _ => {
            let inner_bounds = |f1: f64| match relation {
                Relation::Ancestor => (0.0, f1),
                Relation::Descendant => (f1, 1.0),
                _ => (0.0, 1.0 - f1),
            };
            let outer = |f1: f64| {
                let (lower, upper) = inner_bounds(f1);
                let ln_f1 = ln_first(f1);
                let inner = |f2: f64| (ln_f1 + ln_second(f2)).clamp(-LOG_CLAMP, LOG_CLAMP).exp();
                integrate(inner, lower, upper, &peak_second, config).value
            };
            integrate(outer, 0.0, 1.0, &peak_first, config)
        }
    };

    if !integral.value.is_finite() || integral.value <= 0.0 {
        warn!(
            "Integration failed for markers {} and {} ({relation}), using fallback likelihood {FALLBACK_LIKELIHOOD}.",
            first.marker, second.marker
        );
        return FALLBACK_LIKELIHOOD;
    }
    if !integral.converged {
        debug!(
            "Integration for markers {} and {} ({relation}) did not converge, estimated error: {:e}",
            first.marker, second.marker, integral.error
        );
    }
    integral.value
}

// ----------------------------------------------------------------------------
// Update
// ----------------------------------------------------------------------------

/// Reweights every tree of the `prior` by the likelihood of the marker `panel`.
///
/// - Every unordered pair of markers is evaluated for every tree, a pair with a marker
///   missing from the tree's mutation assignment has a neutral likelihood of 1.
/// - Pair likelihoods only depend on the marker pair and its relation, and are
///   computed once for all trees.
/// - Posterior weights are `prior * product of pair likelihoods`, rescaled to sum to 100.
/// - With fewer than two markers, the weights are the rescaled prior.
///
/// Returns an error if a tree's mutation assignment does not fit the tree.
pub fn update(prior: &Ensemble, panel: &Panel, config: &QuadratureConfig) -> Result<Update, Report> {
    let pairs = marker_pairs(panel.len());
    if pairs.is_empty() {
        warn!(
            "Timepoint {} has {} marker(s), at least 2 are needed for pairwise evidence. Weights are unchanged.",
            panel.timepoint,
            panel.len()
        );
        return Ok(Update {
            ensemble: prior.with_weights(&normalize(&prior.weights(), WEIGHT_TOTAL))?,
            kept: (0..prior.len()).collect(),
            pairs_evaluated: 0,
            pairs_skipped: 0,
        });
    }

    // relation of every marker pair, in every tree
    let relations = prior
        .members()
        .par_iter()
        .enumerate()
        .map(|(i, member)| {
            let classifier =
                Classifier::new(&member.tree, &member.assignment).wrap_err_with(|| format!("Tree {i}"))?;
            let relations = pairs
                .iter()
                .map(|(a, b)| {
                    let (first, second) = (&panel.observations[*a], &panel.observations[*b]);
                    classifier.classify(&first.marker, &second.marker)
                })
                .collect_vec();
            Ok::<_, Report>(relations)
        })
        .collect::<Result<Vec<_>, Report>>()?;

    // integrate each needed (pair, relation) once
    let needed: BTreeSet<(usize, Relation)> = relations
        .iter()
        .flat_map(|tree| tree.iter().enumerate().filter_map(|(p, relation)| relation.map(|r| (p, r))))
        .collect();
    debug!("Integrating {} distinct marker pair relations.", needed.len());
    let ln_likelihoods: BTreeMap<(usize, Relation), f64> = needed
        .into_par_iter()
        .map(|(p, relation)| {
            let (a, b) = pairs[p];
            let value = pair_likelihood(&panel.observations[a], &panel.observations[b], relation, config);
            ((p, relation), value.ln())
        })
        .collect();

    let (mut evaluated, mut skipped) = (0, 0);
    let mut trees_with_skips = 0;
    let log_weights = prior
        .members()
        .iter()
        .zip(&relations)
        .map(|(member, tree)| {
            let mut log_weight = member.weight.ln();
            let missing = tree.iter().filter(|r| r.is_none()).count();
            for (p, relation) in tree.iter().enumerate() {
                if let Some(relation) = relation {
                    log_weight += ln_likelihoods[&(p, *relation)];
                }
            }
            evaluated += tree.len() - missing;
            skipped += missing;
            if missing > 0 {
                trees_with_skips += 1;
            }
            log_weight
        })
        .collect_vec();

    if trees_with_skips > 0 {
        warn!(
            "Timepoint {}: skipped {skipped} marker pairs in {trees_with_skips} trees, where a marker is not assigned to any node.",
            panel.timepoint
        );
    }

    let weights = posterior_weights(&log_weights);
    Ok(Update {
        ensemble: prior.with_weights(&weights)?,
        kept: (0..prior.len()).collect(),
        pairs_evaluated: evaluated,
        pairs_skipped: skipped,
    })
}

/// Converts log weights to weights that sum to 100, without underflow.
///
/// If no weight is positive, returns the uniform distribution with a warning.
fn posterior_weights(log_weights: &[f64]) -> Vec<f64> {
    let max = log_weights.iter().copied().filter(|w| w.is_finite()).max_by(f64::total_cmp);
    let Some(max) = max else {
        if !log_weights.is_empty() {
            warn!("All tree likelihoods were zero, using a uniform distribution.");
        }
        return normalize(&vec![1.0; log_weights.len()], WEIGHT_TOTAL);
    };
    let weights = log_weights
        .iter()
        .map(|w| match w.is_finite() {
            true => (w - max).exp(),
            false => 0.0,
        })
        .collect_vec();
    normalize(&weights, WEIGHT_TOTAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posterior_without_underflow() {
        // products this small underflow outside of log space
        let weights = posterior_weights(&[-2000.0, -2000.0 + 3_f64.ln()]);
        assert!((weights[0] - 25.0).abs() < 1e-9);
        assert!((weights[1] - 75.0).abs() < 1e-9);
    }

    #[test]
    fn posterior_all_zero() {
        let weights = posterior_weights(&[f64::NEG_INFINITY, f64::NEG_INFINITY]);
        assert_eq!(weights, [50.0, 50.0]);
        assert!(posterior_weights(&[]).is_empty());
    }

    #[test]
    fn same_integral_matches_beta_function() -> Result<(), Report> {
        // int_0^1 C(d,r) f^r (1-f)^(d-r) df = 1 / (d + 1)
        let a = Observation::new("A", 0, 10)?;
        let b = Observation::new("B", 0, 1)?;
        let value = pair_likelihood(&a, &b, Relation::Same, &QuadratureConfig::default());
        // (1-f)^10 * (1-f)^1 integrates to 1/12
        assert!((value - 1.0 / 12.0).abs() < 1e-9, "{value}");
        Ok(())
    }

    #[test]
    fn nested_regions_partition_the_square() -> Result<(), Report> {
        // ancestor and descendant regions together cover the unit square,
        // which integrates to (1 / (d1 + 1)) * (1 / (d2 + 1))
        let config = QuadratureConfig::default();
        let a = Observation::new("A", 3, 10)?;
        let b = Observation::new("B", 6, 20)?;
        let ancestor = pair_likelihood(&a, &b, Relation::Ancestor, &config);
        let descendant = pair_likelihood(&a, &b, Relation::Descendant, &config);
        let square = 1.0 / 11.0 * (1.0 / 21.0);
        assert!((ancestor + descendant - square).abs() < 1e-7, "{ancestor} + {descendant}");
        Ok(())
    }

    #[test]
    fn deep_markers_stay_finite() -> Result<(), Report> {
        let a = Observation::new("A", 12_000, 20_000)?;
        let b = Observation::new("B", 4_000, 20_000)?;
        let value = pair_likelihood(&a, &b, Relation::Ancestor, &QuadratureConfig::default());
        assert!(value.is_finite() && value > 0.0);
        Ok(())
    }
}
