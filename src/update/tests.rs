use crate::stats::pair_count;
use crate::update::{update, Method, UpdateConfig};
use crate::{Ensemble, Member, Observation, Panel};
use clonetrack_phylo::{examples, CandidateTree, MutationAssignment};
use color_eyre::eyre::{Report, Result};
use std::collections::BTreeMap;
use std::str::FromStr;
use strum::IntoEnumIterator;

/// `0 -> 1 -> 2 -> 3`, `TP53` on 1, `KRAS` on 2 and `BRAF` on 3.
fn long_chain() -> Result<(CandidateTree, MutationAssignment), Report> {
    let tree = CandidateTree::from_edges(4, [(0, 1), (1, 2), (2, 3)])?;
    let assignment = MutationAssignment::try_from(BTreeMap::from([
        (1, vec!["TP53".to_string()]),
        (2, vec!["KRAS".to_string()]),
        (3, vec!["BRAF".to_string()]),
    ]))?;
    Ok((tree, assignment))
}

/// Tree A has `KRAS` and `BRAF` on the same clone, tree B has them on nested clones.
fn same_versus_nested() -> Result<Ensemble, Report> {
    let (a, a_assignment) = examples::branching()?;
    let (b, b_assignment) = long_chain()?;
    Ensemble::new(vec![Member::new(a, a_assignment, 50.0), Member::new(b, b_assignment, 50.0)])
}

fn panel(counts: &[(&str, u64, u64)]) -> Result<Panel, Report> {
    let observations = counts
        .iter()
        .map(|(marker, mutant, total)| Observation::new(marker, *mutant, *total))
        .collect::<Result<Vec<_>, Report>>()?;
    Ok(Panel::new("2021-03-01", observations))
}

// ----------------------------------------------------------------------------
// Method

#[test]
fn method_names() -> Result<(), Report> {
    assert_eq!(Method::default(), Method::Bayesian);
    for method in Method::iter() {
        assert_eq!(Method::from_str(&method.to_string()).ok(), Some(method));
    }
    assert_eq!(serde_json::to_string(&Method::Fraction)?, "\"fraction\"");
    assert!(Method::from_str("random").is_err());
    Ok(())
}

#[test]
fn empty_panel() -> Result<(), Report> {
    let prior = same_versus_nested()?;
    assert!(update(&prior, &Panel::new("t1", Vec::new()), &UpdateConfig::default()).is_err());
    Ok(())
}

#[test]
fn invalid_alpha() -> Result<(), Report> {
    let prior = same_versus_nested()?;
    let panel = panel(&[("KRAS", 300, 1000), ("BRAF", 310, 1000)])?;
    let config = UpdateConfig { method: Method::Structure, alpha: 0.0, ..Default::default() };
    assert!(update(&prior, &panel, &config).is_err());
    Ok(())
}

#[test]
fn unmatched_markers_are_fatal() -> Result<(), Report> {
    let prior = same_versus_nested()?;
    let panel = panel(&[("EGFR", 300, 1000), ("ALK", 310, 1000)])?;
    for method in Method::iter() {
        let config = UpdateConfig { method, ..Default::default() };
        assert!(update(&prior, &panel, &config).is_err(), "{method}");
    }
    Ok(())
}

#[test]
fn markers_without_a_shared_tree_are_fatal() -> Result<(), Report> {
    // PIK3CA is only in the first tree, APC only in the second
    let (branching, branching_assignment) = examples::branching()?;
    let (chain, _) = examples::chain()?;
    let mut apc = MutationAssignment::new();
    apc.insert(2, "APC")?;
    let prior = Ensemble::new(vec![Member::new(branching, branching_assignment, 1.0), Member::new(chain, apc, 1.0)])?;
    let panel = panel(&[("PIK3CA", 200, 1000), ("APC", 100, 1000)])?;
    for method in [Method::Bayesian, Method::Structure] {
        let config = UpdateConfig { method, ..Default::default() };
        assert!(update(&prior, &panel, &config).is_err(), "{method}");
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Bayesian

#[test]
fn bayesian_favors_consistent_topology() -> Result<(), Report> {
    let prior = same_versus_nested()?;
    let panel = panel(&[("TP53", 800, 1000), ("KRAS", 300, 1000), ("BRAF", 310, 1000)])?;
    let posterior = update(&prior, &panel, &UpdateConfig::default())?;

    let weights = posterior.ensemble.weights();
    assert!(weights[0] > weights[1], "{weights:?}");
    assert!((weights.iter().sum::<f64>() - 100.0).abs() < 1e-9);
    assert_eq!(posterior.kept, [0, 1]);
    // the prior is untouched
    assert_eq!(prior.weights(), [50.0, 50.0]);
    Ok(())
}

#[test]
fn bayesian_pairs_are_exhaustive() -> Result<(), Report> {
    let prior = same_versus_nested()?;
    // PIK3CA is only assigned in tree A
    let counts = [("TP53", 800, 1000), ("KRAS", 300, 1000), ("BRAF", 310, 1000), ("PIK3CA", 200, 1000)];
    let posterior = update(&prior, &panel(&counts)?, &UpdateConfig::default())?;
    assert_eq!(posterior.pairs_evaluated + posterior.pairs_skipped, prior.len() * pair_count(4));
    // tree B skips the 3 pairs with PIK3CA
    assert_eq!(posterior.pairs_skipped, 3);
    Ok(())
}

#[test]
fn bayesian_single_marker_keeps_prior() -> Result<(), Report> {
    let prior = same_versus_nested()?.with_weights(&[1.0, 3.0])?;
    let posterior = update(&prior, &panel(&[("KRAS", 300, 1000)])?, &UpdateConfig::default())?;
    assert_eq!(posterior.ensemble.weights(), [25.0, 75.0]);
    assert_eq!(posterior.pairs_evaluated, 0);
    Ok(())
}

#[test]
fn bayesian_zero_prior_stays_zero() -> Result<(), Report> {
    let prior = same_versus_nested()?.with_weights(&[0.0, 10.0])?;
    let panel = panel(&[("KRAS", 300, 1000), ("BRAF", 310, 1000)])?;
    let posterior = update(&prior, &panel, &UpdateConfig::default())?;
    assert_eq!(posterior.ensemble.weights(), [0.0, 100.0]);
    Ok(())
}

// ----------------------------------------------------------------------------
// Rejection

#[test]
fn structure_rejects_inverted_fractions() -> Result<(), Report> {
    let (tree, assignment) = examples::chain()?;
    let prior = Ensemble::new(vec![Member::new(tree, assignment, 7.0)])?;
    let config = UpdateConfig { method: Method::Structure, ..Default::default() };

    let inverted = panel(&[("TP53", 50, 100), ("KRAS", 80, 100)])?;
    let posterior = update(&prior, &inverted, &config)?;
    assert!(posterior.ensemble.is_empty());
    assert!(posterior.kept.is_empty());

    let ordered = panel(&[("TP53", 80, 100), ("KRAS", 50, 100)])?;
    let posterior = update(&prior, &ordered, &config)?;
    assert_eq!(posterior.kept, [0]);
    assert_eq!(posterior.ensemble.weights(), [7.0]);
    Ok(())
}

#[test]
fn structure_keeps_weights_of_survivors() -> Result<(), Report> {
    let prior = same_versus_nested()?.with_weights(&[20.0, 5.0])?;
    // BRAF far above KRAS contradicts tree B (KRAS ancestor of BRAF), and KRAS != BRAF contradicts tree A
    let contradicts_both = panel(&[("KRAS", 100, 1000), ("BRAF", 600, 1000)])?;
    let config = UpdateConfig { method: Method::Structure, ..Default::default() };
    assert!(update(&prior, &contradicts_both, &config)?.ensemble.is_empty());

    // KRAS well above BRAF only contradicts the same clone of tree A
    let nested = panel(&[("KRAS", 600, 1000), ("BRAF", 100, 1000)])?;
    let posterior = update(&prior, &nested, &config)?;
    assert_eq!(posterior.kept, [1]);
    assert_eq!(posterior.ensemble.weights(), [5.0]);
    Ok(())
}

#[test]
fn fraction_rejects_mismatched_prevalence() -> Result<(), Report> {
    let (tree, assignment) = examples::chain()?;
    let mut matching = Member::new(tree.clone(), assignment.clone(), 1.0);
    matching.clonal_freq = BTreeMap::from([(1, vec![0.5, 0.7]), (2, vec![0.2, 0.2])]);
    let mut mismatched = Member::new(tree, assignment, 1.0);
    mismatched.clonal_freq = BTreeMap::from([(1, vec![0.9, 0.9]), (2, vec![0.6, 0.6])]);
    let prior = Ensemble::new(vec![matching, mismatched])?;

    let panel = panel(&[("TP53", 600, 1000), ("KRAS", 200, 1000)])?;
    let config = UpdateConfig { method: Method::Fraction, ..Default::default() };
    assert_eq!(update(&prior, &panel, &config)?.kept, [0]);

    // the first sample of the matching tree (0.5) is too far from 0.6
    let config = UpdateConfig { sample: Some(0), ..config };
    assert!(update(&prior, &panel, &config)?.kept.is_empty());
    Ok(())
}

#[test]
fn fraction_requires_prevalences() -> Result<(), Report> {
    let prior = same_versus_nested()?;
    let panel = panel(&[("KRAS", 300, 1000)])?;
    let config = UpdateConfig { method: Method::Fraction, ..Default::default() };
    assert!(update(&prior, &panel, &config).is_err());
    Ok(())
}
