use crate::ensemble::summary::{dominant, entropy, significant};
use crate::ensemble::{Ensemble, Member, MutationId};
use clonetrack_phylo::examples;
use color_eyre::eyre::{Report, Result};
use tempfile::tempdir;

fn two_members() -> Result<Ensemble, Report> {
    let (chain, chain_assignment) = examples::chain()?;
    let (branching, branching_assignment) = examples::branching()?;
    let mut first = Member::new(chain, chain_assignment, 3.0);
    first.clonal_freq.insert(1, vec![0.75, 0.5]);
    first.clonal_freq.insert(2, vec![0.25, 0.125]);
    let second = Member::new(branching, branching_assignment, 1.0);
    Ensemble::new(vec![first, second])
}

// ----------------------------------------------------------------------------
// Read and Write

#[test]
fn aggregation_output() -> Result<(), Report> {
    let json = indoc::indoc! {r#"
        {
          "tree_structure": [{"0": [1], "1": [2]}],
          "node_dict": [{"1": [0, 3], "2": [1]}],
          "node_dict_name": [{"1": ["TP53", "APC"], "2": ["KRAS"]}],
          "clonal_freq": [{"1": [[0.9, 0.8]], "2": [[0.3, 0.1]]}],
          "vaf_frac": [{"1": [[0.45, 0.4]], "2": [[0.15, 0.05]]}],
          "freq": [12]
        }
    "#};
    let ensemble: Ensemble = serde_json::from_str(json)?;
    let member = &ensemble.members()[0];
    assert_eq!(member.mutation_ids[&1], [MutationId::Index(0), MutationId::Index(3)]);
    assert_eq!(member.assignment.node_of("APC"), Some(1));
    // clonal_freq takes precedence over vaf_frac, nested samples are flattened
    assert_eq!(member.clonal_freq[&1], [0.9, 0.8]);
    assert!((member.prevalence(2, None).unwrap_or_default() - 0.2).abs() < 1e-12);
    assert_eq!(member.prevalence(2, Some(1)), Some(0.1));
    assert_eq!(member.prevalence(2, Some(2)), None);
    Ok(())
}

#[test]
fn vaf_frac_fallback() -> Result<(), Report> {
    let json = r#"{
        "tree_structure": [{"0": [1]}],
        "node_dict_name": [{"1": ["TP53"]}],
        "vaf_frac": [{"1": [0.45]}],
        "freq": [1]
    }"#;
    let ensemble: Ensemble = serde_json::from_str(json)?;
    assert_eq!(ensemble.members()[0].prevalence(1, None), Some(0.45));
    Ok(())
}

#[test]
fn unequal_arrays() -> Result<(), Report> {
    let json = r#"{
        "tree_structure": [{"0": [1]}, {"0": [1]}],
        "node_dict_name": [{"1": ["TP53"]}],
        "freq": [1, 1]
    }"#;
    assert!(serde_json::from_str::<Ensemble>(json).is_err());
    Ok(())
}

#[test]
fn assignment_outside_tree() -> Result<(), Report> {
    let json = r#"{
        "tree_structure": [{"0": [1]}],
        "node_dict_name": [{"5": ["TP53"]}],
        "freq": [1]
    }"#;
    assert!(serde_json::from_str::<Ensemble>(json).is_err());
    Ok(())
}

#[test]
fn write_read_compressed() -> Result<(), Report> {
    let ensemble = two_members()?;
    let dir = tempdir()?;
    for name in ["ensemble.json", "ensemble.json.zst"] {
        let path = dir.path().join(name);
        ensemble.write(&path)?;
        assert_eq!(Ensemble::read(&path)?, ensemble);
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Filter and Weights

#[test]
fn filter_keeps_weights() -> Result<(), Report> {
    let ensemble = two_members()?;
    let filtered = ensemble.filter(&[1])?;
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered.weights(), [1.0]);
    assert_eq!(filtered.members()[0].tree.len(), 4);
    // the source ensemble is untouched
    assert_eq!(ensemble.len(), 2);
    assert!(ensemble.filter(&[]).is_ok_and(|e| e.is_empty()));
    Ok(())
}

#[test]
fn with_weights() -> Result<(), Report> {
    let ensemble = two_members()?;
    let updated = ensemble.with_weights(&[25.0, 75.0])?;
    assert_eq!(updated.weights(), [25.0, 75.0]);
    assert_eq!(updated.members()[0].clonal_freq, ensemble.members()[0].clonal_freq);
    assert!(ensemble.with_weights(&[1.0]).is_err());
    assert!(ensemble.with_weights(&[1.0, -1.0]).is_err());
    assert!(ensemble.with_weights(&[1.0, f64::NAN]).is_err());
    Ok(())
}

#[test]
fn normalized_weights() -> Result<(), Report> {
    let ensemble = two_members()?;
    assert_eq!(ensemble.normalized_weights(), [0.75, 0.25]);
    let zero = ensemble.with_weights(&[0.0, 0.0])?;
    assert_eq!(zero.normalized_weights(), [0.5, 0.5]);
    Ok(())
}

// ----------------------------------------------------------------------------
// Summary

#[test]
fn summary_statistics() -> Result<(), Report> {
    assert_eq!(entropy(&[]), 0.0);
    assert!((entropy(&[1.0, 1.0, 1.0, 1.0]) - 4_f64.ln()).abs() < 1e-12);
    assert_eq!(dominant(&[1.0, 3.0, 3.0]), Some((1, 3.0)));
    assert_eq!(dominant(&[]), None);
    assert_eq!(significant(&[98.0, 1.5, 0.5], 0.01), 2);

    let summary = two_members()?.summary(0.01);
    assert_eq!(summary.members, 2);
    assert_eq!(summary.total_weight, 4.0);
    assert_eq!(summary.dominant, Some(0));
    assert_eq!(summary.dominant_percent, 75.0);
    Ok(())
}

#[test]
fn weight_table() -> Result<(), Report> {
    let table = two_members()?.with_weights(&[1.0, 3.0])?.to_table()?;
    assert_eq!(table.get_column("member")?, [&"1", &"0"]);
    assert_eq!(table.get_column("percent")?, [&"75.00", &"25.00"]);
    Ok(())
}
