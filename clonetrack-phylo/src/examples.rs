//! Small example trees, used throughout the documentation and tests.

use crate::{CandidateTree, MutationAssignment};
use color_eyre::eyre::{Report, Result};
use std::collections::BTreeMap;

/// Returns a three node chain, `0 -> 1 -> 2`, with `TP53` on node 1 and `KRAS` on node 2.
///
/// ```rust
/// let (tree, assignment) = clonetrack_phylo::examples::chain()?;
/// assert_eq!(tree.edges(), [(0, 1), (1, 2)]);
/// assert_eq!(assignment.node_of("KRAS"), Some(2));
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn chain() -> Result<(CandidateTree, MutationAssignment), Report> {
    let tree = CandidateTree::from_edges(3, [(0, 1), (1, 2)])?;
    let assignment = MutationAssignment::try_from(BTreeMap::from([
        (1, vec!["TP53".to_string()]),
        (2, vec!["KRAS".to_string()]),
    ]))?;
    Ok((tree, assignment))
}

/// Returns a branching tree, `0 -> 1`, `1 -> 2` and `1 -> 3`.
///
/// `TP53` is clonal (node 1), `KRAS` and `BRAF` share subclone 2, `PIK3CA` is on the sibling subclone 3.
pub fn branching() -> Result<(CandidateTree, MutationAssignment), Report> {
    let tree = CandidateTree::from_edges(4, [(0, 1), (1, 2), (1, 3)])?;
    let assignment = MutationAssignment::try_from(BTreeMap::from([
        (1, vec!["TP53".to_string()]),
        (2, vec!["KRAS".to_string(), "BRAF".to_string()]),
        (3, vec!["PIK3CA".to_string()]),
    ]))?;
    Ok((tree, assignment))
}
