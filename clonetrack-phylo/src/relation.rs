use crate::{CandidateTree, MutationAssignment};
use color_eyre::eyre::{eyre, Report, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The phylogenetic [`Relation`] of a first mutation to a second mutation.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    /// Both mutations are on the same node.
    Same,
    /// The first mutation's node is a strict ancestor of the second's.
    Ancestor,
    /// The first mutation's node is a strict descendant of the second's.
    Descendant,
    /// Neither node is an ancestor of the other (ex. siblings).
    Unrelated,
}

impl Relation {
    /// Returns the relation of the second mutation to the first.
    ///
    /// ```rust
    /// use clonetrack_phylo::Relation;
    /// assert_eq!(Relation::Ancestor.reverse(), Relation::Descendant);
    /// assert_eq!(Relation::Same.reverse(), Relation::Same);
    /// ```
    pub fn reverse(&self) -> Relation {
        match self {
            Relation::Ancestor => Relation::Descendant,
            Relation::Descendant => Relation::Ancestor,
            relation => *relation,
        }
    }
}

#[rustfmt::skip]
impl Display for Relation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self { Relation::Same => "same", Relation::Ancestor => "ancestor", Relation::Descendant => "descendant", Relation::Unrelated => "unrelated" };
        write!(f, "{name}")
    }
}

/// Classifies mutation pairs against one tree.
///
/// The ancestor-descendant matrix is computed once, so that classifying all pairs
/// of a marker panel does not repeat the tree traversal.
#[derive(Clone, Debug)]
pub struct Classifier<'t> {
    assignment: &'t MutationAssignment,
    ancestors: Array2<bool>,
}

impl<'t> Classifier<'t> {
    pub fn new(tree: &CandidateTree, assignment: &'t MutationAssignment) -> Result<Self, Report> {
        let ancestors = tree.ancestor_descendant_matrix()?;
        if let Some(max) = assignment.max_node() {
            if max >= tree.len() {
                return Err(eyre!(
                    "Mutation assignment refers to node {max}, but the tree only has {} nodes.",
                    tree.len()
                ));
            }
        }
        Ok(Classifier { assignment, ancestors })
    }

    /// Returns the [`Relation`] of mutation `a` to mutation `b`.
    ///
    /// Returns [`None`] if either mutation is not assigned to any node in this tree,
    /// callers are expected to skip the pair.
    pub fn classify(&self, a: &str, b: &str) -> Option<Relation> {
        let node_a = self.assignment.node_of(a)?;
        let node_b = self.assignment.node_of(b)?;
        let relation = if node_a == node_b {
            Relation::Same
        } else if self.ancestors[(node_a, node_b)] {
            Relation::Ancestor
        } else if self.ancestors[(node_b, node_a)] {
            Relation::Descendant
        } else {
            Relation::Unrelated
        };
        Some(relation)
    }
}

/// Returns the phylogenetic [`Relation`] of mutation `a` to mutation `b` in a tree.
///
/// - Returns `Ok(None)` if either mutation is absent from the assignment (a recoverable skip).
/// - Returns an error if the assignment does not fit the tree (a structural problem).
///
/// ## Examples
///
/// ```rust
/// use clonetrack_phylo::{classify, examples, Relation};
/// let (tree, assignment) = examples::chain()?;
/// assert_eq!(classify(&tree, &assignment, "TP53", "KRAS")?, Some(Relation::Ancestor));
/// assert_eq!(classify(&tree, &assignment, "KRAS", "TP53")?, Some(Relation::Descendant));
/// assert_eq!(classify(&tree, &assignment, "TP53", "EGFR")?, None);
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn classify(
    tree: &CandidateTree,
    assignment: &MutationAssignment,
    a: &str,
    b: &str,
) -> Result<Option<Relation>, Report> {
    Ok(Classifier::new(tree, assignment)?.classify(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::examples;
    use itertools::Itertools;

    #[test]
    fn antisymmetric_over_all_pairs() -> Result<(), Report> {
        let (tree, assignment) = examples::branching()?;
        let classifier = Classifier::new(&tree, &assignment)?;
        let mutations = assignment.iter().flat_map(|(_, m)| m.to_vec()).collect_vec();
        for (a, b) in mutations.iter().tuple_combinations() {
            let forward = classifier.classify(a, b);
            let reverse = classifier.classify(b, a);
            assert_eq!(forward.map(|r| r.reverse()), reverse);
            if forward == Some(Relation::Same) {
                assert_eq!(assignment.node_of(a), assignment.node_of(b));
            }
        }
        Ok(())
    }

    #[test]
    fn siblings_are_unrelated() -> Result<(), Report> {
        let (tree, assignment) = examples::branching()?;
        assert_eq!(classify(&tree, &assignment, "KRAS", "PIK3CA")?, Some(Relation::Unrelated));
        assert_eq!(classify(&tree, &assignment, "KRAS", "BRAF")?, Some(Relation::Same));
        Ok(())
    }

    #[test]
    fn assignment_outside_tree() -> Result<(), Report> {
        let (tree, _) = examples::chain()?;
        let mut assignment = MutationAssignment::new();
        assignment.insert(7, "TP53")?;
        assert!(classify(&tree, &assignment, "TP53", "TP53").is_err());
        Ok(())
    }
}
