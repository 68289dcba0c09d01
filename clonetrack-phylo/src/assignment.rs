use color_eyre::eyre::{eyre, Report, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A [`MutationAssignment`] maps each node id to the mutations that arose on it.
///
/// - Each mutation appears under exactly one node.
/// - The root ("normal" clone) conventionally holds no mutations, and nodes without
///   mutations may be absent from the map.
///
/// ```rust
/// use clonetrack_phylo::MutationAssignment;
/// let assignment: MutationAssignment = serde_json::from_str(r#"{"1": ["TP53"], "2": ["KRAS", "APC"]}"#)?;
/// assert_eq!(assignment.node_of("APC"), Some(2));
/// assert_eq!(assignment.node_of("EGFR"), None);
///
/// // a mutation can not be assigned to two nodes
/// let duplicate: Result<MutationAssignment, _> = serde_json::from_str(r#"{"1": ["TP53"], "2": ["TP53"]}"#);
/// assert!(duplicate.is_err());
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(try_from = "BTreeMap<usize, Vec<String>>", into = "BTreeMap<usize, Vec<String>>")]
pub struct MutationAssignment {
    nodes: BTreeMap<usize, Vec<String>>,
    /// Inverse lookup of mutation to node.
    index: HashMap<String, usize>,
}

impl MutationAssignment {
    pub fn new() -> Self {
        MutationAssignment::default()
    }

    /// Assigns `mutation` to `node`.
    ///
    /// - Returns an error if the mutation is already assigned to any node.
    pub fn insert(&mut self, node: usize, mutation: &str) -> Result<(), Report> {
        if let Some(existing) = self.index.get(mutation) {
            return Err(eyre!("Mutation {mutation} is assigned to both node {existing} and node {node}."));
        }
        self.index.insert(mutation.to_string(), node);
        self.nodes.entry(node).or_default().push(mutation.to_string());
        Ok(())
    }

    /// Returns the mutations assigned to `node` (empty if none).
    pub fn mutations(&self, node: usize) -> &[String] {
        self.nodes.get(&node).map(|m| m.as_slice()).unwrap_or(&[])
    }

    /// Returns the node that `mutation` is assigned to.
    pub fn node_of(&self, mutation: &str) -> Option<usize> {
        self.index.get(mutation).copied()
    }

    /// Returns the inverse map of mutation to node.
    pub fn mutation_to_node(&self) -> &HashMap<String, usize> {
        &self.index
    }

    /// Returns the nodes (with at least one mutation) and their mutations, by ascending node id.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[String])> {
        self.nodes.iter().map(|(node, mutations)| (*node, mutations.as_slice()))
    }

    /// Returns the largest node id holding a mutation.
    pub fn max_node(&self) -> Option<usize> {
        self.nodes.keys().next_back().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns the total number of mutations.
    pub fn len(&self) -> usize {
        self.index.len()
    }
}

impl TryFrom<BTreeMap<usize, Vec<String>>> for MutationAssignment {
    type Error = Report;
    fn try_from(nodes: BTreeMap<usize, Vec<String>>) -> Result<Self, Report> {
        let mut assignment = MutationAssignment::new();
        for (node, mutations) in nodes {
            // keep nodes that are explicitly listed, even without mutations
            assignment.nodes.entry(node).or_default();
            mutations.iter().try_for_each(|m| assignment.insert(node, m))?;
        }
        Ok(assignment)
    }
}

impl From<MutationAssignment> for BTreeMap<usize, Vec<String>> {
    fn from(assignment: MutationAssignment) -> Self {
        assignment.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() -> Result<(), Report> {
        let mut assignment = MutationAssignment::new();
        assignment.insert(1, "TP53")?;
        assignment.insert(1, "PIK3CA")?;
        assignment.insert(3, "KRAS")?;
        assert_eq!(assignment.mutations(1), ["TP53", "PIK3CA"]);
        assert!(assignment.mutations(0).is_empty());
        assert_eq!(assignment.len(), 3);
        assert_eq!(assignment.max_node(), Some(3));
        assert!(assignment.insert(2, "KRAS").is_err());
        Ok(())
    }

    #[test]
    fn empty_nodes_survive_round_trip() -> Result<(), Report> {
        let json = r#"{"0":[],"1":["TP53"]}"#;
        let assignment: MutationAssignment = serde_json::from_str(json)?;
        assert_eq!(serde_json::to_string(&assignment)?, json);
        Ok(())
    }
}
