use crate::{CandidateTree, MutationAssignment};
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use itertools::Itertools;
use log::{debug, warn};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ----------------------------------------------------------------------------
// Editable Tree
// ----------------------------------------------------------------------------

/// A mutable working copy of a [`CandidateTree`], used while collapsing nodes.
///
/// Node ids are never reused or shifted: deleted nodes are only flagged as removed,
/// and [`EditableTree::to_tree`] renumbers the survivors once at the end.
#[derive(Clone, Debug, PartialEq)]
pub struct EditableTree {
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    removed: Vec<bool>,
}

impl From<&CandidateTree> for EditableTree {
    fn from(tree: &CandidateTree) -> Self {
        let n = tree.len();
        EditableTree {
            parent: (0..n).map(|node| tree.parent(node)).collect(),
            children: (0..n).map(|node| tree.children(node)).collect(),
            removed: vec![false; n],
        }
    }
}

impl EditableTree {
    /// Returns the number of nodes that have not been deleted.
    pub fn len(&self) -> usize {
        self.removed.iter().filter(|r| !**r).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_removed(&self, node: usize) -> bool {
        self.removed.get(node).copied().unwrap_or(true)
    }

    pub fn parent(&self, node: usize) -> Option<usize> {
        self.parent.get(node).copied().flatten()
    }

    pub fn children(&self, node: usize) -> &[usize] {
        self.children.get(node).map(|c| c.as_slice()).unwrap_or(&[])
    }

    pub fn is_root(&self, node: usize) -> bool {
        !self.is_removed(node) && self.parent(node).is_none()
    }

    pub fn is_leaf(&self, node: usize) -> bool {
        !self.is_removed(node) && self.children(node).is_empty()
    }

    /// Deletes `node` from the tree.
    ///
    /// - A leaf is removed along with the edge to its parent.
    /// - An internal node is removed, and its children are reattached to its parent.
    /// - The root can only be deleted if it has exactly one child, which becomes the new root.
    ///
    /// Returns an error, and leaves the tree unmodified, if the node does not exist,
    /// is the root with more than one child, or is the last remaining node.
    ///
    /// ```rust
    /// use clonetrack_phylo::{CandidateTree, EditableTree};
    /// let tree = CandidateTree::from_edges(3, [(0, 1), (0, 2)])?;
    /// let mut editable = EditableTree::from(&tree);
    /// assert!(editable.delete_node(0).is_err());
    /// editable.delete_node(1)?;
    /// editable.delete_node(0)?;
    /// assert!(editable.is_root(2));
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn delete_node(&mut self, node: usize) -> Result<(), Report> {
        if self.is_removed(node) {
            return Err(eyre!("Node {node} does not exist in the tree."));
        }
        if self.len() == 1 {
            return Err(eyre!("Node {node} is the only node remaining in the tree."));
        }

        let children = std::mem::take(&mut self.children[node]);
        match self.parent[node] {
            None => {
                if children.len() != 1 {
                    self.children[node] = children;
                    return Err(eyre!(
                        "Root node {node} can not be deleted because it has {} children.",
                        self.children[node].len()
                    ));
                }
                self.parent[children[0]] = None;
            }
            Some(parent) => {
                self.children[parent].retain(|c| *c != node);
                for child in children {
                    self.parent[child] = Some(parent);
                    self.children[parent].push(child);
                }
                self.children[parent].sort();
            }
        }
        self.parent[node] = None;
        self.removed[node] = true;
        Ok(())
    }

    /// Returns a new [`CandidateTree`] of the remaining nodes, renumbered `0..len`
    /// in ascending order of their original ids.
    pub fn to_tree(&self) -> Result<CandidateTree, Report> {
        let ids = self.remaining_ids();
        let edges = ids
            .iter()
            .filter_map(|(old, new)| self.parent(*old).map(|p| (ids[&p], *new)))
            .collect_vec();
        CandidateTree::from_edges(ids.len(), edges)
    }

    /// Returns the map of original node id to renumbered node id, for remaining nodes.
    pub fn remaining_ids(&self) -> BTreeMap<usize, usize> {
        (0..self.removed.len())
            .filter(|node| !self.removed[*node])
            .enumerate()
            .map(|(new, old)| (old, new))
            .collect()
    }
}

// ----------------------------------------------------------------------------
// Collapse
// ----------------------------------------------------------------------------

/// The per-node matrices that travel with a tree through [`collapse`].
///
/// With `N` nodes, `S` samples and `M` mutations:
///
/// - `u`: clonal frequencies, `S x N` (one column per node).
/// - `c`: clone indicator, `N x M` (one row per node).
/// - `a`: adjacency, `N x N`.
/// - `w`: mutation weights, `N x M` (the row sum is the branch weight of a node).
///
/// Each matrix is serialized as a list of rows.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TreeMatrices {
    #[serde(with = "rows")]
    pub u: Array2<f64>,
    #[serde(with = "rows")]
    pub c: Array2<f64>,
    #[serde(with = "rows")]
    pub a: Array2<f64>,
    #[serde(with = "rows")]
    pub w: Array2<f64>,
}

impl TreeMatrices {
    /// Returns an error if any matrix does not have one entry per node along its node axis.
    pub fn validate(&self, n: usize) -> Result<(), Report> {
        let checks = [
            ("U", "columns", self.u.ncols()),
            ("C", "rows", self.c.nrows()),
            ("A", "rows", self.a.nrows()),
            ("A", "columns", self.a.ncols()),
            ("W", "rows", self.w.nrows()),
        ];
        for (name, axis, found) in checks {
            if found != n {
                return Err(eyre!("Matrix {name} has {found} {axis}, but the tree has {n} nodes."));
            }
        }
        Ok(())
    }

    /// Returns new matrices with the rows and columns of the `removed` nodes dropped.
    fn prune(&self, removed: &[usize]) -> TreeMatrices {
        let keep = (0..self.a.nrows()).filter(|node| !removed.contains(node)).collect_vec();
        TreeMatrices {
            u: self.u.select(Axis(1), &keep),
            c: self.c.select(Axis(0), &keep),
            a: self.a.select(Axis(0), &keep).select(Axis(1), &keep),
            w: self.w.select(Axis(0), &keep),
        }
    }
}

/// Serde adapter between an [`Array2`] and a list of equal length rows.
mod rows {
    use itertools::Itertools;
    use ndarray::Array2;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(matrix: &Array2<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(matrix.outer_iter().map(|row| row.to_vec()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Array2<f64>, D::Error> {
        let rows = Vec::<Vec<f64>>::deserialize(deserializer)?;
        let ncols = rows.first().map(|row| row.len()).unwrap_or(0);
        if let Some((i, row)) = rows.iter().find_position(|row| row.len() != ncols) {
            return Err(D::Error::custom(format!("Matrix row {i} has {} columns, expected {ncols}.", row.len())));
        }
        let shape = (rows.len(), ncols);
        Array2::from_shape_vec(shape, rows.into_iter().flatten().collect()).map_err(D::Error::custom)
    }
}

/// The output of [`collapse`].
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Collapsed {
    pub tree: CandidateTree,
    pub assignment: MutationAssignment,
    pub matrices: TreeMatrices,
    /// Original ids of the removed nodes, ascending.
    pub removed: Vec<usize>,
}

/// Simplifies a tree by removing nodes that carry no information.
///
/// In standard mode:
///
/// 1. Every non-root node with zero branch weight (`W` row sum) is deleted, and its
///    frequency (`U` column) is added to its parent's.
/// 2. Of the remaining non-root nodes with mean frequency `<= threshold`, single-child
///    nodes are merged into their child (`W` row added to the child's) and leaves are deleted.
///
/// With `only_leaf`, the zero weight pass skips leaves, then leaves with mean
/// frequency `<= threshold` are deleted, then every remaining non-root node with a
/// single child is merged into that child. Nodes with several children are only ever
/// removed by the zero weight pass, which reattaches their children.
///
/// Nodes are inspected from the highest id to the lowest. Matrices are only reduced
/// once, after all deletions, by the same list of removed nodes. The input is not modified.
///
/// ## Examples
///
/// ```rust
/// use clonetrack_phylo::{collapse, examples, TreeMatrices};
/// use ndarray::array;
/// let (tree, assignment) = examples::chain()?;
/// let matrices = TreeMatrices {
///     u: array![[1.0, 0.6, 0.3]],
///     c: array![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]],
///     a: array![[0.0, 1.0, 1.0], [0.0, 0.0, 1.0], [0.0, 0.0, 0.0]],
///     w: array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
/// };
/// let collapsed = collapse(&tree, &assignment, &matrices, 0.0, false)?;
/// assert!(collapsed.removed.is_empty());
/// assert_eq!(collapsed.matrices, matrices);
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn collapse(
    tree: &CandidateTree,
    assignment: &MutationAssignment,
    matrices: &TreeMatrices,
    threshold: f64,
    only_leaf: bool,
) -> Result<Collapsed, Report> {
    let n = tree.len();
    matrices.validate(n)?;
    if let Some(max) = assignment.max_node() {
        if max >= n {
            return Err(eyre!("Mutation assignment refers to node {max}, but the tree only has {n} nodes."));
        }
    }

    let mut editable = EditableTree::from(tree);
    let mut u = matrices.u.clone();
    let mut w = matrices.w.clone();
    let mut mutations: BTreeMap<usize, Vec<String>> =
        assignment.iter().map(|(node, m)| (node, m.to_vec())).collect();

    // zero weight branches
    let branch_removed = (0..n)
        .rev()
        .filter(|node| tree.parent(*node).is_some())
        .filter(|node| w.row(*node).sum() == 0.0)
        .filter(|node| !only_leaf || !tree.is_leaf(*node))
        .collect_vec();
    debug!("Collapsing zero weight branches: {branch_removed:?}");
    for node in &branch_removed {
        let parent = editable
            .parent(*node)
            .ok_or_else(|| eyre!("Node {node} lost its parent while collapsing."))?;
        let frequency = u.column(*node).to_owned();
        let mut parent_frequency = u.column_mut(parent);
        parent_frequency += &frequency;
        transfer(&mut mutations, *node, parent);
        editable.delete_node(*node)?;
    }

    let below = |node: usize, editable: &EditableTree| {
        !editable.is_removed(node)
            && !editable.is_root(node)
            && u.column(node).mean().unwrap_or(0.0) <= threshold
    };

    let (merged, leaves_removed) = if !only_leaf {
        let candidates = (0..n).rev().filter(|node| below(*node, &editable)).collect_vec();
        let merged = candidates
            .iter()
            .filter(|node| editable.children(**node).len() == 1)
            .copied()
            .collect_vec();
        let leaves = candidates.into_iter().filter(|node| editable.is_leaf(*node)).collect_vec();
        merge_single_children(&mut editable, &mut w, &mut mutations, &merged)?;
        delete_leaves(&mut editable, &mut mutations, &leaves)?;
        (merged, leaves)
    } else {
        let leaves = (0..n)
            .rev()
            .filter(|node| below(*node, &editable) && editable.is_leaf(*node))
            .collect_vec();
        delete_leaves(&mut editable, &mut mutations, &leaves)?;
        let merged = (0..n)
            .rev()
            .filter(|node| !editable.is_removed(*node) && !editable.is_root(*node))
            .filter(|node| editable.children(*node).len() == 1)
            .collect_vec();
        merge_single_children(&mut editable, &mut w, &mut mutations, &merged)?;
        (merged, leaves)
    };

    let removed = branch_removed
        .into_iter()
        .chain(merged)
        .chain(leaves_removed)
        .sorted()
        .dedup()
        .collect_vec();
    debug!("Nodes {removed:?} will be collapsed.");

    let ids = editable.remaining_ids();
    let mut remapped = MutationAssignment::new();
    for (node, names) in &mutations {
        let Some(new) = ids.get(node) else { continue };
        for name in names {
            remapped.insert(*new, name)?;
        }
    }

    let matrices = TreeMatrices { u, w, ..matrices.clone() }.prune(&removed);
    let tree = editable.to_tree().wrap_err("Failed to rebuild tree after collapsing nodes.")?;
    Ok(Collapsed { tree, assignment: remapped, matrices, removed })
}

/// Merges each single-child node into its current child.
fn merge_single_children(
    editable: &mut EditableTree,
    w: &mut Array2<f64>,
    mutations: &mut BTreeMap<usize, Vec<String>>,
    nodes: &[usize],
) -> Result<(), Report> {
    for node in nodes {
        let child = match editable.children(*node) {
            [child] => *child,
            children => return Err(eyre!("Node {node} has {} children, expected one.", children.len())),
        };
        editable.delete_node(*node)?;
        let weights = w.row(*node).to_owned();
        let mut child_weights = w.row_mut(child);
        child_weights += &weights;
        transfer(mutations, *node, child);
    }
    Ok(())
}

fn delete_leaves(
    editable: &mut EditableTree,
    mutations: &mut BTreeMap<usize, Vec<String>>,
    nodes: &[usize],
) -> Result<(), Report> {
    for node in nodes {
        editable.delete_node(*node)?;
        if let Some(dropped) = mutations.remove(node).filter(|m| !m.is_empty()) {
            warn!("Mutations on collapsed leaf {node} were dropped: {}", dropped.join(", "));
        }
    }
    Ok(())
}

fn transfer(mutations: &mut BTreeMap<usize, Vec<String>>, source: usize, target: usize) {
    if let Some(moved) = mutations.remove(&source) {
        mutations.entry(target).or_default().extend(moved);
    }
}
