use color_eyre::eyre::{eyre, Report, Result};
use itertools::Itertools;
use ndarray::Array2;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::Bfs;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// A rooted [`CandidateTree`] of clones, over integer node ids `0..N`.
///
/// ## Introduction
///
/// - Node ids are the indices of the underlying graph, so node `i` is always [`NodeIndex`] `i`.
/// - Exactly one node (the root, conventionally the "normal" clone) has no parent.
/// - Every other node has exactly one parent, and there are no cycles.
///
/// The tree is immutable once constructed. Structural edits (see [`collapse`](crate::collapse))
/// operate on an [`EditableTree`](crate::EditableTree) and produce a new [`CandidateTree`].
///
/// A [`CandidateTree`] is serialized as a map of parent to children, the same layout used
/// by the tree ensemble files.
///
/// ```rust
/// use clonetrack_phylo::CandidateTree;
/// let tree: CandidateTree = serde_json::from_str(r#"{"0": [1], "1": [2, 3]}"#)?;
/// assert_eq!(tree.len(), 4);
/// assert_eq!(tree.children(1), [2, 3]);
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(try_from = "BTreeMap<usize, Vec<usize>>", into = "BTreeMap<usize, Vec<usize>>")]
pub struct CandidateTree {
    /// Directed graph of parent to child edges, node weights are the node ids.
    graph: Graph<usize, ()>,
}

impl CandidateTree {
    /// Returns a new [`CandidateTree`] with `n` nodes connected by (parent, child) `edges`.
    ///
    /// - Returns an error if an edge refers to a node id >= `n`.
    /// - Returns an error if a node has more than one parent.
    /// - Returns an error if the edges introduce a cycle, or if there is not exactly one root.
    ///
    /// ## Examples
    ///
    /// ```rust
    /// use clonetrack_phylo::CandidateTree;
    /// let tree = CandidateTree::from_edges(3, [(0, 1), (1, 2)])?;
    /// assert_eq!(tree.root(), Some(0));
    ///
    /// // node 2 has two parents
    /// assert!(CandidateTree::from_edges(3, [(0, 2), (1, 2)]).is_err());
    /// // a cycle, with no root
    /// assert!(CandidateTree::from_edges(2, [(0, 1), (1, 0)]).is_err());
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn from_edges<I>(n: usize, edges: I) -> Result<Self, Report>
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let mut graph = Graph::with_capacity(n, n.saturating_sub(1));
        (0..n).for_each(|i| {
            graph.add_node(i);
        });

        for (parent, child) in edges {
            if parent >= n || child >= n {
                return Err(eyre!("Edge {parent} -> {child} refers to a node outside of 0..{n}."));
            }
            if parent == child {
                return Err(eyre!("Edge {parent} -> {child} is a self loop."));
            }
            let child_index = NodeIndex::new(child);
            if let Some(existing) = graph.neighbors_directed(child_index, Direction::Incoming).next() {
                return Err(eyre!(
                    "Node {child} has more than one parent: {} and {parent}.",
                    existing.index()
                ));
            }
            graph.add_edge(NodeIndex::new(parent), child_index, ());
        }

        if is_cyclic_directed(&graph) {
            return Err(eyre!("Tree edges introduced a cycle."));
        }

        let tree = CandidateTree { graph };
        let roots = (0..n).filter(|i| tree.parent(*i).is_none()).collect_vec();
        match roots.len() {
            1 => Ok(tree),
            0 => Err(eyre!("Failed to locate root node in tree.")),
            _ => Err(eyre!("Failed to locate root node in tree, multiple roots found: {roots:?}")),
        }
    }

    /// Returns a new [`CandidateTree`] from an `N x N` edge indicator matrix.
    ///
    /// A non-zero value at (parent row, child column) is an edge.
    ///
    /// ```rust
    /// use clonetrack_phylo::CandidateTree;
    /// use ndarray::array;
    /// let edges = array![[0_u8, 1, 0], [0, 0, 1], [0, 0, 0]];
    /// let tree = CandidateTree::from_edge_matrix(&edges)?;
    /// assert_eq!(tree.parent(2), Some(1));
    /// assert_eq!(tree.edge_matrix(), edges);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn from_edge_matrix(matrix: &Array2<u8>) -> Result<Self, Report> {
        let (n, m) = matrix.dim();
        if n != m {
            return Err(eyre!("Edge matrix must be square, found shape ({n}, {m})."));
        }
        let edges = matrix.indexed_iter().filter(|(_, edge)| **edge != 0).map(|(index, _)| index);
        CandidateTree::from_edges(n, edges)
    }

    /// Returns a new [`CandidateTree`] from a map of parent to children.
    ///
    /// The number of nodes is one more than the largest node id mentioned. An empty map
    /// is a tree with a single root node.
    pub fn from_children(children: &BTreeMap<usize, Vec<usize>>) -> Result<Self, Report> {
        let n = children
            .iter()
            .flat_map(|(parent, children)| std::iter::once(parent).chain(children.iter()))
            .max()
            .map(|max| max + 1)
            .unwrap_or(1);
        let edges = children.iter().flat_map(|(p, cs)| cs.iter().map(move |c| (*p, *c)));
        CandidateTree::from_edges(n, edges)
    }

    /// Returns the number of nodes.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns the parent of `node`, or [`None`] for the root (or an unknown node).
    pub fn parent(&self, node: usize) -> Option<usize> {
        if node >= self.len() {
            return None;
        }
        self.graph
            .neighbors_directed(NodeIndex::new(node), Direction::Incoming)
            .next()
            .map(|i| i.index())
    }

    /// Returns the children of `node`, in ascending order.
    pub fn children(&self, node: usize) -> Vec<usize> {
        if node >= self.len() {
            return Vec::new();
        }
        self.graph
            .neighbors_directed(NodeIndex::new(node), Direction::Outgoing)
            .map(|i| i.index())
            .sorted()
            .collect()
    }

    pub fn is_leaf(&self, node: usize) -> bool {
        self.children(node).is_empty()
    }

    /// Returns the (parent, child) edges, sorted by parent then child.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        (0..self.len()).filter_map(|c| self.parent(c).map(|p| (p, c))).sorted().collect()
    }

    /// Returns the root by walking child to parent links, starting from node 0.
    ///
    /// The walk is bounded by the number of nodes, returns [`None`] if the root is
    /// indeterminate (empty tree, or a cycle was encountered).
    ///
    /// ```rust
    /// use clonetrack_phylo::CandidateTree;
    /// let tree = CandidateTree::from_edges(4, [(2, 0), (2, 1), (1, 3)])?;
    /// assert_eq!(tree.root(), Some(2));
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn root(&self) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let mut visited = HashSet::new();
        let mut current = 0;
        for _ in 0..=self.len() {
            if !visited.insert(current) {
                return None;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return Some(current),
            }
        }
        None
    }

    /// Returns the node ids in breadth-first order, starting from the root.
    ///
    /// ```rust
    /// use clonetrack_phylo::CandidateTree;
    /// let tree = CandidateTree::from_edges(4, [(0, 1), (0, 2), (1, 3)])?;
    /// let order = tree.breadth_first_order()?;
    /// assert_eq!(order[0], 0);
    /// assert_eq!(order[3], 3);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn breadth_first_order(&self) -> Result<Vec<usize>, Report> {
        let root = self.root().ok_or_else(|| eyre!("Failed to locate root node in tree."))?;
        let mut bfs = Bfs::new(&self.graph, NodeIndex::new(root));
        let mut order = Vec::with_capacity(self.len());
        while let Some(node_index) = bfs.next(&self.graph) {
            order.push(node_index.index());
        }
        Ok(order)
    }

    /// Returns the `N x N` ancestor-descendant matrix, where `A[i][j]` is `true`
    /// if node `i` is a strict ancestor of node `j`.
    ///
    /// Nodes are processed in reverse breadth-first order (leaves to root), and each
    /// parent accumulates the descendants of its children.
    ///
    /// ```rust
    /// use clonetrack_phylo::CandidateTree;
    /// let tree = CandidateTree::from_edges(3, [(0, 1), (1, 2)])?;
    /// let a = tree.ancestor_descendant_matrix()?;
    /// assert!(a[(0, 2)]);
    /// assert!(!a[(2, 0)]);
    /// assert!(!a[(1, 1)]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn ancestor_descendant_matrix(&self) -> Result<Array2<bool>, Report> {
        let n = self.len();
        let mut matrix = Array2::from_elem((n, n), false);
        for node in self.breadth_first_order()?.into_iter().rev() {
            for child in self.children(node) {
                matrix[(node, child)] = true;
                let descendants = matrix.row(child).to_owned();
                matrix.row_mut(node).zip_mut_with(&descendants, |a, d| *a |= *d);
            }
        }
        Ok(matrix)
    }

    /// Returns the map of child to parent.
    pub fn parent_map(&self) -> BTreeMap<usize, usize> {
        self.edges().into_iter().map(|(p, c)| (c, p)).collect()
    }

    /// Returns the map of parent to children, only nodes with children are included.
    pub fn children_map(&self) -> BTreeMap<usize, Vec<usize>> {
        (0..self.len())
            .map(|node| (node, self.children(node)))
            .filter(|(_, children)| !children.is_empty())
            .collect()
    }

    /// Returns the `N x N` edge indicator matrix (parent row, child column).
    pub fn edge_matrix(&self) -> Array2<u8> {
        let n = self.len();
        let mut matrix = Array2::zeros((n, n));
        self.edges().into_iter().for_each(|(p, c)| matrix[(p, c)] = 1);
        matrix
    }
}

impl PartialEq for CandidateTree {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.edges() == other.edges()
    }
}

impl TryFrom<BTreeMap<usize, Vec<usize>>> for CandidateTree {
    type Error = Report;
    fn try_from(children: BTreeMap<usize, Vec<usize>>) -> Result<Self, Report> {
        CandidateTree::from_children(&children)
    }
}

impl From<CandidateTree> for BTreeMap<usize, Vec<usize>> {
    fn from(tree: CandidateTree) -> Self {
        tree.children_map()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_of_large_chain() -> Result<(), Report> {
        // a fixed iteration cap would report a false cycle on a long chain
        let n = 500;
        let tree = CandidateTree::from_edges(n, (0..n - 1).map(|i| (i + 1, i)))?;
        assert_eq!(tree.root(), Some(n - 1));
        assert_eq!(tree.breadth_first_order()?.len(), n);
        Ok(())
    }

    #[test]
    fn multiple_roots() {
        let result = CandidateTree::from_edges(4, [(0, 1), (2, 3)]);
        assert!(result.is_err());
    }

    #[test]
    fn children_map_round_trip() -> Result<(), Report> {
        let children = BTreeMap::from([(0, vec![1]), (1, vec![2, 3]), (3, vec![4])]);
        let tree = CandidateTree::from_children(&children)?;
        assert_eq!(tree.children_map(), children);
        assert_eq!(tree.parent_map(), BTreeMap::from([(1, 0), (2, 1), (3, 1), (4, 3)]));
        let json = serde_json::to_string(&tree)?;
        let back: CandidateTree = serde_json::from_str(&json)?;
        assert_eq!(tree, back);
        Ok(())
    }

    #[test]
    fn ancestor_matrix_branching() -> Result<(), Report> {
        let tree = CandidateTree::from_edges(5, [(0, 1), (1, 2), (1, 3), (3, 4)])?;
        let a = tree.ancestor_descendant_matrix()?;
        let descendants_of_1 = (0..5).filter(|j| a[(1, *j)]).collect_vec();
        assert_eq!(descendants_of_1, [2, 3, 4]);
        assert!(!a[(2, 3)] && !a[(3, 2)]);
        assert!(a[(0, 4)]);
        Ok(())
    }

    #[test]
    fn single_node_tree() -> Result<(), Report> {
        let tree = CandidateTree::from_children(&BTreeMap::new())?;
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root(), Some(0));
        assert!(tree.is_leaf(0));
        Ok(())
    }
}
