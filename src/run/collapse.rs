use crate::utils;
use clap::Parser;
use clonetrack_phylo::{CandidateTree, Collapsed, MutationAssignment, TreeMatrices};
use color_eyre::eyre::{Report, Result, WrapErr};
use color_eyre::Help;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Collapse uninformative nodes of a tree, and its matrices.
#[derive(Clone, Debug, Deserialize, Parser, PartialEq, Serialize)]
#[clap(verbatim_doc_comment)]
pub struct CollapseArgs {
    /// Input JSON with the keys: tree, assignment (optional), matrices (u, c, a, w)
    #[clap(short = 'i', long, required = true)]
    pub input: PathBuf,

    /// Output JSON, the collapsed tree and matrices with the removed node ids.
    #[clap(short = 'o', long, required = true)]
    pub output: PathBuf,

    /// Nodes with a mean clonal frequency at or below this threshold are collapsed.
    #[clap(long, default_value_t = CollapseArgs::default().threshold)]
    pub threshold: f64,

    /// Only delete leaves by frequency, then merge single-child chains.
    #[clap(long, default_value_t = CollapseArgs::default().only_leaf)]
    pub only_leaf: bool,
}

impl Default for CollapseArgs {
    fn default() -> Self {
        CollapseArgs { input: PathBuf::new(), output: PathBuf::new(), threshold: 0.0, only_leaf: false }
    }
}

/// The input of the [`collapse`] command.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CollapseInput {
    pub tree: CandidateTree,
    #[serde(default)]
    pub assignment: MutationAssignment,
    pub matrices: TreeMatrices,
}

/// Collapses the tree and matrices of the input file, and writes the result.
pub fn collapse(args: &CollapseArgs) -> Result<Collapsed, Report> {
    info!("Reading tree and matrices: {:?}", args.input);
    let text = utils::read_text(&args.input)?;
    let input: CollapseInput = serde_json::from_str(&text)
        .wrap_err_with(|| format!("Failed to parse collapse input: {:?}", args.input))
        .suggestion("Expected a JSON object with the keys tree and matrices (u, c, a, w).")?;

    let collapsed =
        clonetrack_phylo::collapse(&input.tree, &input.assignment, &input.matrices, args.threshold, args.only_leaf)?;
    info!("Removed {} of {} nodes: {:?}", collapsed.removed.len(), input.tree.len(), collapsed.removed);

    let output = serde_json::to_string_pretty(&collapsed)
        .wrap_err_with(|| format!("Failed to serialize collapsed tree: {:?}", args.output))?;
    utils::write_text(&args.output, &output)?;
    Ok(collapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn collapse_zero_weight_node() -> Result<(), Report> {
        let dir = tempdir()?;
        let input = dir.path().join("tree.json");
        // node 2 carries no mutation weight, and folds into node 1
        std::fs::write(
            &input,
            indoc::indoc! {r#"
                {
                  "tree": {"0": [1], "1": [2, 3]},
                  "assignment": {"1": ["TP53"], "3": ["KRAS"]},
                  "matrices": {
                    "u": [[1.0, 0.5, 0.25, 0.25]],
                    "c": [[0, 0], [1, 0], [1, 0], [1, 1]],
                    "a": [[0, 1, 1, 1], [0, 0, 1, 1], [0, 0, 0, 0], [0, 0, 0, 0]],
                    "w": [[0, 0], [1, 0], [0, 0], [0, 1]]
                  }
                }
            "#},
        )?;
        let args = CollapseArgs { input, output: dir.path().join("collapsed.json"), ..Default::default() };
        let collapsed = collapse(&args)?;
        assert_eq!(collapsed.removed, [2]);
        assert_eq!(collapsed.tree.edges(), [(0, 1), (1, 2)]);
        assert_eq!(collapsed.matrices.u.row(0).to_vec(), [1.0, 0.75, 0.25]);
        assert_eq!(collapsed.assignment.node_of("KRAS"), Some(2));

        let written: Collapsed = serde_json::from_str(&std::fs::read_to_string(&args.output)?)?;
        assert_eq!(written, collapsed);
        Ok(())
    }
}
