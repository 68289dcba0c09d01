use crate::ensemble::summary::{Summary, SIGNIFICANT_WEIGHT};
use crate::Ensemble;
use clap::Parser;
use color_eyre::eyre::{Report, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Summarize the weights of a tree ensemble.
#[derive(Clone, Debug, Deserialize, Parser, PartialEq, Serialize)]
#[clap(verbatim_doc_comment)]
pub struct SummaryArgs {
    /// Tree ensemble (JSON, optionally zstd compressed).
    #[clap(short = 'e', long, required = true)]
    pub ensemble: PathBuf,

    /// Normalized weight a tree must exceed to count as significant.
    #[clap(long, default_value_t = SummaryArgs::default().threshold)]
    pub threshold: f64,
}

impl Default for SummaryArgs {
    fn default() -> Self {
        SummaryArgs { ensemble: PathBuf::new(), threshold: SIGNIFICANT_WEIGHT }
    }
}

/// Prints the ensemble [`Summary`] and a markdown table of tree weights.
pub fn summary(args: &SummaryArgs) -> Result<Summary, Report> {
    let ensemble = Ensemble::read(&args.ensemble)?;
    let summary = ensemble.summary(args.threshold);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    println!("{}", ensemble.to_table()?.to_markdown());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Member;
    use clonetrack_phylo::examples;
    use tempfile::tempdir;

    #[test]
    fn summary_of_written_ensemble() -> Result<(), Report> {
        let (tree, assignment) = examples::chain()?;
        let members = [90.0, 9.5, 0.5].map(|w| Member::new(tree.clone(), assignment.clone(), w));
        let dir = tempdir()?;
        let path = dir.path().join("posterior.json.zst");
        Ensemble::new(members.to_vec())?.write(&path)?;

        let summary = summary(&SummaryArgs { ensemble: path, ..Default::default() })?;
        assert_eq!(summary.members, 3);
        assert_eq!(summary.dominant, Some(0));
        assert_eq!(summary.significant, 2);
        Ok(())
    }
}
