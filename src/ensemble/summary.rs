use crate::ensemble::{normalize, Ensemble};
use crate::Table;
use color_eyre::eyre::{Report, Result};
use serde::{Deserialize, Serialize};
use structdoc::StructDoc;

/// Default normalized weight a member must exceed to count as significant.
pub const SIGNIFICANT_WEIGHT: f64 = 0.01;

/// Returns the Shannon entropy (natural log) of the normalized `weights`.
///
/// Zero weights contribute nothing. A single member (or an empty ensemble) has entropy 0.
///
/// ```rust
/// use clonetrack::ensemble::summary::entropy;
/// assert_eq!(entropy(&[100.0]), 0.0);
/// assert!((entropy(&[25.0, 25.0, 0.0]) - 2_f64.ln()).abs() < 1e-12);
/// ```
pub fn entropy(weights: &[f64]) -> f64 {
    if weights.is_empty() {
        return 0.0;
    }
    -normalize(weights, 1.0).into_iter().filter(|p| *p > 0.0).map(|p| p * p.ln()).sum::<f64>()
}

/// Returns the index and weight of the heaviest member, the first one on ties.
pub fn dominant(weights: &[f64]) -> Option<(usize, f64)> {
    weights.iter().copied().enumerate().fold(None, |best, (i, w)| match best {
        Some((_, b)) if b >= w => best,
        _ => Some((i, w)),
    })
}

/// Returns the number of members whose normalized weight exceeds `threshold`.
pub fn significant(weights: &[f64], threshold: f64) -> usize {
    if weights.is_empty() {
        return 0;
    }
    normalize(weights, 1.0).into_iter().filter(|p| *p > threshold).count()
}

/// Summary statistics of the weights of an [`Ensemble`].
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, StructDoc)]
pub struct Summary {
    /// Number of members.
    pub members: usize,
    /// Sum of the raw weights.
    pub total_weight: f64,
    /// Shannon entropy of the normalized weights.
    pub entropy: f64,
    /// Index of the heaviest member.
    pub dominant: Option<usize>,
    /// Normalized weight of the heaviest member, as a percentage.
    pub dominant_percent: f64,
    /// Members whose normalized weight exceeds the threshold.
    pub significant: usize,
}

impl Ensemble {
    /// Returns the [`Summary`] of the ensemble weights.
    ///
    /// ```rust
    /// use clonetrack::{Ensemble, Member};
    /// use clonetrack_phylo::examples;
    /// let (tree, assignment) = examples::branching()?;
    /// let members = [60.0, 39.5, 0.5].map(|w| Member::new(tree.clone(), assignment.clone(), w));
    /// let summary = Ensemble::new(members.to_vec())?.summary(0.01);
    /// assert_eq!(summary.dominant, Some(0));
    /// assert_eq!(summary.significant, 2);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn summary(&self, threshold: f64) -> Summary {
        let weights = self.weights();
        let total_weight = weights.iter().sum();
        let dominant = dominant(&weights).map(|(i, _)| i);
        let dominant_percent = match dominant {
            Some(i) => normalize(&weights, 100.0)[i],
            None => 0.0,
        };
        Summary {
            members: weights.len(),
            total_weight,
            entropy: entropy(&weights),
            dominant,
            dominant_percent,
            significant: significant(&weights, threshold),
        }
    }

    /// Returns a table of member weights, sorted heaviest first, with the normalized percentage.
    pub fn to_table(&self) -> Result<Table<String>, Report> {
        let weights = self.weights();
        let percent = normalize(&weights, 100.0);
        let mut order: Vec<usize> = (0..weights.len()).collect();
        order.sort_by(|a, b| weights[*b].total_cmp(&weights[*a]).then(a.cmp(b)));

        let mut table = Table::new();
        table.headers = ["member", "weight", "percent", "nodes", "mutations"].map(String::from).to_vec();
        for i in order {
            let member = &self.members()[i];
            table.add_row(vec![
                i.to_string(),
                format!("{:.4}", weights[i]),
                format!("{:.2}", percent[i]),
                member.tree.len().to_string(),
                member.assignment.len().to_string(),
            ])?;
        }
        Ok(table)
    }
}
