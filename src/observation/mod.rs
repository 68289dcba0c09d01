//! Marker read-count observations (ex. ddPCR droplets), grouped by timepoint.

use crate::Table;
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;

/// Columns required in a longitudinal observation table.
pub const COLUMNS: [&str; 4] = ["date", "gene", "mutant_droplets", "total_droplets"];

// ----------------------------------------------------------------------------
// Observation
// ----------------------------------------------------------------------------

/// The mutant and total read counts of one marker at one timepoint.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Observation {
    /// Marker (gene/mutation) name, matched against the mutation names of each tree.
    pub marker: String,
    pub mutant: u64,
    pub total: u64,
}

impl Observation {
    /// Returns a new [`Observation`].
    ///
    /// - Returns an error if the mutant count exceeds the total count, or the total is zero.
    ///
    /// ```rust
    /// use clonetrack::Observation;
    /// let observation = Observation::new("KRAS", 80, 100)?;
    /// assert_eq!(observation.fraction(), 0.8);
    /// assert!(Observation::new("KRAS", 101, 100).is_err());
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn new(marker: &str, mutant: u64, total: u64) -> Result<Self, Report> {
        if total == 0 {
            return Err(eyre!("Marker {marker} has a total count of 0."));
        }
        if mutant > total {
            return Err(eyre!("Marker {marker} has more mutant ({mutant}) than total ({total}) counts."));
        }
        Ok(Observation { marker: marker.to_string(), mutant, total })
    }

    /// Returns the empirical mutant fraction (`mutant / total`).
    pub fn fraction(&self) -> f64 {
        self.mutant as f64 / self.total as f64
    }
}

// ----------------------------------------------------------------------------
// Marker Selection
// ----------------------------------------------------------------------------

/// The markers chosen for measurement at a timepoint, with the target read depth.
///
/// This is the hand-off from an upstream marker selector.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct MarkerSelection {
    pub markers: Vec<String>,
    pub read_depth: Option<u64>,
}

impl MarkerSelection {
    pub fn new(markers: &[&str], read_depth: Option<u64>) -> Self {
        MarkerSelection { markers: markers.iter().map(|m| m.to_string()).collect(), read_depth }
    }
}

// ----------------------------------------------------------------------------
// Panel
// ----------------------------------------------------------------------------

/// A [`Panel`] of marker observations at one timepoint.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Panel {
    pub timepoint: String,
    pub observations: Vec<Observation>,
}

impl Panel {
    pub fn new(timepoint: &str, observations: Vec<Observation>) -> Self {
        Panel { timepoint: timepoint.to_string(), observations }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Returns the observation of `marker`.
    pub fn get(&self, marker: &str) -> Option<&Observation> {
        self.observations.iter().find(|o| o.marker == marker)
    }

    pub fn markers(&self) -> Vec<&str> {
        self.observations.iter().map(|o| o.marker.as_str()).collect()
    }

    /// Returns a new panel with only the selected markers, in selection order.
    ///
    /// - Selected markers that were not observed are skipped with a warning.
    /// - Returns an error if none of the selected markers were observed.
    ///
    /// ```rust
    /// use clonetrack::{MarkerSelection, Observation, Panel};
    /// let panel = Panel::new("2021-03-01", vec![
    ///     Observation::new("TP53", 50, 100)?,
    ///     Observation::new("KRAS", 80, 100)?,
    /// ]);
    /// let selected = panel.select(&MarkerSelection::new(&["KRAS", "EGFR"], None))?;
    /// assert_eq!(selected.markers(), ["KRAS"]);
    ///
    /// assert!(panel.select(&MarkerSelection::new(&["EGFR"], None)).is_err());
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn select(&self, selection: &MarkerSelection) -> Result<Panel, Report> {
        let mut observations = Vec::new();
        for marker in selection.markers.iter().unique() {
            let Some(observation) = self.get(marker) else {
                warn!("Selected marker {marker} not found in observations for timepoint {}.", self.timepoint);
                continue;
            };
            if let Some(depth) = selection.read_depth {
                if observation.total < depth {
                    warn!(
                        "Marker {marker} at timepoint {} has {} total counts, below the target read depth of {depth}.",
                        self.timepoint, observation.total
                    );
                }
            }
            observations.push(observation.clone());
        }

        if observations.is_empty() {
            return Err(eyre!("No observations found for the selected markers at timepoint {}.", self.timepoint)
                .suggestion(format!("Selected: {}", selection.markers.join(", ")))
                .suggestion(format!("Observed: {}", self.markers().join(", "))));
        }
        Ok(Panel::new(&self.timepoint, observations))
    }
}

// ----------------------------------------------------------------------------
// Read
// ----------------------------------------------------------------------------

/// Read a longitudinal observation table into one [`Panel`] per timepoint.
///
/// - The table must have the columns `date`, `gene`, `mutant_droplets` and `total_droplets`.
/// - Panels are sorted by timepoint (`date`), observations keep their file order.
/// - A row with a total count of zero is skipped with a warning.
/// - Returns an error for unparsable or negative counts, a mutant count greater than
///   the total count, or a marker listed twice at the same timepoint.
pub fn read_panels<P>(path: &P) -> Result<Vec<Panel>, Report>
where
    P: AsRef<Path> + Debug,
{
    let table = Table::read(path)?;
    let columns = COLUMNS.iter().map(|c| table.get_header_index(c)).collect::<Result<Vec<_>, Report>>()?;
    let [date_i, gene_i, mutant_i, total_i] = [columns[0], columns[1], columns[2], columns[3]];

    let mut panels: BTreeMap<String, Panel> = BTreeMap::new();
    for (i, row) in table.rows.iter().enumerate() {
        let line = i + 2;
        let (date, gene) = (&row[date_i], &row[gene_i]);
        let parse = |value: &str, column: &str| {
            value.parse::<u64>().wrap_err_with(|| {
                format!("Line {line} of {path:?}: {column} must be a non-negative integer, found {value:?}.")
            })
        };
        let mutant = parse(&row[mutant_i], "mutant_droplets")?;
        let total = parse(&row[total_i], "total_droplets")?;
        if total == 0 {
            warn!("Line {line} of {path:?}: marker {gene} at {date} has no droplets and will be skipped.");
            continue;
        }
        let observation =
            Observation::new(gene, mutant, total).wrap_err_with(|| format!("Line {line} of {path:?}"))?;

        let panel = panels.entry(date.clone()).or_insert_with(|| Panel::new(date, Vec::new()));
        if panel.get(gene).is_some() {
            return Err(eyre!("Line {line} of {path:?}: marker {gene} is listed twice at {date}."));
        }
        panel.observations.push(observation);
    }

    debug!("Found {} timepoints: {}", panels.len(), panels.keys().join(", "));
    Ok(panels.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(text: &str) -> Result<tempfile::NamedTempFile, Report> {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile()?;
        write!(file, "{text}")?;
        Ok(file)
    }

    #[test]
    fn panels_by_date() -> Result<(), Report> {
        let file = write_csv(indoc::indoc! {"
            date,gene,mutant_droplets,total_droplets
            2021-06-01,TP53,40,1000
            2021-03-01,TP53,120,1000
            2021-03-01,KRAS,90,1000
            2021-06-01,KRAS,0,0
        "})?;
        let panels = read_panels(&file.path())?;
        assert_eq!(panels.iter().map(|p| p.timepoint.as_str()).collect_vec(), ["2021-03-01", "2021-06-01"]);
        assert_eq!(panels[0].markers(), ["TP53", "KRAS"]);
        // zero depth row is dropped
        assert_eq!(panels[1].markers(), ["TP53"]);
        assert_eq!(panels[1].get("TP53"), Some(&Observation::new("TP53", 40, 1000)?));
        Ok(())
    }

    #[test]
    fn invalid_counts() -> Result<(), Report> {
        let header = "date,gene,mutant_droplets,total_droplets\n";
        for row in ["2021-03-01,TP53,-1,100", "2021-03-01,TP53,101,100", "2021-03-01,TP53,x,100"] {
            let file = write_csv(&format!("{header}{row}\n"))?;
            assert!(read_panels(&file.path()).is_err(), "{row}");
        }
        let file = write_csv(&format!("{header}2021-03-01,TP53,1,100\n2021-03-01,TP53,2,100\n"))?;
        assert!(read_panels(&file.path()).is_err());
        Ok(())
    }

    #[test]
    fn missing_column() -> Result<(), Report> {
        let file = write_csv("date,gene,mutant_droplets\n2021-03-01,TP53,1\n")?;
        assert!(read_panels(&file.path()).is_err());
        Ok(())
    }
}
