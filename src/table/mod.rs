//! Create and manipulate the [Table].

use crate::utils;
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::path::{Path, PathBuf};

/// A row-based table of generic data.
///
/// # Examples
///
/// ```
/// use clonetrack::Table;
///
/// let mut table = Table::new();
/// table.headers = vec!["member", "weight"];
/// table.add_row(vec!["0", "62.5"])?;
///
/// println!("{}", table.to_markdown());
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
///
/// | member | weight |
/// |--------|--------|
/// |   0    |  62.5  |
///
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Table<T> {
    /// Names of the table columns.
    pub headers: Vec<T>,
    /// Rows of table values.
    pub rows: Vec<Vec<T>>,
    /// Optional file path for where the table was read from.
    pub path: Option<PathBuf>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Table<T> {
    /// Create a new table with empty headers and rows.
    pub fn new() -> Self {
        Table { headers: Vec::new(), rows: Vec::new(), path: None }
    }

    /// Add a new row to the table.
    ///
    /// - Returns an error if the row length does not match the headers.
    pub fn add_row(&mut self, row: Vec<T>) -> Result<(), Report> {
        let (new, ex) = (row.len(), self.headers.len());
        if new != ex {
            return Err(eyre!("New row size ({new}) does not match the table headers ({ex})."));
        }
        self.rows.push(row);
        Ok(())
    }
}

impl<T> Table<T>
where
    T: Display,
{
    /// Get the column index (0-based) corresponding to the header.
    ///
    /// ```
    /// use clonetrack::Table;
    ///
    /// let mut table = Table::new();
    /// table.headers = vec!["date", "gene"];
    /// assert_eq!(table.get_header_index("gene")?, 1);
    /// assert!(table.get_header_index("depth").is_err());
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn get_header_index(&self, header: &str) -> Result<usize, Report> {
        self.headers.iter().position(|h| h.to_string() == header).ok_or_else(|| {
            eyre!("Column '{header}' was not found in table: {:?}.", self.path)
                .suggestion(format!("Columns found: {}", self.headers.iter().join(", ")))
        })
    }

    /// Return a vector of table values in a column.
    pub fn get_column(&self, header: &str) -> Result<Vec<&T>, Report> {
        let header_i = self.get_header_index(header)?;
        Ok(self.rows.iter().map(|row| &row[header_i]).collect())
    }

    /// Write table to file, the delimiter is chosen by the file extension.
    ///
    /// ```
    /// use clonetrack::Table;
    /// use tempfile::tempdir;
    ///
    /// let mut table = Table::new();
    /// table.headers = vec!["member", "2021-03-01"];
    /// table.add_row(vec!["0", "62.5"])?;
    ///
    /// let dir = tempdir()?;
    /// let path = dir.path().join("trajectory.tsv");
    /// table.write(&path)?;
    /// assert_eq!(Table::read(&path)?.rows, [["0", "62.5"]]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn write<P>(&self, path: &P) -> Result<(), Report>
    where
        P: AsRef<Path> + Debug,
    {
        let delim = utils::get_delimiter(path)?.to_string();
        let mut text = format!("{}\n", self.headers.iter().join(&delim));
        for row in &self.rows {
            text.push_str(&format!("{}\n", row.iter().join(&delim)));
        }
        utils::write_text(path, &text).wrap_err_with(|| format!("Unable to write table: {path:?}"))
    }

    /// Convert table to markdown format.
    ///
    /// Cells are centered in columns as wide as the longest value, plus a space on either side.
    pub fn to_markdown(&self) -> String {
        let col_widths = self
            .headers
            .iter()
            .enumerate()
            .map(|(col_i, header)| {
                let cells = self.rows.iter().map(|row| row[col_i].to_string().len());
                cells.chain(std::iter::once(header.to_string().len())).max().unwrap_or(0) + 2
            })
            .collect_vec();

        let line = |cells: Vec<String>| {
            let cells = cells
                .iter()
                .zip(&col_widths)
                .map(|(c, w)| format!("{c:^width$}|", width = *w))
                .join("");
            format!("|{cells}\n")
        };

        let mut markdown = line(self.headers.iter().map(|h| h.to_string()).collect());
        markdown.push_str(&line(col_widths.iter().map(|w| "-".repeat(*w)).collect()));
        for row in &self.rows {
            markdown.push_str(&line(row.iter().map(|c| c.to_string()).collect()));
        }
        markdown
    }
}

impl Table<String> {
    /// Read a delimited file (optionally `.zst` compressed) into a Table.
    ///
    /// - The delimiter is chosen by the file extension (see [`get_delimiter`](utils::get_delimiter)).
    /// - The first line is the headers, blank lines are skipped.
    /// - Returns an error if a row does not have one value per header.
    pub fn read<P>(path: &P) -> Result<Table<String>, Report>
    where
        P: AsRef<Path> + Debug,
    {
        let delim = utils::get_delimiter(path)?;
        let text = utils::read_text(path).wrap_err_with(|| format!("Failed to read table: {path:?}"))?;

        let mut table = Table::new();
        let mut lines = text.lines().map(|l| l.trim_end_matches('\r')).filter(|l| !l.trim().is_empty());
        if let Some(headers) = lines.next() {
            table.headers = headers.split(delim).map(|h| h.trim().to_string()).collect();
        }
        for (i, line) in lines.enumerate() {
            let row = line.split(delim).map(|v| v.trim().to_string()).collect_vec();
            table
                .add_row(row)
                .wrap_err_with(|| format!("Malformed line {} of table: {path:?}", i + 2))?;
        }
        table.path = Some(path.as_ref().to_path_buf());
        Ok(table)
    }
}

impl<T> Table<T>
where
    T: ToString,
{
    /// Create a new table with all values converted to owned String.
    pub fn to_string_values(&self) -> Table<String> {
        Table {
            headers: self.headers.iter().map(|s| s.to_string()).collect(),
            rows: self.rows.iter().map(|row| row.iter().map(|s| s.to_string()).collect()).collect(),
            path: self.path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn markdown() -> Result<(), Report> {
        let mut table = Table::new();
        table.headers = vec!["1", "2", "3"];
        table.add_row(vec!["A", "BB", "C"])?;
        let expected = "| 1 | 2  | 3 |\n|---|----|---|\n| A | BB | C |\n";
        assert_eq!(table.to_markdown(), expected);
        Ok(())
    }

    #[test]
    fn read_csv_with_blank_lines() -> Result<(), Report> {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile()?;
        writeln!(file, "date,gene\r\n2021-01-01,TP53\n\n2021-02-01,KRAS")?;
        let table = Table::read(&file.path())?;
        assert_eq!(table.get_column("gene")?, [&"TP53", &"KRAS"]);
        Ok(())
    }

    #[test]
    fn ragged_row() -> Result<(), Report> {
        let mut file: NamedTempFile = tempfile::Builder::new().suffix(".tsv").tempfile()?;
        writeln!(file, "date\tgene\n2021-01-01")?;
        assert!(Table::read(&file.path()).is_err());
        Ok(())
    }
}
