//! Miscellaneous file utilities.

pub mod verbosity;

use color_eyre::eyre::{eyre, ContextCompat, Report, Result, WrapErr};
use color_eyre::Help;
use std::fmt::Debug;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zstd::stream::read::Decoder;
use zstd::stream::write::Encoder;

/// Compression level used when writing `.zst` files.
const ZSTD_LEVEL: i32 = 3;

/// Returns true if the path ends with the `.zst` extension.
pub fn is_zst<P>(path: &P) -> bool
where
    P: AsRef<Path>,
{
    path.as_ref().extension().is_some_and(|ext| ext == "zst")
}

/// Returns the path without a trailing compression extension (ex. `.zst`).
///
/// ```rust
/// use clonetrack::utils::strip_compression;
/// use std::path::PathBuf;
/// assert_eq!(strip_compression(&"trees.json.zst"), PathBuf::from("trees.json"));
/// assert_eq!(strip_compression(&"trees.json"), PathBuf::from("trees.json"));
/// ```
pub fn strip_compression<P>(path: &P) -> PathBuf
where
    P: AsRef<Path>,
{
    match is_zst(path) {
        true => path.as_ref().with_extension(""),
        false => path.as_ref().to_path_buf(),
    }
}

/// Reads a text file into a [`String`], decompressing it first if it ends in `.zst`.
pub fn read_text<P>(path: &P) -> Result<String, Report>
where
    P: AsRef<Path> + Debug,
{
    let mut buffer = String::new();
    let file = std::fs::File::open(path).wrap_err_with(|| format!("Failed to open: {path:?}"))?;
    if is_zst(path) {
        let mut decoder = Decoder::new(file).wrap_err_with(|| format!("Failed to decode: {path:?}"))?;
        decoder
            .read_to_string(&mut buffer)
            .wrap_err_with(|| format!("Failed to decompress: {path:?}"))?;
    } else {
        let mut file = file;
        file.read_to_string(&mut buffer).wrap_err_with(|| format!("Failed to read: {path:?}"))?;
    }
    Ok(buffer)
}

/// Writes text to a file, compressing it if the path ends in `.zst`.
///
/// The parent directory is created if it does not exist.
pub fn write_text<P>(path: &P, text: &str) -> Result<(), Report>
where
    P: AsRef<Path> + Debug,
{
    create_parent_dir(path)?;
    let file = std::fs::File::create(path).wrap_err_with(|| format!("Unable to create file: {path:?}"))?;
    if is_zst(path) {
        let mut encoder =
            Encoder::new(file, ZSTD_LEVEL).wrap_err_with(|| format!("Failed to encode: {path:?}"))?;
        encoder.write_all(text.as_bytes()).wrap_err_with(|| format!("Failed to compress: {path:?}"))?;
        encoder.finish().wrap_err_with(|| format!("Failed to finish compression: {path:?}"))?;
    } else {
        let mut file = file;
        file.write_all(text.as_bytes()).wrap_err_with(|| format!("Failed to write: {path:?}"))?;
    }
    Ok(())
}

/// Creates the parent directory of a file path, if it does not already exist.
pub fn create_parent_dir<P>(path: &P) -> Result<(), Report>
where
    P: AsRef<Path> + Debug,
{
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create directory: {parent:?}"))?;
        }
    }
    Ok(())
}

/// Get delimiter based on file extension.
///
/// A trailing `.zst` is ignored, so that `observations.csv.zst` is comma-delimited.
///
/// - `.tsv` => `\t`
/// - `.txt` => `\t`
/// - `.csv` => `,`
///
/// Note that `.txt` is assumed to be tab-delimited!
///
/// ```rust
/// use clonetrack::utils::get_delimiter;
///
/// assert_eq!(get_delimiter(&"file.tsv")?, '\t');
/// assert_eq!(get_delimiter(&"file.csv")?, ',');
/// assert_eq!(get_delimiter(&"file.csv.zst")?, ',');
/// assert_eq!(get_delimiter(&"file.txt")?, '\t');
/// assert!(get_delimiter(&"file").is_err());
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn get_delimiter<P>(path: &P) -> Result<char, Report>
where
    P: AsRef<Path> + Debug,
{
    let path = strip_compression(path);
    let ext = path
        .extension()
        .wrap_err_with(|| format!("Failed to get file extension: {path:?}"))?
        .to_str()
        .wrap_err_with(|| format!("Failed to convert file extension to str: {path:?}"))?;
    match ext {
        "tsv" | "txt" => Ok('\t'),
        "csv" => Ok(','),
        _ext => {
            Err(eyre!("Unknown file extension: {_ext:?}").suggestion("Options: tsv, csv, or txt"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn zst_round_trip() -> Result<(), Report> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("text.json.zst");
        write_text(&path, "{\"freq\": [1]}")?;
        assert_eq!(read_text(&path)?, "{\"freq\": [1]}");
        // the file on disk is not plain text
        assert_ne!(std::fs::read(&path)?, b"{\"freq\": [1]}");
        Ok(())
    }
}
