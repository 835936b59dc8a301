//! Input discovery: identifier lists and folders of CSV files.

use crate::scraper::cleaner::normalise_identifier;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Read the first column of a one-identifier-per-row CSV.
/// Account lists carry a header row; handle lists do not.
pub fn read_identifiers(path: &Path, has_header: bool) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_header)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open identifier file {:?}", path))?;

    let mut ids = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Row {} in {:?}", i + 1, path))?;
        match record.get(0).and_then(normalise_identifier) {
            Some(id) => ids.push(id),
            None => warn!("Row {} in {:?} has no identifier, skipping", i + 1, path),
        }
    }

    debug!("{} identifiers read from {:?}", ids.len(), path);
    Ok(ids)
}

fn is_csv(path: &Path) -> bool {
    path.is_file() && path.extension().map(|e| e == "csv").unwrap_or(false)
}

/// All `*.csv` files directly inside `dir`, sorted by name.
pub fn discover_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to list {:?}", dir))? {
        let path = entry?.path();
        if is_csv(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// A single CSV file, or every CSV file of a folder.
pub fn csv_inputs(location: &Path) -> Result<Vec<PathBuf>> {
    if location.is_dir() {
        discover_csv_files(location)
    } else if location.is_file() {
        Ok(vec![location.to_path_buf()])
    } else {
        anyhow::bail!("Input {:?} does not exist", location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn account_file_header_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.csv");
        fs::write(&path, "account_id\n111\n 222 \n\n").unwrap();

        assert_eq!(read_identifiers(&path, true).unwrap(), ["111", "222"]);
    }

    #[test]
    fn handle_file_has_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handles.csv");
        fs::write(&path, "handle1\nhandle2\n").unwrap();

        assert_eq!(read_identifiers(&path, false).unwrap(), ["handle1", "handle2"]);
    }

    #[test]
    fn discovery_keeps_only_csv_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.csv"), "x\n").unwrap();
        fs::write(dir.path().join("a.csv"), "x\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "x\n").unwrap();

        let names: Vec<_> = discover_csv_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.csv", "b.csv"]);
    }

    #[test]
    fn single_file_input_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taq.csv");
        fs::write(&path, "DATE\n").unwrap();

        assert_eq!(csv_inputs(&path).unwrap(), vec![path]);
        assert!(csv_inputs(&dir.path().join("missing")).is_err());
    }
}
