use crate::errors::ToolError;
use crate::loader::discover_csv_files;
use anyhow::{Context, Result};
use csv::StringRecord;
use std::path::Path;
use tracing::{info, warn};

/// Files smaller than this cannot hold a header and a row.
const MIN_CSV_BYTES: u64 = 10;

#[derive(Debug, Default)]
pub struct MergeStats {
    pub files_merged: usize,
    pub files_skipped: usize,
    pub rows: usize,
}

struct Table {
    headers: StringRecord,
    rows: Vec<StringRecord>,
}

fn read_table(path: &Path) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {:?}", path))?;

    let headers = reader.headers()?.clone();
    let rows = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read {:?}", path))?;
    Ok(Table { headers, rows })
}

/// Concatenate every CSV of `input_folder` into `output_file`.
/// Columns are the union of all headers; a file lacking a column gets empty cells.
pub fn merge_csv_files(input_folder: &Path, output_file: &Path) -> Result<MergeStats> {
    let mut stats = MergeStats::default();
    let mut columns: Vec<String> = Vec::new();
    let mut tables = Vec::new();

    for path in discover_csv_files(input_folder)? {
        let size = std::fs::metadata(&path)?.len();
        if size < MIN_CSV_BYTES {
            warn!("File {:?} is empty, skipping", path);
            stats.files_skipped += 1;
            continue;
        }

        info!("Processing file {:?}...", path);
        let table = read_table(&path)?;
        if table.rows.is_empty() {
            warn!("File {:?} has no rows, skipping", path);
            stats.files_skipped += 1;
            continue;
        }

        for header in table.headers.iter() {
            if !columns.iter().any(|c| c == header) {
                columns.push(header.to_string());
            }
        }
        tables.push(table);
    }

    if tables.is_empty() {
        return Err(ToolError::NoInput(input_folder.to_path_buf()).into());
    }

    let mut writer = csv::Writer::from_path(output_file)
        .with_context(|| format!("Failed to create {:?}", output_file))?;
    writer.write_record(&columns)?;

    for table in &tables {
        let positions: Vec<Option<usize>> = columns
            .iter()
            .map(|c| table.headers.iter().position(|h| h == c))
            .collect();

        for row in &table.rows {
            let cells = positions
                .iter()
                .map(|pos| pos.and_then(|i| row.get(i)).unwrap_or(""));
            writer.write_record(cells)?;
            stats.rows += 1;
        }
        stats.files_merged += 1;
    }

    writer.flush()?;
    info!(
        "Merged {} rows from {} files into {:?} ({} skipped)",
        stats.rows, stats.files_merged, output_file, stats.files_skipped
    );
    Ok(stats)
}
