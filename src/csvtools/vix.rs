use crate::errors::ToolError;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::Path;
use tracing::info;

const DROPPED: [&str; 3] = ["OPEN", "HIGH", "LOW"];

/// `01/02/2023` → `1/2/23`
pub fn reformat_vix_date(s: &str) -> Option<String> {
    NaiveDate::parse_from_str(s.trim(), "%m/%d/%Y")
        .ok()
        .map(|d| d.format("%-m/%-d/%y").to_string())
}

/// Keep DATE and the close of a CBOE VIX history file, the close renamed to `AVG VIX`.
pub fn clean_vix_data(input_file: &Path, output_file: &Path) -> Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(input_file)
        .with_context(|| format!("Failed to open {:?}", input_file))?;

    let headers = reader.headers()?.clone();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(ToolError::EmptyFile { path: input_file.to_path_buf() }.into());
    }

    let date_idx = headers
        .iter()
        .position(|h| h == "DATE")
        .ok_or_else(|| ToolError::MissingColumn {
            path: input_file.to_path_buf(),
            column: "DATE".to_string(),
        })?;

    let kept: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !DROPPED.contains(h))
        .map(|(i, _)| i)
        .collect();

    let mut writer = csv::Writer::from_path(output_file)
        .with_context(|| format!("Failed to create {:?}", output_file))?;
    writer.write_record(kept.iter().map(|&i| match &headers[i] {
        "CLOSE" => "AVG VIX",
        other => other,
    }))?;

    let mut rows = 0usize;
    for result in reader.records() {
        let record = result.with_context(|| format!("Failed to read {:?}", input_file))?;
        let raw_date = record.get(date_idx).unwrap_or_default();
        let date = reformat_vix_date(raw_date).ok_or_else(|| ToolError::BadValue {
            path: input_file.to_path_buf(),
            value: raw_date.to_string(),
            reason: "expected a MM/DD/YYYY date".to_string(),
        })?;

        let cells: Vec<&str> = kept
            .iter()
            .map(|&i| if i == date_idx { date.as_str() } else { record.get(i).unwrap_or_default() })
            .collect();
        writer.write_record(&cells)?;
        rows += 1;
    }

    writer.flush()?;
    info!("{} VIX rows written to {:?}", rows, output_file);
    Ok(rows)
}
