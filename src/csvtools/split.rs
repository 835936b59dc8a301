use crate::loader::discover_csv_files;
use crate::utils::thousands;
use anyhow::{Context, Result};
use csv::StringRecord;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct SplitStats {
    pub files_split: usize,
    pub files_skipped: usize,
    pub shards_written: Vec<PathBuf>,
}

/// Average serialized size of one row, header included, as the writer would emit it.
pub fn estimate_bytes_per_row(headers: &StringRecord, sample: &[StringRecord]) -> Result<f64> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(headers)?;
    for row in sample {
        writer.write_record(row)?;
    }
    let bytes = writer.into_inner().context("Failed to serialize sample")?;
    Ok(bytes.len() as f64 / sample.len().max(1) as f64)
}

/// How many rows fit a shard of `max_file_size` bytes, estimated from the first rows.
pub fn rows_per_shard(path: &Path, max_file_size: u64, sample_rows: usize) -> Result<Option<usize>> {
    let mut reader = csv::Reader::from_path(path).with_context(|| format!("Failed to open {:?}", path))?;
    let headers = reader.headers()?.clone();
    let sample = reader
        .records()
        .take(sample_rows.max(1))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to sample {:?}", path))?;

    if sample.is_empty() {
        return Ok(None);
    }

    let bytes_per_row = estimate_bytes_per_row(&headers, &sample)?;
    Ok(Some(((max_file_size as f64 / bytes_per_row) as usize).max(1)))
}

fn shard_writer(dir: &Path, base: &str, index: usize, headers: &StringRecord) -> Result<(PathBuf, csv::Writer<File>)> {
    let path = dir.join(format!("{}__{}.csv", base, index));
    let mut writer = csv::Writer::from_path(&path).with_context(|| format!("Failed to create {:?}", path))?;
    writer.write_record(headers)?;
    Ok((path, writer))
}

fn split_file(path: &Path, shard_rows: usize) -> Result<Vec<PathBuf>> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let base = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .with_context(|| format!("No file name in {:?}", path))?;

    let mut reader = csv::Reader::from_path(path).with_context(|| format!("Failed to open {:?}", path))?;
    let headers = reader.headers()?.clone();

    let mut shards = Vec::new();
    let mut current: Option<(PathBuf, csv::Writer<File>, usize)> = None;

    for result in reader.records() {
        let record = result.with_context(|| format!("Failed to read {:?}", path))?;

        if current.as_ref().is_none_or(|(_, _, rows)| *rows == shard_rows) {
            if let Some((done, mut writer, rows)) = current.take() {
                writer.flush()?;
                info!("  ➤ Wrote: {:?} ({} rows)", done, rows);
                shards.push(done);
            }
            let (shard_path, writer) = shard_writer(dir, &base, shards.len(), &headers)?;
            current = Some((shard_path, writer, 0));
        }

        if let Some((_, writer, rows)) = current.as_mut() {
            writer.write_record(&record)?;
            *rows += 1;
        }
    }

    if let Some((done, mut writer, rows)) = current.take() {
        writer.flush()?;
        info!("  ➤ Wrote: {:?} ({} rows)", done, rows);
        shards.push(done);
    }

    Ok(shards)
}

/// Split every CSV of `input_folder` larger than `max_file_size` into
/// `<name>__<i>.csv` shards and delete the original.
pub fn split_large_files(input_folder: &Path, max_file_size: u64, sample_rows: usize) -> Result<SplitStats> {
    let mut stats = SplitStats::default();

    for path in discover_csv_files(input_folder)? {
        let size = std::fs::metadata(&path)?.len();
        if size <= max_file_size {
            info!("Skipping {:?} (size OK: {} bytes)", path, thousands(size));
            stats.files_skipped += 1;
            continue;
        }

        let Some(shard_rows) = rows_per_shard(&path, max_file_size, sample_rows)? else {
            warn!("{:?} has no data rows, leaving it alone", path);
            stats.files_skipped += 1;
            continue;
        };

        info!(
            "Splitting {:?} (size: {} bytes, {} rows per shard)...",
            path,
            thousands(size),
            thousands(shard_rows as u64)
        );
        let shards = split_file(&path, shard_rows)?;

        std::fs::remove_file(&path).with_context(|| format!("Failed to remove {:?}", path))?;
        info!("  ⛔ Removed original: {:?}", path);

        stats.files_split += 1;
        stats.shards_written.extend(shards);
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn numbers_csv(path: &Path, rows: usize) {
        let mut body = String::from("col1,col2\n");
        for i in 0..rows {
            body.push_str(&format!("{},{}\n", i, i));
        }
        fs::write(path, body).unwrap();
    }

    fn line_count(path: &Path) -> usize {
        fs::read_to_string(path).unwrap().lines().count()
    }

    #[test]
    fn bytes_per_row_counts_header_and_rows() {
        let headers = StringRecord::from(vec!["col1", "col2"]);
        let sample = vec![StringRecord::from(vec!["1", "a"]), StringRecord::from(vec!["2", "b"])];
        // "col1,col2\n1,a\n2,b\n" = 18 bytes over 2 rows
        assert_eq!(estimate_bytes_per_row(&headers, &sample).unwrap(), 9.0);
    }

    #[test]
    fn large_file_is_sharded_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let large = dir.path().join("large_file.csv");
        let small = dir.path().join("small_file.csv");
        let notes = dir.path().join("notes.txt");
        numbers_csv(&large, 5_000);
        numbers_csv(&small, 10);
        fs::write(&notes, "This is a test file.").unwrap();

        let max = 4 * 1024;
        let per_shard = rows_per_shard(&large, max, 100).unwrap().unwrap();
        let expected_shards = 5_000usize.div_ceil(per_shard);

        let stats = split_large_files(dir.path(), max, 100).unwrap();

        assert_eq!(stats.files_split, 1);
        assert_eq!(stats.shards_written.len(), expected_shards);
        assert!(!large.exists());
        assert!(small.exists());
        assert!(notes.exists());

        let first = dir.path().join("large_file__0.csv");
        assert_eq!(line_count(&first), per_shard + 1);
        let total_rows: usize = stats.shards_written.iter().map(|p| line_count(p) - 1).sum();
        assert_eq!(total_rows, 5_000);
    }

    #[test]
    fn file_at_threshold_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exact.csv");
        numbers_csv(&path, 50);
        let size = fs::metadata(&path).unwrap().len();

        let stats = split_large_files(dir.path(), size, 100).unwrap();

        assert_eq!(stats.files_split, 0);
        assert!(path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn empty_folder_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let stats = split_large_files(dir.path(), 1024, 100).unwrap();
        assert!(stats.shards_written.is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
