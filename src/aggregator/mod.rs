//! TAQ trades → 1-minute mean prices → partitioned Parquet.
//!
//! Each input file is streamed in chunks of `chunk_size` rows. Every chunk is
//! bucketed on its own; the buckets of all chunks are then folded per file
//! (see [`MergeStrategy`]) and written to the dataset in one go. A read error
//! in any chunk aborts the file before anything is written for it.

pub mod buckets;

use crate::config::{ExportConfig, MergeStrategy};
use crate::errors::ToolError;
use crate::loader::csv_inputs;
use crate::models::{IntervalAggregate, TickRecord};
use crate::storage::PartitionedWriter;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use csv::StringRecord;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use self::buckets::{bucket_chunk, merge_chunk_buckets, ChunkBucket};

const DATE: &str = "DATE";
const TIME: &str = "TIME_M";
const SYMBOL: &str = "SYM_ROOT";
const PRICE: &str = "PRICE";

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y%m%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

// ── Coercion ──────────────────────────────────────────────────────────────────

/// "150.25" → 150.25 | "abc", "", "NaN" → None
pub fn parse_tick_price(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|p| p.is_finite())
}

/// Combine the separate DATE and TIME_M fields.
/// ("2023-01-03", "09:30:00.123456") → 2023-01-03T09:30:00.123456
pub fn parse_tick_timestamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    let combined = format!("{} {}", date.trim(), time.trim());
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&combined, fmt).ok())
}

/// Positions of the columns the aggregation needs.
#[derive(Debug, Clone, Copy)]
struct TaqColumns {
    date: usize,
    time: usize,
    symbol: usize,
    price: usize,
}

impl TaqColumns {
    fn locate(headers: &StringRecord, path: &Path) -> Result<Self, ToolError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| ToolError::MissingColumn {
                    path: path.to_path_buf(),
                    column: name.to_string(),
                })
        };
        Ok(Self {
            date: find(DATE)?,
            time: find(TIME)?,
            symbol: find(SYMBOL)?,
            price: find(PRICE)?,
        })
    }

    /// `None` when the timestamp cannot be built; such rows have no bucket.
    fn tick(&self, record: &StringRecord) -> Option<TickRecord> {
        let timestamp = parse_tick_timestamp(record.get(self.date)?, record.get(self.time)?)?;
        Some(TickRecord {
            timestamp,
            symbol: record.get(self.symbol)?.trim().to_string(),
            price: record.get(self.price).and_then(parse_tick_price),
        })
    }
}

// ── Per-file aggregation ──────────────────────────────────────────────────────

/// Stream `path` in chunks and return its per-minute means.
pub fn aggregate_file(
    path: &Path,
    chunk_size: usize,
    strategy: MergeStrategy,
) -> Result<Vec<IntervalAggregate>> {
    let chunk_size = chunk_size.max(1);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {:?}", path))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {:?}", path))?
        .clone();
    let columns = TaqColumns::locate(&headers, path)?;

    let mut partials: Vec<ChunkBucket> = Vec::new();
    let mut chunk: Vec<TickRecord> = Vec::with_capacity(chunk_size);
    let mut rows_in_chunk = 0usize;
    let mut chunks = 0usize;
    let mut dropped = 0usize;

    for (i, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Row {} in {:?}", i + 1, path))?;
        match columns.tick(&record) {
            Some(tick) => chunk.push(tick),
            None => dropped += 1,
        }
        rows_in_chunk += 1;

        if rows_in_chunk == chunk_size {
            partials.extend(bucket_chunk(&chunk));
            chunk.clear();
            rows_in_chunk = 0;
            chunks += 1;
        }
    }
    if rows_in_chunk > 0 {
        partials.extend(bucket_chunk(&chunk));
        chunks += 1;
    }

    if dropped > 0 {
        debug!("{:?}: {} rows without a usable timestamp", path, dropped);
    }
    debug!("{:?}: {} chunks, {} partial buckets", path, chunks, partials.len());

    Ok(merge_chunk_buckets(&partials, strategy))
}

// ── Export driver ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ExportStats {
    pub files_processed: usize,
    pub rows_written: usize,
    pub files_written: Vec<PathBuf>,
}

pub struct TaqExporter {
    chunk_size: usize,
    strategy: MergeStrategy,
    writer: PartitionedWriter,
}

impl TaqExporter {
    pub fn new(output: &Path, config: &ExportConfig) -> Result<Self> {
        Ok(Self {
            chunk_size: config.chunk_size,
            strategy: config.merge_strategy,
            writer: PartitionedWriter::new(output, &config.compression)?,
        })
    }

    pub fn export(&self, input: &Path) -> Result<ExportStats> {
        let mut stats = ExportStats::default();

        for path in csv_inputs(input)? {
            info!("Processing file: {:?}...", path);
            let rows = aggregate_file(&path, self.chunk_size, self.strategy)?;

            info!("{:?} aggregated into {} rows, persisting into Parquet...", path, rows.len());
            let tag = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "part".to_string());
            let written = self.writer.write(&tag, &rows)?;

            info!("{:?} completed!", path);
            stats.files_processed += 1;
            stats.rows_written += rows.len();
            stats.files_written.extend(written);
        }

        Ok(stats)
    }
}
