//! Hive-style Parquet dataset: `<root>/SYM_ROOT=<symbol>/year=<year>/<tag>-<n>.parquet`.
//!
//! Each write adds new files and never touches existing ones, so several
//! input files can be exported into the same dataset.

use crate::errors::ToolError;
use crate::models::IntervalAggregate;
use anyhow::{Context, Result};
use arrow_array::{ArrayRef, Float64Array, RecordBatch, TimestampNanosecondArray};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use chrono::Datelike;
use parquet::arrow::ArrowWriter;
use parquet::basic::{BrotliLevel, Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub fn parse_compression(name: &str) -> Result<Compression, ToolError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "snappy" => Ok(Compression::SNAPPY),
        "gzip" => Ok(Compression::GZIP(GzipLevel::default())),
        "zstd" => Ok(Compression::ZSTD(ZstdLevel::default())),
        "brotli" => Ok(Compression::BROTLI(BrotliLevel::default())),
        "lz4" => Ok(Compression::LZ4_RAW),
        "none" | "uncompressed" => Ok(Compression::UNCOMPRESSED),
        other => Err(ToolError::UnknownCompression(other.to_string())),
    }
}

pub struct PartitionedWriter {
    root: PathBuf,
    compression: Compression,
}

impl PartitionedWriter {
    pub fn new(root: impl Into<PathBuf>, compression: &str) -> Result<Self> {
        Ok(Self {
            root: root.into(),
            compression: parse_compression(compression)?,
        })
    }

    /// Write `rows` split by symbol and year. Returns the files created.
    pub fn write(&self, tag: &str, rows: &[IntervalAggregate]) -> Result<Vec<PathBuf>> {
        let mut partitions: BTreeMap<(&str, i32), Vec<&IntervalAggregate>> = BTreeMap::new();
        for row in rows {
            partitions
                .entry((row.symbol.as_str(), row.timestamp.year()))
                .or_default()
                .push(row);
        }

        let mut written = Vec::with_capacity(partitions.len());
        for ((symbol, year), rows) in partitions {
            let dir = self
                .root
                .join(format!("SYM_ROOT={}", partition_value(symbol)))
                .join(format!("year={}", year));
            fs::create_dir_all(&dir).with_context(|| format!("Could not create dir {:?}", dir))?;

            let path = unused_file(&dir, tag);
            write_parquet(&path, interval_batch(&rows)?, self.compression)?;
            debug!("{} rows → {:?}", rows.len(), path);
            written.push(path);
        }
        Ok(written)
    }
}

fn partition_value(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

fn unused_file(dir: &Path, tag: &str) -> PathBuf {
    let mut n = 0usize;
    loop {
        let candidate = dir.join(format!("{}-{}.parquet", tag, n));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

fn interval_batch(rows: &[&IntervalAggregate]) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("timestamp", DataType::Timestamp(TimeUnit::Nanosecond, None), false),
        Field::new("avg_price", DataType::Float64, true),
    ]));

    let timestamps = rows
        .iter()
        .map(|r| {
            r.timestamp
                .and_utc()
                .timestamp_nanos_opt()
                .with_context(|| format!("timestamp {} out of range", r.timestamp))
        })
        .collect::<Result<Vec<i64>>>()?;
    let prices: Vec<Option<f64>> = rows.iter().map(|r| r.avg_price).collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(TimestampNanosecondArray::from(timestamps)),
        Arc::new(Float64Array::from(prices)),
    ];
    RecordBatch::try_new(schema, columns).context("building interval record batch")
}

fn write_parquet(path: &Path, batch: RecordBatch, compression: Compression) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let props = WriterProperties::builder().set_compression(compression).build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}
