mod aggregator;
mod config;
mod csvtools;
mod errors;
mod loader;
mod models;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::aggregator::TaqExporter;
use crate::config::{AppConfig, MergeStrategy};
use crate::pipeline::Pipeline;
use crate::utils::{thousands, CommandTimer};
use crate::scraper::ExtractMode;

#[derive(Parser)]
#[command(name = "tweetfin-etl", about = "Tweet scraping and market data ETL", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape the tweets of every account id in ACCOUNT_FILE into OUTPUT_FOLDER/<id>.csv
    ScrapeTweets {
        account_file: PathBuf,
        output_folder: PathBuf,

        /// Stop each account after this many listing pages (0 = no limit)
        #[arg(long)]
        max_pages: Option<usize>,

        #[arg(long, value_enum, default_value_t = ExtractMode::Raw)]
        mode: ExtractMode,
    },

    /// Look up the numeric id of every handle in HANDLE_FILE
    ResolveHandles {
        handle_file: PathBuf,
        output_file: PathBuf,

        #[arg(long)]
        max_pages: Option<usize>,
    },

    /// Concatenate all CSV files of a folder into one
    Merge {
        input_folder: PathBuf,
        output_file: PathBuf,
    },

    /// Shard CSV files above the size threshold into <name>__<i>.csv
    Split {
        input_folder: PathBuf,

        /// Size threshold in bytes (default from config: 45 MiB)
        #[arg(long)]
        max_file_size: Option<u64>,
    },

    /// Reduce a CBOE VIX history file to DATE and AVG VIX
    CleanVix {
        input_file: PathBuf,
        output_file: PathBuf,
    },

    /// Aggregate TAQ trade files into per-minute mean prices, partitioned Parquet
    ExportTaq {
        /// A TAQ CSV file or a folder of them
        input: PathBuf,
        output: PathBuf,

        #[arg(long)]
        chunk_size: Option<usize>,

        /// snappy, gzip, zstd, brotli, lz4 or none
        #[arg(long)]
        compression: Option<String>,

        #[arg(long, value_enum)]
        merge_strategy: Option<MergeStrategy>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "tweetfin_etl=info,warn",
        1 => "tweetfin_etl=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load()?;

    match cli.command {
        Command::ScrapeTweets { account_file, output_folder, max_pages, mode } => {
            let mut timer = CommandTimer::start("scrape-tweets");
            let stats = Pipeline::new(config)
                .scrape_tweets(&account_file, &output_folder, max_pages, mode)
                .await?;
            timer.done(format!(
                "{} accounts, {} tweets, {} cut short",
                stats.targets_processed, stats.records_written, stats.incomplete
            ));
        }

        Command::ResolveHandles { handle_file, output_file, max_pages } => {
            let mut timer = CommandTimer::start("resolve-handles");
            let stats = Pipeline::new(config)
                .resolve_handles(&handle_file, &output_file, max_pages)
                .await?;
            timer.done(format!(
                "{} handles, {} resolved, {} not found",
                stats.targets_processed, stats.records_written, stats.incomplete
            ));
        }

        Command::Merge { input_folder, output_file } => {
            let mut timer = CommandTimer::start("merge");
            let stats = csvtools::merge_csv_files(&input_folder, &output_file)?;
            timer.done(format!(
                "{} files merged, {} skipped, {} rows",
                stats.files_merged,
                stats.files_skipped,
                thousands(stats.rows as u64)
            ));
        }

        Command::Split { input_folder, max_file_size } => {
            let mut timer = CommandTimer::start("split");
            let max = max_file_size.unwrap_or(config.files.max_file_size);
            let stats = csvtools::split_large_files(&input_folder, max, config.files.shard_sample_rows)?;
            timer.done(format!(
                "{} files split into {} shards, {} left alone",
                stats.files_split,
                stats.shards_written.len(),
                stats.files_skipped
            ));
        }

        Command::CleanVix { input_file, output_file } => {
            let mut timer = CommandTimer::start("clean-vix");
            let rows = csvtools::clean_vix_data(&input_file, &output_file)?;
            timer.done(format!("{} rows", thousands(rows as u64)));
        }

        Command::ExportTaq { input, output, chunk_size, compression, merge_strategy } => {
            let mut timer = CommandTimer::start("export-taq");
            if let Some(n) = chunk_size {
                config.export.chunk_size = n;
            }
            if let Some(c) = compression {
                config.export.compression = c;
            }
            if let Some(s) = merge_strategy {
                config.export.merge_strategy = s;
            }

            let stats = TaqExporter::new(&output, &config.export)?.export(&input)?;
            timer.done(format!(
                "{} files, {} minute rows, {} parquet files",
                stats.files_processed,
                thousands(stats.rows_written as u64),
                stats.files_written.len()
            ));
        }
    }

    Ok(())
}
