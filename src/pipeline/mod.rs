//! Batch runners: one scrape session per identifier read from an input file.
//!
//! ## Run modes
//!
//! `scrape_tweets()`: for every account id (file has a header row), walk the
//!   account's tweet listing and write `<output>/<account_id>.csv`. A failed page
//!   cuts that account short; the tweets gathered so far are still written.
//!
//! `resolve_handles()`: for every handle (file has no header), search the
//!   figure listing and collect `{id, handle}` for the handles that were found.
//!
//! Targets are processed one after another, with the page delay in between.

use crate::config::AppConfig;
use crate::loader::read_identifiers;
use crate::models::StopReason;
use crate::scraper::http_client::HttpClient;
use crate::scraper::{ExtractMode, HandleResolver, PageFetcher, TweetScraper};
use crate::storage::{write_handle_mappings, write_tweets_csv};
use anyhow::{Context, Result};
use std::path::Path;
use tokio::time::sleep;
use tracing::{info, warn};

pub struct Pipeline {
    config: AppConfig,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub targets_processed: usize,
    pub records_written: usize,
    /// Sessions that ended on a failed page or without a match.
    pub incomplete: usize,
}

fn output_name(id: &str) -> String {
    let safe: String = id
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{}.csv", safe)
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn scrape_tweets(
        &self,
        account_file: &Path,
        output_folder: &Path,
        max_pages: Option<usize>,
        mode: ExtractMode,
    ) -> Result<PipelineStats> {
        let client = HttpClient::new(&self.config.scraper)?;
        self.scrape_tweets_with(client, account_file, output_folder, max_pages, mode)
            .await
    }

    pub async fn scrape_tweets_with<F: PageFetcher>(
        &self,
        fetcher: F,
        account_file: &Path,
        output_folder: &Path,
        max_pages: Option<usize>,
        mode: ExtractMode,
    ) -> Result<PipelineStats> {
        let scraper = TweetScraper::new(fetcher, &self.config.scraper, mode)
            .context("Failed to build tweet scraper")?;
        let accounts = read_identifiers(account_file, true)?;
        std::fs::create_dir_all(output_folder)
            .with_context(|| format!("Could not create dir {:?}", output_folder))?;

        info!("=== Scraping {} accounts ({:?} mode) ===", accounts.len(), mode);
        let mut stats = PipelineStats::default();

        for account in &accounts {
            let session = scraper
                .scrape_account(account, max_pages)
                .await
                .with_context(|| format!("scrape_account({})", account))?;

            if session.stop_reason == Some(StopReason::FetchFailed) {
                warn!("{}: stopped early after {} pages", session.target, session.pages_visited);
                stats.incomplete += 1;
            }

            let path = output_folder.join(output_name(account));
            stats.records_written += write_tweets_csv(&path, &session.records)?;
            stats.targets_processed += 1;

            sleep(scraper.delay()).await;
        }

        info!(
            "=== Done: {} accounts | {} tweets | {} cut short ===",
            stats.targets_processed, stats.records_written, stats.incomplete
        );
        Ok(stats)
    }

    pub async fn resolve_handles(
        &self,
        handle_file: &Path,
        output_file: &Path,
        max_pages: Option<usize>,
    ) -> Result<PipelineStats> {
        let client = HttpClient::new(&self.config.scraper)?;
        self.resolve_handles_with(client, handle_file, output_file, max_pages)
            .await
    }

    pub async fn resolve_handles_with<F: PageFetcher>(
        &self,
        fetcher: F,
        handle_file: &Path,
        output_file: &Path,
        max_pages: Option<usize>,
    ) -> Result<PipelineStats> {
        let resolver = HandleResolver::new(fetcher, &self.config.scraper)
            .context("Failed to build handle resolver")?;
        let handles = read_identifiers(handle_file, false)?;

        let mut stats = PipelineStats::default();
        let mut mappings = Vec::new();

        for handle in &handles {
            let session = resolver
                .resolve(handle, max_pages)
                .await
                .with_context(|| format!("resolve({})", handle))?;

            if session.stop_reason != Some(StopReason::Resolved) {
                stats.incomplete += 1;
            }
            mappings.extend(session.records);
            stats.targets_processed += 1;

            sleep(resolver.delay()).await;
        }

        info!("Scraped {} ids total.", mappings.len());
        stats.records_written = write_handle_mappings(output_file, &mappings)?;
        Ok(stats)
    }
}
