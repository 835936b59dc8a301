use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub files: FilesConfig,
}

/// Scraper configuration, shared by the tweet crawler and the handle resolver
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Delay between pages when tweets are fetched one by one as raw JSON.
    #[serde(default = "default_raw_delay_ms")]
    pub raw_delay_ms: u64,

    /// Delay between pages when tweets are read off the listing cards.
    #[serde(default = "default_card_delay_ms")]
    pub card_delay_ms: u64,

    #[serde(default = "default_resolver_delay_ms")]
    pub resolver_delay_ms: u64,

    /// The resolver gives up on a handle after this many failed pages in a row.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// TAQ → Parquet export configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_compression")]
    pub compression: String,

    #[serde(default)]
    pub merge_strategy: MergeStrategy,
}

/// CSV housekeeping configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilesConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    #[serde(default = "default_shard_sample_rows")]
    pub shard_sample_rows: usize,
}

/// How per-chunk minute buckets are folded into the per-file result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// Average the per-chunk means. Biased when chunks split a bucket unevenly.
    #[default]
    MeanOfMeans,
    /// Carry (sum, count) through the merge and divide once.
    Exact,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://polititweet.org".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_raw_delay_ms() -> u64 {
    100
}
fn default_card_delay_ms() -> u64 {
    500
}
fn default_resolver_delay_ms() -> u64 {
    100
}
fn default_max_consecutive_failures() -> u32 {
    3
}
fn default_user_agent() -> String {
    "tweetfin-etl/0.1 (research project; tweet and market data collection)".to_string()
}
fn default_chunk_size() -> usize {
    100_000
}
fn default_compression() -> String {
    "snappy".to_string()
}
fn default_max_file_size() -> u64 {
    45 * 1024 * 1024
}
fn default_shard_sample_rows() -> usize {
    100
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            raw_delay_ms: default_raw_delay_ms(),
            card_delay_ms: default_card_delay_ms(),
            resolver_delay_ms: default_resolver_delay_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            compression: default_compression(),
            merge_strategy: MergeStrategy::default(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            shard_sample_rows: default_shard_sample_rows(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("TWEETFIN").separator("__"))
            .build()?;

        Self::from_sources(cfg)
    }

    /// A key that is present but does not fit its type is a hard error.
    fn from_sources(cfg: config::Config) -> Result<Self> {
        cfg.try_deserialize()
            .context("Invalid configuration (config/*.toml or TWEETFIN__* variables)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.scraper.base_url, "https://polititweet.org");
        assert_eq!(cfg.scraper.timeout_secs, 10);
        assert_eq!(cfg.scraper.raw_delay_ms, 100);
        assert_eq!(cfg.scraper.card_delay_ms, 500);
        assert_eq!(cfg.export.chunk_size, 100_000);
        assert_eq!(cfg.export.merge_strategy, MergeStrategy::MeanOfMeans);
        assert_eq!(cfg.files.max_file_size, 45 * 1024 * 1024);
    }

    #[test]
    fn malformed_value_is_rejected() {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(
                "[scraper]\nbase_url = \"http://localhost:8000\"\n\n[export]\nmerge_strategy = \"median\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let err = AppConfig::from_sources(cfg).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid configuration"));
    }

    #[test]
    fn partial_sections_fall_back_to_field_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[scraper]\nbase_url = \"http://localhost:8000\"\n\n[export]\nmerge_strategy = \"exact\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.scraper.base_url, "http://localhost:8000");
        assert_eq!(cfg.scraper.timeout_secs, 10);
        assert_eq!(cfg.export.merge_strategy, MergeStrategy::Exact);
        assert_eq!(cfg.export.compression, "snappy");
        assert_eq!(cfg.files.shard_sample_rows, 100);
    }
}
