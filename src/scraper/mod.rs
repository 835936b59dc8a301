pub mod cleaner;
pub mod http_client;
pub mod parsers;

use crate::config::ScraperConfig;
use crate::errors::FetchError;
use crate::models::{HandleMapping, RawTweet, ScrapeSession, StopReason, TweetRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use self::cleaner::raw_tweet_href;
use self::parsers::{parse_figure_page, parse_tweet_card_page, parse_tweet_link_page};

// ── Fetcher seam ──────────────────────────────────────────────────────────────

/// One blocking-in-spirit GET: a body on success, a classified failure otherwise.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

#[async_trait]
impl<T: PageFetcher + ?Sized> PageFetcher for Arc<T> {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        (**self).fetch(url).await
    }
}

/// How tweets are pulled out of a listing page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ExtractMode {
    /// Follow each card to its `raw=true` JSON form.
    #[default]
    Raw,
    /// Read the visible text of each card.
    Card,
}

// ── URL helpers ───────────────────────────────────────────────────────────────

fn endpoint(base_url: &str, path: &str) -> Result<Url> {
    let raw = format!("{}/{}", base_url.trim_end_matches('/'), path);
    Url::parse(&raw).with_context(|| format!("Invalid endpoint {}", raw))
}

/// Resolve a relative reference (`?account=1&page=2`, `/tweets?...`, or absolute) against `base`.
fn page_url(base: &Url, reference: &str) -> Result<Url, FetchError> {
    base.join(reference).map_err(|e| FetchError::Url {
        reference: reference.to_string(),
        reason: e.to_string(),
    })
}

/// The page after `url`, addressed by its `page` query parameter (absent = page 1).
fn following_page(url: &Url) -> Url {
    let current = url
        .query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse::<u64>().ok())
        .unwrap_or(1);
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut next = url.clone();
    next.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("page", &(current + 1).to_string());
    next
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn cap_reached(pages: usize, max_pages: Option<usize>) -> bool {
    max_pages.is_some_and(|cap| cap > 0 && pages >= cap)
}

// ── Tweet crawler ─────────────────────────────────────────────────────────────

/// Walks the `/tweets?account=<id>` listing of one account.
/// A failed page ends the walk; whatever was gathered before it is kept.
pub struct TweetScraper<F> {
    fetcher: F,
    base: Url,
    endpoint: Url,
    mode: ExtractMode,
    delay: Duration,
}

impl<F: PageFetcher> TweetScraper<F> {
    pub fn new(fetcher: F, config: &ScraperConfig, mode: ExtractMode) -> Result<Self> {
        let delay_ms = match mode {
            ExtractMode::Raw => config.raw_delay_ms,
            ExtractMode::Card => config.card_delay_ms,
        };

        Ok(Self {
            fetcher,
            base: endpoint(&config.base_url, "")?,
            endpoint: endpoint(&config.base_url, "tweets")?,
            mode,
            delay: Duration::from_millis(delay_ms),
        })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub async fn scrape_account(
        &self,
        account_id: &str,
        max_pages: Option<usize>,
    ) -> Result<ScrapeSession<TweetRecord>> {
        let mut session = ScrapeSession::new(account_id, format!("?account={}", encode(account_id)));

        while let Some(reference) = session.next_ref.take() {
            info!("Scraping page {} ({})", session.pages_visited + 1, reference);

            let fetched = match page_url(&self.endpoint, &reference) {
                Ok(url) => self.fetcher.fetch(url.as_str()).await,
                Err(e) => Err(e),
            };
            let body = match fetched {
                Ok(body) => body,
                Err(e) => {
                    warn!("Error scraping page for {}: {}", account_id, e);
                    info!("Scraped {} tweets total.", session.records.len());
                    return Ok(session.finish(StopReason::FetchFailed));
                }
            };

            let (tweets, next) = match self.mode {
                ExtractMode::Card => {
                    let page = parse_tweet_card_page(&body)?;
                    let tweets = page.items.into_records().into_iter().map(TweetRecord::Card).collect();
                    (tweets, page.next)
                }
                ExtractMode::Raw => {
                    let page = parse_tweet_link_page(&body)?;
                    let tweets = self.fetch_raw_tweets(page.items.into_records()).await;
                    (tweets, page.next)
                }
            };

            debug!("  Page {}: {} tweets", session.pages_visited + 1, tweets.len());
            session.records.extend(tweets);

            sleep(self.delay).await;

            session.pages_visited += 1;
            session.next_ref = next;
            if session.next_ref.is_some() && cap_reached(session.pages_visited, max_pages) {
                info!("Scraped {} tweets total.", session.records.len());
                return Ok(session.finish(StopReason::PageCap));
            }
        }

        info!("Scraped {} tweets total.", session.records.len());
        Ok(session.finish(StopReason::Exhausted))
    }

    /// Secondary fetch per card. A tweet that cannot be fetched or decoded is skipped.
    async fn fetch_raw_tweets(&self, hrefs: Vec<String>) -> Vec<TweetRecord> {
        let mut tweets = Vec::with_capacity(hrefs.len());
        for href in hrefs {
            match self.fetch_raw_tweet(&href).await {
                Ok(tweet) => tweets.push(TweetRecord::Raw(tweet)),
                Err(e) => warn!("Failed to retrieve tweet {}: {:#}", href, e),
            }
        }
        tweets
    }

    async fn fetch_raw_tweet(&self, href: &str) -> Result<RawTweet> {
        let url = page_url(&self.base, &raw_tweet_href(href))?;
        let body = self.fetcher.fetch(url.as_str()).await?;
        serde_json::from_str(&body).context("raw tweet is not a JSON object")
    }
}

// ── Handle resolver ───────────────────────────────────────────────────────────

/// Searches `/figures?search=<handle>` until a figure card carries the handle.
/// Unlike the tweet crawler, a failed page is skipped and the search goes on.
pub struct HandleResolver<F> {
    fetcher: F,
    endpoint: Url,
    delay: Duration,
    max_consecutive_failures: u32,
}

impl<F: PageFetcher> HandleResolver<F> {
    pub fn new(fetcher: F, config: &ScraperConfig) -> Result<Self> {
        Ok(Self {
            fetcher,
            endpoint: endpoint(&config.base_url, "figures")?,
            delay: Duration::from_millis(config.resolver_delay_ms),
            max_consecutive_failures: config.max_consecutive_failures.max(1),
        })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub async fn resolve(
        &self,
        handle: &str,
        max_pages: Option<usize>,
    ) -> Result<ScrapeSession<HandleMapping>> {
        let mut session = ScrapeSession::new(handle, format!("?search={}", encode(handle)));
        let mut failures = 0u32;

        info!("Scraping pages for {}...", handle);

        while let Some(reference) = session.next_ref.take() {
            if cap_reached(session.pages_visited, max_pages) {
                debug!("{}: page cap reached", handle);
                return Ok(session.finish(StopReason::PageCap));
            }

            let url = page_url(&self.endpoint, &reference)?;
            session.pages_visited += 1;

            let body = match self.fetcher.fetch(url.as_str()).await {
                Ok(body) => body,
                Err(e) => {
                    failures += 1;
                    warn!("{}: skipping page {} ({})", handle, session.pages_visited, e);
                    if failures >= self.max_consecutive_failures {
                        warn!("{}: {} failed pages in a row, giving up", handle, failures);
                        return Ok(session.finish(StopReason::TooManyFailures));
                    }
                    session.next_ref = Some(following_page(&url).to_string());
                    sleep(self.delay).await;
                    continue;
                }
            };
            failures = 0;

            let page = parse_figure_page(&body)?;
            if page.items.is_not_found() {
                debug!("{}: no figure cards on page {}", handle, session.pages_visited);
            }
            if let Some(found) = page.items.into_records().into_iter().find(|m| m.handle == handle) {
                info!("...FOUND! {} → {}", handle, found.id);
                session.records.push(found);
                return Ok(session.finish(StopReason::Resolved));
            }

            sleep(self.delay).await;
            session.next_ref = page.next;
        }

        info!("...NOT FOUND! {}", handle);
        Ok(session.finish(StopReason::Exhausted))
    }
}
