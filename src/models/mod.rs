use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Scraped records ───────────────────────────────────────────────────────────

/// A tweet read off the visible text of a listing card.
/// `None` means the card did not carry the field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CardTweet {
    pub tweeted_at: Option<String>,
    pub user_handle: Option<String>,
    pub is_retweet: bool,
    pub username: Option<String>,
    pub text: Option<String>,
}

/// A tweet as served by the `raw=true` endpoint; keys keep the server's order.
pub type RawTweet = Map<String, Value>;

/// One scraped tweet, shaped by the extraction mode that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum TweetRecord {
    Card(CardTweet),
    Raw(RawTweet),
}

/// Result of resolving a handle to its numeric account id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandleMapping {
    pub id: String,
    pub handle: String,
}

// ── Extraction / pagination ───────────────────────────────────────────────────

/// What the extractor made of a listing page.
/// A page whose grid holds no cards counts as `NotFound` too.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction<T> {
    NotFound,
    Found(Vec<T>),
}

impl<T> Extraction<T> {
    pub fn into_records(self) -> Vec<T> {
        match self {
            Extraction::NotFound => Vec::new(),
            Extraction::Found(items) => items,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Extraction::NotFound)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The last page had no `Next` control.
    Exhausted,
    PageCap,
    FetchFailed,
    /// The resolver found the handle it was looking for.
    Resolved,
    /// The resolver hit its limit of failed pages in a row.
    TooManyFailures,
}

/// State of one pagination run over one target. Handed back to the caller when done.
#[derive(Debug, Clone)]
pub struct ScrapeSession<T> {
    pub target: String,
    pub next_ref: Option<String>,
    pub pages_visited: usize,
    pub records: Vec<T>,
    pub stop_reason: Option<StopReason>,
}

impl<T> ScrapeSession<T> {
    pub fn new(target: impl Into<String>, first_ref: String) -> Self {
        Self {
            target: target.into(),
            next_ref: Some(first_ref),
            pages_visited: 0,
            records: Vec::new(),
            stop_reason: None,
        }
    }

    pub fn finish(mut self, reason: StopReason) -> Self {
        self.stop_reason = Some(reason);
        self
    }
}

// ── Tick data ─────────────────────────────────────────────────────────────────

/// One TAQ trade after coercion. `price` is `None` when the source was not numeric.
#[derive(Debug, Clone, PartialEq)]
pub struct TickRecord {
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub price: Option<f64>,
}

/// Mean price of one (symbol, minute) bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalAggregate {
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub avg_price: Option<f64>,
}
