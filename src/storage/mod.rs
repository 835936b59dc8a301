pub mod dataset;

use crate::models::{CardTweet, HandleMapping, TweetRecord};
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use tracing::info;

pub use self::dataset::PartitionedWriter;

// ── Tweets ────────────────────────────────────────────────────────────────────

const CARD_COLUMNS: [&str; 5] = ["tweeted_at", "user_handle", "is_retweet", "username", "text"];

fn card_field(tweet: &CardTweet, column: &str) -> Option<String> {
    match column {
        "tweeted_at" => tweet.tweeted_at.clone(),
        "user_handle" => tweet.user_handle.clone(),
        "is_retweet" => Some(tweet.is_retweet.to_string()),
        "username" => tweet.username.clone(),
        "text" => tweet.text.clone(),
        _ => None,
    }
}

fn json_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Union of the columns of every record, in first-seen order.
fn tweet_columns(tweets: &[TweetRecord]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    let mut add = |name: &str| {
        if !columns.iter().any(|c| c == name) {
            columns.push(name.to_string());
        }
    };

    for tweet in tweets {
        match tweet {
            TweetRecord::Card(_) => CARD_COLUMNS.into_iter().for_each(&mut add),
            TweetRecord::Raw(map) => map.keys().for_each(|k| add(k.as_str())),
        }
    }
    columns
}

/// Write one account's tweets. Missing fields become empty cells.
/// An account without tweets still gets a file, holding a single newline.
pub fn write_tweets_csv(path: &Path, tweets: &[TweetRecord]) -> Result<usize> {
    if tweets.is_empty() {
        std::fs::write(path, "\n").with_context(|| format!("Failed to write {:?}", path))?;
        info!("No tweets, empty file written to {:?}", path);
        return Ok(0);
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {:?}", path))?;

    let columns = tweet_columns(tweets);
    writer.write_record(&columns)?;

    for tweet in tweets {
        let row: Vec<String> = columns
            .iter()
            .map(|column| match tweet {
                TweetRecord::Card(card) => card_field(card, column).unwrap_or_default(),
                TweetRecord::Raw(map) => map.get(column).map(json_cell).unwrap_or_default(),
            })
            .collect();
        writer.write_record(&row)?;
    }

    writer.flush().with_context(|| format!("Failed to write {:?}", path))?;
    info!("{} tweets written to {:?}", tweets.len(), path);
    Ok(tweets.len())
}

// ── Handle mappings ───────────────────────────────────────────────────────────

pub fn write_handle_mappings(path: &Path, mappings: &[HandleMapping]) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {:?}", path))?;

    if mappings.is_empty() {
        writer.write_record(["id", "handle"])?;
    }
    for mapping in mappings {
        writer.serialize(mapping)?;
    }

    writer.flush().with_context(|| format!("Failed to write {:?}", path))?;
    info!("{} ids written to {:?}", mappings.len(), path);
    Ok(mappings.len())
}
