//! Per-chunk minute buckets and the second pass that folds them per file.

use crate::config::MergeStrategy;
use crate::models::{IntervalAggregate, TickRecord};
use chrono::{NaiveDateTime, TimeDelta, Timelike};
use std::collections::BTreeMap;

/// Sum and count of the numeric prices of one (symbol, minute) within one chunk.
/// `count == 0` means every price in the bucket was missing.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkBucket {
    pub symbol: String,
    pub minute: NaiveDateTime,
    pub sum: f64,
    pub count: usize,
}

impl ChunkBucket {
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

pub fn truncate_to_minute(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Group one chunk by symbol and 1-minute interval.
/// Every minute between a symbol's first and last tick gets a bucket; minutes
/// without trades come out with `count == 0`.
pub fn bucket_chunk(ticks: &[TickRecord]) -> Vec<ChunkBucket> {
    let mut buckets: BTreeMap<(&str, NaiveDateTime), (f64, usize)> = BTreeMap::new();

    for tick in ticks {
        let slot = buckets
            .entry((tick.symbol.as_str(), truncate_to_minute(tick.timestamp)))
            .or_insert((0.0, 0));
        if let Some(price) = tick.price {
            slot.0 += price;
            slot.1 += 1;
        }
    }

    // Keys are ordered by (symbol, minute): first seen is the earliest, last the latest.
    let mut spans: BTreeMap<&str, (NaiveDateTime, NaiveDateTime)> = BTreeMap::new();
    for &(symbol, minute) in buckets.keys() {
        spans
            .entry(symbol)
            .and_modify(|span| span.1 = minute)
            .or_insert((minute, minute));
    }
    for (symbol, (first, last)) in spans {
        let mut minute = first;
        while minute < last {
            minute += TimeDelta::minutes(1);
            buckets.entry((symbol, minute)).or_insert((0.0, 0));
        }
    }

    buckets
        .into_iter()
        .map(|((symbol, minute), (sum, count))| ChunkBucket {
            symbol: symbol.to_string(),
            minute,
            sum,
            count,
        })
        .collect()
}

/// Fold the buckets of every chunk of a file into one row per (timestamp, symbol),
/// sorted by timestamp then symbol.
pub fn merge_chunk_buckets(buckets: &[ChunkBucket], strategy: MergeStrategy) -> Vec<IntervalAggregate> {
    let mut groups: BTreeMap<(NaiveDateTime, &str), (f64, usize)> = BTreeMap::new();

    for bucket in buckets {
        let slot = groups
            .entry((bucket.minute, bucket.symbol.as_str()))
            .or_insert((0.0, 0));
        match strategy {
            // Each chunk contributes its own mean with equal weight.
            MergeStrategy::MeanOfMeans => {
                if let Some(mean) = bucket.mean() {
                    slot.0 += mean;
                    slot.1 += 1;
                }
            }
            MergeStrategy::Exact => {
                slot.0 += bucket.sum;
                slot.1 += bucket.count;
            }
        }
    }

    groups
        .into_iter()
        .map(|((timestamp, symbol), (sum, count))| IntervalAggregate {
            timestamp,
            symbol: symbol.to_string(),
            avg_price: (count > 0).then(|| sum / count as f64),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 3).unwrap().and_hms_opt(h, m, s).unwrap()
    }

    fn tick(symbol: &str, ts: NaiveDateTime, price: Option<f64>) -> TickRecord {
        TickRecord { timestamp: ts, symbol: symbol.to_string(), price }
    }

    #[test]
    fn chunk_is_bucketed_per_symbol_and_minute() {
        let ticks = vec![
            tick("AAPL", at(9, 30, 1), Some(10.0)),
            tick("AAPL", at(9, 30, 59), Some(20.0)),
            tick("AAPL", at(9, 31, 0), Some(30.0)),
            tick("MSFT", at(9, 30, 5), None),
        ];

        let buckets = bucket_chunk(&ticks);

        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].minute, at(9, 30, 0));
        assert_eq!(buckets[0].mean(), Some(15.0));
        assert_eq!(buckets[1].mean(), Some(30.0));
        assert_eq!(buckets[2].symbol, "MSFT");
        assert_eq!(buckets[2].mean(), None);
    }

    #[test]
    fn quiet_minutes_inside_a_symbol_span_are_filled() {
        let buckets = bucket_chunk(&[
            tick("AAPL", at(9, 30, 1), Some(10.0)),
            tick("AAPL", at(9, 33, 1), Some(20.0)),
            tick("MSFT", at(9, 31, 0), Some(5.0)),
        ]);

        let aapl: Vec<_> = buckets
            .iter()
            .filter(|b| b.symbol == "AAPL")
            .map(|b| (b.minute, b.mean()))
            .collect();
        assert_eq!(
            aapl,
            [
                (at(9, 30, 0), Some(10.0)),
                (at(9, 31, 0), None),
                (at(9, 32, 0), None),
                (at(9, 33, 0), Some(20.0)),
            ]
        );
        // MSFT traded in a single minute, nothing to fill.
        assert_eq!(buckets.iter().filter(|b| b.symbol == "MSFT").count(), 1);
    }

    #[test]
    fn empty_minute_in_one_chunk_takes_the_other_chunks_mean() {
        let first = bucket_chunk(&[
            tick("AAPL", at(9, 30, 0), Some(10.0)),
            tick("AAPL", at(9, 32, 0), Some(30.0)),
        ]);
        let second = bucket_chunk(&[tick("AAPL", at(9, 31, 30), Some(20.0))]);
        let all: Vec<ChunkBucket> = first.into_iter().chain(second).collect();

        let merged = merge_chunk_buckets(&all, MergeStrategy::MeanOfMeans);
        let prices: Vec<_> = merged.iter().map(|r| r.avg_price).collect();
        assert_eq!(prices, [Some(10.0), Some(20.0), Some(30.0)]);
    }

    #[test]
    fn mean_of_means_differs_from_true_mean() {
        let first = bucket_chunk(&[
            tick("AAPL", at(9, 30, 0), Some(10.0)),
            tick("AAPL", at(9, 30, 10), Some(20.0)),
        ]);
        let second = bucket_chunk(&[tick("AAPL", at(9, 30, 20), Some(30.0))]);
        let all: Vec<ChunkBucket> = first.into_iter().chain(second).collect();

        let biased = merge_chunk_buckets(&all, MergeStrategy::MeanOfMeans);
        assert_eq!(biased.len(), 1);
        assert_eq!(biased[0].avg_price, Some(22.5));

        let exact = merge_chunk_buckets(&all, MergeStrategy::Exact);
        assert_eq!(exact[0].avg_price, Some(20.0));
    }

    #[test]
    fn all_missing_prices_give_missing_mean() {
        let buckets = bucket_chunk(&[tick("AAPL", at(10, 0, 0), None)]);
        let merged = merge_chunk_buckets(&buckets, MergeStrategy::MeanOfMeans);
        assert_eq!(merged[0].avg_price, None);
    }

    #[test]
    fn merged_rows_are_sorted_by_timestamp_then_symbol() {
        let buckets = bucket_chunk(&[
            tick("MSFT", at(9, 31, 0), Some(1.0)),
            tick("AAPL", at(9, 31, 0), Some(2.0)),
            tick("MSFT", at(9, 30, 0), Some(3.0)),
        ]);
        let merged = merge_chunk_buckets(&buckets, MergeStrategy::MeanOfMeans);

        let keys: Vec<_> = merged.iter().map(|r| (r.timestamp, r.symbol.as_str())).collect();
        assert_eq!(
            keys,
            [(at(9, 30, 0), "MSFT"), (at(9, 31, 0), "AAPL"), (at(9, 31, 0), "MSFT")]
        );
    }
}
