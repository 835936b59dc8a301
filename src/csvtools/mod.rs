//! Flat-file housekeeping: merging scraped CSVs, sharding oversize ones, cleaning VIX history.

pub mod merge;
pub mod split;
pub mod vix;

pub use self::merge::merge_csv_files;
pub use self::split::split_large_files;
pub use self::vix::clean_vix_data;
