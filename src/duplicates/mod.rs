//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Size bucketing (stage 1)
//! - Prehash bucketing over the first chunk (stage 2)
//! - Full hash bucketing (stage 3)
//! - Extension gating and byte verification (stage 4)
//! - Duplicate group management across one or two universes

pub mod finder;
pub mod groups;

pub use finder::{
    bucket_by_size, refine_by_full_hash, refine_by_prehash, stat_candidates, verify_buckets,
    DuplicateFinder, FinderConfig, FinderError, FinderStats, FullHashBuckets, PrehashBuckets,
    SizeBuckets, Stage,
};
pub use groups::{bucket_is_viable, Bucket, Candidate, DuplicateGroup, DuplicateGroupSet, Side};
