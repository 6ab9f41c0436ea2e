//! File actions module.
//!
//! This module provides functionality for:
//! - Raw copy, move, trash and delete of single files
//! - Name-conflict resolution against an existing destination
//! - Batched, parallel transfers over a filtered file set
//! - Typed outcome counting
//!
//! # Transfers
//!
//! ```no_run
//! use copyall::actions::{TransferConfig, TransferEngine, TransferMode};
//! use copyall::scanner::Filters;
//! use std::path::Path;
//!
//! let engine = TransferEngine::new(
//!     TransferConfig::new(TransferMode::Move).with_keep_structure(false),
//! );
//! let report = engine.run(Path::new("/inbox"), Some(Path::new("/sorted")), Filters::default());
//! ```

pub mod conflict;
pub mod ops;
pub mod summary;
pub mod transfer;

pub use conflict::{resolve, suffixed_name, ConflictMode, ConflictOutcome, DestinationUnavailable};
pub use ops::{copy_file, delete_file, move_file, same_volume, trash_file, OpError};
pub use summary::{ErrorKind, ErrorSummary};
pub use transfer::{
    rate_model_for, BatchDelta, TransferConfig, TransferEngine, TransferError, TransferMode,
    TransferReport,
};
