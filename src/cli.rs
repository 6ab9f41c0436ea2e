//! Command-line interface definitions for copyall.
//!
//! Global options (verbosity, config path, JSON errors) apply to every
//! subcommand. Filter flags are shared by all subcommands that enumerate a
//! tree.
//!
//! # Example
//!
//! ```bash
//! # List the extensions under a folder
//! copyall extensions ~/Pictures
//!
//! # Copy every JPEG over 100KB, flattening the tree
//! copyall transfer /media/card --output ~/Pictures/import -e .jpg --min-size 100KB --flatten
//!
//! # Send duplicates inside a folder to the trash
//! copyall dupes ~/Downloads --trash
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::actions::TransferMode;
use crate::scanner::Filters;

/// Filter, copy, move and deduplicate large file sets.
#[derive(Debug, Parser)]
#[command(name = "copyall")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to a config.toml (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print fatal errors as a JSON object on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Worker threads for stat, hash and transfer batches
    #[arg(long, global = true, value_name = "N", value_parser = clap::value_parser!(usize))]
    pub io_threads: Option<usize>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the distinct file extensions under a folder
    Extensions(ListArgs),
    /// Count the selected files and their total size
    Count(ListArgs),
    /// Copy, move, trash or delete the selected files
    Transfer(TransferArgs),
    /// Find content-identical files in one folder or between two
    Dupes(DupesArgs),
}

/// Filter flags shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct FilterArgs {
    /// Only files ending with this extension, e.g. `.jpg` (repeatable)
    #[arg(short = 'e', long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Only files whose name starts with this prefix (repeatable)
    #[arg(short = 'p', long = "prefix", value_name = "PREFIX")]
    pub prefixes: Vec<String>,

    /// Minimum file size (e.g., 1KB, 1MB, 1GB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Maximum file size (e.g., 1KB, 1MB, 1GB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub max_size: Option<u64>,
}

impl FilterArgs {
    /// Convert to enumeration filters. Extensions without a leading dot get
    /// one.
    #[must_use]
    pub fn to_filters(&self) -> Filters {
        let extensions = self
            .extensions
            .iter()
            .map(|e| {
                if e.starts_with('.') {
                    e.clone()
                } else {
                    format!(".{e}")
                }
            })
            .collect();
        let mut filters = Filters::default()
            .with_extensions(extensions)
            .with_prefixes(self.prefixes.clone());
        if let Some(min) = self.min_size {
            filters = filters.with_min_size(min);
        }
        if let Some(max) = self.max_size {
            filters = filters.with_max_size(max);
        }
        filters
    }
}

/// Arguments for `extensions` and `count`.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Folder to enumerate
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

/// Operation for the `transfer` subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Copy into the output folder
    Copy,
    /// Move into the output folder
    Move,
    /// Send to the system trash
    Trash,
    /// Delete permanently (needs --confirm-permanent-delete)
    Delete,
}

impl From<ModeArg> for TransferMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Copy => Self::Copy,
            ModeArg::Move => Self::Move,
            ModeArg::Trash => Self::Trash,
            ModeArg::Delete => Self::PermanentDelete,
        }
    }
}

/// Arguments for the `transfer` subcommand.
#[derive(Debug, Args)]
pub struct TransferArgs {
    /// Folder whose files are processed
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Destination folder (required for copy and move)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Operation to perform
    #[arg(short, long, value_enum, default_value = "copy")]
    pub mode: ModeArg,

    /// Put every file directly in the output folder instead of mirroring
    /// subfolders
    #[arg(long)]
    pub flatten: bool,

    /// Allow `--mode delete` to remove files irreversibly
    #[arg(long)]
    pub confirm_permanent_delete: bool,

    /// Numbered names tried per name conflict
    #[arg(long, value_name = "N")]
    pub max_retries: Option<usize>,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `dupes` subcommand.
#[derive(Debug, Args)]
pub struct DupesArgs {
    /// Folder to search
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Second folder; report files in PATH that also exist here
    #[arg(long, value_name = "PATH")]
    pub against: Option<PathBuf>,

    /// Also group byte-identical files with different extensions
    #[arg(long)]
    pub any_extension: bool,

    /// Send the removable duplicates to the trash
    #[arg(long, conflicts_with = "delete")]
    pub trash: bool,

    /// Permanently delete the removable duplicates
    #[arg(long, requires = "confirm_permanent_delete")]
    pub delete: bool,

    /// Allow `--delete`
    #[arg(long)]
    pub confirm_permanent_delete: bool,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Print the groups as JSON
    #[arg(long)]
    pub json: bool,
}

impl DupesArgs {
    /// Discard mode requested, if any.
    #[must_use]
    pub fn discard_mode(&self) -> Option<TransferMode> {
        if self.delete {
            Some(TransferMode::PermanentDelete)
        } else if self.trash {
            Some(TransferMode::Trash)
        } else {
            None
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// Decimal suffixes (KB, MB, ...) are powers of 1000; binary suffixes (KiB,
/// MiB, ...) are powers of 1024. Case insensitive.
///
/// # Errors
///
/// Returns a message for empty input, a malformed number or an unknown
/// suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
