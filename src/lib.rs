//! copyall - filter, copy, move and deduplicate large file sets
//!
//! The library is organised around three engines:
//!
//! - [`scanner::Filelist`]: lazy, cached enumeration of a filtered subtree
//! - [`duplicates::DuplicateFinder`]: a size → prehash → full hash → bytes
//!   funnel that groups content-identical files across one or two universes
//! - [`actions::TransferEngine`]: batched copy/move/trash/delete with
//!   content-aware name-conflict resolution
//!
//! [`progress`] supplies fraction, ETA and rate for long runs, and
//! [`run_app`] wires everything to the command line.

pub mod actions;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::sync::Arc;

use anyhow::{Context, Result};
use bytesize::ByteSize;

use crate::actions::{TransferEngine, TransferReport};
use crate::cli::{Cli, Commands, DupesArgs, ListArgs, TransferArgs};
use crate::config::Config;
use crate::duplicates::{DuplicateFinder, DuplicateGroupSet};
use crate::error::ExitCode;
use crate::progress::{ProgressCallback, TerminalProgress};
use crate::scanner::Filelist;
use crate::signal::CancelToken;

/// Run the CLI and return the process exit code.
///
/// # Errors
///
/// Any run-stopping error: invalid configuration, an unusable destination,
/// an interrupt, or an unexpected failure.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let mut config = match cli.config {
        Some(ref path) => Config::try_load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load(),
    };
    config.merge_cli(&cli);
    config.validate()?;
    log::debug!("Effective configuration: {:?}", config);

    let cancel = match signal::install_handler() {
        Ok(token) => token,
        Err(e) => {
            log::warn!("{}; Ctrl+C will terminate immediately", e);
            CancelToken::new()
        }
    };
    let progress: Arc<dyn ProgressCallback> =
        Arc::new(TerminalProgress::new(cli.quiet, config.bar_width));

    match cli.command {
        Commands::Extensions(ref args) => list_extensions(args),
        Commands::Count(ref args) => count_files(args),
        Commands::Transfer(ref args) => transfer(args, &config, cancel, progress),
        Commands::Dupes(ref args) => find_dupes(args, &config, cancel, progress),
    }
}

fn list_extensions(args: &ListArgs) -> Result<ExitCode> {
    let filelist = Filelist::new(&args.path, args.filters.to_filters())?;
    let extensions = filelist.extensions();
    if args.json {
        println!("{}", serde_json::to_string_pretty(extensions)?);
    } else {
        for ext in extensions {
            println!("{ext}");
        }
    }
    Ok(ExitCode::Success)
}

fn count_files(args: &ListArgs) -> Result<ExitCode> {
    let filelist = Filelist::new(&args.path, args.filters.to_filters())?;
    let files = filelist.len();
    let bytes = filelist.total_size();
    if args.json {
        let value = serde_json::json!({ "files": files, "bytes": bytes });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{} files, {}", files, ByteSize(bytes));
    }
    Ok(ExitCode::Success)
}

fn transfer(
    args: &TransferArgs,
    config: &Config,
    cancel: CancelToken,
    progress: Arc<dyn ProgressCallback>,
) -> Result<ExitCode> {
    let mut transfer_config = config
        .transfer_config(args.mode.into())
        .with_keep_structure(!args.flatten)
        .with_confirm_permanent_delete(args.confirm_permanent_delete)
        .with_cancel(cancel)
        .with_progress(progress);
    if let Some(retries) = args.max_retries {
        transfer_config = transfer_config.with_max_retries(retries);
    }

    let engine = TransferEngine::new(transfer_config);
    let report = engine.run(&args.input, args.output.as_deref(), args.filters.to_filters())?;
    print_report(&report, args.json)?;
    Ok(exit_code_for(&report))
}

fn find_dupes(
    args: &DupesArgs,
    config: &Config,
    cancel: CancelToken,
    progress: Arc<dyn ProgressCallback>,
) -> Result<ExitCode> {
    let filters = args.filters.to_filters();
    let left = Filelist::new(&args.path, filters.clone())?;
    let right = args
        .against
        .as_ref()
        .map(|path| Filelist::new(path, filters))
        .transpose()?;

    let finder = DuplicateFinder::new(
        config
            .finder_config()
            .with_match_extensions(config.match_extensions && !args.any_extension)
            .with_cancel(cancel.clone())
            .with_progress(Arc::clone(&progress)),
    );
    let (groups, stats) = finder.find_in_filelists(&left, right.as_ref().unwrap_or(&left))?;
    log::info!(
        "{} groups, {} removable files, {} reclaimable ({:.1}% eliminated before verification)",
        stats.duplicate_groups,
        stats.duplicate_files,
        ByteSize(stats.wasted_space),
        stats.elimination_rate()
    );

    let Some(mode) = args.discard_mode() else {
        print_groups(&groups, args.json)?;
        return Ok(ExitCode::Success);
    };

    let removable = groups.removable();
    let engine = TransferEngine::new(
        config
            .transfer_config(mode)
            .with_confirm_permanent_delete(args.confirm_permanent_delete)
            .with_cancel(cancel)
            .with_progress(progress),
    );
    let report = engine.discard(&removable)?;
    if args.json {
        let value = serde_json::json!({ "groups": &groups, "report": &report });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_groups(&groups, false)?;
        print_report(&report, false)?;
    }
    Ok(exit_code_for(&report))
}

fn print_groups(groups: &DuplicateGroupSet, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(groups)?);
        return Ok(());
    }
    for group in groups {
        println!("{} ({} files):", ByteSize(group.size), group.len());
        if groups.same_universe {
            for path in &group.left {
                println!("  {}", path.display());
            }
        } else {
            for path in &group.left {
                println!("  < {}", path.display());
            }
            for path in &group.right {
                println!("  > {}", path.display());
            }
        }
    }
    if groups.is_empty() {
        println!("No duplicates found");
    } else {
        println!(
            "{} groups, {} removable files, {} reclaimable",
            groups.len(),
            groups.duplicate_count(),
            ByteSize(groups.wasted_space())
        );
    }
    Ok(())
}

fn print_report(report: &TransferReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!(
        "{}: {} of {} files ({}) in {:.2}s",
        report.mode.verb(),
        report.processed_files,
        report.total_files,
        ByteSize(report.processed_bytes),
        report.duration_secs
    );
    println!("{}", report.summary);
    Ok(())
}

fn exit_code_for(report: &TransferReport) -> ExitCode {
    if report.is_complete_success() {
        ExitCode::Success
    } else {
        ExitCode::PartialSuccess
    }
}
