// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use treesync::{
    config::{LocationSettings, ProfileFile},
    path::default_profile_path,
    Comparer, ExcludeSet, LocalFiles, SyncReport, Synchronizer,
};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use std::{error::Error, path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  treesync [options] <treesync-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        match self.command {
            Command::Sync(opts) => run_sync(opts),
            Command::Diff(opts) => run_diff(opts),
            Command::Run(opts) => run_profile(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Mirror source directory into target directory.
    #[command(override_usage = "treesync sync [options] <source> <target>")]
    Sync(SyncOptions),

    /// Show what a sync would change without changing anything.
    #[command(override_usage = "treesync diff [options] <source> <target>")]
    Diff(DiffOptions),

    /// Run sync job from profile file.
    #[command(override_usage = "treesync run [options] <profile>")]
    Run(RunOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SyncOptions {
    /// Directory to copy from.
    #[arg(required = true, value_name = "source")]
    pub source: String,

    /// Directory to copy into.
    #[arg(required = true, value_name = "target")]
    pub target: String,

    /// Glob rule of files to leave out, prefix with '!' to negate.
    #[arg(short, long, value_name = "pattern")]
    pub exclude: Vec<String>,

    /// Delete files and directories that only exist in target.
    #[arg(short, long)]
    pub delete: bool,

    /// Do not ask for confirmation before deleting.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DiffOptions {
    /// Directory to copy from.
    #[arg(required = true, value_name = "source")]
    pub source: String,

    /// Directory to copy into.
    #[arg(required = true, value_name = "target")]
    pub target: String,

    /// Glob rule of files to leave out, prefix with '!' to negate.
    #[arg(short, long, value_name = "pattern")]
    pub exclude: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RunOptions {
    /// Name of profile to run.
    #[arg(required = true, value_name = "profile")]
    pub profile: String,

    /// Path to profile file instead of the default one.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Do not ask for confirmation before deleting.
    #[arg(short, long)]
    pub yes: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_sync(opts: SyncOptions) -> Result<()> {
    let synchronizer = Synchronizer::new()
        .with_source(LocalFiles::new(&LocationSettings::new(opts.source))?)
        .with_target(LocalFiles::new(&LocationSettings::new(opts.target))?)
        .with_excludes(ExcludeSet::new(&opts.exclude)?);

    execute(synchronizer, !opts.delete, opts.yes)
}

fn run_diff(opts: DiffOptions) -> Result<()> {
    let synchronizer = Synchronizer::new()
        .with_source(LocalFiles::new(&LocationSettings::new(opts.source))?)
        .with_target(LocalFiles::new(&LocationSettings::new(opts.target))?)
        .with_excludes(ExcludeSet::new(&opts.exclude)?);

    let diff = synchronizer.compare()?;
    if diff.is_empty() {
        info!("trees are in sync");
        return Ok(());
    }

    print_diff(&diff);

    Ok(())
}

fn run_profile(opts: RunOptions) -> Result<()> {
    let path = match opts.config {
        Some(path) => path,
        None => default_profile_path()?,
    };
    let data = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read profile file {:?}", path.display()))?;
    let profiles: ProfileFile = data.parse()?;
    let profile = profiles.profile(&opts.profile)?;

    let synchronizer = Synchronizer::new()
        .with_source(LocalFiles::new(&profile.source)?)
        .with_target(LocalFiles::new(&profile.target)?)
        .with_excludes(profile.exclude.to_exclude_set()?);

    execute(synchronizer, profile.preserve, opts.yes)
}

fn execute(synchronizer: Synchronizer, preserve: bool, yes: bool) -> Result<()> {
    let mut preserve = preserve;
    if !preserve && !yes {
        let diff = synchronizer.compare()?;
        let obsolete = diff.obsolete_files().count() + diff.obsolete_directories().count();
        if obsolete > 0 && !confirm_delete(&diff, obsolete)? {
            info!("keep obsolete entries");
            preserve = true;
        }
    }

    let report = synchronizer
        .with_progress(progress_bar()?)
        .synchronize(preserve)?;
    check_report(&report)
}

fn confirm_delete(diff: &Comparer, obsolete: usize) -> Result<bool> {
    for file in diff.obsolete_files() {
        println!("delete {file}");
    }
    for directory in diff.obsolete_directories() {
        println!("delete {directory}/");
    }

    Ok(Confirm::new(&format!("delete {obsolete} obsolete entries from target?"))
        .with_default(false)
        .prompt()?)
}

fn progress_bar() -> Result<ProgressBar> {
    let style = ProgressStyle::with_template(
        "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
    )?
    .progress_chars("-Cco.");
    let bar = ProgressBar::new(0);
    bar.set_style(style);

    Ok(bar)
}

fn print_diff(diff: &Comparer) {
    for file in diff.outdated_files() {
        println!("update {file}");
    }
    for directory in diff.missing_directories() {
        println!("create {directory}/");
    }
    for file in diff.missing_files() {
        println!("add    {file}");
    }
    for file in diff.obsolete_files() {
        println!("delete {file}");
    }
    for directory in diff.obsolete_directories() {
        println!("delete {directory}/");
    }
}

fn check_report(report: &SyncReport) -> Result<()> {
    if report.is_success() {
        return Ok(());
    }

    for failure in &report.failures {
        match failure.error.source() {
            Some(cause) => error!("{}: {cause}", failure.error),
            None => error!("{}", failure.error),
        }
    }

    Err(anyhow!(
        "synchronization finished with {} failed operations",
        report.failure_count()
    ))
}
