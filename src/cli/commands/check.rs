//! `linkcache check` command - refresh stale collections
//!
//! Collections checked less than `--max-age` seconds ago are skipped, as are
//! collections parked as invalid (see `linkcache reset`). Changes are posted
//! to the store's event channel so `linkcache watch` in other terminals sees
//! them.

use std::path::PathBuf;

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::{print_structured, resolve_format, Context};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::remote::{DirectorySource, HttpSource, RemoteSource};
use crate::core::{Bus, CheckReport, EventLog, LinkStorage, Outcome};

#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    /// Collection names
    #[arg(required = true)]
    pub collections: Vec<String>,

    /// Seconds since the last check before a collection is stale
    #[arg(long)]
    pub max_age: Option<i64>,

    /// Read collections from `<dir>/<name>.json` exports instead of the API
    #[arg(long, value_name = "DIR")]
    pub source_dir: Option<PathBuf>,

    /// Entries per listing page when reading exports
    #[arg(long, requires = "source_dir")]
    pub page_size: Option<usize>,

    /// Remote API base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Session cookie for private collections
    #[arg(long, env = "LINKCACHE_SID", hide_env_values = true)]
    pub sid: Option<String>,
}

pub fn run(args: CheckArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::from_global(global)?;
    if args.base_url.is_some() {
        ctx.config.base_url = args.base_url.clone();
    }
    if args.sid.is_some() {
        ctx.config.sid = args.sid.clone();
    }
    let max_age = args.max_age.unwrap_or_else(|| ctx.config.max_age());

    let remote: Box<dyn RemoteSource> = match &args.source_dir {
        Some(dir) => {
            let mut source = DirectorySource::new(dir);
            if let Some(page_size) = args.page_size {
                source = source.with_page_size(page_size);
            }
            Box::new(source)
        }
        None => Box::new(
            HttpSource::new(
                ctx.config.base_url().into_diagnostic()?,
                ctx.config.sid.clone(),
                &ctx.config.user_agent(),
            )
            .into_diagnostic()?,
        ),
    };

    let store = ctx.open_store()?;
    let channel = EventLog::open(&ctx.database, ctx.config.event_retention())?;
    let mut storage = LinkStorage::new(store, remote).with_bus(Bus::with_channel(channel));

    let report = storage.check(args.collections.as_slice(), max_age)?;

    let format = resolve_format(global.format);
    if print_structured(format, &report)? {
        return Ok(());
    }
    match format {
        OutputFormat::Tsv => print_tsv(&report),
        _ if global.quiet => {}
        _ => print_human(&report),
    }

    Ok(())
}

fn print_human(report: &CheckReport) {
    for entry in &report.collections {
        let name = style(&entry.collection).cyan();
        match &entry.outcome {
            Outcome::Skipped { reason } => {
                println!("{} {} skipped ({})", style("-").dim(), name, reason)
            }
            Outcome::Unchanged => println!("{} {} is up to date", style("✓").green(), name),
            Outcome::Updated {
                added,
                updated,
                deleted,
            } => println!(
                "{} {} synced: {} added, {} updated, {} deleted",
                style("✓").green(),
                name,
                style(added).green(),
                style(updated).yellow(),
                style(deleted).red()
            ),
            Outcome::Invalid { reason } => {
                println!("{} {} is invalid: {}", style("✗").red(), name, reason)
            }
            Outcome::Failed { error, .. } => {
                println!("{} {} failed: {}", style("!").yellow(), name, error)
            }
        }
    }
}

fn print_tsv(report: &CheckReport) {
    for entry in &report.collections {
        let (outcome, detail) = match &entry.outcome {
            Outcome::Skipped { reason } => ("skipped", reason.to_string()),
            Outcome::Unchanged => ("unchanged", String::new()),
            Outcome::Updated {
                added,
                updated,
                deleted,
            } => ("updated", format!("{}/{}/{}", added, updated, deleted)),
            Outcome::Invalid { reason } => ("invalid", reason.to_string()),
            Outcome::Failed { error, .. } => ("failed", error.clone()),
        };
        println!("{}\t{}\t{}", entry.collection, outcome, detail);
    }
}
