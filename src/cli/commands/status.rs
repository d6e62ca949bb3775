//! `linkcache status` command - sync status of every known collection

use console::style;
use miette::Result;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{format_timestamp, print_structured, resolve_format, Context};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::CollectionStatus;

#[derive(clap::Args, Debug)]
pub struct StatusArgs {
    /// Only show collections parked as invalid
    #[arg(long)]
    pub invalid: bool,
}

pub fn run(args: StatusArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::from_global(global)?;
    let store = ctx.open_store()?;

    let statuses: Vec<CollectionStatus> = store
        .statuses()?
        .into_iter()
        .filter(|s| !args.invalid || !s.is_valid())
        .collect();

    let format = resolve_format(global.format);
    if print_structured(format, &statuses)? {
        return Ok(());
    }

    match format {
        OutputFormat::Tsv => {
            for status in &statuses {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    status.name(),
                    state(status),
                    status.checked(),
                    updated(status),
                    status.updating()
                );
            }
        }
        OutputFormat::Md => println!("{}", table(&statuses).with(Style::markdown())),
        _ => {
            if !statuses.is_empty() {
                println!("{}", table(&statuses).with(Style::rounded()));
            }
            if global.quiet {
                return Ok(());
            }

            let stats = store.statistics()?;
            println!("{}", style("Store Status").bold());
            println!("{}", style("─".repeat(40)).dim());
            println!("  Location:        {}", store.path().display());
            println!("  Collections:     {}", style(stats.total_collections).cyan());
            println!(
                "  Invalid:         {}",
                style(stats.invalid_collections).red()
            );
            println!("  Cached pages:    {}", style(stats.total_links).cyan());
            println!("  Pending events:  {}", style(stats.pending_events).cyan());
            println!(
                "  Database size:   {} KB",
                style(stats.db_size_bytes / 1024).cyan()
            );
        }
    }

    Ok(())
}

fn state(status: &CollectionStatus) -> String {
    match status {
        CollectionStatus::Valid(_) => "valid".to_string(),
        CollectionStatus::Invalid(s) => format!("invalid ({})", s.reason),
    }
}

fn updated(status: &CollectionStatus) -> i64 {
    match status {
        CollectionStatus::Valid(s) => s.updated,
        CollectionStatus::Invalid(_) => 0,
    }
}

fn table(statuses: &[CollectionStatus]) -> tabled::Table {
    let mut builder = Builder::default();
    builder.push_record(["Collection", "State", "Checked", "Remote Updated", "In Flight"]);
    for status in statuses {
        builder.push_record([
            status.name().to_string(),
            state(status),
            format_timestamp(status.checked()),
            format_timestamp(updated(status)),
            if status.updating() { "yes" } else { "" }.to_string(),
        ]);
    }
    builder.build()
}
