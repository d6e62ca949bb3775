//! `linkcache watch` command - follow changes made by other processes
//!
//! Polls the store's event channel and prints every change to the given
//! collections until interrupted (or until `--count` / `--timeout`).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use console::style;
use miette::Result;

use crate::cli::helpers::{resolve_format, Context};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::{Bus, ChangeEvent, EventLog};

#[derive(clap::Args, Debug)]
pub struct WatchArgs {
    /// Collection names
    #[arg(required = true)]
    pub collections: Vec<String>,

    /// Exit after this many events
    #[arg(long)]
    pub count: Option<usize>,

    /// Exit after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Poll interval in milliseconds
    #[arg(long)]
    pub interval: Option<u64>,
}

pub fn run(args: WatchArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::from_global(global)?;
    // Make sure the store (and its schema) exists before polling it
    drop(ctx.open_store()?);

    let channel = EventLog::open(&ctx.database, ctx.config.event_retention())?;
    let mut bus = Bus::with_channel(channel);
    let interval =
        Duration::from_millis(args.interval.unwrap_or_else(|| ctx.config.watch_interval_ms()));

    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    let format = resolve_format(global.format);
    let _subscription = bus.subscribe(
        args.collections.iter().cloned(),
        Arc::new(move |event: &ChangeEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
            print_event(event, format);
        }),
    );

    // Printed once the cursor is set; stdout carries only events
    if !global.quiet {
        eprintln!(
            "{} Watching {} collection(s)...",
            style("→").blue(),
            args.collections.len()
        );
    }

    let start = Instant::now();
    loop {
        bus.relay()?;

        if args.count.is_some_and(|n| received.load(Ordering::SeqCst) >= n) {
            break;
        }
        if args
            .timeout
            .is_some_and(|t| start.elapsed() >= Duration::from_secs(t))
        {
            break;
        }

        std::thread::sleep(interval);
    }

    Ok(())
}

fn print_event(event: &ChangeEvent, format: OutputFormat) {
    let diff = &event.diff;
    match format {
        OutputFormat::Json => match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("cannot encode event: {}", e),
        },
        OutputFormat::Yaml => match serde_yml::to_string(event) {
            Ok(doc) => print!("---\n{}", doc),
            Err(e) => tracing::warn!("cannot encode event: {}", e),
        },
        OutputFormat::Tsv => println!(
            "{}\t{}\t{}\t{}",
            event.collection,
            diff.added.len(),
            diff.updated.len(),
            diff.deleted.len()
        ),
        _ => {
            println!(
                "{} {}: {} added, {} updated, {} deleted",
                style("✓").green(),
                style(&event.collection).cyan(),
                style(diff.added.len()).green(),
                style(diff.updated.len()).yellow(),
                style(diff.deleted.len()).red()
            );
            for record in diff.added.values() {
                println!("  {} {}", style("+").green(), record.title);
            }
            for update in diff.updated.values() {
                println!("  {} {}", style("~").yellow(), update.new.title);
            }
            for record in diff.deleted.values() {
                println!("  {} {}", style("-").red(), record.title);
            }
        }
    }
}
