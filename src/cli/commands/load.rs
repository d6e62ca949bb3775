//! `linkcache load` command - print cached pages
//!
//! Reads the local store only. Unknown collections print nothing.

use console::style;
use miette::Result;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{
    escape_tsv, format_timestamp, print_structured, resolve_format, truncate_str, Context,
};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::LinkRecord;

#[derive(clap::Args, Debug)]
pub struct LoadArgs {
    /// Collection names
    #[arg(required = true)]
    pub collections: Vec<String>,
}

pub fn run(args: LoadArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::from_global(global)?;
    let store = ctx.open_store()?;
    let records = store.load(&args.collections)?;

    let format = resolve_format(global.format);
    if print_structured(format, &records)? {
        return Ok(());
    }

    match format {
        OutputFormat::Tsv => print_tsv(&records),
        OutputFormat::Md => println!("{}", table(&records).with(Style::markdown())),
        _ => {
            if records.is_empty() {
                if !global.quiet {
                    println!("{} No cached pages", style("!").yellow());
                }
                return Ok(());
            }
            println!("{}", table(&records).with(Style::rounded()));
            if !global.quiet {
                println!("{} page(s)", style(records.len()).cyan());
            }
        }
    }

    Ok(())
}

fn table(records: &[LinkRecord]) -> tabled::Table {
    let mut builder = Builder::default();
    builder.push_record(["Collection", "Title", "Updated", "Links"]);
    for record in records {
        builder.push_record([
            record.collection.clone(),
            truncate_str(&record.title, 48),
            format_timestamp(record.updated),
            record.links.len().to_string(),
        ]);
    }
    builder.build()
}

fn print_tsv(records: &[LinkRecord]) {
    for record in records {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            record.collection,
            record.id,
            escape_tsv(&record.title),
            record.updated,
            record
                .links
                .iter()
                .map(|l| escape_tsv(l))
                .collect::<Vec<_>>()
                .join("\t")
        );
    }
}
