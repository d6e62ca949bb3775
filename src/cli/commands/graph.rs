//! `linkcache graph` command - the link graph of cached collections
//!
//! Lists every cached page plus every linked title that has no page, one
//! entry per normalised title. This is the view completion popups use.

use miette::Result;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{
    escape_tsv, print_structured, resolve_format, truncate_str, Context,
};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::{expand_links, GraphEntry};

#[derive(clap::Args, Debug)]
pub struct GraphArgs {
    /// Collection names
    #[arg(required = true)]
    pub collections: Vec<String>,

    /// Only list linked titles that have no page
    #[arg(long)]
    pub missing: bool,
}

pub fn run(args: GraphArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::from_global(global)?;
    let store = ctx.open_store()?;

    let entries: Vec<GraphEntry> = expand_links(&store.load(&args.collections)?)
        .into_iter()
        .filter(|e| !args.missing || !e.exists)
        .collect();

    let format = resolve_format(global.format);
    if print_structured(format, &entries)? {
        return Ok(());
    }

    match format {
        OutputFormat::Md | OutputFormat::Auto => {
            let mut builder = Builder::default();
            builder.push_record(["Title", "Exists", "Links"]);
            for entry in &entries {
                builder.push_record([
                    truncate_str(&entry.title, 48),
                    if entry.exists { "yes" } else { "no" }.to_string(),
                    entry.links.len().to_string(),
                ]);
            }
            let mut table = builder.build();
            if format == OutputFormat::Md {
                table.with(Style::markdown());
            } else {
                table.with(Style::rounded());
            }
            if !entries.is_empty() {
                println!("{}", table);
            }
        }
        _ => {
            for entry in &entries {
                println!(
                    "{}\t{}\t{}",
                    escape_tsv(&entry.title),
                    entry.exists,
                    entry.updated
                );
            }
        }
    }

    Ok(())
}
