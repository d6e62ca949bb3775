//! `linkcache reset` command - un-park invalid collections
//!
//! A collection the remote refused (not found, not a member, not logged in)
//! is never checked again automatically. Resetting it replaces its status
//! with a never-checked placeholder, so the next `check` looks it up again.

use console::style;
use miette::Result;

use crate::cli::helpers::Context;
use crate::cli::GlobalOpts;

#[derive(clap::Args, Debug)]
pub struct ResetArgs {
    /// Collection names
    #[arg(required_unless_present = "all")]
    pub collections: Vec<String>,

    /// Reset every invalid collection
    #[arg(long, conflicts_with = "collections")]
    pub all: bool,
}

pub fn run(args: ResetArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::from_global(global)?;
    let mut store = ctx.open_store()?;

    let names: Vec<String> = if args.all {
        store
            .statuses()?
            .into_iter()
            .filter(|s| !s.is_valid())
            .map(|s| s.name().to_string())
            .collect()
    } else {
        args.collections
    };

    for name in &names {
        let reset = store.reset(name)?;
        if global.quiet {
            continue;
        }
        if reset {
            println!("{} {} will be checked again", style("✓").green(), style(name).cyan());
        } else {
            println!("{} {} is not invalid", style("-").dim(), style(name).cyan());
        }
    }

    Ok(())
}
