//! Shared helper functions for CLI commands

use std::path::PathBuf;

use chrono::{DateTime, Local, Utc};
use console::Term;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::{Config, LinkStore};

/// Resolved configuration for one command run
pub struct Context {
    pub config: Config,
    pub database: PathBuf,
}

impl Context {
    /// Load the config layers and apply the global flags on top
    pub fn from_global(global: &GlobalOpts) -> Result<Self> {
        let mut config = Config::load(global.config.as_deref()).into_diagnostic()?;
        if let Some(ref database) = global.database {
            config.database = Some(database.clone());
        }
        let database = config.database().into_diagnostic()?;

        Ok(Self { config, database })
    }

    pub fn open_store(&self) -> Result<LinkStore> {
        LinkStore::open(&self.database)
    }
}

/// Format a UNIX timestamp in local time; 0 means never
pub fn format_timestamp(ts: i64) -> String {
    if ts <= 0 {
        return "never".to_string();
    }
    match DateTime::<Utc>::from_timestamp(ts, 0) {
        Some(dt) => dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
        None => ts.to_string(),
    }
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Replace characters that would break a TSV row
pub fn escape_tsv(s: &str) -> String {
    s.replace(['\t', '\n', '\r'], " ")
}

/// Concrete output format: `Auto` is human output on a terminal, TSV when piped
pub fn resolve_format(format: OutputFormat) -> OutputFormat {
    resolve_for_terminal(format, Term::stdout().is_term())
}

fn resolve_for_terminal(format: OutputFormat, is_term: bool) -> OutputFormat {
    match format {
        OutputFormat::Auto if !is_term => OutputFormat::Tsv,
        other => other,
    }
}

/// Print `value` in a machine format
///
/// Returns `false` for formats the caller renders itself.
pub fn print_structured<T: Serialize + ?Sized>(format: OutputFormat, value: &T) -> Result<bool> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
            Ok(true)
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(value).into_diagnostic()?);
            Ok(true)
        }
        _ => Ok(false),
    }
}
