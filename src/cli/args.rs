//! Command-line arguments and subcommands for the `selrule` CLI.
//!
//! This module uses the `clap` crate with its "derive" feature to create a
//! declarative and type-safe argument parsing structure.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "selrule",
    version,
    about = "Checks, compiles and runs selection rules."
)]
pub struct SelruleArgs {
    /// YAML engine configuration.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace). `SELRULE_LOG`
    /// overrides it.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check a rule file, or every `.sel` file under a directory.
    Verify {
        #[arg(required = true)]
        path: PathBuf,
        /// JSON data set declaring the data objects rules select from.
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Print the expression tree of a rule file as JSON.
    Ast {
        #[arg(required = true)]
        file: PathBuf,
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Compile a rule file and print the resulting scope tree.
    Scopes {
        #[arg(required = true)]
        file: PathBuf,
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Compile a rule file against a data set and invoke one rule.
    Run {
        #[arg(required = true)]
        file: PathBuf,
        #[arg(long)]
        data: PathBuf,
        /// Rule name, optionally module-qualified.
        #[arg(long)]
        rule: String,
        /// Positional arguments, each parsed as JSON or else taken as text.
        args: Vec<String>,
    },
}
