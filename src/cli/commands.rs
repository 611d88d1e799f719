//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: execute a form definition with the local dispatcher
//! - variables: list every variable a form defines
//! - conflicts: report variable name collisions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Formloop - loop execution core for form automation actions
#[derive(Parser, Debug)]
#[command(name = "formloop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a form definition
    Run {
        /// Path to the form definition YAML
        form: PathBuf,

        /// Seed initial state, key=value (value parsed as JSON when possible)
        #[arg(short, long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// List every variable the form defines
    Variables {
        /// Path to the form definition YAML
        form: PathBuf,

        /// Include the internal template variables and reserved loop names
        #[arg(short, long)]
        internal: bool,
    },

    /// Report variable name conflicts (exit code 1 if any)
    Conflicts {
        /// Path to the form definition YAML
        form: PathBuf,
    },
}
