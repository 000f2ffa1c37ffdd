//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};
use clap_complete::Shell;

/// Inspect and validate model document outlines
#[derive(Parser, Debug)]
#[command(name = "modeldom")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Turn debugging information on (repeat for more: -d -d -d)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub debug: u8,

    /// Config file layered over the global one
    #[arg(long, global = true, env = "MODELDOM_CONFIG", value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Generate shell completions
    #[arg(long = "generate", value_enum)]
    pub generator: Option<Shell>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the node tree of an outline
    Tree {
        /// Outline file (TOML)
        #[arg(value_hint = ValueHint::FilePath)]
        outline: PathBuf,
        /// Freeze the document before printing
        #[arg(long)]
        freeze: bool,
    },

    /// Build an outline and report what it contains
    Check {
        /// Outline file (TOML)
        #[arg(value_hint = ValueHint::FilePath)]
        outline: PathBuf,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective settings
    Show,
    /// Show global config file location
    Path,
}
