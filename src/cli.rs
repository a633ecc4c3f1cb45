//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - index: build or load the guideline index
//! - ask: run one question through every subject model
//! - review: discover and review the files of a submission

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// critiq - retrieval-grounded multi-model review pipeline
#[derive(Parser, Debug)]
#[command(name = "critiq")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

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
    /// Build the guideline index, or load it if already persisted
    Index {
        /// Corpus root directory (overrides config)
        #[arg(long)]
        corpus: Option<PathBuf>,
    },

    /// Ask one question through every subject model
    Ask {
        /// The question to answer against the guideline corpus
        question: String,

        /// Subject models (overrides config)
        #[arg(short, long)]
        models: Vec<String>,

        /// Judge model (overrides config)
        #[arg(short, long)]
        judge: Option<String>,
    },

    /// Review every source and documentation file of a submission
    Review {
        /// Submission root directory (overrides config)
        root: Option<PathBuf>,

        /// Subject models (overrides config)
        #[arg(short, long)]
        models: Vec<String>,

        /// Judge model (overrides config)
        #[arg(short, long)]
        judge: Option<String>,

        /// Worker pool size (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,
    },
}
