//! CLI parse: clap types for learncrafter. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// LearnCrafter - generate and publish courses from an outline
#[derive(Debug, Parser)]
#[command(name = "learncrafter")]
#[command(about = "Turns a course outline into generated, persisted course content")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the `config/` folder
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path, layered over `config/`
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable logging for one-shot commands (`serve` always logs)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve the publishing job API
    Serve {
        /// Address to bind, overrides `server.bind`
        #[arg(long)]
        bind: Option<String>,
    },
    /// Publish one course to completion and print the final job record
    Run {
        /// Course spec as JSON
        #[arg(long, required_unless_present = "request", conflicts_with = "request")]
        spec: Option<PathBuf>,

        /// Publish request as JSON; missing parts of the outline are planned first
        #[arg(long)]
        request: Option<PathBuf>,
    },
    /// Load and validate configuration, including the workflow prompts
    CheckConfig,
}
