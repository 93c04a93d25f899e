//! CLI parse: clap types for qengine. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// qengine - run question modules against local course content
#[derive(Parser, Debug)]
#[command(name = "qengine")]
#[command(about = "Generate, render and grade question variants from a course directory")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Course content root (contains questions/)
    #[arg(long, default_value = ".")]
    pub course: PathBuf,

    /// Numeric course id used in diagnostics
    #[arg(long, default_value = "1")]
    pub course_id: u64,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
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

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show version information
    Version,
    /// Generate a variant
    Generate {
        /// Question directory under questions/
        qid: String,
        /// Variant seed (random when omitted)
        #[arg(long)]
        seed: Option<String>,
    },
    /// Render a variant, optionally with graded submissions
    Render {
        qid: String,
        #[arg(long)]
        seed: String,
        /// Submitted answer as JSON; repeat for several submissions
        #[arg(long = "submission")]
        submissions: Vec<String>,
        /// Leave out the answer panel
        #[arg(long)]
        no_answer: bool,
    },
    /// Grade one submitted answer
    Grade {
        qid: String,
        #[arg(long)]
        seed: String,
        /// Submitted answer as JSON
        #[arg(long)]
        answer: String,
    },
    /// Produce an auxiliary file for a variant
    File {
        qid: String,
        filename: String,
        #[arg(long)]
        seed: String,
        /// Write the bytes here instead of embedding them in the output
        #[arg(long)]
        out: Option<PathBuf>,
    },
}
