//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;
use soa_cli::output::DEFAULT_BASE_NAME;
use soa_model::SourceTag;

#[derive(Parser)]
#[command(
    name = "soa-reconcile",
    version,
    about = "Reconcile text and vision Schedule of Activities extractions",
    long_about = "Repair, normalize and merge two model extractions of a protocol's \
                  Schedule of Activities into one USDM-shaped entity graph.\n\n\
                  Writes the graph, a provenance ledger and a validation report as \
                  sibling JSON files."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// TOML configuration file (defaults apply to anything it omits).
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Decode, normalize and merge a text and a vision extraction.
    Reconcile(ReconcileArgs),

    /// Decode, normalize and validate a single extraction.
    Normalize(NormalizeArgs),

    /// Validate an existing entity-graph document.
    Validate(ValidateArgs),

    /// Repair a raw model response and print the JSON.
    Decode(DecodeArgs),
}

#[derive(Args)]
pub struct ReconcileArgs {
    /// Raw response of the text-based extraction.
    #[arg(long = "text", value_name = "FILE")]
    pub text: PathBuf,

    /// Raw response of the vision-based extraction.
    #[arg(long = "vision", value_name = "FILE")]
    pub vision: PathBuf,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args)]
pub struct NormalizeArgs {
    /// Raw model response to normalize.
    #[arg(long = "input", value_name = "FILE")]
    pub input: PathBuf,

    /// Which extraction produced the response.
    #[arg(long = "source", value_enum)]
    pub source: SourceArg,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Entity-graph document to validate.
    #[arg(value_name = "DOCUMENT")]
    pub document: PathBuf,

    /// Write the report next to the document as `<stem>_validation.json`.
    #[arg(long = "write-report")]
    pub write_report: bool,
}

#[derive(Args)]
pub struct DecodeArgs {
    /// Raw model response.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(Args)]
pub struct OutputArgs {
    /// Directory for the output artifacts.
    #[arg(long = "output", short = 'o', value_name = "DIR", default_value = "output")]
    pub dir: PathBuf,

    /// Artifact stem (`<NAME>.json`, `<NAME>_provenance.json`, `<NAME>_validation.json`).
    #[arg(long = "name", value_name = "NAME", default_value = DEFAULT_BASE_NAME)]
    pub name: String,

    /// Run and report without writing any files.
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SourceArg {
    Text,
    Vision,
}

impl From<SourceArg> for SourceTag {
    fn from(value: SourceArg) -> Self {
        match value {
            SourceArg::Text => SourceTag::Text,
            SourceArg::Vision => SourceTag::Vision,
        }
    }
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
