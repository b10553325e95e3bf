use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use soa_cli::output::{ArtifactPaths, write_artifacts, write_json};
use soa_cli::pipeline::{PipelineOutcome, run_reconcile, run_single_source, validate_document};
use soa_core::decode::decode_with_layer;
use soa_model::{SoaConfig, SoaDocument};
use soa_validate::ValidationReport;
use tracing::info_span;

use crate::cli::{DecodeArgs, NormalizeArgs, OutputArgs, ReconcileArgs, ValidateArgs};

/// A pipeline run and where its artifacts went.
#[derive(Debug)]
pub struct RunResult {
    pub outcome: PipelineOutcome,
    pub artifacts: Option<ArtifactPaths>,
}

impl RunResult {
    pub fn has_errors(&self) -> bool {
        !self.outcome.validation.passed()
    }
}

/// Validation of an existing document.
#[derive(Debug)]
pub struct ValidateResult {
    pub document: PathBuf,
    pub report: ValidationReport,
    pub written: Option<PathBuf>,
}

pub fn run_reconcile_command(args: &ReconcileArgs, config: &SoaConfig) -> Result<RunResult> {
    let _span = info_span!("run", command = "reconcile").entered();
    let text = read_source(&args.text)?;
    let vision = read_source(&args.vision)?;
    let outcome = run_reconcile(&text, &vision, config)?;
    finish(outcome, &args.output)
}

pub fn run_normalize_command(args: &NormalizeArgs, config: &SoaConfig) -> Result<RunResult> {
    let _span = info_span!("run", command = "normalize").entered();
    let raw = read_source(&args.input)?;
    let outcome = run_single_source(&raw, args.source.into(), config)?;
    finish(outcome, &args.output)
}

pub fn run_validate_command(args: &ValidateArgs, config: &SoaConfig) -> Result<ValidateResult> {
    let _span = info_span!("run", command = "validate").entered();
    let contents = read_source(&args.document)?;
    let document: SoaDocument = serde_json::from_str(&contents)
        .with_context(|| format!("parse document {}", args.document.display()))?;
    let report = validate_document(&document, config);
    let written = if args.write_report {
        let path = ArtifactPaths::validation_for(&args.document);
        write_json(&path, &report)?;
        Some(path)
    } else {
        None
    };
    Ok(ValidateResult {
        document: args.document.clone(),
        report,
        written,
    })
}

pub fn run_decode_command(args: &DecodeArgs) -> Result<()> {
    let raw = read_source(&args.file)?;
    let decoded = decode_with_layer(&raw)
        .with_context(|| format!("decode {}", args.file.display()))?;
    let pretty = serde_json::to_string_pretty(&decoded.value).context("format JSON")?;
    eprintln!("Repair layer: {}", decoded.layer);
    println!("{pretty}");
    Ok(())
}

fn finish(outcome: PipelineOutcome, output: &OutputArgs) -> Result<RunResult> {
    let artifacts = if output.dry_run {
        None
    } else {
        let paths = ArtifactPaths::new(&output.dir, &output.name);
        write_artifacts(&paths, &outcome.document, &outcome.ledger, &outcome.validation)?;
        Some(paths)
    };
    Ok(RunResult { outcome, artifacts })
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}
