//! Decode, normalize, reconcile and validate.
//!
//! Each stage runs inside its own span. Defects and violations accumulate in
//! the stage reports; only a source that cannot be decoded or normalized, or
//! a reconciliation failure, stops the run.

use anyhow::{Context, Result, bail};
use soa_core::decode::decode_with_layer;
use soa_core::{
    NormalizationReport, NormalizedSource, Normalizer, ProvenanceLedger, ReconciliationEngine,
    ReconciliationReport,
};
use soa_model::{SoaConfig, SoaDocument, SourceTag};
use soa_validate::{ValidationReport, Validator};
use tracing::{info, info_span, warn};

/// How the output document was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// Both sources were merged.
    Reconciled,
    /// Only this source could be used.
    SingleSource(SourceTag),
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub mode: PipelineMode,
    pub document: SoaDocument,
    pub ledger: ProvenanceLedger,
    pub normalization: Vec<(SourceTag, NormalizationReport)>,
    pub reconciliation: Option<ReconciliationReport>,
    pub validation: ValidationReport,
    /// Sources that were dropped, with the reason.
    pub source_errors: Vec<(SourceTag, String)>,
}

impl PipelineOutcome {
    fn single(source: NormalizedSource, config: &SoaConfig) -> Self {
        let validation = validate_document(&source.document, config);
        Self {
            mode: PipelineMode::SingleSource(source.tag),
            document: source.document,
            ledger: source.ledger,
            normalization: vec![(source.tag, source.report)],
            reconciliation: None,
            validation,
            source_errors: Vec::new(),
        }
    }
}

/// Decode and normalize one raw model response.
pub fn prepare_source(raw: &str, tag: SourceTag, config: &SoaConfig) -> Result<NormalizedSource> {
    let decoded = {
        let _span = info_span!("decode", source = %tag).entered();
        let decoded = decode_with_layer(raw).with_context(|| format!("decode {tag} response"))?;
        info!(layer = %decoded.layer, "response decoded");
        decoded
    };

    let _span = info_span!("normalize", source = %tag).entered();
    let source = Normalizer::new(config)
        .normalize(&decoded.value, tag)
        .with_context(|| format!("normalize {tag} extraction"))?;
    let report = &source.report;
    info!(
        encounters = source.document.study_design.encounters.len(),
        activities = source.document.study_design.activities.len(),
        defaults = report.defaults.len(),
        timing_extractions = report.timing_extractions.len(),
        id_rewrites = report.id_rewrites.len(),
        defects = report.defects.len(),
        "extraction normalized"
    );
    Ok(source)
}

/// Run one source through normalization and validation.
pub fn run_single_source(raw: &str, tag: SourceTag, config: &SoaConfig) -> Result<PipelineOutcome> {
    let source = prepare_source(raw, tag, config)?;
    Ok(PipelineOutcome::single(source, config))
}

/// Run both sources through the full pipeline.
///
/// When exactly one source fails to decode or normalize, the other is
/// validated on its own and the failure is kept in `source_errors`.
pub fn run_reconcile(text_raw: &str, vision_raw: &str, config: &SoaConfig) -> Result<PipelineOutcome> {
    let text = prepare_source(text_raw, SourceTag::Text, config);
    let vision = prepare_source(vision_raw, SourceTag::Vision, config);

    let (text, vision) = match (text, vision) {
        (Ok(text), Ok(vision)) => (text, vision),
        (Ok(source), Err(error)) | (Err(error), Ok(source)) => {
            let failed = source.tag.counterpart();
            let reason = format!("{error:#}");
            warn!(
                failed = %failed,
                reason = %reason,
                "source unusable, continuing with {} only",
                source.tag
            );
            let mut outcome = PipelineOutcome::single(source, config);
            outcome.source_errors.push((failed, reason));
            return Ok(outcome);
        }
        (Err(text_error), Err(vision_error)) => {
            bail!("both sources failed: text: {text_error:#}; vision: {vision_error:#}")
        }
    };

    let reconciled = {
        let _span = info_span!("reconcile").entered();
        ReconciliationEngine::new(config)
            .reconcile(&text, &vision)
            .context("reconcile text and vision extractions")?
    };

    let validation = validate_document(&reconciled.document, config);
    Ok(PipelineOutcome {
        mode: PipelineMode::Reconciled,
        document: reconciled.document,
        ledger: reconciled.ledger,
        normalization: vec![(text.tag, text.report), (vision.tag, vision.report)],
        reconciliation: Some(reconciled.report),
        validation,
        source_errors: Vec::new(),
    })
}

/// Validate a document with the configured options.
pub fn validate_document(document: &SoaDocument, config: &SoaConfig) -> ValidationReport {
    let _span = info_span!("validate").entered();
    Validator::new(&config.validation).validate(document)
}
