//! Per-source normalization of a decoded extraction.
//!
//! Steps run in a fixed order, each applied to the output of the previous:
//!
//! 1. Backfill required fields (synthetic epoch, timepoint defaults).
//! 2. Move timing tokens out of encounter/timepoint names.
//! 3. Standardize ID separators.
//! 4. Align numeric ID suffixes within each prefix.
//! 5. Collapse duplicate terminal timepoints and duplicate ticks.
//! 6. Flag unscheduled encounters.
//!
//! Normalizing an already-normalized document yields the same document.

mod backfill;
mod build;
mod ids;
mod naming;
mod report;
mod unscheduled;

use serde_json::Value;
use soa_model::{SoaConfig, SoaDocument, SourceTag};
use thiserror::Error;
use tracing::{debug, info};

pub use ids::{scheme_renames, standardize_separators};
pub use report::{
    AppliedDefault, DefaultScope, DefectReason, IdRewrite, NormalizationDefect,
    NormalizationReport, RewriteReason, TimingExtraction,
};
pub use unscheduled::is_unscheduled;

use crate::dedupe::collapse_duplicates;
use crate::provenance::ProvenanceLedger;

/// The extraction as a whole could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("{tag} extraction is not a JSON object")]
    NotAnObject { tag: SourceTag },
    #[error("{tag} extraction has no study design or entity collections")]
    NoStudyDesign { tag: SourceTag },
}

/// A normalized single-source graph with its ledger and audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSource {
    pub tag: SourceTag,
    pub document: SoaDocument,
    pub ledger: ProvenanceLedger,
    pub report: NormalizationReport,
}

/// Runs the normalization steps with a given configuration.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    config: &'a SoaConfig,
}

impl<'a> Normalizer<'a> {
    pub fn new(config: &'a SoaConfig) -> Self {
        Self { config }
    }

    /// Normalize a decoded extraction.
    pub fn normalize(&self, raw: &Value, tag: SourceTag) -> Result<NormalizedSource, NormalizeError> {
        let mut report = NormalizationReport::default();
        let document = build::build_document(raw, tag, &mut report)?;
        Ok(self.finish(document, tag, report))
    }

    /// Normalize an already-typed document.
    pub fn normalize_document(&self, document: SoaDocument, tag: SourceTag) -> NormalizedSource {
        self.finish(document, tag, NormalizationReport::default())
    }

    fn finish(
        &self,
        mut document: SoaDocument,
        tag: SourceTag,
        mut report: NormalizationReport,
    ) -> NormalizedSource {
        backfill::apply(&mut document, self.config, &mut report);

        let design = &mut document.study_design;
        naming::apply(design, &mut report);
        ids::apply_separators(design, &mut report);
        ids::apply_number_scheme(design, &mut report);
        ids::drop_duplicate_ids(design, &mut report);

        let collapse = collapse_duplicates(design);
        report.redirects = collapse.redirects;
        report.dropped_ticks = collapse.dropped_ticks;

        unscheduled::apply(design, self.config, &mut report);

        let mut ledger = ProvenanceLedger::for_design(design, tag);
        for redirect in &report.redirects {
            ledger.record(redirect.kind, redirect.dropped.clone(), tag);
            ledger.redirect(redirect.kind, &redirect.dropped, &redirect.survivor);
        }

        debug!(
            %tag,
            defaults = report.defaults.len(),
            timing = report.timing_extractions.len(),
            rewrites = report.id_rewrites.len(),
            redirects = report.redirects.len(),
            "normalization steps applied"
        );
        info!(
            %tag,
            epochs = design.epochs.len(),
            encounters = design.encounters.len(),
            timepoints = design.planned_timepoints.len(),
            activities = design.activities.len(),
            ticks = design.activity_timepoints.len(),
            defects = report.defects.len(),
            "normalized extraction"
        );

        NormalizedSource {
            tag,
            document,
            ledger,
            report,
        }
    }
}
