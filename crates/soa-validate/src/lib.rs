//! Referential integrity validation for Schedule of Activities graphs.
//!
//! The validator is purely diagnostic: it walks a document, reports every
//! naming, reference, uniqueness and completeness breach with the offending
//! entity, and scores the graph. It never mutates its input.

mod category;
mod checks;
mod issue;
mod report;

use std::collections::BTreeMap;

use soa_model::{SoaDocument, ValidationOptions};
use tracing::{debug, info};

pub use category::Category;
pub use issue::{Issue, Severity};
pub use report::{CategoryResult, Scores, ValidationReport, ValidationViolation};

use checks::{completeness, naming, references, uniqueness};
use report::{Collector, ratio};

/// Validates documents against the configured weights and violation cap.
#[derive(Debug, Clone, Copy)]
pub struct Validator<'a> {
    options: &'a ValidationOptions,
}

impl<'a> Validator<'a> {
    pub fn new(options: &'a ValidationOptions) -> Self {
        Self { options }
    }

    pub fn validate(&self, document: &SoaDocument) -> ValidationReport {
        let design = &document.study_design;

        let naming = naming::check(design);
        let (references, linkage) = references::check(design);
        let uniqueness = uniqueness::check(design);
        let (completeness, coverage) = completeness::check(document);

        let mut collector = Collector::new(self.options.max_violations);
        let mut checked = BTreeMap::new();
        for (category, outcome) in [
            (Category::Naming, &naming),
            (Category::References, &references),
            (Category::Uniqueness, &uniqueness),
            (Category::Completeness, &completeness),
        ] {
            debug!(
                category = category.label(),
                issues = outcome.issues.len(),
                checked = outcome.checked,
                "category checked"
            );
            collector.extend(&outcome.issues);
            checked.insert(category, outcome.checked);
        }

        let scores = Scores {
            weighted_completeness: completeness::weighted_completeness(&coverage, self.options),
            linkage_accuracy: ratio(linkage.resolved, linkage.total),
            references_total: linkage.total,
            references_resolved: linkage.resolved,
            completeness_by_kind: coverage
                .iter()
                .map(|(kind, cov)| (*kind, cov.ratio()))
                .collect(),
        };
        let report = collector.finish(&checked, scores);

        info!(
            passed = report.passed(),
            errors = report.error_count(),
            warnings = report.warning_count(),
            truncated = report.truncated,
            completeness = report.scores.weighted_completeness,
            linkage = report.scores.linkage_accuracy,
            "validation complete"
        );
        report
    }
}

/// Validate a document with the given options.
pub fn validate(document: &SoaDocument, options: &ValidationOptions) -> ValidationReport {
    Validator::new(options).validate(document)
}
