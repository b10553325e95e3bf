//! Validation report and the violation collector that feeds it.

use std::collections::BTreeMap;

use serde::Serialize;

use soa_model::EntityKind;

use crate::category::Category;
use crate::issue::{Issue, Severity};

/// A serialized invariant breach.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationViolation {
    pub rule_id: &'static str,
    pub category: Category,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_kind: Option<EntityKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
    pub message: String,
}

impl From<&Issue> for ValidationViolation {
    fn from(issue: &Issue) -> Self {
        Self {
            rule_id: issue.rule_id(),
            category: issue.category(),
            severity: issue.severity(),
            entity_kind: issue.entity_kind(),
            entity_id: issue.entity_id().map(str::to_string),
            field: issue.field(),
            message: issue.message(),
        }
    }
}

/// Outcome of one invariant category.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResult {
    pub category: Category,
    pub passed: bool,
    pub errors: usize,
    pub warnings: usize,
    /// Items inspected by the category's checks.
    pub checked: usize,
    /// Share of inspected items without a violation, 1.0 when nothing was inspected.
    pub score: f64,
}

/// Graph-wide quality scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scores {
    /// Required-field completeness weighted per entity kind.
    pub weighted_completeness: f64,
    /// Resolved references over total references.
    pub linkage_accuracy: f64,
    pub references_total: usize,
    pub references_resolved: usize,
    /// Per-kind share of required fields populated.
    pub completeness_by_kind: BTreeMap<EntityKind, f64>,
}

/// Full validation result for one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub categories: Vec<CategoryResult>,
    pub scores: Scores,
    pub violations: Vec<ValidationViolation>,
    /// Violations stopped being collected at the configured cap.
    pub truncated: bool,
}

impl ValidationReport {
    /// True when every category passes.
    pub fn passed(&self) -> bool {
        self.categories.iter().all(|c| c.passed)
    }

    pub fn category(&self, category: Category) -> Option<&CategoryResult> {
        self.categories.iter().find(|c| c.category == category)
    }

    pub fn violations_in(&self, category: Category) -> impl Iterator<Item = &ValidationViolation> {
        self.violations
            .iter()
            .filter(move |v| v.category == category)
    }

    pub fn violations_for_rule<'a>(
        &'a self,
        rule_id: &'a str,
    ) -> impl Iterator<Item = &'a ValidationViolation> {
        self.violations.iter().filter(move |v| v.rule_id == rule_id)
    }

    pub fn error_count(&self) -> usize {
        self.categories.iter().map(|c| c.errors).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.categories.iter().map(|c| c.warnings).sum()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    errors: usize,
    warnings: usize,
}

/// Accumulates issues up to an optional cap.
///
/// Counts per category always cover every issue pushed; only the stored
/// violations stop at the cap.
#[derive(Debug)]
pub(crate) struct Collector {
    max: Option<usize>,
    violations: Vec<ValidationViolation>,
    tallies: BTreeMap<Category, Tally>,
    truncated: bool,
}

impl Collector {
    pub(crate) fn new(max: Option<usize>) -> Self {
        Self {
            max,
            violations: Vec::new(),
            tallies: BTreeMap::new(),
            truncated: false,
        }
    }

    pub(crate) fn push(&mut self, issue: &Issue) {
        let tally = self.tallies.entry(issue.category()).or_default();
        match issue.severity() {
            Severity::Error => tally.errors += 1,
            Severity::Warning => tally.warnings += 1,
        }
        if self.max.is_some_and(|max| self.violations.len() >= max) {
            self.truncated = true;
            return;
        }
        self.violations.push(ValidationViolation::from(issue));
    }

    pub(crate) fn extend(&mut self, issues: &[Issue]) {
        for issue in issues {
            self.push(issue);
        }
    }

    /// Violating items per category, used for the category score.
    fn violating(&self, category: Category) -> usize {
        self.tallies
            .get(&category)
            .map_or(0, |t| t.errors + t.warnings)
    }

    pub(crate) fn finish(
        self,
        checked: &BTreeMap<Category, usize>,
        scores: Scores,
    ) -> ValidationReport {
        let categories = Category::all()
            .iter()
            .map(|&category| {
                let tally = self.tallies.get(&category).copied().unwrap_or_default();
                let checked = checked.get(&category).copied().unwrap_or(0);
                CategoryResult {
                    category,
                    passed: tally.errors == 0,
                    errors: tally.errors,
                    warnings: tally.warnings,
                    checked,
                    score: ratio(checked.saturating_sub(self.violating(category)), checked),
                }
            })
            .collect();
        ValidationReport {
            categories,
            scores,
            violations: self.violations,
            truncated: self.truncated,
        }
    }
}

/// `part / whole`, 1.0 when `whole` is zero.
pub(crate) fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        1.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing(id: &str) -> Issue {
        Issue::MissingRequiredField {
            kind: EntityKind::Activity,
            id: id.to_string(),
            field: "name",
        }
    }

    fn empty_scores() -> Scores {
        Scores {
            weighted_completeness: 1.0,
            linkage_accuracy: 1.0,
            references_total: 0,
            references_resolved: 0,
            completeness_by_kind: BTreeMap::new(),
        }
    }

    #[test]
    fn cap_truncates_stored_violations_but_keeps_counts() {
        let mut collector = Collector::new(Some(2));
        collector.extend(&[missing("a"), missing("b"), missing("c")]);
        let checked = BTreeMap::from([(Category::Completeness, 6)]);
        let report = collector.finish(&checked, empty_scores());
        assert!(report.truncated);
        assert_eq!(report.violations.len(), 2);
        let completeness = report.category(Category::Completeness).expect("category");
        assert_eq!(completeness.errors, 3);
        assert!(!completeness.passed);
        assert!((completeness.score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn warnings_do_not_fail_a_category() {
        let mut collector = Collector::new(None);
        collector.push(&Issue::DuplicateEpochPosition {
            id: "epoch_2".to_string(),
            first_id: "epoch_1".to_string(),
            position: 1,
        });
        let report = collector.finish(&BTreeMap::new(), empty_scores());
        assert!(report.passed());
        assert_eq!(report.warning_count(), 1);
        assert!(!report.truncated);
    }
}
