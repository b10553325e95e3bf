//! Required-field presence per entity type and for the document wrapper.

use std::collections::BTreeMap;

use soa_model::{Entity, EntityKind, SoaDocument, ValidationOptions};

use super::CheckOutcome;
use crate::issue::Issue;
use crate::report::ratio;

/// Required fields populated out of required fields expected.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FieldCoverage {
    pub populated: usize,
    pub required: usize,
}

impl FieldCoverage {
    pub fn ratio(&self) -> f64 {
        ratio(self.populated, self.required)
    }
}

pub(crate) fn check(document: &SoaDocument) -> (CheckOutcome, BTreeMap<EntityKind, FieldCoverage>) {
    let design = &document.study_design;
    let mut outcome = CheckOutcome::default();
    let mut coverage = BTreeMap::new();

    for field in document.missing_required() {
        outcome.issues.push(Issue::MissingDocumentField { field });
    }
    outcome.checked += 5;

    scan(&design.epochs, &mut outcome, &mut coverage);
    scan(&design.encounters, &mut outcome, &mut coverage);
    scan(&design.planned_timepoints, &mut outcome, &mut coverage);
    scan(&design.activities, &mut outcome, &mut coverage);
    scan(&design.activity_groups, &mut outcome, &mut coverage);
    scan(&design.activity_timepoints, &mut outcome, &mut coverage);

    (outcome, coverage)
}

fn scan<T: Entity>(
    items: &[T],
    outcome: &mut CheckOutcome,
    coverage: &mut BTreeMap<EntityKind, FieldCoverage>,
) {
    if items.is_empty() {
        return;
    }
    let entry = coverage.entry(T::KIND).or_default();
    for item in items {
        let missing = item.missing_required();
        entry.required += T::required_count();
        entry.populated += T::required_count() - missing.len();
        outcome.checked += T::required_count();
        for field in missing {
            outcome.issues.push(Issue::MissingRequiredField {
                kind: T::KIND,
                id: item.id().to_string(),
                field,
            });
        }
    }
}

/// Completeness averaged over kinds present in the graph, weighted per kind.
pub(crate) fn weighted_completeness(
    coverage: &BTreeMap<EntityKind, FieldCoverage>,
    options: &ValidationOptions,
) -> f64 {
    let (weighted, total_weight) = coverage.iter().fold((0.0, 0.0), |(sum, weights), (kind, cov)| {
        let weight = options.weight(*kind);
        (sum + weight * cov.ratio(), weights + weight)
    });
    if total_weight > 0.0 {
        weighted / total_weight
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use soa_model::{Activity, PlannedTimepoint, SoaConfig, StudyDesign};

    use super::*;

    #[test]
    fn weights_favour_activities_over_groups() {
        let mut coverage = BTreeMap::new();
        coverage.insert(
            EntityKind::Activity,
            FieldCoverage {
                populated: 2,
                required: 2,
            },
        );
        coverage.insert(
            EntityKind::ActivityGroup,
            FieldCoverage {
                populated: 0,
                required: 2,
            },
        );
        let options = ValidationOptions::default();
        let score = weighted_completeness(&coverage, &options);
        assert!((score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn missing_fields_name_the_entity() {
        let config = SoaConfig::default();
        let mut design = StudyDesign::new("sd_1", "Main");
        design.activities.push(Activity {
            id: "act_1".to_string(),
            ..Activity::default()
        });
        design.planned_timepoints.push(PlannedTimepoint {
            id: "tp_1".to_string(),
            name: "Day 1".to_string(),
            ..PlannedTimepoint::default()
        });
        let document = SoaDocument::new(&config, design);

        let (outcome, coverage) = check(&document);
        assert!(outcome.issues.contains(&Issue::MissingRequiredField {
            kind: EntityKind::Activity,
            id: "act_1".to_string(),
            field: "name",
        }));
        assert_eq!(
            coverage[&EntityKind::PlannedTimepoint],
            FieldCoverage {
                populated: 2,
                required: 8
            }
        );
        assert!(
            !outcome
                .issues
                .iter()
                .any(|issue| matches!(issue, Issue::MissingDocumentField { .. }))
        );
    }
}
