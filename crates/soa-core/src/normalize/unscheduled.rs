//! Detection and flagging of unscheduled visits.

use std::sync::LazyLock;

use regex::Regex;
use soa_model::{Encounter, EntityKind, SoaConfig, StudyDesign};

use super::report::{DefaultScope, NormalizationReport};

static UNSCHEDULED_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:unscheduled|unplanned|ad[\s-]?hoc|as[\s-]needed|prn|uns)\b")
        .expect("Invalid unscheduled regex")
});

/// Whether an encounter is (or looks like) an unscheduled visit.
pub fn is_unscheduled(encounter: &Encounter) -> bool {
    encounter.unscheduled
        || UNSCHEDULED_LABEL.is_match(&encounter.name)
        || UNSCHEDULED_LABEL.is_match(&encounter.encounter_type)
}

/// Flag unscheduled encounters and give them their sentinel type and timing.
pub(crate) fn apply(design: &mut StudyDesign, config: &SoaConfig, report: &mut NormalizationReport) {
    let defaults = &config.defaults;
    let scope = DefaultScope::Entity(EntityKind::Encounter);
    for encounter in &mut design.encounters {
        if !is_unscheduled(encounter) {
            continue;
        }
        if !encounter.unscheduled {
            encounter.unscheduled = true;
            report.record_default(scope, &encounter.id, "unscheduled", "true");
        }
        if encounter.encounter_type.is_empty() {
            encounter.encounter_type.clone_from(&defaults.unscheduled_type);
            report.record_default(scope, &encounter.id, "type", &defaults.unscheduled_type);
        }
        if encounter.timing.is_none() {
            encounter.timing = Some(defaults.unscheduled_timing.clone());
            report.record_default(scope, &encounter.id, "timing", &defaults.unscheduled_timing);
        }
    }
}
