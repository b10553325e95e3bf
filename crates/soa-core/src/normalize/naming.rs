//! Move timing tokens out of encounter and timepoint names.

use std::collections::BTreeMap;

use soa_model::{EntityKind, StudyDesign};

use super::report::{DefaultScope, NormalizationReport, TimingExtraction};
use crate::timing::split_timing;

/// Strip timing tokens from names.
///
/// The token goes to `Encounter.timing` / `PlannedTimepoint.description`
/// only when that field is empty. A name that was nothing but timing falls
/// back to `Visit <n>` for encounters and to the linked encounter's name (or
/// `Timepoint <n>`) for timepoints.
pub(crate) fn apply(design: &mut StudyDesign, report: &mut NormalizationReport) {
    for (index, encounter) in design.encounters.iter_mut().enumerate() {
        let Some(split) = split_timing(&encounter.name) else {
            continue;
        };
        let token = split.timing();
        let field_written = encounter.timing.is_none();
        if field_written {
            encounter.timing = Some(token.clone());
        }
        let original_name = std::mem::take(&mut encounter.name);
        encounter.name = if split.has_remainder() {
            split.remainder
        } else {
            let fallback = format!("Visit {}", index + 1);
            report.record_default(
                DefaultScope::Entity(EntityKind::Encounter),
                &encounter.id,
                "name",
                &fallback,
            );
            fallback
        };
        report.timing_extractions.push(TimingExtraction {
            kind: EntityKind::Encounter,
            entity_id: encounter.id.clone(),
            original_name,
            name: encounter.name.clone(),
            token,
            field_written,
        });
    }

    let encounter_names: BTreeMap<&str, &str> = design
        .encounters
        .iter()
        .map(|encounter| (encounter.id.as_str(), encounter.name.as_str()))
        .collect();

    for (index, timepoint) in design.planned_timepoints.iter_mut().enumerate() {
        let Some(split) = split_timing(&timepoint.name) else {
            continue;
        };
        let token = split.timing();
        let field_written = timepoint.description.is_none();
        if field_written {
            timepoint.description = Some(token.clone());
        }
        let original_name = std::mem::take(&mut timepoint.name);
        timepoint.name = if split.has_remainder() {
            split.remainder
        } else {
            let fallback = timepoint
                .encounter_id
                .as_deref()
                .and_then(|id| encounter_names.get(id))
                .map_or_else(|| format!("Timepoint {}", index + 1), |name| (*name).to_string());
            report.record_default(
                DefaultScope::Entity(EntityKind::PlannedTimepoint),
                &timepoint.id,
                "name",
                &fallback,
            );
            fallback
        };
        report.timing_extractions.push(TimingExtraction {
            kind: EntityKind::PlannedTimepoint,
            entity_id: timepoint.id.clone(),
            original_name,
            name: timepoint.name.clone(),
            token,
            field_written,
        });
    }
}
