//! Fill required fields the extraction left empty.

use soa_model::{Entity, EntityKind, Epoch, SoaConfig, SoaDocument};

use super::report::{DefaultScope, NormalizationReport};
use super::unscheduled::is_unscheduled;

pub(crate) fn apply(document: &mut SoaDocument, config: &SoaConfig, report: &mut NormalizationReport) {
    let defaults = &config.defaults;

    for (field, slot, value) in [
        ("usdmVersion", &mut document.usdm_version, &config.usdm_version),
        ("systemName", &mut document.system_name, &config.system_name),
        ("systemVersion", &mut document.system_version, &config.system_version),
    ] {
        if slot.is_empty() {
            slot.clone_from(value);
            report.record_default(DefaultScope::Document, "", field, value);
        }
    }

    let design = &mut document.study_design;
    if design.id.is_empty() {
        design.id.clone_from(&defaults.design_id);
        report.record_default(DefaultScope::StudyDesign, "", "id", &defaults.design_id);
    }
    if design.name.is_empty() {
        design.name.clone_from(&defaults.design_name);
        report.record_default(DefaultScope::StudyDesign, "", "name", &defaults.design_name);
    }

    if design.epochs.is_empty() {
        design.epochs.push(Epoch {
            id: defaults.epoch_id.clone(),
            name: defaults.epoch_name.clone(),
            position: Some(1),
            description: None,
        });
        report.record_default(
            DefaultScope::Entity(EntityKind::Epoch),
            &defaults.epoch_id,
            "name",
            &defaults.epoch_name,
        );
        for encounter in design.encounters.iter_mut().filter(|e| e.epoch_id.is_none()) {
            encounter.epoch_id = Some(defaults.epoch_id.clone());
            report.record_default(
                DefaultScope::Entity(EntityKind::Encounter),
                &encounter.id,
                "epochId",
                &defaults.epoch_id,
            );
        }
    }

    let mut next_position = design.epochs.iter().filter_map(|e| e.position).max().unwrap_or(0);
    for epoch in &mut design.epochs {
        fill_name(epoch, report);
        if epoch.position.is_none() {
            next_position += 1;
            epoch.position = Some(next_position);
            report.record_default(
                DefaultScope::Entity(EntityKind::Epoch),
                &epoch.id,
                "position",
                &next_position.to_string(),
            );
        }
    }

    for encounter in &mut design.encounters {
        if encounter.name.is_empty() {
            encounter.name = placeholder_name(&*encounter);
            report.record_default(
                DefaultScope::Entity(EntityKind::Encounter),
                &encounter.id,
                "name",
                &encounter.name,
            );
        }
        // Unscheduled visits get their own type later.
        if encounter.encounter_type.is_empty() && !is_unscheduled(encounter) {
            encounter.encounter_type.clone_from(&defaults.encounter_type);
            report.record_default(
                DefaultScope::Entity(EntityKind::Encounter),
                &encounter.id,
                "type",
                &defaults.encounter_type,
            );
        }
    }

    let scope = DefaultScope::Entity(EntityKind::PlannedTimepoint);
    for timepoint in &mut design.planned_timepoints {
        if timepoint.name.is_empty() {
            timepoint.name = placeholder_name(&*timepoint);
            report.record_default(scope, &timepoint.id, "name", &timepoint.name);
        }
        for (field, slot, value) in [
            ("instanceType", &mut timepoint.instance_type, &defaults.timepoint_instance_type),
            ("value", &mut timepoint.value, &defaults.not_specified),
            ("valueLabel", &mut timepoint.value_label, &defaults.not_specified),
            ("type", &mut timepoint.timing_type, &defaults.timepoint_type),
            ("relativeToFrom", &mut timepoint.relative_to_from, &defaults.relative_to_from),
            ("windowLabel", &mut timepoint.window_label, &defaults.not_specified),
        ] {
            if slot.is_empty() {
                slot.clone_from(value);
                report.record_default(scope, &timepoint.id, field, value);
            }
        }
    }

    for activity in &mut design.activities {
        fill_name(activity, report);
    }
    for group in &mut design.activity_groups {
        fill_name(group, report);
    }
}

fn placeholder_name<T: Entity>(entity: &T) -> String {
    format!("{} {}", T::KIND.label(), entity.id())
}

fn fill_name<T: Entity + NameSlot>(entity: &mut T, report: &mut NormalizationReport) {
    if entity.name().is_empty() {
        let name = placeholder_name(&*entity);
        report.record_default(DefaultScope::Entity(T::KIND), entity.id(), "name", &name);
        *entity.name_slot() = name;
    }
}

/// Entities whose name can be backfilled generically.
trait NameSlot {
    fn name_slot(&mut self) -> &mut String;
}

macro_rules! impl_name_slot {
    ($($ty:ty),+) => {
        $(impl NameSlot for $ty {
            fn name_slot(&mut self) -> &mut String {
                &mut self.name
            }
        })+
    };
}

impl_name_slot!(
    soa_model::Epoch,
    soa_model::Activity,
    soa_model::ActivityGroup
);
