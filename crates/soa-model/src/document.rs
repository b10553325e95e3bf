//! The study design container and the persisted document wrapper.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::de;
use crate::entity::{
    Activity, ActivityGroup, ActivityTimepoint, Encounter, Entity, Epoch, PlannedTimepoint,
    Reference,
};
use crate::kind::EntityKind;
use crate::options::SoaConfig;

/// Owns every entity of one Schedule of Activities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyDesign {
    #[serde(default, deserialize_with = "de::string")]
    pub id: String,
    #[serde(default, deserialize_with = "de::string")]
    pub name: String,
    #[serde(
        default,
        deserialize_with = "de::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub study_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "de::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub study_title: Option<String>,
    #[serde(default)]
    pub epochs: Vec<Epoch>,
    #[serde(default)]
    pub encounters: Vec<Encounter>,
    #[serde(default)]
    pub planned_timepoints: Vec<PlannedTimepoint>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub activity_groups: Vec<ActivityGroup>,
    #[serde(default)]
    pub activity_timepoints: Vec<ActivityTimepoint>,
}

/// A reference together with the entity that holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutgoingReference<'a> {
    pub source: EntityKind,
    pub source_id: &'a str,
    pub reference: Reference<'a>,
}

impl StudyDesign {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Number of entities of a kind.
    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Epoch => self.epochs.len(),
            EntityKind::Encounter => self.encounters.len(),
            EntityKind::PlannedTimepoint => self.planned_timepoints.len(),
            EntityKind::Activity => self.activities.len(),
            EntityKind::ActivityGroup => self.activity_groups.len(),
            EntityKind::ActivityTimepoint => self.activity_timepoints.len(),
        }
    }

    /// IDs of a kind in document order.
    pub fn ids(&self, kind: EntityKind) -> Vec<&str> {
        match kind {
            EntityKind::Epoch => ids_of(&self.epochs),
            EntityKind::Encounter => ids_of(&self.encounters),
            EntityKind::PlannedTimepoint => ids_of(&self.planned_timepoints),
            EntityKind::Activity => ids_of(&self.activities),
            EntityKind::ActivityGroup => ids_of(&self.activity_groups),
            EntityKind::ActivityTimepoint => ids_of(&self.activity_timepoints),
        }
    }

    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.ids(kind).contains(&id)
    }

    /// Whether the design carries any schedule content at all.
    pub fn has_schedule_content(&self) -> bool {
        !self.encounters.is_empty()
            || !self.planned_timepoints.is_empty()
            || !self.activities.is_empty()
    }

    pub fn encounter(&self, id: &str) -> Option<&Encounter> {
        self.encounters.iter().find(|e| e.id == id)
    }

    /// Rename entities of `kind` and every reference that targets them.
    pub fn rename_ids(&mut self, kind: EntityKind, renames: &BTreeMap<String, String>) {
        if renames.is_empty() {
            return;
        }
        match kind {
            EntityKind::Epoch => rename_entities(&mut self.epochs, renames),
            EntityKind::Encounter => rename_entities(&mut self.encounters, renames),
            EntityKind::PlannedTimepoint => rename_entities(&mut self.planned_timepoints, renames),
            EntityKind::Activity => rename_entities(&mut self.activities, renames),
            EntityKind::ActivityGroup => rename_entities(&mut self.activity_groups, renames),
            EntityKind::ActivityTimepoint => {
                rename_entities(&mut self.activity_timepoints, renames);
            }
        }
        self.remap_references(kind, renames);
    }

    /// Rewrite references that target `kind` without touching the entities themselves.
    pub fn remap_references(&mut self, kind: EntityKind, renames: &BTreeMap<String, String>) {
        let mut visit = |target: EntityKind, id: &mut String| {
            if target == kind {
                if let Some(new_id) = renames.get(id.as_str()) {
                    id.clone_from(new_id);
                }
            }
        };
        visit_all(&mut self.encounters, &mut visit);
        visit_all(&mut self.planned_timepoints, &mut visit);
        visit_all(&mut self.activities, &mut visit);
        visit_all(&mut self.activity_timepoints, &mut visit);
    }

    /// Apply `rewrite` to every entity ID and every reference in the graph.
    pub fn rewrite_all_ids(&mut self, rewrite: &dyn Fn(&str) -> String) {
        rewrite_entities(&mut self.epochs, rewrite);
        rewrite_entities(&mut self.encounters, rewrite);
        rewrite_entities(&mut self.planned_timepoints, rewrite);
        rewrite_entities(&mut self.activities, rewrite);
        rewrite_entities(&mut self.activity_groups, rewrite);
        rewrite_entities(&mut self.activity_timepoints, rewrite);
    }

    /// Every populated reference in the graph, in document order.
    pub fn outgoing_references(&self) -> Vec<OutgoingReference<'_>> {
        let mut out = Vec::new();
        collect_references(&self.encounters, &mut out);
        collect_references(&self.planned_timepoints, &mut out);
        collect_references(&self.activities, &mut out);
        collect_references(&self.activity_timepoints, &mut out);
        out
    }
}

fn ids_of<T: Entity>(items: &[T]) -> Vec<&str> {
    items.iter().map(Entity::id).collect()
}

fn rename_entities<T: Entity>(items: &mut [T], renames: &BTreeMap<String, String>) {
    for item in items {
        if let Some(new_id) = renames.get(item.id()) {
            item.id_mut().clone_from(new_id);
        }
    }
}

fn visit_all<T: Entity>(items: &mut [T], visit: &mut dyn FnMut(EntityKind, &mut String)) {
    for item in items {
        item.visit_references_mut(visit);
    }
}

fn rewrite_entities<T: Entity>(items: &mut [T], rewrite: &dyn Fn(&str) -> String) {
    for item in items {
        let new_id = rewrite(item.id());
        *item.id_mut() = new_id;
        item.visit_references_mut(&mut |_, id: &mut String| {
            *id = rewrite(id);
        });
    }
}

fn collect_references<'a, T: Entity>(items: &'a [T], out: &mut Vec<OutgoingReference<'a>>) {
    for item in items {
        for reference in item.references() {
            out.push(OutgoingReference {
                source: T::KIND,
                source_id: item.id(),
                reference,
            });
        }
    }
}

/// The persisted entity-graph document.
///
/// Provenance is never part of this document; it is written as a sibling
/// artifact so schema consumers receive pure data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoaDocument {
    #[serde(default, deserialize_with = "de::string")]
    pub usdm_version: String,
    #[serde(default, deserialize_with = "de::string")]
    pub system_name: String,
    #[serde(default, deserialize_with = "de::string")]
    pub system_version: String,
    pub study_design: StudyDesign,
}

impl SoaDocument {
    /// Wrap a design with the configured version/system metadata.
    pub fn new(config: &SoaConfig, study_design: StudyDesign) -> Self {
        Self {
            usdm_version: config.usdm_version.clone(),
            system_name: config.system_name.clone(),
            system_version: config.system_version.clone(),
            study_design,
        }
    }

    /// Wrapper-level and design-level required fields that are absent.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        for (field, value) in [
            ("usdmVersion", &self.usdm_version),
            ("systemName", &self.system_name),
            ("systemVersion", &self.system_version),
            ("studyDesign.id", &self.study_design.id),
            ("studyDesign.name", &self.study_design.name),
        ] {
            if value.trim().is_empty() {
                missing.push(field);
            }
        }
        missing
    }
}
