//! Entity types of the Schedule of Activities graph.
//!
//! Required string fields are plain `String`s; an empty string means the
//! value is absent. Optional fields are `Option`s. Every entity implements
//! [`Entity`], which is the single definition of identity, references and
//! required-field completeness shared by normalization, reconciliation and
//! validation.

use serde::{Deserialize, Serialize};

use crate::de;
use crate::kind::EntityKind;

/// An outgoing foreign-key-like reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference<'a> {
    /// Serialized field name (e.g. `encounterId`).
    pub field: &'static str,
    /// Kind of the referenced entity.
    pub target: EntityKind,
    /// Referenced ID.
    pub id: &'a str,
}

/// Common behaviour of all graph entities.
pub trait Entity {
    const KIND: EntityKind;

    fn id(&self) -> &str;

    fn id_mut(&mut self) -> &mut String;

    fn name(&self) -> &str;

    /// Outgoing references that are populated.
    fn references(&self) -> Vec<Reference<'_>>;

    /// Visit every populated reference mutably with its target kind.
    fn visit_references_mut(&mut self, visit: &mut dyn FnMut(EntityKind, &mut String));

    /// Serialized names of required fields that are absent.
    fn missing_required(&self) -> Vec<&'static str>;

    /// Number of required fields for this entity type.
    fn required_count() -> usize;
}

fn missing(checks: &[(&'static str, bool)]) -> Vec<&'static str> {
    checks
        .iter()
        .filter(|(_, present)| !present)
        .map(|(field, _)| *field)
        .collect()
}

fn filled(value: &str) -> bool {
    !value.trim().is_empty()
}

fn visit_optional(
    value: &mut Option<String>,
    target: EntityKind,
    visit: &mut dyn FnMut(EntityKind, &mut String),
) {
    if let Some(id) = value.as_mut() {
        visit(target, id);
    }
}

/// A named study phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Epoch {
    #[serde(deserialize_with = "de::string")]
    pub id: String,
    #[serde(default, deserialize_with = "de::string")]
    pub name: String,
    /// 1-based ordinal within the study.
    #[serde(
        default,
        deserialize_with = "de::opt_u32",
        alias = "order",
        alias = "sequence",
        skip_serializing_if = "Option::is_none"
    )]
    pub position: Option<u32>,
    #[serde(
        default,
        deserialize_with = "de::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
}

impl Entity for Epoch {
    const KIND: EntityKind = EntityKind::Epoch;

    fn id(&self) -> &str {
        &self.id
    }

    fn id_mut(&mut self) -> &mut String {
        &mut self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn references(&self) -> Vec<Reference<'_>> {
        Vec::new()
    }

    fn visit_references_mut(&mut self, _visit: &mut dyn FnMut(EntityKind, &mut String)) {}

    fn missing_required(&self) -> Vec<&'static str> {
        missing(&[
            ("id", filled(&self.id)),
            ("name", filled(&self.name)),
            ("position", self.position.is_some()),
        ])
    }

    fn required_count() -> usize {
        3
    }
}

/// A study visit or visit window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Encounter {
    #[serde(deserialize_with = "de::string")]
    pub id: String,
    #[serde(default, deserialize_with = "de::string")]
    pub name: String,
    /// Visit classification (e.g. `Visit`, `Unscheduled Visit`).
    #[serde(rename = "type", default, deserialize_with = "de::string")]
    pub encounter_type: String,
    /// Timing window label (e.g. `Week -2`).
    #[serde(
        default,
        deserialize_with = "de::opt_string",
        alias = "window",
        alias = "windowLabel",
        alias = "timingWindow",
        skip_serializing_if = "Option::is_none"
    )]
    pub timing: Option<String>,
    #[serde(
        default,
        deserialize_with = "de::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub epoch_id: Option<String>,
    /// Set for unscheduled/ad-hoc visits without a fixed timepoint.
    #[serde(
        default,
        deserialize_with = "de::flag",
        alias = "isUnscheduled",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub unscheduled: bool,
    #[serde(
        default,
        deserialize_with = "de::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
}

impl Entity for Encounter {
    const KIND: EntityKind = EntityKind::Encounter;

    fn id(&self) -> &str {
        &self.id
    }

    fn id_mut(&mut self) -> &mut String {
        &mut self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn references(&self) -> Vec<Reference<'_>> {
        self.epoch_id
            .as_deref()
            .map(|id| Reference {
                field: "epochId",
                target: EntityKind::Epoch,
                id,
            })
            .into_iter()
            .collect()
    }

    fn visit_references_mut(&mut self, visit: &mut dyn FnMut(EntityKind, &mut String)) {
        visit_optional(&mut self.epoch_id, EntityKind::Epoch, visit);
    }

    fn missing_required(&self) -> Vec<&'static str> {
        missing(&[
            ("id", filled(&self.id)),
            ("name", filled(&self.name)),
            ("type", filled(&self.encounter_type)),
        ])
    }

    fn required_count() -> usize {
        3
    }
}

/// A scheduled point or window in the study timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedTimepoint {
    #[serde(deserialize_with = "de::string")]
    pub id: String,
    #[serde(default, deserialize_with = "de::string")]
    pub name: String,
    #[serde(default, deserialize_with = "de::string")]
    pub instance_type: String,
    /// Offset value relative to the reference point.
    #[serde(default, deserialize_with = "de::string")]
    pub value: String,
    #[serde(default, deserialize_with = "de::string")]
    pub value_label: String,
    /// Timing type (e.g. `Fixed Reference`, `After`, `Before`).
    #[serde(rename = "type", default, deserialize_with = "de::string")]
    pub timing_type: String,
    #[serde(default, deserialize_with = "de::string")]
    pub relative_to_from: String,
    #[serde(default, deserialize_with = "de::string")]
    pub window_label: String,
    #[serde(
        default,
        deserialize_with = "de::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "de::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub encounter_id: Option<String>,
}

impl Entity for PlannedTimepoint {
    const KIND: EntityKind = EntityKind::PlannedTimepoint;

    fn id(&self) -> &str {
        &self.id
    }

    fn id_mut(&mut self) -> &mut String {
        &mut self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn references(&self) -> Vec<Reference<'_>> {
        self.encounter_id
            .as_deref()
            .map(|id| Reference {
                field: "encounterId",
                target: EntityKind::Encounter,
                id,
            })
            .into_iter()
            .collect()
    }

    fn visit_references_mut(&mut self, visit: &mut dyn FnMut(EntityKind, &mut String)) {
        visit_optional(&mut self.encounter_id, EntityKind::Encounter, visit);
    }

    fn missing_required(&self) -> Vec<&'static str> {
        missing(&[
            ("id", filled(&self.id)),
            ("name", filled(&self.name)),
            ("instanceType", filled(&self.instance_type)),
            ("value", filled(&self.value)),
            ("valueLabel", filled(&self.value_label)),
            ("type", filled(&self.timing_type)),
            ("relativeToFrom", filled(&self.relative_to_from)),
            ("windowLabel", filled(&self.window_label)),
        ])
    }

    fn required_count() -> usize {
        8
    }
}

/// A procedure or task performed during the study.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(deserialize_with = "de::string")]
    pub id: String,
    #[serde(default, deserialize_with = "de::string")]
    pub name: String,
    #[serde(
        default,
        deserialize_with = "de::opt_string",
        alias = "groupId",
        skip_serializing_if = "Option::is_none"
    )]
    pub activity_group_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "de::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
}

impl Entity for Activity {
    const KIND: EntityKind = EntityKind::Activity;

    fn id(&self) -> &str {
        &self.id
    }

    fn id_mut(&mut self) -> &mut String {
        &mut self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn references(&self) -> Vec<Reference<'_>> {
        self.activity_group_id
            .as_deref()
            .map(|id| Reference {
                field: "activityGroupId",
                target: EntityKind::ActivityGroup,
                id,
            })
            .into_iter()
            .collect()
    }

    fn visit_references_mut(&mut self, visit: &mut dyn FnMut(EntityKind, &mut String)) {
        visit_optional(&mut self.activity_group_id, EntityKind::ActivityGroup, visit);
    }

    fn missing_required(&self) -> Vec<&'static str> {
        missing(&[("id", filled(&self.id)), ("name", filled(&self.name))])
    }

    fn required_count() -> usize {
        2
    }
}

/// Optional row grouping of activities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityGroup {
    #[serde(deserialize_with = "de::string")]
    pub id: String,
    #[serde(default, deserialize_with = "de::string")]
    pub name: String,
    #[serde(
        default,
        deserialize_with = "de::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
}

impl Entity for ActivityGroup {
    const KIND: EntityKind = EntityKind::ActivityGroup;

    fn id(&self) -> &str {
        &self.id
    }

    fn id_mut(&mut self) -> &mut String {
        &mut self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn references(&self) -> Vec<Reference<'_>> {
        Vec::new()
    }

    fn visit_references_mut(&mut self, _visit: &mut dyn FnMut(EntityKind, &mut String)) {}

    fn missing_required(&self) -> Vec<&'static str> {
        missing(&[("id", filled(&self.id)), ("name", filled(&self.name))])
    }

    fn required_count() -> usize {
        2
    }
}

/// Assertion that an activity occurs at a planned timepoint (one SoA tick).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTimepoint {
    #[serde(deserialize_with = "de::string")]
    pub id: String,
    #[serde(default, deserialize_with = "de::string")]
    pub activity_id: String,
    #[serde(default, deserialize_with = "de::string", alias = "timepointId")]
    pub planned_timepoint_id: String,
}

impl ActivityTimepoint {
    /// The matrix cell this tick occupies.
    pub fn cell(&self) -> CellKey {
        CellKey::new(&self.activity_id, &self.planned_timepoint_id)
    }
}

impl Entity for ActivityTimepoint {
    const KIND: EntityKind = EntityKind::ActivityTimepoint;

    fn id(&self) -> &str {
        &self.id
    }

    fn id_mut(&mut self) -> &mut String {
        &mut self.id
    }

    /// Ticks have no name of their own.
    fn name(&self) -> &str {
        ""
    }

    fn references(&self) -> Vec<Reference<'_>> {
        let mut refs = Vec::with_capacity(2);
        if filled(&self.activity_id) {
            refs.push(Reference {
                field: "activityId",
                target: EntityKind::Activity,
                id: &self.activity_id,
            });
        }
        if filled(&self.planned_timepoint_id) {
            refs.push(Reference {
                field: "plannedTimepointId",
                target: EntityKind::PlannedTimepoint,
                id: &self.planned_timepoint_id,
            });
        }
        refs
    }

    fn visit_references_mut(&mut self, visit: &mut dyn FnMut(EntityKind, &mut String)) {
        visit(EntityKind::Activity, &mut self.activity_id);
        visit(EntityKind::PlannedTimepoint, &mut self.planned_timepoint_id);
    }

    fn missing_required(&self) -> Vec<&'static str> {
        missing(&[
            ("id", filled(&self.id)),
            ("activityId", filled(&self.activity_id)),
            ("plannedTimepointId", filled(&self.planned_timepoint_id)),
        ])
    }

    fn required_count() -> usize {
        3
    }
}

/// Key of one activity × timepoint cell, rendered as `activityId|plannedTimepointId`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    pub activity_id: String,
    pub planned_timepoint_id: String,
}

impl CellKey {
    pub const SEPARATOR: char = '|';

    pub fn new(activity_id: impl Into<String>, planned_timepoint_id: impl Into<String>) -> Self {
        Self {
            activity_id: activity_id.into(),
            planned_timepoint_id: planned_timepoint_id.into(),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let (activity, timepoint) = value.split_once(Self::SEPARATOR)?;
        if activity.is_empty() || timepoint.is_empty() {
            return None;
        }
        Some(Self::new(activity, timepoint))
    }
}

impl std::fmt::Display for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.activity_id,
            Self::SEPARATOR,
            self.planned_timepoint_id
        )
    }
}

impl Serialize for CellKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CellKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid cell key: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn timepoint_reports_all_missing_required_fields() {
        let tp: PlannedTimepoint = serde_json::from_value(json!({"id": "tp_1"})).unwrap();
        let missing = tp.missing_required();
        assert_eq!(missing.len(), 7);
        assert!(!missing.contains(&"id"));
        assert!(missing.contains(&"windowLabel"));
    }

    #[test]
    fn encounter_accepts_loose_input() {
        let enc: Encounter = serde_json::from_value(json!({
            "id": 3,
            "name": "Visit 3",
            "window": "Day 8 ± 1 day",
            "isUnscheduled": "no"
        }))
        .unwrap();
        assert_eq!(enc.id, "3");
        assert_eq!(enc.timing.as_deref(), Some("Day 8 ± 1 day"));
        assert!(!enc.unscheduled);
    }

    #[test]
    fn missing_id_fails_construction() {
        let result: Result<Activity, _> = serde_json::from_value(json!({"name": "ECG"}));
        assert!(result.is_err());
    }

    #[test]
    fn cell_key_round_trips_through_display() {
        let key = CellKey::new("act_1", "tp_3");
        assert_eq!(key.to_string(), "act_1|tp_3");
        assert_eq!(CellKey::parse("act_1|tp_3"), Some(key));
        assert_eq!(CellKey::parse("act_1"), None);
    }
}
