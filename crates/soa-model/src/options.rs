//! Configuration for normalization, reconciliation and validation.
//!
//! Every section deserializes with defaults so a partial TOML file only
//! needs the keys it changes. The configuration is passed by reference into
//! each component; there is no ambient global state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::kind::EntityKind;
use crate::source::SourceTag;

/// USDM version written into every document wrapper.
pub const USDM_VERSION: &str = "4.0.0";

/// System name written into every document wrapper.
pub const SYSTEM_NAME: &str = "soa-reconcile";

/// Suffix appended to the graph artifact stem to name the provenance ledger.
pub const PROVENANCE_SUFFIX: &str = "_provenance";

/// Suffix appended to the graph artifact stem to name the validation report.
pub const VALIDATION_SUFFIX: &str = "_validation";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SoaConfig {
    pub usdm_version: String,
    pub system_name: String,
    pub system_version: String,
    pub defaults: EntityDefaults,
    pub reconcile: ReconcileOptions,
    pub validation: ValidationOptions,
}

impl Default for SoaConfig {
    fn default() -> Self {
        Self {
            usdm_version: USDM_VERSION.to_string(),
            system_name: SYSTEM_NAME.to_string(),
            system_version: env!("CARGO_PKG_VERSION").to_string(),
            defaults: EntityDefaults::default(),
            reconcile: ReconcileOptions::default(),
            validation: ValidationOptions::default(),
        }
    }
}

impl SoaConfig {
    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.reconcile.structural_source == SourceTag::Both {
            return Err(ModelError::InvalidConfig(
                "reconcile.structural_source must be `text` or `vision`".to_string(),
            ));
        }
        for (name, value) in [
            (
                "reconcile.activity_min_similarity",
                self.reconcile.activity_min_similarity,
            ),
            ("reconcile.name_min_score", self.reconcile.name_min_score),
            ("reconcile.positional_weight", self.reconcile.positional_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ModelError::InvalidConfig(format!(
                    "{name} must be within 0.0..=1.0 (got {value})"
                )));
            }
        }
        for (key, source) in &self.reconcile.field_policy.overrides {
            if *source == SourceTag::Both {
                return Err(ModelError::InvalidConfig(format!(
                    "field policy `{key}` must prefer `text` or `vision`"
                )));
            }
        }
        for (key, weight) in &self.validation.weights {
            key.parse::<EntityKind>()?;
            if *weight < 0.0 {
                return Err(ModelError::InvalidConfig(format!(
                    "validation weight for `{key}` must not be negative"
                )));
            }
        }
        Ok(())
    }
}

/// Documented default values inserted by required-field backfill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EntityDefaults {
    pub design_id: String,
    pub design_name: String,
    /// ID of the synthetic epoch created when a source has none.
    pub epoch_id: String,
    /// Generic name of the synthetic epoch.
    pub epoch_name: String,
    pub encounter_type: String,
    pub unscheduled_type: String,
    /// Sentinel timing label for unscheduled encounters.
    pub unscheduled_timing: String,
    pub timepoint_instance_type: String,
    pub timepoint_type: String,
    pub relative_to_from: String,
    /// Marker for narrative values that could not be recovered.
    pub not_specified: String,
}

impl Default for EntityDefaults {
    fn default() -> Self {
        Self {
            design_id: "StudyDesign_1".to_string(),
            design_name: "Study Design".to_string(),
            epoch_id: "epoch_1".to_string(),
            epoch_name: "Study Period".to_string(),
            encounter_type: "Visit".to_string(),
            unscheduled_type: "Unscheduled Visit".to_string(),
            unscheduled_timing: "As needed".to_string(),
            timepoint_instance_type: "PlannedTimepoint".to_string(),
            timepoint_type: "Fixed Reference".to_string(),
            relative_to_from: "Start to Start".to_string(),
            not_specified: "Not specified".to_string(),
        }
    }
}

/// Options for aligning and merging two extractions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ReconcileOptions {
    /// Minimum Jaro-Winkler similarity for two activity names to align.
    pub activity_min_similarity: f64,
    /// Minimum score for name+position alignment of encounters and timepoints.
    pub name_min_score: f64,
    /// Share of the encounter/timepoint score given to positional proximity.
    pub positional_weight: f64,
    /// Source whose table structure (ordering) is preferred.
    pub structural_source: SourceTag,
    pub field_policy: FieldPolicy,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            activity_min_similarity: 0.9,
            name_min_score: 0.5,
            positional_weight: 0.2,
            structural_source: SourceTag::Vision,
            field_policy: FieldPolicy::default(),
        }
    }
}

/// Which source wins when aligned entities disagree on a field.
///
/// Built-in preferences send narrative fields to text and structural fields to
/// vision; `overrides` replaces individual entries, keyed `entity.field`
/// (e.g. `encounter.epochId`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldPolicy {
    pub overrides: BTreeMap<String, SourceTag>,
}

/// Fields describing table structure; vision is preferred for these.
const STRUCTURAL_FIELDS: &[&str] = &[
    "epoch.position",
    "encounter.epochId",
    "plannedTimepoint.encounterId",
    "plannedTimepoint.value",
    "activity.activityGroupId",
];

impl FieldPolicy {
    /// Preferred source for a field of an entity kind.
    pub fn preference(&self, kind: EntityKind, field: &str) -> SourceTag {
        let key = format!("{}.{}", kind.policy_key(), field);
        self.preference_for_key(&key)
    }

    /// Preferred source for a fully-qualified key such as `studyDesign.name`.
    pub fn preference_for_key(&self, key: &str) -> SourceTag {
        if let Some(source) = self.overrides.get(key) {
            return *source;
        }
        if STRUCTURAL_FIELDS.contains(&key) {
            SourceTag::Vision
        } else {
            SourceTag::Text
        }
    }

    pub fn with_override(mut self, key: impl Into<String>, source: SourceTag) -> Self {
        self.overrides.insert(key.into(), source);
        self
    }
}

/// Options for the referential integrity validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ValidationOptions {
    /// Completeness weight per entity collection name.
    pub weights: BTreeMap<String, f64>,
    /// Stop collecting violations once this many have been found.
    pub max_violations: Option<usize>,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        let weights = [
            (EntityKind::Activity, 3.0),
            (EntityKind::PlannedTimepoint, 3.0),
            (EntityKind::ActivityTimepoint, 3.0),
            (EntityKind::Encounter, 2.0),
            (EntityKind::Epoch, 1.0),
            (EntityKind::ActivityGroup, 1.0),
        ]
        .into_iter()
        .map(|(kind, weight)| (kind.collection().to_string(), weight))
        .collect();
        Self {
            weights,
            max_violations: None,
        }
    }
}

impl ValidationOptions {
    /// Completeness weight for a kind (unlisted kinds weigh 1.0).
    pub fn weight(&self, kind: EntityKind) -> f64 {
        self.weights.get(kind.collection()).copied().unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_splits_narrative_and_structural() {
        let policy = FieldPolicy::default();
        assert_eq!(
            policy.preference(EntityKind::Encounter, "timing"),
            SourceTag::Text
        );
        assert_eq!(
            policy.preference(EntityKind::Activity, "activityGroupId"),
            SourceTag::Vision
        );
    }

    #[test]
    fn overrides_replace_builtin_preferences() {
        let policy =
            FieldPolicy::default().with_override("activity.activityGroupId", SourceTag::Text);
        assert_eq!(
            policy.preference(EntityKind::Activity, "activityGroupId"),
            SourceTag::Text
        );
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: SoaConfig = toml::from_str(
            r#"
            system_name = "pipeline-test"

            [reconcile]
            activity_min_similarity = 0.85

            [reconcile.field_policy.overrides]
            "encounter.timing" = "vision"
            "#,
        )
        .expect("parse config");
        assert_eq!(config.system_name, "pipeline-test");
        assert_eq!(config.usdm_version, USDM_VERSION);
        assert!((config.reconcile.activity_min_similarity - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.reconcile.structural_source, SourceTag::Vision);
        assert_eq!(
            config
                .reconcile
                .field_policy
                .preference(EntityKind::Encounter, "timing"),
            SourceTag::Vision
        );
        config.validate().expect("valid config");
    }

    #[test]
    fn rejects_both_as_structural_source() {
        let mut config = SoaConfig::default();
        config.reconcile.structural_source = SourceTag::Both;
        assert!(config.validate().is_err());
    }
}
