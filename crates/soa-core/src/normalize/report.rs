//! Audit records produced while normalizing one extraction.

use serde::Serialize;
use soa_model::EntityKind;
use thiserror::Error;

use crate::dedupe::Redirect;

/// Where a default value was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DefaultScope {
    Document,
    StudyDesign,
    Entity(EntityKind),
}

/// A value the normalizer filled in because the source lacked it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedDefault {
    pub scope: DefaultScope,
    /// Empty for document- and design-level defaults.
    pub entity_id: String,
    pub field: &'static str,
    pub value: String,
}

/// A timing token moved out of a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingExtraction {
    pub kind: EntityKind,
    pub entity_id: String,
    pub original_name: String,
    pub name: String,
    pub token: String,
    /// False when the timing field already held a value and was left alone.
    pub field_written: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteReason {
    /// Hyphens or spaces replaced by underscores.
    Separator,
    /// Numeric suffix padded or unpadded to match its siblings.
    NumberScheme,
}

/// An ID rewritten during standardization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdRewrite {
    pub kind: EntityKind,
    pub from: String,
    pub to: String,
    pub reason: RewriteReason,
}

/// Why an individual entity could not be kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DefectReason {
    #[error("entry is not a JSON object")]
    NotAnObject,
    #[error("entry has no id")]
    MissingId,
    #[error("id duplicates an earlier entity")]
    DuplicateId,
    #[error("missing required reference {field}")]
    MissingReference { field: &'static str },
    #[error("malformed entry: {detail}")]
    Malformed { detail: String },
}

/// An entity dropped during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{kind}[{index}]: {reason}")]
pub struct NormalizationDefect {
    pub kind: EntityKind,
    /// Position in the source collection.
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(flatten)]
    pub reason: DefectReason,
}

/// Everything the normalizer changed, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationReport {
    pub defaults: Vec<AppliedDefault>,
    pub timing_extractions: Vec<TimingExtraction>,
    pub id_rewrites: Vec<IdRewrite>,
    pub redirects: Vec<Redirect>,
    pub dropped_ticks: Vec<String>,
    pub defects: Vec<NormalizationDefect>,
}

impl NormalizationReport {
    pub(crate) fn record_default(
        &mut self,
        scope: DefaultScope,
        entity_id: &str,
        field: &'static str,
        value: &str,
    ) {
        tracing::debug!(?scope, entity_id, field, value, "applied default");
        self.defaults.push(AppliedDefault {
            scope,
            entity_id: entity_id.to_string(),
            field,
            value: value.to_string(),
        });
    }

    pub(crate) fn defect(
        &mut self,
        kind: EntityKind,
        index: usize,
        entity_id: Option<&str>,
        reason: DefectReason,
    ) {
        let defect = NormalizationDefect {
            kind,
            index,
            entity_id: entity_id.map(str::to_string),
            reason,
        };
        tracing::warn!(%defect, "dropped entity during normalization");
        self.defects.push(defect);
    }

    /// Whether normalization changed nothing.
    pub fn is_clean(&self) -> bool {
        self.defaults.is_empty()
            && self.timing_extractions.is_empty()
            && self.id_rewrites.is_empty()
            && self.redirects.is_empty()
            && self.dropped_ticks.is_empty()
            && self.defects.is_empty()
    }
}
