//! Field-level conflict resolution for aligned entities.

use serde::Serialize;
use soa_model::{FieldPolicy, SourceTag};
use tracing::debug;

/// Which side supplied the merged value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Text,
    Vision,
    Adjudicator,
}

impl From<SourceTag> for Winner {
    fn from(tag: SourceTag) -> Self {
        match tag {
            SourceTag::Vision => Self::Vision,
            SourceTag::Text | SourceTag::Both => Self::Text,
        }
    }
}

/// How one field of one aligned pair was decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldResolution {
    /// `entity.field` policy key, e.g. `encounter.timing`.
    pub field: String,
    pub entity_id: String,
    pub text_value: Option<String>,
    pub vision_value: Option<String>,
    pub chosen: Option<String>,
    pub winner: Winner,
}

/// A disagreement handed to an [`Adjudicator`].
#[derive(Debug, Clone, Copy)]
pub struct FieldConflict<'a> {
    pub field: &'a str,
    pub entity_id: &'a str,
    pub text: &'a str,
    pub vision: &'a str,
    /// What the field policy would pick.
    pub policy_choice: SourceTag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Adjudication {
    Resolved(String),
    DeferToPolicy,
}

/// Optional third opinion on field conflicts.
///
/// A resolved value is used as-is; it is still subject to validation of the
/// merged document.
pub trait Adjudicator {
    fn adjudicate(&self, conflict: &FieldConflict<'_>) -> Adjudication;
}

/// Always defers to the field policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyAdjudicator;

impl Adjudicator for PolicyAdjudicator {
    fn adjudicate(&self, _conflict: &FieldConflict<'_>) -> Adjudication {
        Adjudication::DeferToPolicy
    }
}

/// Decides field values for aligned pairs and records every decision.
pub(crate) struct FieldResolver<'a> {
    policy: &'a FieldPolicy,
    adjudicator: &'a dyn Adjudicator,
    /// Backfilled marker treated as absent when the other side has a value.
    placeholder: &'a str,
    resolutions: Vec<FieldResolution>,
}

impl<'a> FieldResolver<'a> {
    pub(crate) fn new(
        policy: &'a FieldPolicy,
        adjudicator: &'a dyn Adjudicator,
        placeholder: &'a str,
    ) -> Self {
        Self {
            policy,
            adjudicator,
            placeholder,
            resolutions: Vec::new(),
        }
    }

    pub(crate) fn into_resolutions(self) -> Vec<FieldResolution> {
        self.resolutions
    }

    /// Resolve a required string field (empty means absent).
    pub(crate) fn required(&mut self, field: &str, entity_id: &str, text: &str, vision: &str) -> String {
        self.optional(field, entity_id, Some(text), Some(vision))
            .unwrap_or_default()
    }

    /// Resolve an optional field.
    pub(crate) fn optional(
        &mut self,
        field: &str,
        entity_id: &str,
        text: Option<&str>,
        vision: Option<&str>,
    ) -> Option<String> {
        let text = text.filter(|v| !v.is_empty());
        let vision = vision.filter(|v| !v.is_empty());
        let (chosen, winner) = match (
            without_placeholder(text, self.placeholder),
            without_placeholder(vision, self.placeholder),
        ) {
            (None, None) => return text.or(vision).map(str::to_string),
            (Some(t), Some(v)) if t == v => return Some(t.to_string()),
            (Some(t), None) => (t.to_string(), Winner::Text),
            (None, Some(v)) => (v.to_string(), Winner::Vision),
            (Some(t), Some(v)) => {
                let policy_choice = self.policy.preference_for_key(field);
                let conflict = FieldConflict {
                    field,
                    entity_id,
                    text: t,
                    vision: v,
                    policy_choice,
                };
                match self.adjudicator.adjudicate(&conflict) {
                    Adjudication::Resolved(value) => (value, Winner::Adjudicator),
                    Adjudication::DeferToPolicy => match policy_choice {
                        SourceTag::Vision => (v.to_string(), Winner::Vision),
                        SourceTag::Text | SourceTag::Both => (t.to_string(), Winner::Text),
                    },
                }
            }
        };

        debug!(field, entity_id, ?winner, "resolved field");
        self.resolutions.push(FieldResolution {
            field: field.to_string(),
            entity_id: entity_id.to_string(),
            text_value: text.map(str::to_string),
            vision_value: vision.map(str::to_string),
            chosen: Some(chosen.clone()),
            winner,
        });
        Some(chosen)
    }
}

fn without_placeholder<'v>(value: Option<&'v str>, placeholder: &str) -> Option<&'v str> {
    value.filter(|v| *v != placeholder)
}
