//! Validation issue types.
//!
//! Each [`Issue`] variant carries only the data its rule needs; the rule ID,
//! category, severity and message are derived from the variant.

use serde::Serialize;

use soa_model::EntityKind;

use crate::category::Category;

/// Issue severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warning => "Warning",
        }
    }
}

/// One invariant breach found in a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    // Naming
    /// An encounter or timepoint name still contains a timing token.
    TimingInName {
        kind: EntityKind,
        id: String,
        name: String,
        token: String,
    },

    // References
    /// A reference names an ID that no entity of the target kind has.
    DanglingReference {
        kind: EntityKind,
        id: String,
        field: &'static str,
        target: EntityKind,
        target_id: String,
    },
    /// A reference names an ID shared by several entities of the target kind.
    AmbiguousReference {
        kind: EntityKind,
        id: String,
        field: &'static str,
        target: EntityKind,
        target_id: String,
        matches: usize,
    },

    // Uniqueness
    DuplicateId {
        kind: EntityKind,
        id: String,
        occurrences: usize,
    },
    /// Two ticks assert the same activity × timepoint cell.
    DuplicateCell {
        id: String,
        first_id: String,
        activity_id: String,
        planned_timepoint_id: String,
    },
    DuplicateEpochPosition {
        id: String,
        first_id: String,
        position: u32,
    },

    // Completeness
    MissingRequiredField {
        kind: EntityKind,
        id: String,
        field: &'static str,
    },
    /// Wrapper or study design metadata is absent.
    MissingDocumentField { field: &'static str },
}

impl Issue {
    pub fn rule_id(&self) -> &'static str {
        match self {
            Issue::TimingInName { .. } => "SOA-T001",
            Issue::DanglingReference { .. } => "SOA-R001",
            Issue::AmbiguousReference { .. } => "SOA-R002",
            Issue::DuplicateId { .. } => "SOA-U001",
            Issue::DuplicateCell { .. } => "SOA-U002",
            Issue::DuplicateEpochPosition { .. } => "SOA-U003",
            Issue::MissingRequiredField { .. } => "SOA-C001",
            Issue::MissingDocumentField { .. } => "SOA-C002",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Issue::TimingInName { .. } => Category::Naming,
            Issue::DanglingReference { .. } | Issue::AmbiguousReference { .. } => {
                Category::References
            }
            Issue::DuplicateId { .. }
            | Issue::DuplicateCell { .. }
            | Issue::DuplicateEpochPosition { .. } => Category::Uniqueness,
            Issue::MissingRequiredField { .. } | Issue::MissingDocumentField { .. } => {
                Category::Completeness
            }
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Issue::DuplicateEpochPosition { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Kind of the offending entity, if the issue concerns one.
    pub fn entity_kind(&self) -> Option<EntityKind> {
        match self {
            Issue::TimingInName { kind, .. }
            | Issue::DanglingReference { kind, .. }
            | Issue::AmbiguousReference { kind, .. }
            | Issue::DuplicateId { kind, .. }
            | Issue::MissingRequiredField { kind, .. } => Some(*kind),
            Issue::DuplicateCell { .. } => Some(EntityKind::ActivityTimepoint),
            Issue::DuplicateEpochPosition { .. } => Some(EntityKind::Epoch),
            Issue::MissingDocumentField { .. } => None,
        }
    }

    pub fn entity_id(&self) -> Option<&str> {
        match self {
            Issue::TimingInName { id, .. }
            | Issue::DanglingReference { id, .. }
            | Issue::AmbiguousReference { id, .. }
            | Issue::DuplicateId { id, .. }
            | Issue::DuplicateCell { id, .. }
            | Issue::DuplicateEpochPosition { id, .. }
            | Issue::MissingRequiredField { id, .. } => Some(id),
            Issue::MissingDocumentField { .. } => None,
        }
    }

    /// Field the issue points at, where one applies.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Issue::TimingInName { .. } => Some("name"),
            Issue::DanglingReference { field, .. }
            | Issue::AmbiguousReference { field, .. }
            | Issue::MissingRequiredField { field, .. }
            | Issue::MissingDocumentField { field } => Some(field),
            Issue::DuplicateId { .. } => Some("id"),
            Issue::DuplicateCell { .. } => None,
            Issue::DuplicateEpochPosition { .. } => Some("position"),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Issue::TimingInName {
                kind,
                id,
                name,
                token,
            } => format!(
                "{} {} name \"{}\" contains timing text \"{}\"",
                kind.label(),
                id,
                name,
                token
            ),
            Issue::DanglingReference {
                kind,
                id,
                field,
                target,
                target_id,
            } => format!(
                "{} {} {} references missing {} {}",
                kind.label(),
                id,
                field,
                target.label().to_lowercase(),
                target_id
            ),
            Issue::AmbiguousReference {
                kind,
                id,
                field,
                target,
                target_id,
                matches,
            } => format!(
                "{} {} {} resolves to {} {} entities with ID {}",
                kind.label(),
                id,
                field,
                matches,
                target.label().to_lowercase(),
                target_id
            ),
            Issue::DuplicateId {
                kind,
                id,
                occurrences,
            } => format!("{} ID {} occurs {} times", kind.label(), id, occurrences),
            Issue::DuplicateCell {
                id,
                first_id,
                activity_id,
                planned_timepoint_id,
            } => format!(
                "Activity timepoint {} repeats cell {}|{} already asserted by {}",
                id, activity_id, planned_timepoint_id, first_id
            ),
            Issue::DuplicateEpochPosition {
                id,
                first_id,
                position,
            } => format!(
                "Epoch {} shares position {} with epoch {}",
                id, position, first_id
            ),
            Issue::MissingRequiredField { kind, id, field } => {
                format!("{} {} is missing required field {}", kind.label(), id, field)
            }
            Issue::MissingDocumentField { field } => {
                format!("Document is missing required field {}", field)
            }
        }
    }
}
