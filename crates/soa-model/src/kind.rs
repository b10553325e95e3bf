//! Entity kinds and their collection names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// The six entity types of a Schedule of Activities graph.
///
/// The serialized form is the collection name used in documents and ledgers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "epochs")]
    Epoch,
    #[serde(rename = "encounters")]
    Encounter,
    #[serde(rename = "plannedTimepoints")]
    PlannedTimepoint,
    #[serde(rename = "activities")]
    Activity,
    #[serde(rename = "activityGroups")]
    ActivityGroup,
    #[serde(rename = "activityTimepoints")]
    ActivityTimepoint,
}

impl EntityKind {
    pub const fn all() -> &'static [Self] {
        &[
            Self::Epoch,
            Self::Encounter,
            Self::PlannedTimepoint,
            Self::Activity,
            Self::ActivityGroup,
            Self::ActivityTimepoint,
        ]
    }

    /// Collection name inside a study design.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Epoch => "epochs",
            Self::Encounter => "encounters",
            Self::PlannedTimepoint => "plannedTimepoints",
            Self::Activity => "activities",
            Self::ActivityGroup => "activityGroups",
            Self::ActivityTimepoint => "activityTimepoints",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Epoch => "Epoch",
            Self::Encounter => "Encounter",
            Self::PlannedTimepoint => "Timepoint",
            Self::Activity => "Activity",
            Self::ActivityGroup => "Group",
            Self::ActivityTimepoint => "Activity Timepoint",
        }
    }

    /// Short key used in field-policy tables (`encounter.timing`).
    pub fn policy_key(&self) -> &'static str {
        match self {
            Self::Epoch => "epoch",
            Self::Encounter => "encounter",
            Self::PlannedTimepoint => "plannedTimepoint",
            Self::Activity => "activity",
            Self::ActivityGroup => "activityGroup",
            Self::ActivityTimepoint => "activityTimepoint",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

impl FromStr for EntityKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::all()
            .iter()
            .copied()
            .find(|kind| {
                kind.collection().eq_ignore_ascii_case(trimmed)
                    || kind.policy_key().eq_ignore_ascii_case(trimmed)
            })
            .ok_or_else(|| ModelError::InvalidEntityKind(s.to_string()))
    }
}
