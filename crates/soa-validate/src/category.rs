//! Invariant categories checked by the validator.

use std::fmt;

use serde::Serialize;

/// Invariant category of a validation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Names carry no timing tokens.
    Naming,
    /// Every reference resolves to exactly one entity.
    References,
    /// IDs, cells and epoch positions are unique.
    Uniqueness,
    /// Required fields are populated.
    Completeness,
}

impl Category {
    pub const fn all() -> &'static [Self] {
        &[
            Self::Naming,
            Self::References,
            Self::Uniqueness,
            Self::Completeness,
        ]
    }

    /// Single-letter code used in rule IDs (`SOA-R001`).
    pub fn code(&self) -> char {
        match self {
            Self::Naming => 'T',
            Self::References => 'R',
            Self::Uniqueness => 'U',
            Self::Completeness => 'C',
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Naming => "Naming",
            Self::References => "References",
            Self::Uniqueness => "Uniqueness",
            Self::Completeness => "Completeness",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Naming => "Encounter and timepoint names free of timing text",
            Self::References => "Reference closure across the entity graph",
            Self::Uniqueness => "Unique IDs, cells and epoch positions",
            Self::Completeness => "Required fields per entity type",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
