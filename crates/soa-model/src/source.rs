//! Extraction source tags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Which extraction produced an entity or a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    /// Extracted from the protocol's raw text.
    Text,
    /// Extracted from rendered page images.
    Vision,
    /// Confirmed by both extractions.
    Both,
}

impl SourceTag {
    /// Combine two tags for the same key.
    ///
    /// Equal tags are kept, anything else becomes `Both`. The operation is
    /// commutative, associative and idempotent.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        if self == other { self } else { Self::Both }
    }

    /// The other single source (`Both` maps to itself).
    #[must_use]
    pub fn counterpart(self) -> Self {
        match self {
            Self::Text => Self::Vision,
            Self::Vision => Self::Text,
            Self::Both => Self::Both,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Vision => "vision",
            Self::Both => "both",
        }
    }

    /// Whether this tag includes the given single source.
    pub fn includes(self, source: Self) -> bool {
        self == Self::Both || self == source
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceTag {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "vision" => Ok(Self::Vision),
            "both" => Ok(Self::Both),
            _ => Err(ModelError::InvalidSourceTag(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_is_commutative_and_idempotent() {
        let all = [SourceTag::Text, SourceTag::Vision, SourceTag::Both];
        for a in all {
            assert_eq!(a.combine(a), a);
            for b in all {
                assert_eq!(a.combine(b), b.combine(a));
            }
        }
        assert_eq!(SourceTag::Text.combine(SourceTag::Vision), SourceTag::Both);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Vision".parse::<SourceTag>().unwrap(), SourceTag::Vision);
        assert!("ocr".parse::<SourceTag>().is_err());
    }
}
