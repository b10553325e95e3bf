//! One-to-one alignment and merge ordering.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;
use soa_model::{EntityKind, SourceTag};

use super::similarity::{Candidate, SimilarityScorer};

/// Index pairs plus the unaligned leftovers of each side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alignment {
    /// `(text_index, vision_index)`, sorted by text index.
    pub pairs: Vec<(usize, usize)>,
    pub text_only: Vec<usize>,
    pub vision_only: Vec<usize>,
    /// Candidates that lost to an equally scored pair on document order.
    pub ties: Vec<Tie>,
}

/// A candidate passed over in favour of an equal-scoring pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tie {
    pub score: f64,
    /// `(text_index, vision_index)` that was kept.
    pub kept: (usize, usize),
    pub passed_over: (usize, usize),
}

/// Per-kind alignment counts for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentSummary {
    pub kind: EntityKind,
    pub aligned: usize,
    pub text_only: usize,
    pub vision_only: usize,
}

impl Alignment {
    pub fn summary(&self, kind: EntityKind) -> AlignmentSummary {
        AlignmentSummary {
            kind,
            aligned: self.pairs.len(),
            text_only: self.text_only.len(),
            vision_only: self.vision_only.len(),
        }
    }
}

/// Greedy one-to-one assignment by descending score.
///
/// Pairs below the scorer's minimum are never considered. Equal scores
/// resolve to the lower text index, then the lower vision index, so the
/// result does not depend on iteration order.
pub fn align<T>(text: &[T], vision: &[T], scorer: &dyn SimilarityScorer<T>) -> Alignment {
    let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
    for (ti, text_entity) in text.iter().enumerate() {
        for (vi, vision_entity) in vision.iter().enumerate() {
            let score = scorer.score(
                Candidate {
                    entity: text_entity,
                    index: ti,
                    total: text.len(),
                },
                Candidate {
                    entity: vision_entity,
                    index: vi,
                    total: vision.len(),
                },
            );
            if score > 0.0 && score >= scorer.min_score() {
                candidates.push((score, ti, vi));
            }
        }
    }

    candidates.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });

    // Each claimed index remembers the score and pair that claimed it.
    let mut text_claims: BTreeMap<usize, (f64, (usize, usize))> = BTreeMap::new();
    let mut vision_claims: BTreeMap<usize, (f64, (usize, usize))> = BTreeMap::new();
    let mut pairs = Vec::new();
    let mut ties = Vec::new();
    for (score, ti, vi) in candidates {
        let claim = text_claims.get(&ti).or_else(|| vision_claims.get(&vi));
        if let Some(&(kept_score, kept)) = claim {
            if (kept_score - score).abs() < f64::EPSILON {
                ties.push(Tie {
                    score,
                    kept,
                    passed_over: (ti, vi),
                });
            }
            continue;
        }
        text_claims.insert(ti, (score, (ti, vi)));
        vision_claims.insert(vi, (score, (ti, vi)));
        pairs.push((ti, vi));
    }
    pairs.sort_unstable();

    Alignment {
        pairs,
        text_only: (0..text.len())
            .filter(|i| !text_claims.contains_key(i))
            .collect(),
        vision_only: (0..vision.len())
            .filter(|i| !vision_claims.contains_key(i))
            .collect(),
        ties,
    }
}

/// One position in the merged collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Pair { text: usize, vision: usize },
    Text(usize),
    Vision(usize),
}

/// Merged order: the structural source's order, with the other source's
/// unaligned entities placed after their nearest aligned predecessor.
pub fn merge_order(
    alignment: &Alignment,
    text_len: usize,
    vision_len: usize,
    structural: SourceTag,
) -> Vec<Slot> {
    let vision_primary = structural != SourceTag::Text;
    let (primary_len, partner_of): (usize, BTreeMap<usize, usize>) = if vision_primary {
        (vision_len, alignment.pairs.iter().map(|&(t, v)| (v, t)).collect())
    } else {
        (text_len, alignment.pairs.iter().copied().collect())
    };
    let secondary_only = if vision_primary {
        &alignment.text_only
    } else {
        &alignment.vision_only
    };

    let slot = |primary: usize, secondary: Option<usize>| match (vision_primary, secondary) {
        (true, Some(t)) => Slot::Pair {
            text: t,
            vision: primary,
        },
        (false, Some(v)) => Slot::Pair {
            text: primary,
            vision: v,
        },
        (true, None) => Slot::Vision(primary),
        (false, None) => Slot::Text(primary),
    };
    let orphan = |secondary: usize| {
        if vision_primary {
            Slot::Text(secondary)
        } else {
            Slot::Vision(secondary)
        }
    };

    let mut order = Vec::with_capacity(text_len + vision_len);
    let mut pending = secondary_only.iter().copied().peekable();
    for primary in 0..primary_len {
        let partner = partner_of.get(&primary).copied();
        if let Some(partner) = partner {
            while let Some(next) = pending.next_if(|&s| s < partner) {
                order.push(orphan(next));
            }
        }
        order.push(slot(primary, partner));
    }
    order.extend(pending.map(orphan));
    order
}
