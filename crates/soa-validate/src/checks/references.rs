//! Reference closure: every reference must resolve to exactly one entity.

use std::collections::BTreeMap;

use soa_model::{EntityKind, StudyDesign};
use tracing::debug;

use super::CheckOutcome;
use crate::issue::Issue;

/// Reference counts behind the linkage score.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Linkage {
    pub total: usize,
    pub resolved: usize,
}

pub(crate) fn check(design: &StudyDesign) -> (CheckOutcome, Linkage) {
    let index = id_counts(design);
    let mut outcome = CheckOutcome::default();
    let mut linkage = Linkage::default();

    for outgoing in design.outgoing_references() {
        let reference = outgoing.reference;
        linkage.total += 1;
        outcome.checked += 1;
        let matches = index
            .get(&reference.target)
            .and_then(|ids| ids.get(reference.id))
            .copied()
            .unwrap_or(0);
        match matches {
            1 => linkage.resolved += 1,
            0 => outcome.issues.push(Issue::DanglingReference {
                kind: outgoing.source,
                id: outgoing.source_id.to_string(),
                field: reference.field,
                target: reference.target,
                target_id: reference.id.to_string(),
            }),
            _ => outcome.issues.push(Issue::AmbiguousReference {
                kind: outgoing.source,
                id: outgoing.source_id.to_string(),
                field: reference.field,
                target: reference.target,
                target_id: reference.id.to_string(),
                matches,
            }),
        }
    }

    debug!(
        total = linkage.total,
        resolved = linkage.resolved,
        "reference walk complete"
    );
    (outcome, linkage)
}

fn id_counts(design: &StudyDesign) -> BTreeMap<EntityKind, BTreeMap<&str, usize>> {
    EntityKind::all()
        .iter()
        .map(|&kind| {
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for id in design.ids(kind) {
                *counts.entry(id).or_default() += 1;
            }
            (kind, counts)
        })
        .collect()
}
