//! Duplicate IDs, duplicate cells and colliding epoch positions.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use soa_model::{CellKey, EntityKind, StudyDesign};

use super::CheckOutcome;
use crate::issue::Issue;

pub(crate) fn check(design: &StudyDesign) -> CheckOutcome {
    let mut outcome = CheckOutcome::default();
    duplicate_ids(design, &mut outcome);
    duplicate_cells(design, &mut outcome);
    duplicate_positions(design, &mut outcome);
    outcome
}

fn duplicate_ids(design: &StudyDesign, outcome: &mut CheckOutcome) {
    for &kind in EntityKind::all() {
        let ids = design.ids(kind);
        outcome.checked += ids.len();
        // Insertion order is kept so issues follow document order.
        let mut order: Vec<&str> = Vec::new();
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for id in ids {
            let count = counts.entry(id).or_default();
            if *count == 0 {
                order.push(id);
            }
            *count += 1;
        }
        for id in order {
            let occurrences = counts[id];
            if occurrences > 1 {
                outcome.issues.push(Issue::DuplicateId {
                    kind,
                    id: id.to_string(),
                    occurrences,
                });
            }
        }
    }
}

fn duplicate_cells(design: &StudyDesign, outcome: &mut CheckOutcome) {
    let mut seen: BTreeMap<CellKey, &str> = BTreeMap::new();
    for tick in &design.activity_timepoints {
        outcome.checked += 1;
        match seen.entry(tick.cell()) {
            Entry::Vacant(slot) => {
                slot.insert(&tick.id);
            }
            Entry::Occupied(slot) => outcome.issues.push(Issue::DuplicateCell {
                id: tick.id.clone(),
                first_id: (*slot.get()).to_string(),
                activity_id: tick.activity_id.clone(),
                planned_timepoint_id: tick.planned_timepoint_id.clone(),
            }),
        }
    }
}

fn duplicate_positions(design: &StudyDesign, outcome: &mut CheckOutcome) {
    let mut seen: BTreeMap<u32, &str> = BTreeMap::new();
    for epoch in &design.epochs {
        let Some(position) = epoch.position else {
            continue;
        };
        outcome.checked += 1;
        match seen.entry(position) {
            Entry::Vacant(slot) => {
                slot.insert(&epoch.id);
            }
            Entry::Occupied(slot) => outcome.issues.push(Issue::DuplicateEpochPosition {
                id: epoch.id.clone(),
                first_id: (*slot.get()).to_string(),
                position,
            }),
        }
    }
}
