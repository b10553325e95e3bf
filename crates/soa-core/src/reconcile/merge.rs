//! Building merged entities from aligned pairs.

use std::collections::{BTreeMap, BTreeSet};

use soa_model::{
    Activity, ActivityGroup, ActivityTimepoint, CellKey, Encounter, Entity, Epoch,
    PlannedTimepoint, SourceTag,
};

use super::align::{Alignment, Slot, merge_order};
use super::policy::FieldResolver;

/// Renames applied to vision entities of one kind so they land in the
/// merged ID space: aligned entities take the text ID, vision-only entities
/// keep theirs unless it is taken, in which case a `_v` suffix is added.
///
/// `reserved` holds IDs the text source dropped during normalization; they
/// stay in the ledger and count as taken.
pub(crate) fn vision_renames<T: Entity>(
    text: &[T],
    vision: &[T],
    alignment: &Alignment,
    reserved: &BTreeSet<String>,
) -> BTreeMap<String, String> {
    let mut taken: BTreeSet<String> = text
        .iter()
        .map(|e| e.id().to_string())
        .chain(reserved.iter().cloned())
        .collect();
    let mut renames = BTreeMap::new();
    for &(t, v) in &alignment.pairs {
        if text[t].id() != vision[v].id() {
            renames.insert(vision[v].id().to_string(), text[t].id().to_string());
        }
    }
    for &v in &alignment.vision_only {
        let id = vision[v].id();
        let unique = unique_id(id, &mut taken);
        if unique != id {
            renames.insert(id.to_string(), unique);
        }
    }
    renames
}

/// `base`, or the first free `base_v`, `base_v2`, ... Reserves the result.
pub(crate) fn unique_id(base: &str, taken: &mut BTreeSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut attempt = 1;
    while taken.contains(&candidate) {
        candidate = if attempt == 1 {
            format!("{base}_v")
        } else {
            format!("{base}_v{attempt}")
        };
        attempt += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

/// Lay out a merged collection in structural order.
pub(crate) fn merge_collection<T: Clone>(
    text: &[T],
    vision: &[T],
    alignment: &Alignment,
    structural: SourceTag,
    mut merge_pair: impl FnMut(&T, &T) -> T,
) -> Vec<T> {
    merge_order(alignment, text.len(), vision.len(), structural)
        .into_iter()
        .map(|slot| match slot {
            Slot::Pair { text: t, vision: v } => merge_pair(&text[t], &vision[v]),
            Slot::Text(t) => text[t].clone(),
            Slot::Vision(v) => vision[v].clone(),
        })
        .collect()
}

fn position_string(position: Option<u32>) -> Option<String> {
    position.map(|p| p.to_string())
}

pub(crate) fn merge_epoch(r: &mut FieldResolver<'_>, text: &Epoch, vision: &Epoch) -> Epoch {
    let id = &text.id;
    Epoch {
        id: id.clone(),
        name: r.required("epoch.name", id, &text.name, &vision.name),
        position: r
            .optional(
                "epoch.position",
                id,
                position_string(text.position).as_deref(),
                position_string(vision.position).as_deref(),
            )
            .and_then(|p| p.parse().ok()),
        description: r.optional(
            "epoch.description",
            id,
            text.description.as_deref(),
            vision.description.as_deref(),
        ),
    }
}

pub(crate) fn merge_encounter(
    r: &mut FieldResolver<'_>,
    text: &Encounter,
    vision: &Encounter,
) -> Encounter {
    let id = &text.id;
    Encounter {
        id: id.clone(),
        name: r.required("encounter.name", id, &text.name, &vision.name),
        encounter_type: r.required(
            "encounter.type",
            id,
            &text.encounter_type,
            &vision.encounter_type,
        ),
        timing: r.optional(
            "encounter.timing",
            id,
            text.timing.as_deref(),
            vision.timing.as_deref(),
        ),
        epoch_id: r.optional(
            "encounter.epochId",
            id,
            text.epoch_id.as_deref(),
            vision.epoch_id.as_deref(),
        ),
        unscheduled: text.unscheduled || vision.unscheduled,
        description: r.optional(
            "encounter.description",
            id,
            text.description.as_deref(),
            vision.description.as_deref(),
        ),
    }
}

pub(crate) fn merge_timepoint(
    r: &mut FieldResolver<'_>,
    text: &PlannedTimepoint,
    vision: &PlannedTimepoint,
) -> PlannedTimepoint {
    let id = &text.id;
    PlannedTimepoint {
        id: id.clone(),
        name: r.required("plannedTimepoint.name", id, &text.name, &vision.name),
        instance_type: r.required(
            "plannedTimepoint.instanceType",
            id,
            &text.instance_type,
            &vision.instance_type,
        ),
        value: r.required("plannedTimepoint.value", id, &text.value, &vision.value),
        value_label: r.required(
            "plannedTimepoint.valueLabel",
            id,
            &text.value_label,
            &vision.value_label,
        ),
        timing_type: r.required(
            "plannedTimepoint.type",
            id,
            &text.timing_type,
            &vision.timing_type,
        ),
        relative_to_from: r.required(
            "plannedTimepoint.relativeToFrom",
            id,
            &text.relative_to_from,
            &vision.relative_to_from,
        ),
        window_label: r.required(
            "plannedTimepoint.windowLabel",
            id,
            &text.window_label,
            &vision.window_label,
        ),
        description: r.optional(
            "plannedTimepoint.description",
            id,
            text.description.as_deref(),
            vision.description.as_deref(),
        ),
        encounter_id: r.optional(
            "plannedTimepoint.encounterId",
            id,
            text.encounter_id.as_deref(),
            vision.encounter_id.as_deref(),
        ),
    }
}

pub(crate) fn merge_activity(
    r: &mut FieldResolver<'_>,
    text: &Activity,
    vision: &Activity,
) -> Activity {
    let id = &text.id;
    Activity {
        id: id.clone(),
        name: r.required("activity.name", id, &text.name, &vision.name),
        activity_group_id: r.optional(
            "activity.activityGroupId",
            id,
            text.activity_group_id.as_deref(),
            vision.activity_group_id.as_deref(),
        ),
        description: r.optional(
            "activity.description",
            id,
            text.description.as_deref(),
            vision.description.as_deref(),
        ),
    }
}

pub(crate) fn merge_group(
    r: &mut FieldResolver<'_>,
    text: &ActivityGroup,
    vision: &ActivityGroup,
) -> ActivityGroup {
    let id = &text.id;
    ActivityGroup {
        id: id.clone(),
        name: r.required("activityGroup.name", id, &text.name, &vision.name),
        description: r.optional(
            "activityGroup.description",
            id,
            text.description.as_deref(),
            vision.description.as_deref(),
        ),
    }
}

/// Cell tallies of a tick union.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellUnion {
    pub both: usize,
    pub text_only: usize,
    pub vision_only: usize,
}

/// Union of both sources' ticks, keyed by cell.
///
/// References must already be in the merged ID space. A cell ticked by both
/// keeps the text tick's ID; a vision-only tick keeps its own ID unless taken.
/// Returns the merged ticks, the vision tick renames and the cell tallies.
pub(crate) fn merge_ticks(
    text: &[ActivityTimepoint],
    vision: &[ActivityTimepoint],
    structural: SourceTag,
) -> (Vec<ActivityTimepoint>, BTreeMap<String, String>, CellUnion) {
    let text_cells = first_by_cell(text);
    let vision_cells = first_by_cell(vision);
    let (primary, secondary) = if structural == SourceTag::Text {
        (text, vision)
    } else {
        (vision, text)
    };

    let mut order: Vec<CellKey> = Vec::new();
    let mut listed = BTreeSet::new();
    for tick in primary.iter().chain(secondary) {
        let cell = tick.cell();
        if listed.insert(cell.clone()) {
            order.push(cell);
        }
    }

    let mut taken: BTreeSet<String> = text.iter().map(|t| t.id.clone()).collect();
    let mut renames = BTreeMap::new();
    let mut union = CellUnion::default();
    let mut merged = Vec::with_capacity(order.len());
    for cell in order {
        let id = match (text_cells.get(&cell), vision_cells.get(&cell)) {
            (Some(t), Some(v)) => {
                union.both += 1;
                if v.id != t.id {
                    renames.insert(v.id.clone(), t.id.clone());
                }
                t.id.clone()
            }
            (Some(t), None) => {
                union.text_only += 1;
                t.id.clone()
            }
            (None, Some(v)) => {
                union.vision_only += 1;
                let unique = unique_id(&v.id, &mut taken);
                if unique != v.id {
                    renames.insert(v.id.clone(), unique.clone());
                }
                unique
            }
            (None, None) => continue,
        };
        merged.push(ActivityTimepoint {
            id,
            activity_id: cell.activity_id,
            planned_timepoint_id: cell.planned_timepoint_id,
        });
    }
    (merged, renames, union)
}

fn first_by_cell(ticks: &[ActivityTimepoint]) -> BTreeMap<CellKey, &ActivityTimepoint> {
    let mut map = BTreeMap::new();
    for tick in ticks {
        map.entry(tick.cell()).or_insert(tick);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(id: &str, activity: &str, timepoint: &str) -> ActivityTimepoint {
        ActivityTimepoint {
            id: id.into(),
            activity_id: activity.into(),
            planned_timepoint_id: timepoint.into(),
        }
    }

    #[test]
    fn unique_id_appends_vision_suffixes() {
        let mut taken: BTreeSet<String> = ["enc_2".to_string(), "enc_2_v".to_string()].into();
        assert_eq!(unique_id("enc_3", &mut taken), "enc_3");
        assert_eq!(unique_id("enc_2", &mut taken), "enc_2_v2");
        assert!(taken.contains("enc_2_v2"));
    }

    #[test]
    fn tick_union_keeps_every_cell() {
        let text = vec![tick("at_1", "act_1", "tp_1"), tick("at_2", "act_2", "tp_3")];
        let vision = vec![tick("at_1", "act_1", "tp_1"), tick("at_2", "act_1", "tp_2")];
        let (merged, renames, union) = merge_ticks(&text, &vision, SourceTag::Vision);

        let cells: Vec<String> = merged.iter().map(|t| t.cell().to_string()).collect();
        assert_eq!(cells, vec!["act_1|tp_1", "act_1|tp_2", "act_2|tp_3"]);
        assert_eq!(merged[1].id, "at_2_v");
        assert_eq!(renames.get("at_2").map(String::as_str), Some("at_2_v"));
        assert_eq!(
            union,
            CellUnion {
                both: 1,
                text_only: 1,
                vision_only: 1
            }
        );
    }
}
