//! Provenance ledger recording which source asserted each entity and cell.
//!
//! The ledger is a sidecar to the SoA graph: it is never embedded in the
//! document and is persisted as its own artifact. It only grows. Renames
//! move entries to their new IDs and redirects keep the dropped entry while
//! folding its tag into the survivor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use soa_model::{CellKey, Entity, EntityKind, SourceTag, StudyDesign};

/// Per-kind ID renames, old ID to new ID.
pub type IdRenames = BTreeMap<EntityKind, BTreeMap<String, String>>;

/// Source tags per entity and per activity/timepoint cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceLedger {
    /// Entity ID to tag, per kind.
    #[serde(default)]
    entities: BTreeMap<EntityKind, BTreeMap<String, SourceTag>>,
    /// Cell (`activityId|plannedTimepointId`) to tag.
    #[serde(default)]
    cells: BTreeMap<CellKey, SourceTag>,
    /// Dropped duplicate ID to surviving ID, per kind.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    redirects: BTreeMap<EntityKind, BTreeMap<String, String>>,
}

/// Tally of tags across the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TagCounts {
    pub text: usize,
    pub vision: usize,
    pub both: usize,
}

impl TagCounts {
    fn add(&mut self, tag: SourceTag) {
        match tag {
            SourceTag::Text => self.text += 1,
            SourceTag::Vision => self.vision += 1,
            SourceTag::Both => self.both += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.text + self.vision + self.both
    }
}

impl ProvenanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag every entity and cell of a single-source design.
    pub fn for_design(design: &StudyDesign, tag: SourceTag) -> Self {
        let mut ledger = Self::new();
        for kind in EntityKind::all() {
            for id in design.ids(*kind) {
                ledger.record(*kind, id, tag);
            }
        }
        for tick in &design.activity_timepoints {
            ledger.record_cell(tick.cell(), tag);
        }
        ledger
    }

    /// Record an entity; an existing tag is combined rather than replaced.
    pub fn record(&mut self, kind: EntityKind, id: impl Into<String>, tag: SourceTag) {
        self.entities
            .entry(kind)
            .or_default()
            .entry(id.into())
            .and_modify(|existing| *existing = existing.combine(tag))
            .or_insert(tag);
    }

    /// Record a cell; an existing tag is combined rather than replaced.
    pub fn record_cell(&mut self, cell: CellKey, tag: SourceTag) {
        self.cells
            .entry(cell)
            .and_modify(|existing| *existing = existing.combine(tag))
            .or_insert(tag);
    }

    /// Record a collapsed duplicate.
    ///
    /// The dropped entry stays; its tag is folded into the survivor. For
    /// timepoints and activities the dropped entity's cells are folded into
    /// the survivor's cells too.
    pub fn redirect(&mut self, kind: EntityKind, dropped: &str, survivor: &str) {
        if dropped == survivor {
            return;
        }
        if let Some(tag) = self.tag(kind, dropped) {
            self.record(kind, survivor, tag);
        }
        let moved: Vec<(CellKey, SourceTag)> = self
            .cells
            .iter()
            .filter_map(|(cell, tag)| {
                let target = match kind {
                    EntityKind::PlannedTimepoint if cell.planned_timepoint_id == dropped => {
                        CellKey::new(cell.activity_id.clone(), survivor)
                    }
                    EntityKind::Activity if cell.activity_id == dropped => {
                        CellKey::new(survivor, cell.planned_timepoint_id.clone())
                    }
                    _ => return None,
                };
                Some((target, *tag))
            })
            .collect();
        for (cell, tag) in moved {
            self.record_cell(cell, tag);
        }
        self.redirects
            .entry(kind)
            .or_default()
            .insert(dropped.to_string(), survivor.to_string());
    }

    /// A copy with entity IDs and cell keys renamed.
    ///
    /// Entries that collapse onto the same new ID have their tags combined.
    pub fn remapped(&self, renames: &IdRenames) -> Self {
        let rename = |kind: EntityKind, id: &str| -> String {
            renames
                .get(&kind)
                .and_then(|map| map.get(id))
                .cloned()
                .unwrap_or_else(|| id.to_string())
        };

        let mut out = Self::new();
        for (kind, ids) in &self.entities {
            for (id, tag) in ids {
                out.record(*kind, rename(*kind, id), *tag);
            }
        }
        for (cell, tag) in &self.cells {
            out.record_cell(
                CellKey::new(
                    rename(EntityKind::Activity, &cell.activity_id),
                    rename(EntityKind::PlannedTimepoint, &cell.planned_timepoint_id),
                ),
                *tag,
            );
        }
        for (kind, redirects) in &self.redirects {
            for (dropped, survivor) in redirects {
                out.insert_redirect(*kind, rename(*kind, dropped), rename(*kind, survivor));
            }
        }
        out
    }

    /// Union of two ledgers.
    ///
    /// Tags present in both are combined, so the merge is commutative and
    /// idempotent. Conflicting redirects keep the lexicographically smaller
    /// survivor.
    pub fn merge(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for (kind, ids) in &other.entities {
            for (id, tag) in ids {
                out.record(*kind, id.clone(), *tag);
            }
        }
        for (cell, tag) in &other.cells {
            out.record_cell(cell.clone(), *tag);
        }
        for (kind, redirects) in &other.redirects {
            for (dropped, survivor) in redirects {
                out.insert_redirect(*kind, dropped.clone(), survivor.clone());
            }
        }
        out
    }

    fn insert_redirect(&mut self, kind: EntityKind, dropped: String, survivor: String) {
        self.redirects
            .entry(kind)
            .or_default()
            .entry(dropped)
            .and_modify(|existing| {
                if survivor < *existing {
                    existing.clone_from(&survivor);
                }
            })
            .or_insert(survivor);
    }

    pub fn tag(&self, kind: EntityKind, id: &str) -> Option<SourceTag> {
        self.entities.get(&kind).and_then(|ids| ids.get(id)).copied()
    }

    pub fn tag_of<T: Entity>(&self, entity: &T) -> Option<SourceTag> {
        self.tag(T::KIND, entity.id())
    }

    pub fn cell_tag(&self, cell: &CellKey) -> Option<SourceTag> {
        self.cells.get(cell).copied()
    }

    /// Survivor a dropped ID was redirected to.
    pub fn redirected_to(&self, kind: EntityKind, id: &str) -> Option<&str> {
        self.redirects
            .get(&kind)
            .and_then(|map| map.get(id))
            .map(String::as_str)
    }

    /// Dropped IDs of one kind with their survivors, ordered by dropped ID.
    pub fn redirects(&self, kind: EntityKind) -> impl Iterator<Item = (&str, &str)> {
        self.redirects
            .get(&kind)
            .into_iter()
            .flat_map(|map| map.iter().map(|(dropped, survivor)| (dropped.as_str(), survivor.as_str())))
    }

    /// Entries of one kind, ordered by ID.
    pub fn entities(&self, kind: EntityKind) -> impl Iterator<Item = (&str, SourceTag)> {
        self.entities
            .get(&kind)
            .into_iter()
            .flat_map(|ids| ids.iter().map(|(id, tag)| (id.as_str(), *tag)))
    }

    pub fn cells(&self) -> impl Iterator<Item = (&CellKey, SourceTag)> {
        self.cells.iter().map(|(cell, tag)| (cell, *tag))
    }

    pub fn entity_count(&self) -> usize {
        self.entities.values().map(BTreeMap::len).sum()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn redirect_count(&self) -> usize {
        self.redirects.values().map(BTreeMap::len).sum()
    }

    /// Tag tally over entities (not cells).
    pub fn entity_tag_counts(&self) -> TagCounts {
        let mut counts = TagCounts::default();
        for ids in self.entities.values() {
            for tag in ids.values() {
                counts.add(*tag);
            }
        }
        counts
    }

    /// Tag tally over cells.
    pub fn cell_tag_counts(&self) -> TagCounts {
        let mut counts = TagCounts::default();
        for tag in self.cells.values() {
            counts.add(*tag);
        }
        counts
    }

    pub fn is_empty(&self) -> bool {
        self.entity_count() == 0 && self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use soa_model::{ActivityTimepoint, Encounter};

    use super::*;

    fn design() -> StudyDesign {
        let mut design = StudyDesign::new("sd", "Design");
        design.encounters.push(Encounter {
            id: "enc_1".into(),
            name: "Visit 1".into(),
            ..Encounter::default()
        });
        design.activity_timepoints.push(ActivityTimepoint {
            id: "at_1".into(),
            activity_id: "act_1".into(),
            planned_timepoint_id: "tp_1".into(),
        });
        design
    }

    #[test]
    fn record_combines_instead_of_overwriting() {
        let mut ledger = ProvenanceLedger::for_design(&design(), SourceTag::Text);
        ledger.record(EntityKind::Encounter, "enc_1", SourceTag::Vision);
        assert_eq!(ledger.tag(EntityKind::Encounter, "enc_1"), Some(SourceTag::Both));
        assert_eq!(ledger.cell_tag(&CellKey::new("act_1", "tp_1")), Some(SourceTag::Text));
    }

    #[test]
    fn redirect_keeps_dropped_entry_and_moves_cells() {
        let mut ledger = ProvenanceLedger::new();
        ledger.record(EntityKind::PlannedTimepoint, "tp_6", SourceTag::Text);
        ledger.record(EntityKind::PlannedTimepoint, "tp_8", SourceTag::Vision);
        ledger.record_cell(CellKey::new("act_1", "tp_8"), SourceTag::Vision);

        ledger.redirect(EntityKind::PlannedTimepoint, "tp_8", "tp_6");

        assert_eq!(ledger.tag(EntityKind::PlannedTimepoint, "tp_6"), Some(SourceTag::Both));
        assert_eq!(ledger.tag(EntityKind::PlannedTimepoint, "tp_8"), Some(SourceTag::Vision));
        assert_eq!(ledger.cell_tag(&CellKey::new("act_1", "tp_6")), Some(SourceTag::Vision));
        assert_eq!(ledger.redirected_to(EntityKind::PlannedTimepoint, "tp_8"), Some("tp_6"));
    }

    #[test]
    fn remapped_renames_entities_and_cells() {
        let ledger = ProvenanceLedger::for_design(&design(), SourceTag::Vision);
        let mut renames = IdRenames::new();
        renames
            .entry(EntityKind::Activity)
            .or_default()
            .insert("act_1".into(), "act_01".into());
        let remapped = ledger.remapped(&renames);
        assert_eq!(remapped.cell_tag(&CellKey::new("act_01", "tp_1")), Some(SourceTag::Vision));
        assert_eq!(remapped.cell_count(), 1);
    }

    #[test]
    fn tag_counts_cover_entities_and_cells() {
        let mut ledger = ProvenanceLedger::for_design(&design(), SourceTag::Text);
        ledger.record(EntityKind::Epoch, "epoch_1", SourceTag::Both);
        assert_eq!(ledger.entity_tag_counts(), TagCounts { text: 2, vision: 0, both: 1 });
        assert_eq!(ledger.cell_tag_counts().total(), 1);
    }
}
