//! Reconciliation of the text and vision extractions into one graph.
//!
//! Entities are aligned kind by kind (epochs, groups, encounters,
//! timepoints, activities). After each kind the vision graph is renamed into
//! the merged ID space, so later kinds compare references directly. Ticks
//! are merged last as a union of cells, then the merged graph gets the same
//! duplicate collapse the normalizer applies.

mod align;
mod merge;
mod policy;
mod similarity;

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use soa_model::{Entity, EntityKind, Epoch, SoaConfig, SoaDocument, SourceTag, StudyDesign};
use thiserror::Error;
use tracing::{info, warn};

pub use align::{Alignment, AlignmentSummary, Slot, Tie, align, merge_order};
pub use merge::CellUnion;
pub use policy::{
    Adjudication, Adjudicator, FieldConflict, FieldResolution, PolicyAdjudicator, Winner,
};
pub use similarity::{
    Candidate, ExactNameScorer, FuzzyNameScorer, NamePositionScorer, Scorers, SimilarityScorer,
    name_similarity,
};

use self::merge::{
    merge_activity, merge_collection, merge_encounter, merge_epoch, merge_group, merge_ticks,
    merge_timepoint, unique_id, vision_renames,
};
use self::policy::FieldResolver;
use crate::dedupe::{Redirect, collapse_duplicates};
use crate::normalize::NormalizedSource;
use crate::provenance::{IdRenames, ProvenanceLedger};
use crate::text::normalize_label;

/// The two sources cannot be reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconciliationFailure {
    #[error("{tag} extraction has no encounters, timepoints or activities")]
    EmptySource { tag: SourceTag },
    #[error("sources describe different studies (text: {text}, vision: {vision})")]
    StudyMismatch { text: String, vision: String },
}

/// A kind with no entities in one or both sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageGap {
    pub kind: EntityKind,
    /// `Both` when neither source has the kind.
    pub missing_from: SourceTag,
}

/// A vision ID moved to a fresh ID because the text source already used it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionRename {
    pub kind: EntityKind,
    pub from: String,
    pub to: String,
}

/// Two candidate pairs scored equally; the one earlier in document order won.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TieBreak {
    pub kind: EntityKind,
    pub score: f64,
    pub kept_text: String,
    pub kept_vision: String,
    pub passed_text: String,
    pub passed_vision: String,
}

/// Audit trail of one reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub structural_source: SourceTag,
    pub alignments: Vec<AlignmentSummary>,
    pub tie_breaks: Vec<TieBreak>,
    pub coverage_gaps: Vec<CoverageGap>,
    pub vision_renames: Vec<VisionRename>,
    pub resolutions: Vec<FieldResolution>,
    pub cells: CellUnion,
    pub epochs_renumbered: bool,
    pub redirects: Vec<Redirect>,
    pub dropped_ticks: Vec<String>,
}

/// The merged document with its ledger and report.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub document: SoaDocument,
    pub ledger: ProvenanceLedger,
    pub report: ReconciliationReport,
}

/// Aligns and merges two normalized sources.
pub struct ReconciliationEngine<'a> {
    config: &'a SoaConfig,
    scorers: Scorers,
    adjudicator: Box<dyn Adjudicator + 'a>,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(config: &'a SoaConfig) -> Self {
        Self {
            config,
            scorers: Scorers::from_options(&config.reconcile),
            adjudicator: Box::new(PolicyAdjudicator),
        }
    }

    /// Replace the similarity scorers.
    pub fn with_scorers(mut self, scorers: Scorers) -> Self {
        self.scorers = scorers;
        self
    }

    /// Consult an adjudicator before falling back to the field policy.
    pub fn with_adjudicator(mut self, adjudicator: impl Adjudicator + 'a) -> Self {
        self.adjudicator = Box::new(adjudicator);
        self
    }

    /// Merge the text and vision graphs.
    ///
    /// Neither input is modified. The merged ledger is the union of both
    /// ledgers after renames, so no source assertion is lost.
    pub fn reconcile(
        &self,
        text: &NormalizedSource,
        vision: &NormalizedSource,
    ) -> Result<Reconciled, ReconciliationFailure> {
        if text.tag != SourceTag::Text || vision.tag != SourceTag::Vision {
            warn!(text = %text.tag, vision = %vision.tag, "unexpected source tags for reconciliation");
        }
        let text_design = &text.document.study_design;
        let vision_source = &vision.document.study_design;
        for (design, tag) in [(text_design, SourceTag::Text), (vision_source, SourceTag::Vision)] {
            if !design.has_schedule_content() {
                return Err(ReconciliationFailure::EmptySource { tag });
            }
        }
        check_same_study(text_design, vision_source)?;

        let options = &self.config.reconcile;
        let structural = options.structural_source;
        let mut resolver = FieldResolver::new(
            &options.field_policy,
            self.adjudicator.as_ref(),
            &self.config.defaults.not_specified,
        );
        let mut vision_design = vision_source.clone();
        let mut state = MergeState::new(&text.ledger);
        let mut merged = StudyDesign::default();

        merged.epochs = state.reconcile_kind(
            &text_design.epochs,
            &mut vision_design,
            |d| d.epochs.as_slice(),
            self.scorers.epochs.as_ref(),
            structural,
            |t, v| merge_epoch(&mut resolver, t, v),
        );
        merged.activity_groups = state.reconcile_kind(
            &text_design.activity_groups,
            &mut vision_design,
            |d| d.activity_groups.as_slice(),
            self.scorers.activity_groups.as_ref(),
            structural,
            |t, v| merge_group(&mut resolver, t, v),
        );
        merged.encounters = state.reconcile_kind(
            &text_design.encounters,
            &mut vision_design,
            |d| d.encounters.as_slice(),
            self.scorers.encounters.as_ref(),
            structural,
            |t, v| merge_encounter(&mut resolver, t, v),
        );
        merged.planned_timepoints = state.reconcile_kind(
            &text_design.planned_timepoints,
            &mut vision_design,
            |d| d.planned_timepoints.as_slice(),
            self.scorers.planned_timepoints.as_ref(),
            structural,
            |t, v| merge_timepoint(&mut resolver, t, v),
        );
        merged.activities = state.reconcile_kind(
            &text_design.activities,
            &mut vision_design,
            |d| d.activities.as_slice(),
            self.scorers.activities.as_ref(),
            structural,
            |t, v| merge_activity(&mut resolver, t, v),
        );

        let (ticks, tick_renames, cells) = merge_ticks(
            &text_design.activity_timepoints,
            &vision_design.activity_timepoints,
            structural,
        );
        merged.activity_timepoints = ticks;
        state
            .renames
            .entry(EntityKind::ActivityTimepoint)
            .or_default()
            .extend(tick_renames);

        merged.id = resolver.required("studyDesign.id", "", &text_design.id, &vision_source.id);
        merged.name =
            resolver.required("studyDesign.name", "", &text_design.name, &vision_source.name);
        merged.study_id = resolver.optional(
            "studyDesign.studyId",
            "",
            text_design.study_id.as_deref(),
            vision_source.study_id.as_deref(),
        );
        merged.study_title = resolver.optional(
            "studyDesign.studyTitle",
            "",
            text_design.study_title.as_deref(),
            vision_source.study_title.as_deref(),
        );

        let epochs_renumbered = renumber_colliding_positions(&mut merged.epochs);
        let collapse = collapse_duplicates(&mut merged);

        state.rename_dropped_vision_ids(&text.ledger, &vision.ledger, &merged);
        let mut ledger = text.ledger.merge(&vision.ledger.remapped(&state.renames));
        for redirect in &collapse.redirects {
            ledger.redirect(redirect.kind, &redirect.dropped, &redirect.survivor);
        }

        let coverage_gaps = coverage_gaps(text_design, vision_source);
        for gap in &coverage_gaps {
            warn!(kind = %gap.kind, missing_from = %gap.missing_from, "coverage gap");
        }

        info!(
            epochs = merged.epochs.len(),
            encounters = merged.encounters.len(),
            timepoints = merged.planned_timepoints.len(),
            activities = merged.activities.len(),
            ticks = merged.activity_timepoints.len(),
            cells_both = cells.both,
            cells_text_only = cells.text_only,
            cells_vision_only = cells.vision_only,
            "reconciled extractions"
        );

        let report = ReconciliationReport {
            structural_source: structural,
            alignments: state.alignments,
            tie_breaks: state.tie_breaks,
            coverage_gaps,
            vision_renames: state.vision_renames,
            resolutions: resolver.into_resolutions(),
            cells,
            epochs_renumbered,
            redirects: collapse.redirects,
            dropped_ticks: collapse.dropped_ticks,
        };
        Ok(Reconciled {
            document: SoaDocument::new(self.config, merged),
            ledger,
            report,
        })
    }
}

#[derive(Default)]
struct MergeState {
    renames: IdRenames,
    /// IDs the text source dropped during normalization, per kind.
    reserved: BTreeMap<EntityKind, BTreeSet<String>>,
    alignments: Vec<AlignmentSummary>,
    tie_breaks: Vec<TieBreak>,
    vision_renames: Vec<VisionRename>,
}

impl MergeState {
    fn new(text_ledger: &ProvenanceLedger) -> Self {
        let mut reserved: BTreeMap<EntityKind, BTreeSet<String>> = BTreeMap::new();
        for kind in EntityKind::all() {
            for (dropped, _) in text_ledger.redirects(*kind) {
                reserved.entry(*kind).or_default().insert(dropped.to_string());
            }
        }
        Self {
            reserved,
            ..Self::default()
        }
    }

    /// Move IDs the vision source dropped during normalization out of the
    /// merged ID space.
    ///
    /// Dropped IDs stay in the vision ledger with their redirects. Left as
    /// they are, one that matches a merged ID would tag that entity as seen
    /// by vision and redirect it.
    fn rename_dropped_vision_ids(
        &mut self,
        text_ledger: &ProvenanceLedger,
        vision_ledger: &ProvenanceLedger,
        merged: &StudyDesign,
    ) {
        for &kind in EntityKind::all() {
            let dropped: Vec<&str> = vision_ledger.redirects(kind).map(|(id, _)| id).collect();
            if dropped.is_empty() {
                continue;
            }
            let renames = self.renames.entry(kind).or_default();
            let mut taken: BTreeSet<String> = merged
                .ids(kind)
                .into_iter()
                .map(str::to_string)
                .chain(text_ledger.entities(kind).map(|(id, _)| id.to_string()))
                .chain(renames.values().cloned())
                .collect();
            for id in dropped {
                let unique = unique_id(id, &mut taken);
                if unique == id {
                    continue;
                }
                warn!(%kind, from = %id, to = %unique, "dropped vision ID collides with a merged ID; renamed");
                renames.insert(id.to_string(), unique.clone());
                self.vision_renames.push(VisionRename {
                    kind,
                    from: id.to_string(),
                    to: unique,
                });
            }
        }
    }

    /// Align one kind, move the vision graph into the merged ID space and
    /// lay out the merged collection.
    fn reconcile_kind<T: Entity + Clone>(
        &mut self,
        text: &[T],
        vision_design: &mut StudyDesign,
        items: fn(&StudyDesign) -> &[T],
        scorer: &dyn SimilarityScorer<T>,
        structural: SourceTag,
        merge_pair: impl FnMut(&T, &T) -> T,
    ) -> Vec<T> {
        let kind = T::KIND;
        let alignment = align(text, items(vision_design), scorer);
        self.alignments.push(alignment.summary(kind));
        for tie in &alignment.ties {
            let vision_items = items(vision_design);
            let tie_break = TieBreak {
                kind,
                score: tie.score,
                kept_text: text[tie.kept.0].id().to_string(),
                kept_vision: vision_items[tie.kept.1].id().to_string(),
                passed_text: text[tie.passed_over.0].id().to_string(),
                passed_vision: vision_items[tie.passed_over.1].id().to_string(),
            };
            warn!(
                %kind,
                kept = %format_args!("{}~{}", tie_break.kept_text, tie_break.kept_vision),
                passed_over = %format_args!("{}~{}", tie_break.passed_text, tie_break.passed_vision),
                "equal alignment scores; kept the earlier pair"
            );
            self.tie_breaks.push(tie_break);
        }
        let renames = vision_renames(
            text,
            items(vision_design),
            &alignment,
            self.reserved.get(&kind).unwrap_or(&BTreeSet::new()),
        );
        let aligned_vision: BTreeSet<&str> = alignment
            .pairs
            .iter()
            .map(|&(_, v)| items(vision_design)[v].id())
            .collect();
        for (from, to) in &renames {
            if aligned_vision.contains(from.as_str()) {
                continue;
            }
            warn!(%kind, %from, %to, "vision ID collides with text ID; renamed");
            self.vision_renames.push(VisionRename {
                kind,
                from: from.clone(),
                to: to.clone(),
            });
        }
        vision_design.rename_ids(kind, &renames);
        self.renames.entry(kind).or_default().extend(renames);
        merge_collection(text, items(vision_design), &alignment, structural, merge_pair)
    }
}

/// Fail only when neither study identifier contains the other.
///
/// `ABC-123` and `ABC-123 Amendment 2` describe the same study.
fn check_same_study(text: &StudyDesign, vision: &StudyDesign) -> Result<(), ReconciliationFailure> {
    let (Some(t), Some(v)) = (&text.study_id, &vision.study_id) else {
        return Ok(());
    };
    let (nt, nv) = (normalize_label(t), normalize_label(v));
    if nt.is_empty() || nv.is_empty() || nt == nv {
        return Ok(());
    }
    if contains_words(&nt, &nv) || contains_words(&nv, &nt) {
        warn!(text = %t, vision = %v, "study identifiers differ in wording; treating as one study");
        return Ok(());
    }
    Err(ReconciliationFailure::StudyMismatch {
        text: t.clone(),
        vision: v.clone(),
    })
}

/// Whether the words of `needle` appear contiguously in `haystack`.
fn contains_words(haystack: &str, needle: &str) -> bool {
    let haystack: Vec<&str> = haystack.split(' ').collect();
    let needle: Vec<&str> = needle.split(' ').collect();
    haystack.windows(needle.len()).any(|window| window == needle.as_slice())
}

/// Renumber epoch positions 1..n in merged order when any two collide.
fn renumber_colliding_positions(epochs: &mut [Epoch]) -> bool {
    let mut seen = BTreeSet::new();
    let collides = epochs
        .iter()
        .filter_map(|epoch| epoch.position)
        .any(|position| !seen.insert(position));
    if !collides {
        return false;
    }
    info!("epoch positions collide after merge; renumbering in merged order");
    for (position, epoch) in (1u32..).zip(epochs.iter_mut()) {
        epoch.position = Some(position);
    }
    true
}

fn coverage_gaps(text: &StudyDesign, vision: &StudyDesign) -> Vec<CoverageGap> {
    EntityKind::all()
        .iter()
        .filter_map(|&kind| {
            let missing_from = match (text.count(kind) == 0, vision.count(kind) == 0) {
                (true, true) => SourceTag::Both,
                (true, false) => SourceTag::Text,
                (false, true) => SourceTag::Vision,
                (false, false) => return None,
            };
            Some(CoverageGap { kind, missing_from })
        })
        .collect()
}
