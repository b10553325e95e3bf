//! Pairwise similarity between entities of the two sources.
//!
//! Every aligned kind has its own scorer behind [`SimilarityScorer`], so
//! the matching rule for one kind can be swapped without touching the
//! assignment or merge code.

use rapidfuzz::distance::jaro_winkler;
use soa_model::{Activity, ActivityGroup, Encounter, Entity, Epoch, PlannedTimepoint, ReconcileOptions};

use crate::text::normalize_label;
use crate::timing::timing_anchor;

/// An entity together with its position in its source collection.
#[derive(Debug)]
pub struct Candidate<'a, T> {
    pub entity: &'a T,
    pub index: usize,
    pub total: usize,
}

impl<T> Clone for Candidate<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Candidate<'_, T> {}

impl<T> Candidate<'_, T> {
    /// Position scaled to `0.0..=1.0`.
    pub fn relative_position(&self) -> f64 {
        if self.total <= 1 {
            0.0
        } else {
            self.index as f64 / (self.total - 1) as f64
        }
    }
}

/// Scores how likely two entities describe the same thing.
pub trait SimilarityScorer<T> {
    /// Score in `0.0..=1.0`.
    fn score(&self, text: Candidate<'_, T>, vision: Candidate<'_, T>) -> f64;

    /// Pairs scoring below this are never aligned.
    fn min_score(&self) -> f64;
}

/// Aligns on normalized name equality only.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactNameScorer;

impl<T: Entity> SimilarityScorer<T> for ExactNameScorer {
    fn score(&self, text: Candidate<'_, T>, vision: Candidate<'_, T>) -> f64 {
        if same_label(text.entity.name(), vision.entity.name()) {
            1.0
        } else {
            0.0
        }
    }

    fn min_score(&self) -> f64 {
        1.0
    }
}

/// Name equality blended with positional proximity.
///
/// When both sides carry a timing offset (encounter timing, timepoint
/// description) the offsets decide: different offsets never align, whatever
/// the names say. Names of timing-only headers are generated from the row
/// number, so they cannot outvote the timing. For timepoints, a pair whose
/// encounter links disagree is penalized once encounters have been aligned
/// (both links then share one ID space).
#[derive(Debug, Clone, Copy)]
pub struct NamePositionScorer {
    pub positional_weight: f64,
    pub min_score: f64,
}

/// Multiplier applied when aligned timepoints point at different encounters.
const LINK_MISMATCH_FACTOR: f64 = 0.4;

/// Base score when names differ but timing labels agree.
const TIMING_MATCH_BASE: f64 = 0.8;

impl NamePositionScorer {
    fn blend<T>(&self, base: f64, text: Candidate<'_, T>, vision: Candidate<'_, T>) -> f64 {
        if base <= 0.0 {
            return 0.0;
        }
        let weight = self.positional_weight.clamp(0.0, 1.0);
        let proximity = 1.0 - (text.relative_position() - vision.relative_position()).abs();
        base * (1.0 - weight) + proximity * weight
    }
}

impl SimilarityScorer<Encounter> for NamePositionScorer {
    fn score(&self, text: Candidate<'_, Encounter>, vision: Candidate<'_, Encounter>) -> f64 {
        let base = name_timing_base(
            (text.entity.name.as_str(), text.entity.timing.as_deref()),
            (vision.entity.name.as_str(), vision.entity.timing.as_deref()),
        );
        self.blend(base, text, vision)
    }

    fn min_score(&self) -> f64 {
        self.min_score
    }
}

impl SimilarityScorer<PlannedTimepoint> for NamePositionScorer {
    fn score(
        &self,
        text: Candidate<'_, PlannedTimepoint>,
        vision: Candidate<'_, PlannedTimepoint>,
    ) -> f64 {
        let base = name_timing_base(
            (text.entity.name.as_str(), text.entity.description.as_deref()),
            (vision.entity.name.as_str(), vision.entity.description.as_deref()),
        );
        let score = self.blend(base, text, vision);
        match (&text.entity.encounter_id, &vision.entity.encounter_id) {
            (Some(a), Some(b)) if a != b => score * LINK_MISMATCH_FACTOR,
            _ => score,
        }
    }

    fn min_score(&self) -> f64 {
        self.min_score
    }
}

/// Base score of a `(name, timing)` pair before positional blending.
fn name_timing_base(text: (&str, Option<&str>), vision: (&str, Option<&str>)) -> f64 {
    let same_name = same_label(text.0, vision.0);
    match (text.1.and_then(timing_anchor), vision.1.and_then(timing_anchor)) {
        (Some(a), Some(b)) if a != b => 0.0,
        (Some(_), Some(_)) if same_name => 1.0,
        (Some(_), Some(_)) => TIMING_MATCH_BASE,
        _ if same_name => 1.0,
        _ if same_optional(text.1, vision.1) => TIMING_MATCH_BASE,
        _ => 0.0,
    }
}

/// Jaro-Winkler similarity on normalized names.
#[derive(Debug, Clone, Copy)]
pub struct FuzzyNameScorer {
    pub min_similarity: f64,
}

impl<T: Entity> SimilarityScorer<T> for FuzzyNameScorer {
    fn score(&self, text: Candidate<'_, T>, vision: Candidate<'_, T>) -> f64 {
        name_similarity(text.entity.name(), vision.entity.name())
    }

    fn min_score(&self) -> f64 {
        self.min_similarity
    }
}

/// Jaro-Winkler similarity of two labels after normalization.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_label(a);
    let b = normalize_label(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    jaro_winkler::similarity(a.chars(), b.chars())
}

fn same_label(a: &str, b: &str) -> bool {
    let a = normalize_label(a);
    !a.is_empty() && a == normalize_label(b)
}

fn same_optional(a: Option<&str>, b: Option<&str>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if same_label(a, b))
}

/// The scorer used for each aligned kind.
pub struct Scorers {
    pub epochs: Box<dyn SimilarityScorer<Epoch>>,
    pub activity_groups: Box<dyn SimilarityScorer<ActivityGroup>>,
    pub encounters: Box<dyn SimilarityScorer<Encounter>>,
    pub planned_timepoints: Box<dyn SimilarityScorer<PlannedTimepoint>>,
    pub activities: Box<dyn SimilarityScorer<Activity>>,
}

impl Scorers {
    pub fn from_options(options: &ReconcileOptions) -> Self {
        let positional = NamePositionScorer {
            positional_weight: options.positional_weight,
            min_score: options.name_min_score,
        };
        Self {
            epochs: Box::new(ExactNameScorer),
            activity_groups: Box::new(ExactNameScorer),
            encounters: Box::new(positional),
            planned_timepoints: Box::new(positional),
            activities: Box::new(FuzzyNameScorer {
                min_similarity: options.activity_min_similarity,
            }),
        }
    }
}

impl Default for Scorers {
    fn default() -> Self {
        Self::from_options(&ReconcileOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encounter(id: &str, name: &str) -> Encounter {
        Encounter {
            id: id.into(),
            name: name.into(),
            ..Encounter::default()
        }
    }

    fn candidate<T>(entity: &T, index: usize, total: usize) -> Candidate<'_, T> {
        Candidate {
            entity,
            index,
            total,
        }
    }

    #[test]
    fn fuzzy_names_tolerate_small_differences() {
        assert!(name_similarity("Hematology", "Haematology") > 0.9);
        assert!(name_similarity("Vital signs", "vital-signs") >= 1.0);
        assert!(name_similarity("ECG", "Urinalysis") < 0.9);
    }

    #[test]
    fn positional_scorer_prefers_nearby_equal_names() {
        let scorer = NamePositionScorer {
            positional_weight: 0.2,
            min_score: 0.5,
        };
        let text = encounter("enc_1", "Visit 1");
        let near = encounter("enc_1", "visit 1");
        let other = encounter("enc_2", "Visit 2");
        let same_spot =
            SimilarityScorer::<Encounter>::score(&scorer, candidate(&text, 0, 4), candidate(&near, 0, 4));
        let far =
            SimilarityScorer::<Encounter>::score(&scorer, candidate(&text, 0, 4), candidate(&near, 3, 4));
        let different =
            SimilarityScorer::<Encounter>::score(&scorer, candidate(&text, 0, 4), candidate(&other, 0, 4));
        assert!((same_spot - 1.0).abs() < f64::EPSILON);
        assert!(far < same_spot && far >= 0.5);
        assert!(different.abs() < f64::EPSILON);
    }

    #[test]
    fn different_timing_offsets_never_align() {
        let scorer = NamePositionScorer {
            positional_weight: 0.2,
            min_score: 0.5,
        };
        let mut text = encounter("enc_2", "Visit 2");
        text.timing = Some("Week 2".into());
        let mut shifted = encounter("enc_2", "Visit 2");
        shifted.timing = Some("Day 1".into());
        let mut later = encounter("enc_3", "Visit 3");
        later.timing = Some("Week 2 ± 3 days".into());

        let same_name =
            SimilarityScorer::<Encounter>::score(&scorer, candidate(&text, 1, 3), candidate(&shifted, 1, 4));
        let same_timing =
            SimilarityScorer::<Encounter>::score(&scorer, candidate(&text, 1, 3), candidate(&later, 2, 4));
        assert!(same_name.abs() < f64::EPSILON);
        assert!(same_timing >= scorer.min_score);
    }

    #[test]
    fn timepoints_on_different_encounters_fall_below_threshold() {
        let scorer = NamePositionScorer {
            positional_weight: 0.2,
            min_score: 0.5,
        };
        let text = PlannedTimepoint {
            id: "tp_1".into(),
            name: "Predose".into(),
            encounter_id: Some("enc_1".into()),
            ..PlannedTimepoint::default()
        };
        let mut vision = text.clone();
        vision.encounter_id = Some("enc_2".into());
        let score = SimilarityScorer::<PlannedTimepoint>::score(
            &scorer,
            candidate(&text, 0, 2),
            candidate(&vision, 0, 2),
        );
        assert!(score < scorer.min_score);
    }
}
