//! Terminal-visit detection and duplicate collapse.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use soa_model::{EntityKind, PlannedTimepoint, StudyDesign};
use tracing::{debug, info};

use crate::text::normalize_label;

/// Terminal visits that must appear at most once per encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalKind {
    EndOfStudy,
    EndOfTreatment,
    EarlyTermination,
}

impl fmt::Display for TerminalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EndOfStudy => "end of study",
            Self::EndOfTreatment => "end of treatment",
            Self::EarlyTermination => "early termination",
        })
    }
}

const END_OF_STUDY_PHRASES: &[&str] = &[
    "end of study",
    "end of trial",
    "study completion",
    "study completion visit",
    "final visit",
    "final study visit",
];
const END_OF_STUDY_TOKENS: &[&str] = &["eos", "eosv"];

const END_OF_TREATMENT_PHRASES: &[&str] = &[
    "end of treatment",
    "end of therapy",
    "treatment completion",
];
const END_OF_TREATMENT_TOKENS: &[&str] = &["eot", "eotv"];

const EARLY_TERMINATION_PHRASES: &[&str] = &[
    "early termination",
    "early discontinuation",
    "early withdrawal",
    "premature discontinuation",
    "premature termination",
];
const EARLY_TERMINATION_TOKENS: &[&str] = &["et", "ed", "etv", "ptv"];

/// Classify a visit label as a terminal visit.
///
/// `"End of Study (EOS)"`, `"EOS"` and `"Final Visit"` all classify as
/// [`TerminalKind::EndOfStudy`]. A label naming two terminal kinds takes the
/// first of end of study, end of treatment, early termination.
pub fn terminal_kind(label: &str) -> Option<TerminalKind> {
    let normalized = normalize_label(label);
    if normalized.is_empty() {
        return None;
    }
    let tokens: BTreeSet<&str> = normalized.split(' ').collect();
    let matches = |phrases: &[&str], abbreviations: &[&str]| {
        phrases.iter().any(|phrase| contains_phrase(&normalized, phrase))
            || abbreviations.iter().any(|abbr| tokens.contains(abbr))
    };
    if matches(END_OF_STUDY_PHRASES, END_OF_STUDY_TOKENS) {
        Some(TerminalKind::EndOfStudy)
    } else if matches(END_OF_TREATMENT_PHRASES, END_OF_TREATMENT_TOKENS) {
        Some(TerminalKind::EndOfTreatment)
    } else if matches(EARLY_TERMINATION_PHRASES, EARLY_TERMINATION_TOKENS) {
        Some(TerminalKind::EarlyTermination)
    } else {
        None
    }
}

fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    normalized == phrase
        || normalized.starts_with(&format!("{phrase} "))
        || normalized.ends_with(&format!(" {phrase}"))
        || normalized.contains(&format!(" {phrase} "))
}

fn timepoint_terminal_kind(timepoint: &PlannedTimepoint) -> Option<TerminalKind> {
    terminal_kind(&timepoint.name).or_else(|| terminal_kind(&timepoint.value_label))
}

/// A duplicate collapsed into a surviving entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub kind: EntityKind,
    pub dropped: String,
    pub survivor: String,
    pub reason: String,
}

/// Result of a duplicate collapse pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollapseOutcome {
    pub redirects: Vec<Redirect>,
    /// IDs of activity timepoints removed because their cell was already ticked.
    pub dropped_ticks: Vec<String>,
}

impl CollapseOutcome {
    pub fn is_empty(&self) -> bool {
        self.redirects.is_empty() && self.dropped_ticks.is_empty()
    }
}

/// Collapse duplicate terminal timepoints and duplicate ticks.
pub fn collapse_duplicates(design: &mut StudyDesign) -> CollapseOutcome {
    let redirects = collapse_terminal_timepoints(design);
    let dropped_ticks = collapse_duplicate_ticks(design);
    CollapseOutcome {
        redirects,
        dropped_ticks,
    }
}

/// Keep one timepoint per (encounter, terminal kind).
///
/// The survivor is the earliest timepoint in document order. Activity
/// timepoints pointing at a dropped timepoint are redirected to the survivor.
/// Timepoints without an encounter link are never collapsed.
pub fn collapse_terminal_timepoints(design: &mut StudyDesign) -> Vec<Redirect> {
    let mut survivors: BTreeMap<(String, TerminalKind), String> = BTreeMap::new();
    let mut renames: BTreeMap<String, String> = BTreeMap::new();
    let mut redirects = Vec::new();

    for timepoint in &design.planned_timepoints {
        let Some(kind) = timepoint_terminal_kind(timepoint) else {
            continue;
        };
        let Some(encounter) = timepoint.encounter_id.clone() else {
            debug!(
                timepoint = %timepoint.id,
                terminal = %kind,
                "terminal timepoint has no encounter; not collapsed"
            );
            continue;
        };
        let key = (encounter, kind);
        match survivors.get(&key) {
            Some(survivor) if survivor != &timepoint.id => {
                info!(
                    dropped = %timepoint.id,
                    survivor = %survivor,
                    terminal = %kind,
                    "collapsed duplicate terminal timepoint; kept earliest"
                );
                renames.insert(timepoint.id.clone(), survivor.clone());
                redirects.push(Redirect {
                    kind: EntityKind::PlannedTimepoint,
                    dropped: timepoint.id.clone(),
                    survivor: survivor.clone(),
                    reason: format!("duplicate {kind} timepoint"),
                });
            }
            Some(_) => {}
            None => {
                survivors.insert(key, timepoint.id.clone());
            }
        }
    }

    if renames.is_empty() {
        return redirects;
    }

    design
        .planned_timepoints
        .retain(|timepoint| !renames.contains_key(&timepoint.id));
    design.remap_references(EntityKind::PlannedTimepoint, &renames);
    redirects
}

/// Drop activity timepoints whose cell is already ticked, keeping the first.
pub fn collapse_duplicate_ticks(design: &mut StudyDesign) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut dropped = Vec::new();
    design.activity_timepoints.retain(|tick| {
        let key = tick.cell();
        if seen.insert(key) {
            true
        } else {
            dropped.push(tick.id.clone());
            false
        }
    });
    dropped
}

#[cfg(test)]
mod tests {
    use soa_model::ActivityTimepoint;

    use super::*;

    fn timepoint(id: &str, name: &str, encounter: &str) -> PlannedTimepoint {
        PlannedTimepoint {
            id: id.into(),
            name: name.into(),
            encounter_id: Some(encounter.into()),
            ..PlannedTimepoint::default()
        }
    }

    fn tick(id: &str, activity: &str, timepoint: &str) -> ActivityTimepoint {
        ActivityTimepoint {
            id: id.into(),
            activity_id: activity.into(),
            planned_timepoint_id: timepoint.into(),
        }
    }

    #[test]
    fn classifies_terminal_labels() {
        assert_eq!(terminal_kind("End of Study"), Some(TerminalKind::EndOfStudy));
        assert_eq!(terminal_kind("EOS"), Some(TerminalKind::EndOfStudy));
        assert_eq!(terminal_kind("Final Visit"), Some(TerminalKind::EndOfStudy));
        assert_eq!(terminal_kind("EOT"), Some(TerminalKind::EndOfTreatment));
        assert_eq!(terminal_kind("Early Termination/ET"), Some(TerminalKind::EarlyTermination));
        assert_eq!(terminal_kind("Screening"), None);
        assert_eq!(terminal_kind("Retest"), None);
    }

    #[test]
    fn collapses_terminal_timepoints_per_encounter() {
        let mut design = StudyDesign::new("sd", "Design");
        design.planned_timepoints = vec![
            timepoint("tp_6", "End of Study", "enc_6"),
            timepoint("tp_8", "EOS", "enc_6"),
            timepoint("tp_9", "EOS", "enc_7"),
        ];
        design.activity_timepoints = vec![
            tick("at_1", "act_1", "tp_6"),
            tick("at_2", "act_1", "tp_8"),
            tick("at_3", "act_2", "tp_8"),
        ];

        let outcome = collapse_duplicates(&mut design);

        assert_eq!(design.ids(EntityKind::PlannedTimepoint), vec!["tp_6", "tp_9"]);
        assert_eq!(outcome.redirects.len(), 1);
        assert_eq!(outcome.redirects[0].dropped, "tp_8");
        assert_eq!(outcome.redirects[0].survivor, "tp_6");
        assert_eq!(outcome.dropped_ticks, vec!["at_2".to_string()]);
        assert!(
            design
                .activity_timepoints
                .iter()
                .all(|tick| tick.planned_timepoint_id != "tp_8")
        );
    }

    #[test]
    fn unlinked_terminal_timepoints_are_kept_apart() {
        let mut design = StudyDesign::new("sd", "Design");
        let mut first = timepoint("tp_1", "End of Study", "enc_1");
        first.encounter_id = None;
        let mut second = timepoint("tp_2", "EOS", "enc_1");
        second.encounter_id = None;
        design.planned_timepoints = vec![first, second];

        assert!(collapse_duplicates(&mut design).is_empty());
        assert_eq!(design.ids(EntityKind::PlannedTimepoint), vec!["tp_1", "tp_2"]);
    }

    #[test]
    fn non_terminal_timepoints_are_untouched() {
        let mut design = StudyDesign::new("sd", "Design");
        design.planned_timepoints = vec![
            timepoint("tp_1", "Day 1", "enc_1"),
            timepoint("tp_2", "Day 1", "enc_1"),
        ];
        assert!(collapse_duplicates(&mut design).is_empty());
        assert_eq!(design.planned_timepoints.len(), 2);
    }
}
