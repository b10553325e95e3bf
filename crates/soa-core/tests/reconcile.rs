use std::collections::BTreeSet;

use serde_json::{Value, json};
use soa_core::dedupe::{TerminalKind, terminal_kind};
use soa_core::normalize::{NormalizedSource, Normalizer};
use soa_core::reconcile::{
    Adjudication, Adjudicator, FieldConflict, ReconciliationEngine, ReconciliationFailure, Winner,
};
use soa_model::{CellKey, EntityKind, SoaConfig, SourceTag};

fn text_extraction() -> Value {
    json!({
        "studyDesign": {
            "id": "sd-1",
            "name": "Main Design",
            "studyId": "ABC-123",
            "epochs": [
                {"id": "epoch-1", "name": "Screening", "position": 1},
                {"id": "epoch-2", "name": "Treatment", "position": 2}
            ],
            "encounters": [
                {"id": "enc-1", "name": "Visit 1 - Week -2", "epochId": "epoch-1"},
                {"id": "enc-2", "name": "Visit 2 (Day 1)", "epochId": "epoch-2"},
                {"id": "enc-3", "name": "End of Study", "epochId": "epoch-2"}
            ],
            "plannedTimepoints": [
                {"id": "tp-1", "name": "Visit 1", "encounterId": "enc-1"},
                {"id": "tp-2", "name": "Visit 2", "encounterId": "enc-2"},
                {"id": "tp-3", "name": "End of Study", "encounterId": "enc-3"}
            ],
            "activityGroups": [{"id": "grp-1", "name": "Laboratory"}],
            "activities": [
                {"id": "act-1", "name": "Informed Consent"},
                {"id": "act-2", "name": "Blood Draw", "activityGroupId": "grp-1"},
                {"id": "act-3", "name": "Hematology", "activityGroupId": "grp-1"}
            ],
            "activityTimepoints": [
                {"id": "at-1", "activityId": "act-1", "plannedTimepointId": "tp-1"},
                {"id": "at-2", "activityId": "act-2", "plannedTimepointId": "tp-2"},
                {"id": "at-3", "activityId": "act-2", "plannedTimepointId": "tp-3"},
                {"id": "at-4", "activityId": "act-3", "plannedTimepointId": "tp-2"}
            ]
        }
    })
}

fn vision_extraction() -> Value {
    json!({
        "studyDesign": {
            "id": "sd_1",
            "name": "Main Design",
            "studyId": "ABC-123",
            "epochs": [
                {"id": "epoch_1", "name": "Screening", "position": 1},
                {"id": "epoch_2", "name": "Treatment", "position": 2}
            ],
            "encounters": [
                {"id": "enc_1", "name": "Visit 1", "epochId": "epoch_1"},
                {"id": "enc_2", "name": "Visit 2", "epochId": "epoch_2"},
                {"id": "enc_3", "name": "End of Study", "epochId": "epoch_2"}
            ],
            "plannedTimepoints": [
                {"id": "tp_1", "name": "Visit 1", "encounterId": "enc_1"},
                {"id": "tp_2", "name": "Visit 2", "encounterId": "enc_2"},
                {"id": "tp_8", "name": "EOS", "encounterId": "enc_3"}
            ],
            "activityGroups": [{"id": "grp_1", "name": "Laboratory"}],
            "activities": [
                {"id": "act_1", "name": "Informed consent"},
                {"id": "act_2", "name": "Blood draw", "activityGroupId": "grp_1"},
                {"id": "act_3", "name": "Haematology", "activityGroupId": "grp_1"},
                {"id": "act_4", "name": "Vital Signs"}
            ],
            "activityTimepoints": [
                {"id": "at_1", "activityId": "act_1", "plannedTimepointId": "tp_1"},
                {"id": "at_2", "activityId": "act_3", "plannedTimepointId": "tp_2"},
                {"id": "at_3", "activityId": "act_2", "plannedTimepointId": "tp_8"},
                {"id": "at_4", "activityId": "act_4", "plannedTimepointId": "tp_2"}
            ]
        }
    })
}

fn sources(config: &SoaConfig) -> (NormalizedSource, NormalizedSource) {
    let normalizer = Normalizer::new(config);
    let text = normalizer
        .normalize(&text_extraction(), SourceTag::Text)
        .expect("text");
    let vision = normalizer
        .normalize(&vision_extraction(), SourceTag::Vision)
        .expect("vision");
    (text, vision)
}

#[test]
fn aligned_encounter_keeps_text_timing() {
    let config = SoaConfig::default();
    let (text, vision) = sources(&config);
    let merged = ReconciliationEngine::new(&config)
        .reconcile(&text, &vision)
        .expect("reconcile");
    let design = &merged.document.study_design;

    assert_eq!(design.encounters.len(), 3);
    let encounter = design.encounter("enc_1").expect("enc_1");
    assert_eq!(encounter.name, "Visit 1");
    assert_eq!(encounter.timing.as_deref(), Some("Week -2"));
    assert_eq!(
        merged.ledger.tag(EntityKind::Encounter, "enc_1"),
        Some(SourceTag::Both)
    );
}

#[test]
fn text_only_tick_survives_with_text_tag() {
    let config = SoaConfig::default();
    let (text, vision) = sources(&config);
    let merged = ReconciliationEngine::new(&config)
        .reconcile(&text, &vision)
        .expect("reconcile");
    let design = &merged.document.study_design;

    let cell = CellKey::new("act_2", "tp_2");
    assert!(design.activity_timepoints.iter().any(|t| t.cell() == cell));
    assert_eq!(merged.ledger.cell_tag(&cell), Some(SourceTag::Text));

    let shared = CellKey::new("act_1", "tp_1");
    assert_eq!(merged.ledger.cell_tag(&shared), Some(SourceTag::Both));
    let vision_only = CellKey::new("act_4", "tp_2");
    assert_eq!(merged.ledger.cell_tag(&vision_only), Some(SourceTag::Vision));
}

#[test]
fn duplicate_end_of_study_collapses_to_one() {
    let config = SoaConfig::default();
    let (text, vision) = sources(&config);
    let merged = ReconciliationEngine::new(&config)
        .reconcile(&text, &vision)
        .expect("reconcile");
    let design = &merged.document.study_design;

    let terminal: Vec<&str> = design
        .planned_timepoints
        .iter()
        .filter(|tp| terminal_kind(&tp.name) == Some(TerminalKind::EndOfStudy))
        .map(|tp| tp.id.as_str())
        .collect();
    assert_eq!(terminal.len(), 1);
    let survivor = terminal[0];
    let dropped = if survivor == "tp_3" { "tp_8" } else { "tp_3" };

    assert!(
        design
            .activity_timepoints
            .iter()
            .all(|t| t.planned_timepoint_id != dropped)
    );
    assert_eq!(
        merged.ledger.redirected_to(EntityKind::PlannedTimepoint, dropped),
        Some(survivor)
    );
    assert_eq!(merged.report.redirects.len(), 1);
    assert_eq!(
        merged.ledger.cell_tag(&CellKey::new("act_2", survivor)),
        Some(SourceTag::Both)
    );
}

#[test]
fn merged_graph_is_referentially_closed() {
    let config = SoaConfig::default();
    let (text, vision) = sources(&config);
    let merged = ReconciliationEngine::new(&config)
        .reconcile(&text, &vision)
        .expect("reconcile");
    let design = &merged.document.study_design;

    for link in design.outgoing_references() {
        assert!(
            design.contains(link.reference.target, link.reference.id),
            "{} {} -> {} {}",
            link.source,
            link.source_id,
            link.reference.target,
            link.reference.id
        );
    }
    for kind in EntityKind::all() {
        let ids = design.ids(*kind);
        let unique: BTreeSet<&str> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len(), "duplicate {kind} ids");
    }
}

#[test]
fn every_source_tick_is_in_the_union() {
    let config = SoaConfig::default();
    let (text, vision) = sources(&config);
    let merged = ReconciliationEngine::new(&config)
        .reconcile(&text, &vision)
        .expect("reconcile");
    let design = &merged.document.study_design;
    let cells: BTreeSet<CellKey> = design.activity_timepoints.iter().map(|t| t.cell()).collect();

    for source in [&text, &vision] {
        for tick in &source.document.study_design.activity_timepoints {
            let timepoint = merged
                .ledger
                .redirected_to(EntityKind::PlannedTimepoint, &tick.planned_timepoint_id)
                .unwrap_or(&tick.planned_timepoint_id);
            assert!(
                cells.contains(&CellKey::new(tick.activity_id.clone(), timepoint)),
                "{} lost",
                tick.cell()
            );
        }
    }
}

#[test]
fn fuzzy_activity_names_align_and_text_wins_narrative() {
    let config = SoaConfig::default();
    let (text, vision) = sources(&config);
    let merged = ReconciliationEngine::new(&config)
        .reconcile(&text, &vision)
        .expect("reconcile");
    let design = &merged.document.study_design;

    assert_eq!(design.activities.len(), 4);
    let names: Vec<&str> = design.activities.iter().map(|a| a.name.as_str()).collect();
    assert!(names.contains(&"Hematology"));
    assert!(!names.contains(&"Haematology"));
    assert!(merged.report.resolutions.iter().any(|r| {
        r.field == "activity.name" && r.entity_id == "act_3" && r.winner == Winner::Text
    }));
    assert_eq!(
        merged.ledger.tag(EntityKind::Activity, "act_4"),
        Some(SourceTag::Vision)
    );
}

#[test]
fn reconciliation_is_deterministic() {
    let config = SoaConfig::default();
    let (text, vision) = sources(&config);
    let engine = ReconciliationEngine::new(&config);
    let first = engine.reconcile(&text, &vision).expect("first");
    let second = engine.reconcile(&text, &vision).expect("second");
    assert_eq!(first.document, second.document);
    assert_eq!(first.ledger, second.ledger);
}

#[test]
fn colliding_vision_ids_get_suffixes() {
    let config = SoaConfig::default();
    let normalizer = Normalizer::new(&config);
    let text = normalizer
        .normalize(&text_extraction(), SourceTag::Text)
        .expect("text");
    let mut raw = vision_extraction();
    raw["studyDesign"]["activities"][3]["id"] = json!("act_1");
    raw["studyDesign"]["activities"][0]["id"] = json!("act_9");
    raw["studyDesign"]["activityTimepoints"][0]["activityId"] = json!("act_9");
    raw["studyDesign"]["activityTimepoints"][3]["activityId"] = json!("act_1");
    let vision = normalizer
        .normalize(&raw, SourceTag::Vision)
        .expect("vision");

    let merged = ReconciliationEngine::new(&config)
        .reconcile(&text, &vision)
        .expect("reconcile");
    let design = &merged.document.study_design;

    let vital = design
        .activities
        .iter()
        .find(|a| a.name == "Vital Signs")
        .expect("vital signs");
    assert_eq!(vital.id, "act_1_v");
    assert!(
        design
            .activity_timepoints
            .iter()
            .any(|t| t.activity_id == "act_1_v" && t.planned_timepoint_id == "tp_2")
    );
    assert_eq!(merged.report.vision_renames.len(), 1);
}

struct PreferVisionNames;

impl Adjudicator for PreferVisionNames {
    fn adjudicate(&self, conflict: &FieldConflict<'_>) -> Adjudication {
        if conflict.field == "activity.name" {
            Adjudication::Resolved(conflict.vision.to_string())
        } else {
            Adjudication::DeferToPolicy
        }
    }
}

#[test]
fn adjudicator_decides_before_policy() {
    let config = SoaConfig::default();
    let (text, vision) = sources(&config);
    let merged = ReconciliationEngine::new(&config)
        .with_adjudicator(PreferVisionNames)
        .reconcile(&text, &vision)
        .expect("reconcile");
    let names: Vec<&str> = merged
        .document
        .study_design
        .activities
        .iter()
        .map(|a| a.name.as_str())
        .collect();
    assert!(names.contains(&"Haematology"));
}

#[test]
fn empty_source_is_rejected() {
    let config = SoaConfig::default();
    let normalizer = Normalizer::new(&config);
    let text = normalizer
        .normalize(&text_extraction(), SourceTag::Text)
        .expect("text");
    let vision = normalizer
        .normalize(&json!({"studyDesign": {"id": "sd_1", "epochs": []}}), SourceTag::Vision)
        .expect("vision");
    let failure = ReconciliationEngine::new(&config)
        .reconcile(&text, &vision)
        .expect_err("empty vision");
    assert_eq!(
        failure,
        ReconciliationFailure::EmptySource {
            tag: SourceTag::Vision
        }
    );
}

#[test]
fn different_studies_are_rejected() {
    let config = SoaConfig::default();
    let normalizer = Normalizer::new(&config);
    let text = normalizer
        .normalize(&text_extraction(), SourceTag::Text)
        .expect("text");
    let mut raw = vision_extraction();
    raw["studyDesign"]["studyId"] = json!("XYZ-999");
    let vision = normalizer
        .normalize(&raw, SourceTag::Vision)
        .expect("vision");
    let failure = ReconciliationEngine::new(&config)
        .reconcile(&text, &vision)
        .expect_err("mismatch");
    assert!(matches!(failure, ReconciliationFailure::StudyMismatch { .. }));
}

#[test]
fn text_structure_can_be_preferred() {
    let mut config = SoaConfig::default();
    config.reconcile.structural_source = SourceTag::Text;
    let (text, vision) = sources(&config);
    let merged = ReconciliationEngine::new(&config)
        .reconcile(&text, &vision)
        .expect("reconcile");
    let design = &merged.document.study_design;
    assert_eq!(design.activities[3].name, "Vital Signs");
    assert!(
        design
            .planned_timepoints
            .iter()
            .any(|tp| tp.id == "tp_3")
    );
}

#[test]
fn reconciled_ledger_snapshot() {
    let text = json!({
        "studyDesign": {
            "encounters": [{"id": "enc_1", "name": "Visit 1"}],
            "plannedTimepoints": [{"id": "tp_1", "name": "Visit 1", "encounterId": "enc_1"}],
            "activities": [{"id": "act_1", "name": "Informed Consent"}],
            "activityTimepoints": [
                {"id": "at_1", "activityId": "act_1", "plannedTimepointId": "tp_1"}
            ]
        }
    });
    let vision = json!({
        "studyDesign": {
            "encounters": [{"id": "enc_1", "name": "Visit 1"}],
            "plannedTimepoints": [{"id": "tp_1", "name": "Visit 1", "encounterId": "enc_1"}],
            "activities": [
                {"id": "act_1", "name": "Informed consent"},
                {"id": "act_2", "name": "Vital Signs"}
            ],
            "activityTimepoints": [
                {"id": "at_1", "activityId": "act_1", "plannedTimepointId": "tp_1"},
                {"id": "at_2", "activityId": "act_2", "plannedTimepointId": "tp_1"}
            ]
        }
    });
    let config = SoaConfig::default();
    let normalizer = Normalizer::new(&config);
    let text = normalizer.normalize(&text, SourceTag::Text).expect("text");
    let vision = normalizer.normalize(&vision, SourceTag::Vision).expect("vision");
    let merged = ReconciliationEngine::new(&config)
        .reconcile(&text, &vision)
        .expect("reconcile");

    insta::assert_json_snapshot!(merged.ledger, @r#"
    {
      "entities": {
        "epochs": {
          "epoch_1": "both"
        },
        "encounters": {
          "enc_1": "both"
        },
        "plannedTimepoints": {
          "tp_1": "both"
        },
        "activities": {
          "act_1": "both",
          "act_2": "vision"
        },
        "activityTimepoints": {
          "at_1": "both",
          "at_2": "vision"
        }
      },
      "cells": {
        "act_1|tp_1": "both",
        "act_2|tp_1": "vision"
      }
    }
    "#);
}

fn timing_header_extraction(headers: &[&str]) -> Value {
    let encounters: Vec<Value> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| json!({"id": format!("enc_{}", i + 1), "name": name}))
        .collect();
    let timepoints: Vec<Value> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| {
            json!({"id": format!("tp_{}", i + 1), "name": name, "encounterId": format!("enc_{}", i + 1)})
        })
        .collect();
    let ticks: Vec<Value> = (1..=headers.len())
        .map(|i| json!({"id": format!("at_{i}"), "activityId": "act_1", "plannedTimepointId": format!("tp_{i}")}))
        .collect();
    json!({
        "studyDesign": {
            "encounters": encounters,
            "plannedTimepoints": timepoints,
            "activities": [{"id": "act_1", "name": "Vital Signs"}],
            "activityTimepoints": ticks
        }
    })
}

#[test]
fn timing_only_headers_align_on_timing_across_column_counts() {
    let config = SoaConfig::default();
    let normalizer = Normalizer::new(&config);
    let text = normalizer
        .normalize(
            &timing_header_extraction(&["Screening", "Week 2", "Week 4"]),
            SourceTag::Text,
        )
        .expect("text");
    let vision = normalizer
        .normalize(
            &timing_header_extraction(&["Screening", "Day 1", "Week 2", "Week 4"]),
            SourceTag::Vision,
        )
        .expect("vision");
    let merged = ReconciliationEngine::new(&config)
        .reconcile(&text, &vision)
        .expect("reconcile");
    let design = &merged.document.study_design;

    let encounters = merged
        .report
        .alignments
        .iter()
        .find(|summary| summary.kind == EntityKind::Encounter)
        .expect("encounter alignment");
    assert_eq!((encounters.aligned, encounters.vision_only), (3, 1));
    assert_eq!(
        design.ids(EntityKind::Encounter),
        vec!["enc_1", "enc_2_v", "enc_2", "enc_3"]
    );
    let timing = |id: &str| design.encounter(id).and_then(|e| e.timing.clone());
    assert_eq!(timing("enc_2_v").as_deref(), Some("Day 1"));
    assert_eq!(timing("enc_2").as_deref(), Some("Week 2"));
    assert_eq!(timing("enc_3").as_deref(), Some("Week 4"));
    assert!(
        merged
            .report
            .resolutions
            .iter()
            .filter(|r| r.field == "encounter.timing")
            .all(|r| r.text_value == r.vision_value)
    );

    assert_eq!(
        merged.ledger.tag(EntityKind::Encounter, "enc_2_v"),
        Some(SourceTag::Vision)
    );
    assert_eq!(
        merged.ledger.tag(EntityKind::Encounter, "enc_2"),
        Some(SourceTag::Both)
    );
    assert_eq!(
        merged.ledger.cell_tag(&CellKey::new("act_1", "tp_2_v")),
        Some(SourceTag::Vision)
    );
    assert_eq!(
        merged.ledger.cell_tag(&CellKey::new("act_1", "tp_2")),
        Some(SourceTag::Both)
    );
}

fn terminal_extraction(second_timepoint: &str) -> Value {
    json!({
        "studyDesign": {
            "encounters": [
                {"id": "enc_1", "name": "Visit 1"},
                {"id": "enc_2", "name": "Visit 2"}
            ],
            "plannedTimepoints": [
                {"id": "tp_6", "name": "End of Study", "encounterId": "enc_2"},
                {"id": "tp_8", "name": second_timepoint, "encounterId": "enc_2"}
            ],
            "activities": [{"id": "act_1", "name": "Vital Signs"}],
            "activityTimepoints": [
                {"id": "at_1", "activityId": "act_1", "plannedTimepointId": "tp_8"},
                {"id": "at_2", "activityId": "act_1", "plannedTimepointId": "tp_6"}
            ]
        }
    })
}

fn reconcile_terminal(text_second: &str, vision_second: &str) -> soa_core::Reconciled {
    let config = SoaConfig::default();
    let normalizer = Normalizer::new(&config);
    let text = normalizer
        .normalize(&terminal_extraction(text_second), SourceTag::Text)
        .expect("text");
    let vision = normalizer
        .normalize(&terminal_extraction(vision_second), SourceTag::Vision)
        .expect("vision");
    ReconciliationEngine::new(&config)
        .reconcile(&text, &vision)
        .expect("reconcile")
}

#[test]
fn vision_ids_dropped_in_normalization_do_not_hit_text_entities() {
    let merged = reconcile_terminal("Predose", "EOS");
    let ledger = &merged.ledger;

    assert_eq!(
        merged.document.study_design.ids(EntityKind::PlannedTimepoint),
        vec!["tp_6", "tp_8"]
    );
    assert_eq!(
        ledger.tag(EntityKind::PlannedTimepoint, "tp_8"),
        Some(SourceTag::Text)
    );
    assert_eq!(ledger.redirected_to(EntityKind::PlannedTimepoint, "tp_8"), None);
    assert_eq!(
        ledger.tag(EntityKind::PlannedTimepoint, "tp_8_v"),
        Some(SourceTag::Vision)
    );
    assert_eq!(
        ledger.redirected_to(EntityKind::PlannedTimepoint, "tp_8_v"),
        Some("tp_6")
    );
    assert_eq!(
        ledger.tag(EntityKind::PlannedTimepoint, "tp_6"),
        Some(SourceTag::Both)
    );
    assert_eq!(
        ledger.cell_tag(&CellKey::new("act_1", "tp_8")),
        Some(SourceTag::Text)
    );
    assert!(
        merged
            .report
            .vision_renames
            .iter()
            .any(|r| r.from == "tp_8" && r.to == "tp_8_v")
    );
}

#[test]
fn text_ids_dropped_in_normalization_stay_reserved() {
    let merged = reconcile_terminal("EOS", "Predose");
    let ledger = &merged.ledger;

    assert_eq!(
        merged.document.study_design.ids(EntityKind::PlannedTimepoint),
        vec!["tp_6", "tp_8_v"]
    );
    assert_eq!(
        ledger.tag(EntityKind::PlannedTimepoint, "tp_8"),
        Some(SourceTag::Text)
    );
    assert_eq!(
        ledger.redirected_to(EntityKind::PlannedTimepoint, "tp_8"),
        Some("tp_6")
    );
    assert_eq!(
        ledger.tag(EntityKind::PlannedTimepoint, "tp_8_v"),
        Some(SourceTag::Vision)
    );
    assert_eq!(
        ledger.cell_tag(&CellKey::new("act_1", "tp_8_v")),
        Some(SourceTag::Vision)
    );
}

#[test]
fn amended_study_identifier_is_the_same_study() {
    let config = SoaConfig::default();
    let normalizer = Normalizer::new(&config);
    let text = normalizer
        .normalize(&text_extraction(), SourceTag::Text)
        .expect("text");
    let mut raw = vision_extraction();
    raw["studyDesign"]["studyId"] = json!("ABC-123 Amendment 2");
    let vision = normalizer
        .normalize(&raw, SourceTag::Vision)
        .expect("vision");
    let merged = ReconciliationEngine::new(&config)
        .reconcile(&text, &vision)
        .expect("same study");
    assert_eq!(
        merged.document.study_design.study_id.as_deref(),
        Some("ABC-123")
    );
}
