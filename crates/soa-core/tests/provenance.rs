use proptest::prelude::*;
use soa_core::provenance::ProvenanceLedger;
use soa_model::{CellKey, EntityKind, SourceTag};

fn tag_strategy() -> impl Strategy<Value = SourceTag> {
    prop_oneof![
        Just(SourceTag::Text),
        Just(SourceTag::Vision),
        Just(SourceTag::Both)
    ]
}

fn kind_strategy() -> impl Strategy<Value = EntityKind> {
    prop::sample::select(EntityKind::all().to_vec())
}

fn ledger_strategy() -> impl Strategy<Value = ProvenanceLedger> {
    let entities = prop::collection::vec((kind_strategy(), 0..4u8, tag_strategy()), 0..8);
    let cells = prop::collection::vec((0..3u8, 0..3u8, tag_strategy()), 0..6);
    let redirects = prop::collection::vec((0..4u8, 0..4u8), 0..2);
    (entities, cells, redirects).prop_map(|(entities, cells, redirects)| {
        let mut ledger = ProvenanceLedger::new();
        for (kind, id, tag) in entities {
            ledger.record(kind, format!("id_{id}"), tag);
        }
        for (activity, timepoint, tag) in cells {
            ledger.record_cell(CellKey::new(format!("act_{activity}"), format!("tp_{timepoint}")), tag);
        }
        for (dropped, survivor) in redirects {
            ledger.redirect(
                EntityKind::PlannedTimepoint,
                &format!("tp_{dropped}"),
                &format!("tp_{survivor}"),
            );
        }
        ledger
    })
}

proptest! {
    #[test]
    fn merge_is_commutative(a in ledger_strategy(), b in ledger_strategy()) {
        prop_assert_eq!(a.merge(&b), b.merge(&a));
    }

    #[test]
    fn merge_is_idempotent(a in ledger_strategy()) {
        prop_assert_eq!(a.merge(&a), a);
    }

    #[test]
    fn merge_never_drops_entries(a in ledger_strategy(), b in ledger_strategy()) {
        let merged = a.merge(&b);
        for kind in EntityKind::all() {
            for (id, tag) in a.entities(*kind).chain(b.entities(*kind)) {
                let merged_tag = merged.tag(*kind, id);
                prop_assert!(merged_tag.is_some_and(|t| t.includes(tag)));
            }
        }
        prop_assert!(merged.cell_count() >= a.cell_count().max(b.cell_count()));
    }
}

#[test]
fn ledger_serializes_as_sidecar_json() {
    let mut ledger = ProvenanceLedger::new();
    ledger.record(EntityKind::Encounter, "enc_1", SourceTag::Text);
    ledger.record(EntityKind::Encounter, "enc_1", SourceTag::Vision);
    ledger.record(EntityKind::Activity, "act_1", SourceTag::Vision);
    ledger.record_cell(CellKey::new("act_1", "tp_1"), SourceTag::Text);

    insta::assert_json_snapshot!(ledger, @r#"
    {
      "entities": {
        "encounters": {
          "enc_1": "both"
        },
        "activities": {
          "act_1": "vision"
        }
      },
      "cells": {
        "act_1|tp_1": "text"
      }
    }
    "#);

    let json = serde_json::to_string(&ledger).expect("serialize");
    let round: ProvenanceLedger = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(round, ledger);
}
