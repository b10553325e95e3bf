//! Raw JSON to typed document.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use soa_model::de::scalar_to_string;
use soa_model::{ActivityTimepoint, Entity, EntityKind, SoaDocument, SourceTag, StudyDesign};

use super::NormalizeError;
use super::report::{DefectReason, NormalizationReport};

/// Accepted collection names per kind, preferred name first.
fn collection_names(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Epoch => &["epochs"],
        EntityKind::Encounter => &["encounters", "visits"],
        EntityKind::PlannedTimepoint => &["plannedTimepoints", "timepoints"],
        EntityKind::Activity => &["activities"],
        EntityKind::ActivityGroup => &["activityGroups", "groups"],
        EntityKind::ActivityTimepoint => &["activityTimepoints"],
    }
}

/// Build a typed document from a decoded extraction.
///
/// Entities that cannot be typed are dropped and reported; only a missing
/// design aborts.
pub(crate) fn build_document(
    raw: &Value,
    tag: SourceTag,
    report: &mut NormalizationReport,
) -> Result<SoaDocument, NormalizeError> {
    let root = raw.as_object().ok_or(NormalizeError::NotAnObject { tag })?;
    let design_map = locate_design(root).ok_or(NormalizeError::NoStudyDesign { tag })?;

    let mut design = StudyDesign {
        id: text_field(design_map, &["id"]).unwrap_or_default(),
        name: text_field(design_map, &["name", "label"]).unwrap_or_default(),
        study_id: text_field(design_map, &["studyId"]).or_else(|| study_field(root, &["id"])),
        study_title: text_field(design_map, &["studyTitle"])
            .or_else(|| study_field(root, &["title", "name", "officialTitle"])),
        ..StudyDesign::default()
    };
    if design.study_id.is_none() {
        design.study_id = text_field(root, &["studyId"]);
    }
    if design.study_title.is_none() {
        design.study_title = text_field(root, &["studyTitle"]);
    }

    design.epochs = build_entities(design_map, report);
    design.encounters = build_entities(design_map, report);
    design.planned_timepoints = build_entities(design_map, report);
    design.activities = build_entities(design_map, report);
    design.activity_groups = build_entities(design_map, report);
    design.activity_timepoints = build_ticks(design_map, report);

    Ok(SoaDocument {
        usdm_version: text_field(root, &["usdmVersion"]).unwrap_or_default(),
        system_name: text_field(root, &["systemName"]).unwrap_or_default(),
        system_version: text_field(root, &["systemVersion"]).unwrap_or_default(),
        study_design: design,
    })
}

fn locate_design(root: &Map<String, Value>) -> Option<&Map<String, Value>> {
    if let Some(design) = root.get("studyDesign").and_then(Value::as_object) {
        return Some(design);
    }
    if let Some(design) = first_object(root.get("studyDesigns")) {
        return Some(design);
    }
    if let Some(study) = root.get("study").and_then(Value::as_object) {
        if let Some(design) = first_object(study.get("studyDesigns")) {
            return Some(design);
        }
        let version = first_object(study.get("versions"));
        if let Some(design) = version.and_then(|v| first_object(v.get("studyDesigns"))) {
            return Some(design);
        }
    }
    let has_entities = EntityKind::all().iter().any(|kind| {
        collection_names(*kind)
            .iter()
            .any(|name| root.get(*name).is_some_and(Value::is_array))
    });
    has_entities.then_some(root)
}

fn first_object(value: Option<&Value>) -> Option<&Map<String, Value>> {
    value?.as_array()?.first()?.as_object()
}

fn text_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find_map(scalar_to_string)
}

fn study_field(root: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    root.get("study")
        .and_then(Value::as_object)
        .and_then(|study| text_field(study, keys))
}

fn collection<'a>(design: &'a Map<String, Value>, kind: EntityKind) -> &'a [Value] {
    collection_names(kind)
        .iter()
        .find_map(|name| design.get(*name).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn build_entities<T>(design: &Map<String, Value>, report: &mut NormalizationReport) -> Vec<T>
where
    T: Entity + DeserializeOwned,
{
    build_checked(design, report, |_: &T| None)
}

fn build_ticks(
    design: &Map<String, Value>,
    report: &mut NormalizationReport,
) -> Vec<ActivityTimepoint> {
    build_checked(design, report, |tick: &ActivityTimepoint| {
        if tick.activity_id.is_empty() {
            Some(DefectReason::MissingReference {
                field: "activityId",
            })
        } else if tick.planned_timepoint_id.is_empty() {
            Some(DefectReason::MissingReference {
                field: "plannedTimepointId",
            })
        } else {
            None
        }
    })
}

/// Type each entry of a collection, dropping entries that fail `check`.
fn build_checked<T>(
    design: &Map<String, Value>,
    report: &mut NormalizationReport,
    check: impl Fn(&T) -> Option<DefectReason>,
) -> Vec<T>
where
    T: Entity + DeserializeOwned,
{
    let mut out = Vec::new();
    for (index, item) in collection(design, T::KIND).iter().enumerate() {
        let Some(object) = item.as_object() else {
            report.defect(T::KIND, index, None, DefectReason::NotAnObject);
            continue;
        };
        let id = object.get("id").and_then(scalar_to_string);
        if id.is_none() {
            report.defect(T::KIND, index, None, DefectReason::MissingId);
            continue;
        }
        match serde_json::from_value::<T>(item.clone()) {
            Ok(entity) => match check(&entity) {
                Some(reason) => report.defect(T::KIND, index, Some(entity.id()), reason),
                None => out.push(entity),
            },
            Err(error) => report.defect(
                T::KIND,
                index,
                id.as_deref(),
                DefectReason::Malformed {
                    detail: error.to_string(),
                },
            ),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn build(raw: &Value) -> (SoaDocument, NormalizationReport) {
        let mut report = NormalizationReport::default();
        let document = build_document(raw, SourceTag::Text, &mut report).unwrap();
        (document, report)
    }

    #[test]
    fn finds_design_in_usdm_wrapper() {
        let raw = json!({
            "usdmVersion": "3.0.0",
            "study": {
                "id": "STUDY-1",
                "versions": [{"studyDesigns": [{"id": "sd", "encounters": [{"id": "e1"}]}]}]
            }
        });
        let (document, _) = build(&raw);
        assert_eq!(document.usdm_version, "3.0.0");
        assert_eq!(document.study_design.id, "sd");
        assert_eq!(document.study_design.study_id.as_deref(), Some("STUDY-1"));
        assert_eq!(document.study_design.encounters.len(), 1);
    }

    #[test]
    fn accepts_bare_entity_arrays() {
        let raw = json!({"timepoints": [{"id": 1, "name": "Day 1"}]});
        let (document, report) = build(&raw);
        assert_eq!(document.study_design.planned_timepoints[0].id, "1");
        assert!(report.defects.is_empty());
    }

    #[test]
    fn drops_entities_without_id_or_references() {
        let raw = json!({"studyDesign": {
            "activities": [{"name": "No id"}, "junk", {"id": "a1", "name": "ECG"}],
            "activityTimepoints": [{"id": "at1", "activityId": "a1"}]
        }});
        let (document, report) = build(&raw);
        assert_eq!(document.study_design.activities.len(), 1);
        assert!(document.study_design.activity_timepoints.is_empty());
        let reasons: Vec<_> = report.defects.iter().map(|d| d.reason.clone()).collect();
        assert_eq!(
            reasons,
            vec![
                DefectReason::MissingId,
                DefectReason::NotAnObject,
                DefectReason::MissingReference {
                    field: "plannedTimepointId"
                },
            ]
        );
    }

    #[test]
    fn rejects_graph_without_design() {
        let mut report = NormalizationReport::default();
        let result = build_document(&json!({"note": "nothing"}), SourceTag::Vision, &mut report);
        assert!(matches!(result, Err(NormalizeError::NoStudyDesign { .. })));
        let result = build_document(&json!([1, 2]), SourceTag::Vision, &mut report);
        assert!(matches!(result, Err(NormalizeError::NotAnObject { .. })));
    }
}
