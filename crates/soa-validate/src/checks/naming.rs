//! Timing text left in encounter and timepoint names.

use soa_core::timing::first_timing_token;
use soa_model::{Entity, StudyDesign};

use super::CheckOutcome;
use crate::issue::Issue;

pub(crate) fn check(design: &StudyDesign) -> CheckOutcome {
    let mut outcome = CheckOutcome::default();
    scan(&design.encounters, &mut outcome);
    scan(&design.planned_timepoints, &mut outcome);
    outcome
}

fn scan<T: Entity>(items: &[T], outcome: &mut CheckOutcome) {
    for item in items {
        outcome.checked += 1;
        if let Some(token) = first_timing_token(item.name()) {
            outcome.issues.push(Issue::TimingInName {
                kind: T::KIND,
                id: item.id().to_string(),
                name: item.name().to_string(),
                token,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use soa_model::{Encounter, PlannedTimepoint};

    use super::*;

    #[test]
    fn flags_names_with_timing_tokens() {
        let mut design = StudyDesign::new("sd_1", "Main");
        design.encounters.push(Encounter {
            id: "enc_1".to_string(),
            name: "Visit 1 (Day 1)".to_string(),
            ..Encounter::default()
        });
        design.planned_timepoints.push(PlannedTimepoint {
            id: "tp_1".to_string(),
            name: "Baseline".to_string(),
            ..PlannedTimepoint::default()
        });
        let outcome = check(&design);
        assert_eq!(outcome.checked, 2);
        assert_eq!(outcome.issues.len(), 1);
        assert!(matches!(
            &outcome.issues[0],
            Issue::TimingInName { id, token, .. } if id == "enc_1" && token == "Day 1"
        ));
    }
}
