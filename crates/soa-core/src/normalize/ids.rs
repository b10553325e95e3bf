//! ID standardization and identity checks.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use soa_model::{Entity, EntityKind, StudyDesign};
use tracing::warn;

use super::report::{DefectReason, IdRewrite, NormalizationReport, RewriteReason};

static NUMBERED_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<prefix>.*?)(?P<digits>\d+)$").expect("Invalid ID regex"));

/// Replace hyphens and spaces with underscores.
pub fn standardize_separators(id: &str) -> String {
    id.trim().replace(['-', ' '], "_")
}

/// Rewrite every ID and reference to the underscore convention.
pub(crate) fn apply_separators(design: &mut StudyDesign, report: &mut NormalizationReport) {
    for kind in EntityKind::all() {
        for id in design.ids(*kind) {
            let standardized = standardize_separators(id);
            if standardized != id {
                report.id_rewrites.push(IdRewrite {
                    kind: *kind,
                    from: id.to_string(),
                    to: standardized,
                    reason: RewriteReason::Separator,
                });
            }
        }
    }
    design.rewrite_all_ids(&standardize_separators);
}

/// Align zero-padding of numeric suffixes within each ID prefix.
///
/// The majority convention wins; a tie follows the first ID in document
/// order. A rewrite that would collide with an existing ID is skipped.
pub(crate) fn apply_number_scheme(design: &mut StudyDesign, report: &mut NormalizationReport) {
    for kind in EntityKind::all() {
        let renames = scheme_renames(&design.ids(*kind));
        if renames.is_empty() {
            continue;
        }
        for (from, to) in &renames {
            report.id_rewrites.push(IdRewrite {
                kind: *kind,
                from: from.clone(),
                to: to.clone(),
                reason: RewriteReason::NumberScheme,
            });
        }
        design.rename_ids(*kind, &renames);
    }
}

struct Numbered<'a> {
    id: &'a str,
    prefix: &'a str,
    digits: &'a str,
}

impl Numbered<'_> {
    fn is_padded(&self) -> bool {
        self.digits.len() > 1 && self.digits.starts_with('0')
    }
}

/// Renames that bring one kind's IDs onto a single numbering scheme.
pub fn scheme_renames(ids: &[&str]) -> BTreeMap<String, String> {
    let mut groups: Vec<(&str, Vec<Numbered<'_>>)> = Vec::new();
    for &id in ids {
        let Some(caps) = NUMBERED_ID.captures(id) else {
            continue;
        };
        let (Some(prefix), Some(digits)) = (caps.name("prefix"), caps.name("digits")) else {
            continue;
        };
        let numbered = Numbered {
            id,
            prefix: prefix.as_str(),
            digits: digits.as_str(),
        };
        match groups.iter_mut().find(|(p, _)| *p == numbered.prefix) {
            Some((_, members)) => members.push(numbered),
            None => groups.push((numbered.prefix, vec![numbered])),
        }
    }

    let mut taken: BTreeSet<String> = ids.iter().map(|id| (*id).to_string()).collect();
    let mut renames = BTreeMap::new();
    for (prefix, members) in &groups {
        let Some(width) = dominant_width(members) else {
            continue;
        };
        let padded: Vec<&Numbered<'_>> = members.iter().filter(|m| m.is_padded()).collect();
        let unpadded: Vec<&Numbered<'_>> = members
            .iter()
            .filter(|m| !m.is_padded() && m.digits.len() < width)
            .collect();
        if unpadded.is_empty() {
            continue;
        }
        let pad = match padded.len().cmp(&unpadded.len()) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => members.first().is_some_and(Numbered::is_padded),
        };
        let rewrite = if pad { &unpadded } else { &padded };
        for member in rewrite {
            let digits = if pad {
                format!("{:0>width$}", member.digits)
            } else {
                let trimmed = member.digits.trim_start_matches('0');
                if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() }
            };
            let new_id = format!("{prefix}{digits}");
            if taken.contains(&new_id) {
                warn!(from = member.id, to = %new_id, "skipped ID rewrite that would collide");
                continue;
            }
            taken.insert(new_id.clone());
            renames.insert(member.id.to_string(), new_id);
        }
    }
    renames
}

/// Most common digit width among padded members.
fn dominant_width(members: &[Numbered<'_>]) -> Option<usize> {
    let mut widths: BTreeMap<usize, usize> = BTreeMap::new();
    for member in members.iter().filter(|m| m.is_padded()) {
        *widths.entry(member.digits.len()).or_default() += 1;
    }
    widths
        .into_iter()
        .max_by(|(wa, ca), (wb, cb)| ca.cmp(cb).then(wb.cmp(wa)))
        .map(|(width, _)| width)
}

/// Drop entities whose ID repeats an earlier one of the same kind.
pub(crate) fn drop_duplicate_ids(design: &mut StudyDesign, report: &mut NormalizationReport) {
    dedupe(&mut design.epochs, report);
    dedupe(&mut design.encounters, report);
    dedupe(&mut design.planned_timepoints, report);
    dedupe(&mut design.activities, report);
    dedupe(&mut design.activity_groups, report);
    dedupe(&mut design.activity_timepoints, report);
}

fn dedupe<T: Entity>(items: &mut Vec<T>, report: &mut NormalizationReport) {
    let mut seen = BTreeSet::new();
    let mut index = 0;
    items.retain(|item| {
        let keep = seen.insert(item.id().to_string());
        if !keep {
            report.defect(T::KIND, index, Some(item.id()), DefectReason::DuplicateId);
        }
        index += 1;
        keep
    });
}
