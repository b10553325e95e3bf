//! Category checks over a study design.
//!
//! Each check returns the issues it found and how many items it inspected,
//! so category scores stay meaningful when violation collection is capped.

pub(crate) mod completeness;
pub(crate) mod naming;
pub(crate) mod references;
pub(crate) mod uniqueness;

use crate::issue::Issue;

#[derive(Debug, Default)]
pub(crate) struct CheckOutcome {
    pub issues: Vec<Issue>,
    pub checked: usize,
}
