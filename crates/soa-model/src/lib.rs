//! Schedule of Activities data model.
//!
//! Typed entities for the USDM-shaped SoA graph, the source tags used by
//! provenance, and the configuration shared by every pipeline stage.

pub mod de;
pub mod document;
pub mod entity;
pub mod error;
pub mod kind;
pub mod options;
pub mod source;

pub use document::{OutgoingReference, SoaDocument, StudyDesign};
pub use entity::{
    Activity, ActivityGroup, ActivityTimepoint, CellKey, Encounter, Entity, Epoch,
    PlannedTimepoint, Reference,
};
pub use error::{ModelError, Result};
pub use kind::EntityKind;
pub use options::{
    EntityDefaults, FieldPolicy, PROVENANCE_SUFFIX, ReconcileOptions, SoaConfig, USDM_VERSION,
    VALIDATION_SUFFIX, ValidationOptions,
};
pub use source::SourceTag;
