//! Decoding, normalization, provenance and reconciliation of Schedule of
//! Activities extractions.
//!
//! A typical run decodes each raw model response with [`decode::decode`],
//! normalizes it with [`normalize::Normalizer`], and merges the text and
//! vision results with [`reconcile::ReconciliationEngine`].

pub mod decode;
pub mod dedupe;
pub mod normalize;
pub mod provenance;
pub mod reconcile;
pub mod text;
pub mod timing;

pub use decode::{DecodeFailure, DecodeLayer, decode};
pub use normalize::{NormalizationReport, NormalizeError, NormalizedSource, Normalizer};
pub use provenance::ProvenanceLedger;
pub use reconcile::{Reconciled, ReconciliationEngine, ReconciliationFailure, ReconciliationReport};
