//! Writing the graph, provenance and validation artifacts.
//!
//! The three files share a stem: `<base>.json`, `<base>_provenance.json` and
//! `<base>_validation.json`, so each can be found from the others.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use soa_core::ProvenanceLedger;
use soa_model::{PROVENANCE_SUFFIX, SoaDocument, VALIDATION_SUFFIX};
use soa_validate::ValidationReport;
use tracing::info;

/// Default artifact stem.
pub const DEFAULT_BASE_NAME: &str = "soa";

/// Locations of the artifacts for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub graph: PathBuf,
    pub provenance: PathBuf,
    pub validation: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: &Path, base: &str) -> Self {
        Self {
            graph: dir.join(format!("{base}.json")),
            provenance: dir.join(format!("{base}{PROVENANCE_SUFFIX}.json")),
            validation: dir.join(format!("{base}{VALIDATION_SUFFIX}.json")),
        }
    }

    /// Provenance path for an existing graph artifact.
    pub fn provenance_for(graph: &Path) -> PathBuf {
        sibling(graph, PROVENANCE_SUFFIX)
    }

    /// Validation path for an existing graph artifact.
    pub fn validation_for(graph: &Path) -> PathBuf {
        sibling(graph, VALIDATION_SUFFIX)
    }
}

fn sibling(graph: &Path, suffix: &str) -> PathBuf {
    let stem = graph
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_BASE_NAME.to_string());
    graph.with_file_name(format!("{stem}{suffix}.json"))
}

/// Write all three artifacts, creating the directory if needed.
///
/// Documents with violations are written like any other; the validation
/// artifact records their state.
pub fn write_artifacts(
    paths: &ArtifactPaths,
    document: &SoaDocument,
    ledger: &ProvenanceLedger,
    report: &ValidationReport,
) -> Result<()> {
    if let Some(dir) = paths.graph.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    write_json(&paths.graph, document)?;
    write_json(&paths.provenance, ledger)?;
    write_json(&paths.validation, report)?;
    info!(
        graph = %paths.graph.display(),
        provenance = %paths.provenance.display(),
        validation = %paths.validation.display(),
        "artifacts written"
    );
    Ok(())
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("serialize {}", path.display()))?;
    writer
        .write_all(b"\n")
        .and_then(|()| writer.flush())
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_share_a_stem() {
        let paths = ArtifactPaths::new(Path::new("out"), "study_42");
        assert_eq!(paths.graph, Path::new("out/study_42.json"));
        assert_eq!(paths.provenance, Path::new("out/study_42_provenance.json"));
        assert_eq!(paths.validation, Path::new("out/study_42_validation.json"));
        assert_eq!(ArtifactPaths::provenance_for(&paths.graph), paths.provenance);
        assert_eq!(ArtifactPaths::validation_for(&paths.graph), paths.validation);
    }
}
