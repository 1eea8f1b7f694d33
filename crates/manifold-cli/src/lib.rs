//! Library interface for the manifold CLI
//!
//! Scans a repository for Kubernetes, Helm and Kustomize sources, evaluates
//! the rendered resources and maps every finding back to the raw file and
//! lines that produced it.

pub mod policy;
pub mod report;
pub mod scan;
pub mod validate;
pub mod vcs;

pub use policy::{PolicyCatalog, PolicySpec};
pub use report::{ScanReport, ValidationReport};
pub use scan::{scan, PathTrie};
pub use validate::{Entity, Finding, Location, Policy, PolicyEvaluator, Validator, Violation};
pub use vcs::{RemediatedFile, RemediationRequest, VersionControlProvider, WorkingTreeWriter};

use anyhow::{bail, Result};
use manifold_core::File;
use tracing::info;

/// Lines of `key` in the first file holding resource `id`
pub fn locate(files: &[File], id: &str, key: &str) -> Option<Location> {
    files.iter().find_map(|file| {
        file.resource(id).map(|resource| {
            let (start_line, end_line) = resource.find_key(key);
            Location {
                path: file.path().to_path_buf(),
                start_line,
                end_line,
            }
        })
    })
}

/// Write `value` at `key` in the raw document of resource `id`.
///
/// The first file holding a raw form of the resource is changed; its new
/// content is returned for writing.
pub fn set_field(files: &mut [File], id: &str, key: &str, value: &serde_json::Value) -> Result<RemediatedFile> {
    let Some(file) = files
        .iter_mut()
        .find(|file| file.resource(id).is_some_and(|resource| resource.raw().is_some()))
    else {
        bail!("No raw resource {} found", id);
    };

    file.remediate(id, key, value)?;
    info!("Set {} on {} in {}", key, id, file.path().display());
    Ok(RemediatedFile {
        path: file.path().to_path_buf(),
        content: file.content(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifold_core::yaml::parse_str;
    use manifold_core::Resource;
    use serde_json::json;

    fn files() -> Vec<File> {
        let documents = parse_str("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\ndata:\n  k: v\n").unwrap();
        vec![
            File::from_documents("rendered.yaml", documents.clone(), Resource::from_rendered),
            File::from_documents("cm.yaml", documents, Resource::shared),
        ]
    }

    #[test]
    fn test_locate_uses_first_match() {
        let location = locate(&files(), "v1/ConfigMap/[noNamespace]/a", "data.k").unwrap();
        assert_eq!(location.to_string(), "rendered.yaml:6-6");
        assert!(locate(&files(), "v1/ConfigMap/[noNamespace]/b", "data.k").is_none());
    }

    #[test]
    fn test_set_field_skips_rendered_only_copies() {
        let mut files = files();
        let changed = set_field(&mut files, "v1/ConfigMap/[noNamespace]/a", "data.k", &json!("w")).unwrap();
        assert_eq!(changed.path, std::path::PathBuf::from("cm.yaml"));
        assert!(changed.content.contains("k: w"));
        assert!(set_field(&mut files, "v1/ConfigMap/[noNamespace]/b", "data.k", &json!(1)).is_err());
    }
}
