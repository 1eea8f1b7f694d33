//! Plain manifest directories

use crate::error::Result;
use crate::paths::{is_hidden_name, is_yaml_file};
use crate::{Source, SourceKind};
use manifold_core::{yaml, File, Resource};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

/// A directory (or single file) of Kubernetes manifests
#[derive(Debug, Clone)]
pub struct Kubernetes {
    path: PathBuf,
}

impl Kubernetes {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Every non-hidden YAML file under the path, sorted by name
    fn yaml_files(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let walker = WalkDir::new(&self.path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_name().to_str().map(is_hidden_name).unwrap_or(false)
            });

        for entry in walker {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_file() && is_yaml_file(entry.path()) {
                paths.push(entry.into_path());
            }
        }
        Ok(paths)
    }
}

/// A YAML file whose first document declares a `kind`
fn is_manifest(path: &Path) -> bool {
    if !is_yaml_file(path) {
        return false;
    }
    match yaml::parse_file(path) {
        Ok(documents) => documents.first().is_some_and(|doc| {
            doc.get_field("kind")
                .and_then(|field| field.value.as_str())
                .is_some_and(|kind| !kind.is_empty())
        }),
        Err(e) => {
            debug!("Ignoring {}: {}", path.display(), e);
            false
        }
    }
}

impl Source for Kubernetes {
    fn kind(&self) -> SourceKind {
        SourceKind::Kubernetes
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn is_valid_path(&self) -> bool {
        if self.path.is_file() {
            return is_yaml_file(&self.path);
        }

        let Ok(entries) = std::fs::read_dir(&self.path) else {
            return false;
        };
        entries.flatten().any(|entry| {
            let name = entry.file_name();
            !name.to_str().map(is_hidden_name).unwrap_or(true) && is_manifest(&entry.path())
        })
    }

    #[instrument(skip(self), fields(path = %self.path.display()), level = "debug")]
    fn resource_files(&self) -> Result<Vec<File>> {
        let mut files = Vec::new();
        for path in self.yaml_files()? {
            let documents = yaml::parse_file(&path)?;
            files.push(File::from_documents(path, documents, Resource::shared));
        }
        info!("Loaded {} manifest file(s) from {}", files.len(), self.path.display());
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_hidden_entries_are_skipped() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::create_dir(dir.path().join(".github"))?;
        fs::write(dir.path().join(".github/workflow.yaml"), "kind: Workflow\n")?;
        fs::write(dir.path().join(".hidden.yaml"), "kind: Secret\n")?;
        fs::write(dir.path().join("cm.yaml"), "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n")?;

        let source = Kubernetes::new(dir.path());
        assert!(source.is_valid_path());
        let files = source.resource_files()?;
        assert_eq!(files.len(), 1);
        assert!(files[0].path().ends_with("cm.yaml"));
        Ok(())
    }

    #[test]
    fn test_directory_without_manifests_is_not_valid() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("values.yaml"), "replicaCount: 1\n")?;
        assert!(!Kubernetes::new(dir.path()).is_valid_path());
        Ok(())
    }

    #[test]
    fn test_single_file_path() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("svc.yml");
        fs::write(&path, "apiVersion: v1\nkind: Service\nmetadata:\n  name: web\n")?;
        let source = Kubernetes::new(&path);
        assert!(source.is_valid_path());
        assert_eq!(source.resource_files()?[0].len(), 1);
        Ok(())
    }

    #[test]
    fn test_documents_with_one_identity_are_all_kept() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cm.yaml");
        let doc = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n";
        fs::write(&path, format!("{}data:\n  v: \"1\"\n---\n{}data:\n  v: \"2\"\n", doc, doc))?;

        let files = Kubernetes::new(&path).resource_files()?;
        let file = &files[0];
        assert_eq!(file.len(), 2);
        let second = file
            .resource("v1/ConfigMap/[noNamespace]/a#2")
            .and_then(|resource| resource.raw())
            .ok_or("second document was dropped")?;
        assert_eq!(second.to_json()["data"]["v"], "2");
        Ok(())
    }
}
