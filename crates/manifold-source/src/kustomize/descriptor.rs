//! The kustomization descriptor

use crate::error::{Result, SourceError};
use manifold_core::{yaml, Node};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// File names recognized as a descriptor, in lookup order
pub const DESCRIPTOR_NAMES: [&str; 3] = ["kustomization.yaml", "kustomization.yml", "Kustomization"];

/// `buildMetadata` option that makes the build record each resource's origin
pub const ORIGIN_ANNOTATIONS: &str = "originAnnotations";

const BUILD_METADATA_FIELD: &str = "buildMetadata";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Kustomization {
    pub api_version: Option<String>,
    pub kind: Option<String>,
    pub metadata: Option<serde_yaml::Value>,
    pub resources: Vec<String>,
    pub bases: Vec<String>,
    pub name_prefix: String,
    pub name_suffix: String,
    pub namespace: String,
    pub common_labels: BTreeMap<String, String>,
    pub common_annotations: BTreeMap<String, String>,
    /// File paths or inline patch documents
    pub patches_strategic_merge: Vec<String>,
    pub patches: Vec<Patch>,
    /// JSON 6902 operations; every entry names a target
    #[serde(rename = "patchesJson6902")]
    pub patches_json6902: Vec<Patch>,
    pub images: Vec<Image>,
    pub replicas: Vec<Replica>,
    pub labels: Vec<Label>,
    pub config_map_generator: Vec<Generator>,
    pub secret_generator: Vec<Generator>,
    pub generator_options: Option<GeneratorOptions>,
    pub build_metadata: Vec<String>,
    /// Fields the in-process build does not implement
    #[serde(flatten)]
    pub unsupported: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Patch {
    pub path: Option<String>,
    pub patch: Option<String>,
    pub target: Option<Target>,
}

/// Resource selector of a patch; `name` and `namespace` are regular expressions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Target {
    pub group: Option<String>,
    pub version: Option<String>,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Image {
    pub name: String,
    pub new_name: Option<String>,
    pub new_tag: Option<String>,
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Replica {
    pub name: String,
    pub count: i64,
}

/// Entry of `labels`; selectors and pod templates are opt-in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Label {
    pub pairs: BTreeMap<String, String>,
    pub include_selectors: bool,
    pub include_templates: bool,
}

/// Entry of `configMapGenerator` or `secretGenerator`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Generator {
    pub name: String,
    pub namespace: Option<String>,
    /// `create` (default), `merge` or `replace`
    pub behavior: Option<String>,
    /// `KEY=VALUE` pairs
    pub literals: Vec<String>,
    /// `path` or `key=path`
    pub files: Vec<String>,
    /// Dotenv files
    pub envs: Vec<String>,
    pub env: Option<String>,
    pub options: Option<GeneratorOptions>,
    /// Secret type, `Opaque` when unset
    #[serde(rename = "type")]
    pub secret_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratorOptions {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub disable_name_suffix_hash: bool,
    pub immutable: bool,
}

/// The descriptor file name inside `dir`, if any
pub fn find_descriptor(dir: &Path) -> Option<PathBuf> {
    DESCRIPTOR_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// A loaded descriptor and the file it came from
#[derive(Debug, Clone)]
pub struct Descriptor {
    path: PathBuf,
    pub kustomization: Kustomization,
}

impl Descriptor {
    pub fn load(dir: &Path) -> Result<Self> {
        let path = find_descriptor(dir)
            .ok_or_else(|| SourceError::kustomize(dir, "no kustomization file found"))?;
        let content = fs::read_to_string(&path)?;
        let kustomization = if content.trim().is_empty() {
            Kustomization::default()
        } else {
            serde_yaml::from_str(&content).map_err(|e| SourceError::kustomize(&path, e))?
        };
        if !kustomization.unsupported.is_empty() {
            let fields: Vec<&str> = kustomization.unsupported.keys().map(String::as_str).collect();
            return Err(SourceError::Unsupported(format!(
                "kustomization field(s) {} in {}",
                fields.join(", "),
                path.display()
            )));
        }
        Ok(Self { path, kustomization })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory the descriptor lives in
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn origin_annotations(&self) -> bool {
        self.kustomization
            .build_metadata
            .iter()
            .any(|option| option == ORIGIN_ANNOTATIONS)
    }

    /// Add `originAnnotations` to `buildMetadata` and rewrite the file.
    ///
    /// Only `buildMetadata` changes; other fields keep their order and
    /// formatting. Returns `false` when the option was already present.
    pub fn enable_origin_annotations(&mut self) -> Result<bool> {
        if self.origin_annotations() {
            return Ok(false);
        }

        let mut documents = yaml::parse_file(&self.path)?;
        let mut node = if documents.is_empty() {
            Node::mapping(Vec::new(), 1, 0)
        } else {
            documents.swap_remove(0)
        };

        let mut options = self.kustomization.build_metadata.clone();
        options.push(ORIGIN_ANNOTATIONS.to_string());
        node.set_field(BUILD_METADATA_FIELD, &options)?;
        fs::write(&self.path, yaml::to_string(&node))?;

        self.kustomization.build_metadata = options;
        info!("Enabled {} in {}", ORIGIN_ANNOTATIONS, self.path.display());
        Ok(true)
    }

    /// Patch files referenced by path, relative to the descriptor directory
    pub fn patch_files(&self) -> Vec<PathBuf> {
        let inline = self
            .kustomization
            .patches_strategic_merge
            .iter()
            .filter(|entry| !is_inline_patch(entry))
            .map(PathBuf::from);
        let referenced = self
            .kustomization
            .patches
            .iter()
            .chain(&self.kustomization.patches_json6902)
            .filter_map(|patch| patch.path.as_ref())
            .map(PathBuf::from);
        inline.chain(referenced).collect()
    }
}

/// `patchesStrategicMerge` entries may hold a document instead of a path
pub fn is_inline_patch(entry: &str) -> bool {
    entry.contains('\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DESCRIPTOR: &str = "apiVersion: kustomize.config.k8s.io/v1beta1
kind: Kustomization
namePrefix: dev-
resources:
- ../../base
patchesStrategicMerge:
- replicas.yaml
";

    #[test]
    fn test_load_fields() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("kustomization.yaml"), DESCRIPTOR)?;

        let descriptor = Descriptor::load(dir.path())?;
        assert_eq!(descriptor.kustomization.name_prefix, "dev-");
        assert_eq!(descriptor.kustomization.resources, vec!["../../base".to_string()]);
        assert_eq!(descriptor.patch_files(), vec![PathBuf::from("replicas.yaml")]);
        assert!(!descriptor.origin_annotations());
        Ok(())
    }

    #[test]
    fn test_enable_origin_annotations_is_idempotent() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("kustomization.yaml");
        fs::write(&path, DESCRIPTOR)?;

        let mut descriptor = Descriptor::load(dir.path())?;
        assert!(descriptor.enable_origin_annotations()?);
        let first = fs::read_to_string(&path)?;
        assert!(first.starts_with("apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\nnamePrefix: dev-\n"));
        assert!(first.ends_with("buildMetadata:\n  - originAnnotations\n"));

        let mut reloaded = Descriptor::load(dir.path())?;
        assert!(reloaded.origin_annotations());
        assert!(!reloaded.enable_origin_annotations()?);
        assert_eq!(fs::read_to_string(&path)?, first);
        Ok(())
    }

    #[test]
    fn test_existing_build_metadata_is_extended() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("kustomization.yml"),
            "buildMetadata: [managedByLabel]\nresources:\n- cm.yaml\n",
        )?;
        let mut descriptor = Descriptor::load(dir.path())?;
        descriptor.enable_origin_annotations()?;
        assert_eq!(
            Descriptor::load(dir.path())?.kustomization.build_metadata,
            vec!["managedByLabel".to_string(), ORIGIN_ANNOTATIONS.to_string()]
        );
        Ok(())
    }

    #[test]
    fn test_generators_and_json_patches_load() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("kustomization.yaml"),
            "configMapGenerator:
- name: settings
  literals:
  - LOG_LEVEL=debug
  options:
    disableNameSuffixHash: true
secretGenerator:
- name: creds
  type: kubernetes.io/basic-auth
  literals: [username=admin]
patchesJson6902:
- target:
    kind: Deployment
    name: web
  path: ops.yaml
labels:
- pairs:
    team: shop
  includeSelectors: true
",
        )?;

        let descriptor = Descriptor::load(dir.path())?;
        let k = &descriptor.kustomization;
        assert_eq!(k.config_map_generator[0].literals, vec!["LOG_LEVEL=debug".to_string()]);
        assert!(k.config_map_generator[0].options.as_ref().is_some_and(|o| o.disable_name_suffix_hash));
        assert_eq!(k.secret_generator[0].secret_type.as_deref(), Some("kubernetes.io/basic-auth"));
        assert!(k.labels[0].include_selectors);
        assert_eq!(descriptor.patch_files(), vec![PathBuf::from("ops.yaml")]);
        Ok(())
    }

    #[test]
    fn test_unknown_fields_are_unsupported() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("kustomization.yaml"),
            "resources:\n- cm.yaml\ncomponents:\n- ../feature\nhelmCharts:\n- name: redis\n",
        )?;
        match Descriptor::load(dir.path()) {
            Err(SourceError::Unsupported(message)) => {
                assert!(message.contains("components, helmCharts"), "{}", message)
            }
            other => panic!("expected unsupported fields, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_missing_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(Descriptor::load(dir.path()), Err(SourceError::Kustomize { .. })));
    }
}
