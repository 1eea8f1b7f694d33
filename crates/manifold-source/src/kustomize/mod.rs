//! Kustomize overlays with provenance
//!
//! The overlay is built in-process. Every built resource knows the file it
//! came from, so it can be matched back to the raw document in that file once
//! the overlay's name prefix and suffix are undone.

pub mod build;
pub mod descriptor;
pub mod patch;

use crate::error::Result;
use crate::paths::normalize;
use crate::{Source, SourceKind};
use build::BuiltResource;
use descriptor::{find_descriptor, Descriptor};
use indexmap::IndexMap;
use manifold_core::{yaml, File, Object, Resource};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct Kustomize {
    path: PathBuf,
}

impl Kustomize {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Undo the root overlay's name prefix and suffix
fn original_name<'a>(name: &'a str, prefix: &str, suffix: &str) -> &'a str {
    let name = name.strip_prefix(prefix).unwrap_or(name);
    name.strip_suffix(suffix).unwrap_or(name)
}

/// Id of the raw resource in `file` that `object` was built from.
///
/// The exact pre-transform identity wins; otherwise the namespace is
/// ignored, since the overlay may have set one.
fn matching_id(file: &File, object: &Object, name: &str) -> Option<String> {
    let exact = [object.api_version(), object.kind(), object.namespace(), name.to_string()].join("/");
    if file.contains(&exact) {
        return Some(exact);
    }

    file.resources()
        .iter()
        .find(|(_, resource)| {
            resource.raw().is_some_and(|raw| {
                raw.api_version() == object.api_version() && raw.kind() == object.kind() && raw.name() == name
            })
        })
        .map(|(id, _)| id.clone())
}

/// Render a built resource into a document with its own line marks
fn to_object(built: &BuiltResource) -> Result<Option<Object>> {
    let text = serde_yaml::to_string(&built.object)?;
    Ok(yaml::parse_str(&text)?.into_iter().next().map(Object::new))
}

impl Source for Kustomize {
    fn kind(&self) -> SourceKind {
        SourceKind::Kustomize
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn is_valid_path(&self) -> bool {
        self.path.is_dir() && find_descriptor(&self.path).is_some()
    }

    #[instrument(skip(self), fields(path = %self.path.display()), level = "debug")]
    fn resource_files(&self) -> Result<Vec<File>> {
        let mut descriptor = Descriptor::load(&self.path)?;
        let requested = descriptor.origin_annotations();
        if !requested {
            descriptor.enable_origin_annotations()?;
        }

        let built = build::build(&self.path)?;
        let root = normalize(&self.path);

        let mut files: IndexMap<PathBuf, File> = IndexMap::new();
        for origin in built.iter().filter_map(|resource| resource.origin.as_ref()) {
            let path = normalize(&root.join(origin));
            if !files.contains_key(&path) {
                let file = File::from_path(&path)?;
                files.insert(path, file);
            }
        }
        for patch in descriptor.patch_files() {
            let path = normalize(&root.join(patch));
            if !files.contains_key(&path) {
                debug!("Loading patch file {}", path.display());
                let file = File::from_path(&path)?;
                files.insert(path, file);
            }
        }

        let k = &descriptor.kustomization;
        let mut unmatched = 0;
        for mut resource in built {
            if !requested {
                resource.remove_origin_annotation();
            }
            let Some(object) = to_object(&resource)? else {
                continue;
            };

            let origin = resource
                .origin
                .as_ref()
                .map(|origin| normalize(&root.join(origin)))
                .unwrap_or_else(|| descriptor.path().to_path_buf());
            let file = files.entry(origin.clone()).or_insert_with(|| File::new(&origin));

            let name = original_name(resource.name(), &k.name_prefix, &k.name_suffix);
            let Some(id) = matching_id(file, &object, name) else {
                unmatched += 1;
                debug!("No raw resource for {} in {}", object.id(), origin.display());
                file.insert(Resource::from_rendered(object));
                continue;
            };
            if let Err(object) = file.set_rendered(&id, object) {
                warn!("Resource {} vanished from {}", object.id(), origin.display());
            }
        }

        if unmatched > 0 {
            info!("{} built resource(s) are rendered-only", unmatched);
        }
        info!("Resolved {} file(s) from overlay {}", files.len(), self.path.display());
        Ok(files.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifold_core::Rendered;
    use std::fs;

    #[test]
    fn test_original_name() {
        assert_eq!(original_name("dev-web-v2", "dev-", "-v2"), "web");
        assert_eq!(original_name("web", "dev-", ""), "web");
    }

    #[test]
    fn test_prefixed_resources_match_their_origin() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("deployment.yaml"),
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\nspec:\n  replicas: 1\n",
        )?;
        fs::write(
            dir.path().join("kustomization.yaml"),
            "resources:\n- deployment.yaml\nnamePrefix: dev-\nnamespace: shop\n",
        )?;

        let source = Kustomize::new(dir.path());
        assert!(source.is_valid_path());
        let files = source.resource_files()?;
        assert_eq!(files.len(), 1);

        let resource = files[0]
            .resource("apps/v1/Deployment/[noNamespace]/web")
            .ok_or("missing deployment")?;
        let rendered = resource.rendered().ok_or("missing rendered")?;
        assert_eq!(rendered.name(), "dev-web");
        assert_eq!(rendered.namespace(), "shop");
        assert!(rendered.get_field("metadata.annotations").is_none());
        assert!(matches!(resource.rendering(), Rendered::Distinct(_)));
        Ok(())
    }

    #[test]
    fn test_requested_origin_annotations_are_kept() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("cm.yaml"),
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: settings\n",
        )?;
        fs::write(
            dir.path().join("kustomization.yaml"),
            "resources:\n- cm.yaml\nbuildMetadata:\n- originAnnotations\n",
        )?;

        let files = Kustomize::new(dir.path()).resource_files()?;
        let resource = files[0]
            .resource("v1/ConfigMap/[noNamespace]/settings")
            .ok_or("missing configmap")?;
        let rendered = resource.rendered().ok_or("missing rendered")?;
        assert_eq!(
            rendered.to_json()["metadata"]["annotations"][build::ORIGIN_ANNOTATION],
            "path: cm.yaml\n"
        );
        Ok(())
    }
}
