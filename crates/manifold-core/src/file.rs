//! Resources grouped by the source file they live in

use crate::error::CoreError;
use crate::object::Object;
use crate::resource::Resource;
use crate::yaml::{self, Node};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One source file and the resources it holds, keyed by identity.
///
/// Resources keep the order their documents appear in the file so that
/// [`File::content`] writes them back in the same order. A document whose
/// identity is already taken is kept under `<identity>#<n>`.
#[derive(Debug, Clone, Default)]
pub struct File {
    path: PathBuf,
    resources: IndexMap<String, Resource>,
}

impl File {
    /// Empty file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            resources: IndexMap::new(),
        }
    }

    /// Read `path` and hold each of its documents as a raw-only resource
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let documents = yaml::parse_file(path)?;
        debug!("Loaded {} document(s) from {}", documents.len(), path.display());
        Ok(Self::from_documents(path, documents, Resource::from_raw))
    }

    /// Build a file from parsed documents, wrapping each with `wrap`
    pub fn from_documents(
        path: impl Into<PathBuf>,
        documents: Vec<Node>,
        wrap: impl Fn(Object) -> Resource,
    ) -> Self {
        let mut file = Self::new(path);
        for node in documents {
            file.insert(wrap(Object::new(node)));
        }
        file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn resources(&self) -> &IndexMap<String, Resource> {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> impl Iterator<Item = (&String, &mut Resource)> {
        self.resources.iter_mut()
    }

    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn resource_mut(&mut self, id: &str) -> Option<&mut Resource> {
        self.resources.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Add a resource under its identity and return the key it was stored
    /// under. Lookups by identity keep finding the first document.
    pub fn insert(&mut self, resource: Resource) -> String {
        let id = resource.id();
        let mut key = id.clone();
        let mut occurrence = 1;
        while self.resources.contains_key(&key) {
            occurrence += 1;
            key = format!("{}#{}", id, occurrence);
        }
        if occurrence > 1 {
            debug!("Duplicate resource {} in {} kept as {}", id, self.path.display(), key);
        }
        self.resources.insert(key.clone(), resource);
        key
    }

    /// Attach a rendered object to the resource stored under `id`.
    ///
    /// Hands the object back when no such resource exists.
    pub fn set_rendered(&mut self, id: &str, rendered: Object) -> Result<(), Object> {
        match self.resources.get_mut(id) {
            Some(resource) => {
                resource.set_rendered(rendered);
                Ok(())
            }
            None => Err(rendered),
        }
    }

    /// True once any contained resource has been remediated
    pub fn remediated(&self) -> bool {
        self.resources.values().any(Resource::remediated)
    }

    /// Remediate the resource `id`; `Ok(false)` when it is unknown or has no
    /// raw form.
    pub fn remediate(&mut self, id: &str, path: &str, value: &serde_json::Value) -> Result<bool, CoreError> {
        match self.resources.get_mut(id) {
            Some(resource) => resource.remediate(path, value),
            None => Ok(false),
        }
    }

    /// Multi-document YAML of the raw documents only
    pub fn content(&self) -> String {
        let nodes: Vec<&Node> = self
            .resources
            .values()
            .filter_map(Resource::raw)
            .map(Object::node)
            .collect();
        yaml::to_stream(&nodes)
    }
}
