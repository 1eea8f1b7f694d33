//! In-process overlay build
//!
//! Resources are loaded from files and nested kustomizations and generators
//! add ConfigMaps and Secrets. Each level then applies its own
//! transformations in a fixed order: patches, images, replicas, namespace,
//! name prefix/suffix, labels and annotations. Generated names get their
//! content hash once the whole overlay is built.

use super::descriptor::{
    is_inline_patch, Descriptor, Generator, GeneratorOptions, Image, Kustomization, Patch,
};
use super::patch::{self, Selector};
use crate::error::{Result, SourceError};
use crate::paths::{normalize, relative_to};
use base64::Engine as _;
use manifold_core::yaml;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, trace};

/// Annotation carrying the file a built resource came from
pub const ORIGIN_ANNOTATION: &str = "config.kubernetes.io/origin";

/// Kinds that never receive a namespace
const CLUSTER_SCOPED: [&str; 11] = [
    "Namespace",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "PersistentVolume",
    "StorageClass",
    "PriorityClass",
    "IngressClass",
    "APIService",
    "ValidatingWebhookConfiguration",
    "MutatingWebhookConfiguration",
];

/// Kinds whose names are left alone by prefix and suffix
const UNPREFIXED: [&str; 2] = ["Namespace", "CustomResourceDefinition"];

/// Workload kinds whose pod template and selector follow `commonLabels`
const WORKLOADS: [&str; 4] = ["Deployment", "StatefulSet", "DaemonSet", "ReplicaSet"];

/// A resource produced by the build
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltResource {
    pub object: Value,
    /// Source file relative to the root overlay; `None` for generated content
    pub origin: Option<PathBuf>,
    pub generated: Option<Generated>,
}

/// Bookkeeping for a ConfigMap or Secret made by a generator
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    /// Name given in the generator entry
    pub name: String,
    /// Append the content hash to the final name
    pub hash: bool,
}

impl BuiltResource {
    fn text(&self, pointer: &str) -> &str {
        self.object.pointer(pointer).and_then(Value::as_str).unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.text("/kind")
    }

    pub fn name(&self) -> &str {
        self.text("/metadata/name")
    }

    fn metadata_map(&mut self, field: &str) -> Option<&mut Map<String, Value>> {
        let metadata = self.object.as_object_mut()?.entry("metadata").or_insert_with(|| Value::Object(Map::new()));
        let map = metadata.as_object_mut()?.entry(field).or_insert_with(|| Value::Object(Map::new()));
        map.as_object_mut()
    }

    fn set_metadata(&mut self, field: &str, value: &str) {
        if let Some(metadata) = self
            .object
            .as_object_mut()
            .map(|object| object.entry("metadata").or_insert_with(|| Value::Object(Map::new())))
            .and_then(Value::as_object_mut)
        {
            metadata.insert(field.to_string(), Value::String(value.to_string()));
        }
    }

    /// Record the origin as an annotation
    pub fn annotate_origin(&mut self) {
        let Some(origin) = self.origin.as_ref().map(|path| path_text(path)) else {
            return;
        };
        if let Some(annotations) = self.metadata_map("annotations") {
            annotations.insert(ORIGIN_ANNOTATION.to_string(), Value::String(format!("path: {}\n", origin)));
        }
    }

    /// Drop the origin annotation and an `annotations` map it leaves empty
    pub fn remove_origin_annotation(&mut self) {
        let Some(metadata) = self.object.get_mut("metadata").and_then(Value::as_object_mut) else {
            return;
        };
        let now_empty = match metadata.get_mut("annotations").and_then(Value::as_object_mut) {
            Some(annotations) => {
                annotations.remove(ORIGIN_ANNOTATION);
                annotations.is_empty()
            }
            None => false,
        };
        if now_empty {
            metadata.remove("annotations");
        }
    }
}

/// Forward-slash form used in annotations
fn path_text(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the overlay rooted at `root`.
///
/// Origins are always tracked; they are written as annotations only when
/// the root descriptor requests `originAnnotations`.
#[instrument(level = "debug")]
pub fn build(root: &Path) -> Result<Vec<BuiltResource>> {
    let descriptor = Descriptor::load(root)?;
    let mut builder = Builder {
        root: normalize(root),
        stack: Vec::new(),
    };
    let mut resources = builder.build_level(&descriptor)?;
    apply_name_hashes(&mut resources);

    if descriptor.origin_annotations() {
        resources.iter_mut().for_each(BuiltResource::annotate_origin);
    }
    debug!("Built {} resource(s) from {}", resources.len(), root.display());
    Ok(resources)
}

struct Builder {
    root: PathBuf,
    /// Kustomization directories being built, for cycle detection
    stack: Vec<PathBuf>,
}

impl Builder {
    fn build_level(&mut self, descriptor: &Descriptor) -> Result<Vec<BuiltResource>> {
        let dir = normalize(descriptor.dir());
        if self.stack.contains(&dir) {
            return Err(SourceError::kustomize(&dir, "cycle detected between kustomizations"));
        }
        self.stack.push(dir.clone());

        let k = &descriptor.kustomization;
        let mut resources = Vec::new();
        for entry in k.resources.iter().chain(k.bases.iter()) {
            resources.extend(self.load_entry(&dir, entry)?);
        }
        trace!("Loaded {} resource(s) at {}", resources.len(), dir.display());
        generate(&dir, k, &mut resources)?;

        apply_strategic_merge_patches(&dir, k, &mut resources)?;
        for entry in &k.patches_json6902 {
            if entry.target.is_none() {
                return Err(SourceError::kustomize(&dir, "patchesJson6902 entry without a target"));
            }
            apply_patch(&dir, entry, &mut resources)?;
        }
        for entry in &k.patches {
            apply_patch(&dir, entry, &mut resources)?;
        }
        apply_images(&k.images, &mut resources);
        apply_replicas(k, &mut resources);
        apply_namespace(&k.namespace, &mut resources);
        apply_name_affixes(&k.name_prefix, &k.name_suffix, &mut resources);
        apply_labels(&k.common_labels, true, true, &mut resources);
        for label in &k.labels {
            apply_labels(&label.pairs, label.include_selectors, label.include_templates, &mut resources);
        }
        apply_annotations(&k.common_annotations, &mut resources);

        self.stack.pop();
        Ok(resources)
    }

    fn load_entry(&mut self, dir: &Path, entry: &str) -> Result<Vec<BuiltResource>> {
        if is_remote(entry) {
            return Err(SourceError::Unsupported(format!("remote kustomize resource {}", entry)));
        }

        let path = normalize(&dir.join(entry));
        if path.is_dir() {
            let descriptor = Descriptor::load(&path)?;
            return self.build_level(&descriptor);
        }

        let origin = relative_to(&path, &self.root);
        Ok(yaml::parse_file(&path)?
            .iter()
            .map(|document| BuiltResource {
                object: document.to_json(),
                origin: Some(origin.clone()),
                generated: None,
            })
            .collect())
    }
}

fn is_remote(entry: &str) -> bool {
    ["http://", "https://", "git@", "git::", "github.com/"]
        .iter()
        .any(|prefix| entry.starts_with(prefix))
        || entry.contains("?ref=")
}

/// Documents of a patch given as a path or inline text
fn patch_documents(dir: &Path, path: Option<&str>, inline: Option<&str>) -> Result<Vec<Value>> {
    let documents = match (path, inline) {
        (Some(path), _) => yaml::parse_file(&dir.join(path))?,
        (None, Some(text)) => yaml::parse_str(text)?,
        (None, None) => return Err(SourceError::kustomize(dir, "patch without path or content")),
    };
    Ok(documents.iter().map(|document| document.to_json()).collect())
}

fn apply_strategic_merge_patches(dir: &Path, k: &Kustomization, resources: &mut Vec<BuiltResource>) -> Result<()> {
    for entry in &k.patches_strategic_merge {
        let documents = if is_inline_patch(entry) {
            patch_documents(dir, None, Some(entry))?
        } else {
            patch_documents(dir, Some(entry), None)?
        };
        for document in documents {
            apply_untargeted(dir, &document, resources)?;
        }
    }
    Ok(())
}

/// Strategic merge patch that names its own target
fn apply_untargeted(dir: &Path, document: &Value, resources: &mut Vec<BuiltResource>) -> Result<()> {
    let Some(index) = resources
        .iter()
        .position(|resource| patch::same_object(&resource.object, document))
    else {
        let name = document.pointer("/metadata/name").and_then(Value::as_str).unwrap_or_default();
        let kind = document.get("kind").and_then(Value::as_str).unwrap_or_default();
        return Err(SourceError::kustomize(dir, format!("no resource matches patch {}/{}", kind, name)));
    };

    if patch::deletes_resource(document) {
        resources.remove(index);
    } else {
        patch::strategic_merge(&mut resources[index].object, document);
    }
    Ok(())
}

fn apply_patch(dir: &Path, entry: &Patch, resources: &mut Vec<BuiltResource>) -> Result<()> {
    let documents = patch_documents(dir, entry.path.as_deref(), entry.patch.as_deref())?;

    let Some(target) = &entry.target else {
        for document in &documents {
            apply_untargeted(dir, document, resources)?;
        }
        return Ok(());
    };

    let selector = Selector::new(target).map_err(|e| SourceError::kustomize(dir, e))?;
    let mut deleted = Vec::new();
    let mut matched = 0;
    for (index, resource) in resources.iter_mut().enumerate() {
        if !selector.matches(&resource.object) {
            continue;
        }
        matched += 1;
        for document in &documents {
            match document {
                Value::Array(operations) => patch::json6902(&mut resource.object, operations)
                    .map_err(|e| SourceError::kustomize(dir, e))?,
                _ if patch::deletes_resource(document) => deleted.push(index),
                _ => patch::strategic_merge(&mut resource.object, document),
            }
        }
    }
    if matched == 0 {
        debug!("Patch target {:?} matched nothing in {}", target, dir.display());
    }
    deleted.dedup();
    for index in deleted.into_iter().rev() {
        resources.remove(index);
    }
    Ok(())
}

/// Call `visit` on every container and init container inside `value`
fn visit_containers(value: &mut Value, visit: &mut dyn FnMut(&mut Map<String, Value>)) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                match (key.as_str(), child) {
                    ("containers" | "initContainers", Value::Array(items)) => {
                        items.iter_mut().filter_map(Value::as_object_mut).for_each(&mut *visit);
                    }
                    (_, child) => visit_containers(child, visit),
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| visit_containers(item, visit)),
        _ => {}
    }
}

/// `nginx:1.25` is `("nginx", ":1.25")`, `nginx@sha256:..` keeps the digest
fn split_image(image: &str) -> (&str, &str) {
    if let Some(at) = image.find('@') {
        return image.split_at(at);
    }
    let last_slash = image.rfind('/').map_or(0, |i| i + 1);
    match image[last_slash..].find(':') {
        Some(colon) => image.split_at(last_slash + colon),
        None => (image, ""),
    }
}

fn apply_images(images: &[Image], resources: &mut [BuiltResource]) {
    if images.is_empty() {
        return;
    }
    for resource in resources {
        visit_containers(&mut resource.object, &mut |container| {
            let Some(current) = container.get("image").and_then(Value::as_str) else {
                return;
            };
            let (name, reference) = split_image(current);
            let Some(image) = images.iter().find(|image| image.name == name) else {
                return;
            };
            let new_name = image.new_name.as_deref().unwrap_or(name);
            let reference = match (&image.digest, &image.new_tag) {
                (Some(digest), _) => format!("@{}", digest),
                (None, Some(tag)) => format!(":{}", tag),
                (None, None) => reference.to_string(),
            };
            let updated = format!("{}{}", new_name, reference);
            container.insert("image".to_string(), Value::String(updated));
        });
    }
}

fn apply_replicas(k: &Kustomization, resources: &mut [BuiltResource]) {
    for replica in &k.replicas {
        for resource in resources.iter_mut().filter(|resource| resource.name() == replica.name) {
            if let Some(spec) = resource.object.get_mut("spec").and_then(Value::as_object_mut) {
                spec.insert("replicas".to_string(), Value::from(replica.count));
            }
        }
    }
}

fn apply_namespace(namespace: &str, resources: &mut [BuiltResource]) {
    if namespace.is_empty() {
        return;
    }
    for resource in resources {
        if !CLUSTER_SCOPED.contains(&resource.kind()) {
            resource.set_metadata("namespace", namespace);
        }
    }
}

fn apply_name_affixes(prefix: &str, suffix: &str, resources: &mut [BuiltResource]) {
    if prefix.is_empty() && suffix.is_empty() {
        return;
    }
    for resource in resources {
        if UNPREFIXED.contains(&resource.kind()) {
            continue;
        }
        let name = format!("{}{}{}", prefix, resource.name(), suffix);
        resource.set_metadata("name", &name);
    }
}

/// Insert every entry of `values` into the map at `pointer`, creating it
fn merge_into(object: &mut Value, pointer: &[&str], values: &BTreeMap<String, String>) {
    let mut current = object;
    for key in pointer {
        let Some(map) = current.as_object_mut() else {
            return;
        };
        current = map.entry(key.to_string()).or_insert_with(|| Value::Object(Map::new()));
    }
    if let Some(map) = current.as_object_mut() {
        for (key, value) in values {
            map.insert(key.clone(), Value::String(value.clone()));
        }
    }
}

/// `commonLabels` reach selectors and pod templates; `labels` entries only
/// when they ask to
fn apply_labels(
    labels: &BTreeMap<String, String>,
    selectors: bool,
    templates: bool,
    resources: &mut [BuiltResource],
) {
    if labels.is_empty() {
        return;
    }
    for resource in resources {
        merge_into(&mut resource.object, &["metadata", "labels"], labels);
        let kind = resource.kind().to_string();
        let template: &[&str] = match kind.as_str() {
            "Service" => {
                if selectors {
                    merge_into(&mut resource.object, &["spec", "selector"], labels);
                }
                continue;
            }
            kind if WORKLOADS.contains(&kind) => {
                if selectors {
                    merge_into(&mut resource.object, &["spec", "selector", "matchLabels"], labels);
                }
                &["spec", "template", "metadata", "labels"]
            }
            "Job" => &["spec", "template", "metadata", "labels"],
            "CronJob" => &["spec", "jobTemplate", "spec", "template", "metadata", "labels"],
            _ => continue,
        };
        if selectors || templates {
            merge_into(&mut resource.object, template, labels);
        }
    }
}

/// `KEY=VALUE` with one level of matching quotes removed from the value
fn split_pair<'t>(entry: &'t str, dir: &Path) -> Result<(&'t str, &'t str)> {
    let (key, value) = entry
        .split_once('=')
        .ok_or_else(|| SourceError::kustomize(dir, format!("invalid literal {:?}, want KEY=VALUE", entry)))?;
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|quote| value.strip_prefix(*quote)?.strip_suffix(*quote));
    Ok((key.trim(), unquoted.unwrap_or(value)))
}

/// Dotenv lines; a bare key takes its value from the environment
fn read_env_file(path: &Path, data: &mut BTreeMap<String, String>) -> Result<()> {
    let content = fs::read_to_string(path)?;
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) => data.insert(key.trim().to_string(), value.to_string()),
            None => data.insert(line.to_string(), std::env::var(line).unwrap_or_default()),
        };
    }
    Ok(())
}

fn generator_data(dir: &Path, generator: &Generator) -> Result<BTreeMap<String, String>> {
    let mut data = BTreeMap::new();
    for entry in &generator.literals {
        let (key, value) = split_pair(entry, dir)?;
        data.insert(key.to_string(), value.to_string());
    }
    for entry in &generator.files {
        let (key, file) = match entry.split_once('=') {
            Some((key, file)) => (key.to_string(), file),
            None => {
                let name = Path::new(entry).file_name().map(|name| name.to_string_lossy().into_owned());
                (name.unwrap_or_else(|| entry.clone()), entry.as_str())
            }
        };
        data.insert(key, fs::read_to_string(dir.join(file))?);
    }
    for env in generator.envs.iter().chain(&generator.env) {
        read_env_file(&dir.join(env), &mut data)?;
    }
    Ok(data)
}

/// A ConfigMap or Secret built from one generator entry
fn generated_object(
    kind: &str,
    generator: &Generator,
    defaults: Option<&GeneratorOptions>,
    data: BTreeMap<String, String>,
) -> (Value, bool) {
    let mut labels = BTreeMap::new();
    let mut annotations = BTreeMap::new();
    let mut hash = true;
    let mut immutable = false;
    for options in defaults.into_iter().chain(&generator.options) {
        labels.extend(options.labels.clone());
        annotations.extend(options.annotations.clone());
        hash &= !options.disable_name_suffix_hash;
        immutable |= options.immutable;
    }

    let mut metadata = Map::new();
    metadata.insert("name".to_string(), Value::String(generator.name.clone()));
    if let Some(namespace) = &generator.namespace {
        metadata.insert("namespace".to_string(), Value::String(namespace.clone()));
    }
    if !labels.is_empty() {
        metadata.insert("labels".to_string(), serde_json::json!(labels));
    }
    if !annotations.is_empty() {
        metadata.insert("annotations".to_string(), serde_json::json!(annotations));
    }

    let data: Map<String, Value> = data
        .into_iter()
        .map(|(key, value)| {
            let value = if kind == "Secret" {
                base64::engine::general_purpose::STANDARD.encode(value)
            } else {
                value
            };
            (key, Value::String(value))
        })
        .collect();

    let mut object = Map::new();
    object.insert("apiVersion".to_string(), Value::String("v1".to_string()));
    object.insert("kind".to_string(), Value::String(kind.to_string()));
    object.insert("metadata".to_string(), Value::Object(metadata));
    object.insert("data".to_string(), Value::Object(data));
    if kind == "Secret" {
        let secret_type = generator.secret_type.as_deref().unwrap_or("Opaque");
        object.insert("type".to_string(), Value::String(secret_type.to_string()));
    }
    if immutable {
        object.insert("immutable".to_string(), Value::Bool(true));
    }
    (Value::Object(object), hash)
}

/// Run `configMapGenerator` and `secretGenerator`; `merge` and `replace`
/// update a ConfigMap or Secret generated by a base
fn generate(dir: &Path, k: &Kustomization, resources: &mut Vec<BuiltResource>) -> Result<()> {
    let entries = k
        .config_map_generator
        .iter()
        .map(|generator| ("ConfigMap", generator))
        .chain(k.secret_generator.iter().map(|generator| ("Secret", generator)));

    for (kind, generator) in entries {
        let data = generator_data(dir, generator)?;
        let (object, hash) = generated_object(kind, generator, k.generator_options.as_ref(), data);
        let existing = resources.iter().position(|resource| {
            resource.kind() == kind
                && resource
                    .generated
                    .as_ref()
                    .is_some_and(|generated| generated.name == generator.name)
        });

        match (generator.behavior.as_deref().unwrap_or("create"), existing) {
            ("create", None) => resources.push(BuiltResource {
                object,
                origin: None,
                generated: Some(Generated {
                    name: generator.name.clone(),
                    hash,
                }),
            }),
            ("create", Some(_)) => {
                return Err(SourceError::kustomize(
                    dir,
                    format!("{} {} is already generated; use behavior merge or replace", kind, generator.name),
                ))
            }
            ("merge", Some(index)) => {
                let mut overlay = object;
                if let Some(metadata) = overlay.get_mut("metadata").and_then(Value::as_object_mut) {
                    metadata.remove("name");
                }
                patch::strategic_merge(&mut resources[index].object, &overlay);
                set_hash(&mut resources[index], hash);
            }
            ("replace", Some(index)) => {
                let name = resources[index].name().to_string();
                resources[index].object = object;
                resources[index].set_metadata("name", &name);
                set_hash(&mut resources[index], hash);
            }
            (behavior @ ("merge" | "replace"), None) => {
                return Err(SourceError::kustomize(
                    dir,
                    format!("no generated {} {} to {}", kind, generator.name, behavior),
                ))
            }
            (behavior, _) => {
                return Err(SourceError::kustomize(dir, format!("unknown generator behavior {:?}", behavior)))
            }
        }
        debug!("Generated {} {} in {}", kind, generator.name, dir.display());
    }
    Ok(())
}

fn set_hash(resource: &mut BuiltResource, hash: bool) {
    if let Some(generated) = resource.generated.as_mut() {
        generated.hash = hash;
    }
}

/// Content hash suffix of a generated ConfigMap or Secret
fn name_hash(object: &Value) -> String {
    let mut content = Map::new();
    for field in ["kind", "data", "binaryData", "type"] {
        if let Some(value) = object.get(field) {
            content.insert(field.to_string(), value.clone());
        }
    }
    content.insert("name".to_string(), object.pointer("/metadata/name").cloned().unwrap_or(Value::Null));
    let json = Value::Object(content)
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026");
    let digest = hex::encode(Sha256::digest(json.as_bytes()));
    digest
        .chars()
        .take(10)
        .map(|c| match c {
            '0' => 'g',
            '1' => 'h',
            '3' => 'k',
            'a' => 'm',
            'e' => 't',
            c => c,
        })
        .collect()
}

/// Point ConfigMap or Secret references named `from` at `to`
fn rename_references(value: &mut Value, kind: &str, from: &str, to: &str) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let field = match (kind, key.as_str()) {
                    ("ConfigMap", "configMapRef" | "configMapKeyRef" | "configMap") => Some("name"),
                    ("Secret", "secretRef" | "secretKeyRef") => Some("name"),
                    ("Secret", "secret") => Some("secretName"),
                    _ => None,
                };
                if let Some(field) = field {
                    rename_field(child, field, from, to);
                }
                if kind == "Secret" && key == "imagePullSecrets" {
                    if let Value::Array(items) = child {
                        items.iter_mut().for_each(|item| rename_field(item, "name", from, to));
                    }
                }
                rename_references(child, kind, from, to);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| rename_references(item, kind, from, to)),
        _ => {}
    }
}

fn rename_field(value: &mut Value, field: &str, from: &str, to: &str) {
    if let Some(slot) = value.get_mut(field) {
        if slot.as_str() == Some(from) {
            *slot = Value::String(to.to_string());
        }
    }
}

/// Give generated resources their final names and update references to them
fn apply_name_hashes(resources: &mut [BuiltResource]) {
    let mut renames = Vec::new();
    for resource in resources.iter_mut() {
        let Some(generated) = resource.generated.clone() else {
            continue;
        };
        let current = resource.name().to_string();
        let name = if generated.hash {
            format!("{}-{}", current, name_hash(&resource.object))
        } else {
            current.clone()
        };
        resource.set_metadata("name", &name);
        renames.push((resource.kind().to_string(), generated.name, current, name));
    }

    for (kind, original, current, name) in &renames {
        for resource in resources.iter_mut() {
            for from in [original, current] {
                if from != name {
                    rename_references(&mut resource.object, kind, from, name);
                }
            }
        }
    }
}

fn apply_annotations(annotations: &BTreeMap<String, String>, resources: &mut [BuiltResource]) {
    if annotations.is_empty() {
        return;
    }
    for resource in resources {
        merge_into(&mut resource.object, &["metadata", "annotations"], annotations);
        if WORKLOADS.contains(&resource.kind()) {
            merge_into(&mut resource.object, &["spec", "template", "metadata", "annotations"], annotations);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    const DEPLOYMENT: &str = "apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  replicas: 1
  selector:
    matchLabels:
      app: web
  template:
    metadata:
      labels:
        app: web
    spec:
      containers:
      - name: web
        image: nginx:1.25
";

    fn base(dir: &Path) -> std::io::Result<()> {
        fs::create_dir_all(dir.join("base"))?;
        fs::write(dir.join("base/deployment.yaml"), DEPLOYMENT)?;
        fs::write(
            dir.join("base/namespace.yaml"),
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: shop\n",
        )?;
        fs::write(
            dir.join("base/kustomization.yaml"),
            "resources:\n- deployment.yaml\n- namespace.yaml\n",
        )
    }

    #[test]
    fn test_overlay_transformations() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        base(dir.path())?;
        let overlay = dir.path().join("overlays/dev");
        fs::create_dir_all(&overlay)?;
        fs::write(
            overlay.join("kustomization.yaml"),
            "resources:\n- ../../base\nnamePrefix: dev-\nnamespace: shop\ncommonLabels:\n  env: dev\nimages:\n- name: nginx\n  newTag: \"1.27\"\nreplicas:\n- name: web\n  count: 3\n",
        )?;

        let resources = build(&overlay)?;
        assert_eq!(resources.len(), 2);

        let deployment = &resources[0].object;
        assert_eq!(deployment["metadata"]["name"], "dev-web");
        assert_eq!(deployment["metadata"]["namespace"], "shop");
        assert_eq!(deployment["metadata"]["labels"]["env"], "dev");
        assert_eq!(deployment["spec"]["selector"]["matchLabels"]["env"], "dev");
        assert_eq!(deployment["spec"]["replicas"], 3);
        assert_eq!(deployment["spec"]["template"]["spec"]["containers"][0]["image"], "nginx:1.27");
        assert_eq!(resources[0].origin, Some(PathBuf::from("../../base/deployment.yaml")));

        let namespace = &resources[1].object;
        assert_eq!(namespace["metadata"]["name"], "shop");
        assert_eq!(namespace["metadata"].get("namespace"), None);
        Ok(())
    }

    #[test]
    fn test_patches_and_origin_annotations() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        base(dir.path())?;
        let overlay = dir.path().join("overlays/prod");
        fs::create_dir_all(&overlay)?;
        fs::write(
            overlay.join("replicas.yaml"),
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\nspec:\n  replicas: 5\n",
        )?;
        fs::write(
            overlay.join("kustomization.yaml"),
            "resources:
- ../../base
patchesStrategicMerge:
- replicas.yaml
patches:
- target:
    kind: Deployment
    name: web
  patch: |-
    - op: add
      path: /metadata/labels
      value:
        tier: frontend
- target:
    kind: Namespace
  patch: |-
    $patch: delete
    apiVersion: v1
    kind: Namespace
    metadata:
      name: shop
buildMetadata:
- originAnnotations
",
        )?;

        let resources = build(&overlay)?;
        assert_eq!(resources.len(), 1);
        let deployment = &resources[0].object;
        assert_eq!(deployment["spec"]["replicas"], 5);
        assert_eq!(deployment["metadata"]["labels"]["tier"], "frontend");
        assert_eq!(
            deployment["metadata"]["annotations"][ORIGIN_ANNOTATION],
            "path: ../../base/deployment.yaml\n"
        );

        let mut stripped = resources[0].clone();
        stripped.remove_origin_annotation();
        assert_eq!(stripped.object["metadata"].get("annotations"), None);
        Ok(())
    }

    #[test]
    fn test_unmatched_patch_is_an_error() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        base(dir.path())?;
        fs::write(
            dir.path().join("base/kustomization.yaml"),
            "resources:\n- deployment.yaml\npatchesStrategicMerge:\n- |-\n  kind: Deployment\n  metadata:\n    name: api\n",
        )?;
        assert!(matches!(build(&dir.path().join("base")), Err(SourceError::Kustomize { .. })));
        Ok(())
    }

    #[test]
    fn test_remote_resources_are_unsupported() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("kustomization.yaml"),
            "resources:\n- https://github.com/example/app//deploy?ref=v1\n",
        )?;
        assert!(matches!(build(dir.path()), Err(SourceError::Unsupported(_))));
        Ok(())
    }

    #[test]
    fn test_generators_hash_names_and_update_references() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let root = dir.path();
        fs::write(
            root.join("deployment.yaml"),
            "apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  template:
    spec:
      containers:
      - name: web
        envFrom:
        - configMapRef:
            name: settings
        - secretRef:
            name: creds
      volumes:
      - name: config
        configMap:
          name: settings
",
        )?;
        fs::write(root.join("app.env"), "# defaults\nMODE=fast\n\nREGION=eu\n")?;
        fs::write(
            root.join("kustomization.yaml"),
            "resources:
- deployment.yaml
namePrefix: dev-
configMapGenerator:
- name: settings
  literals:
  - LOG_LEVEL=\"debug\"
  envs:
  - app.env
secretGenerator:
- name: creds
  literals:
  - password=s3cret
  options:
    disableNameSuffixHash: true
",
        )?;

        let resources = build(root)?;
        assert_eq!(resources.len(), 3);

        let config_map = &resources[1];
        assert_eq!(config_map.origin, None);
        assert_eq!(
            config_map.object["data"],
            serde_json::json!({"LOG_LEVEL": "debug", "MODE": "fast", "REGION": "eu"})
        );
        let name = config_map.name();
        let hash = name.strip_prefix("dev-settings-").ok_or("missing hash suffix")?;
        assert_eq!(hash.len(), 10);
        assert_eq!(name, format!("dev-settings-{}", name_hash(&{
            let mut unhashed = config_map.object.clone();
            unhashed["metadata"]["name"] = Value::from("dev-settings");
            unhashed
        })));

        let secret = &resources[2].object;
        assert_eq!(secret["metadata"]["name"], "dev-creds");
        assert_eq!(secret["data"]["password"], "czNjcmV0");
        assert_eq!(secret["type"], "Opaque");

        let pod = &resources[0].object["spec"]["template"]["spec"];
        assert_eq!(pod["containers"][0]["envFrom"][0]["configMapRef"]["name"], name);
        assert_eq!(pod["containers"][0]["envFrom"][1]["secretRef"]["name"], "dev-creds");
        assert_eq!(pod["volumes"][0]["configMap"]["name"], name);
        Ok(())
    }

    #[test]
    fn test_generator_merge_extends_base_data() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("base"))?;
        fs::write(
            dir.path().join("base/kustomization.yaml"),
            "configMapGenerator:\n- name: settings\n  literals: [A=1, B=2]\n",
        )?;
        let overlay = dir.path().join("overlay");
        fs::create_dir_all(&overlay)?;
        fs::write(
            overlay.join("kustomization.yaml"),
            "resources:\n- ../base\nconfigMapGenerator:\n- name: settings\n  behavior: merge\n  literals: [B=3]\n  options:\n    disableNameSuffixHash: true\n",
        )?;

        let resources = build(&overlay)?;
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].name(), "settings");
        assert_eq!(resources[0].object["data"], serde_json::json!({"A": "1", "B": "3"}));

        fs::write(
            overlay.join("kustomization.yaml"),
            "resources:\n- ../base\nconfigMapGenerator:\n- name: settings\n  literals: [B=3]\n",
        )?;
        assert!(matches!(build(&overlay), Err(SourceError::Kustomize { .. })));
        Ok(())
    }

    #[test]
    fn test_json6902_patches_and_labels() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        base(dir.path())?;
        let overlay = dir.path().join("overlays/prod");
        fs::create_dir_all(&overlay)?;
        fs::write(overlay.join("ops.yaml"), "- op: replace\n  path: /spec/replicas\n  value: 5\n")?;
        fs::write(
            overlay.join("kustomization.yaml"),
            "resources:
- ../../base
patchesJson6902:
- target:
    group: apps
    version: v1
    kind: Deployment
    name: web
  path: ops.yaml
labels:
- pairs:
    team: shop
- pairs:
    tier: web
  includeTemplates: true
",
        )?;

        let resources = build(&overlay)?;
        let deployment = &resources[0].object;
        assert_eq!(deployment["spec"]["replicas"], 5);
        assert_eq!(deployment["metadata"]["labels"]["team"], "shop");
        assert_eq!(deployment["spec"]["template"]["metadata"]["labels"].get("team"), None);
        assert_eq!(deployment["spec"]["template"]["metadata"]["labels"]["tier"], "web");
        assert_eq!(deployment["spec"]["selector"]["matchLabels"].get("tier"), None);

        fs::write(
            overlay.join("kustomization.yaml"),
            "resources:\n- ../../base\npatchesJson6902:\n- path: ops.yaml\n",
        )?;
        assert!(matches!(build(&overlay), Err(SourceError::Kustomize { .. })));
        Ok(())
    }

    #[test]
    fn test_name_hash_encoding() {
        let hash = name_hash(&serde_json::json!({
            "kind": "ConfigMap",
            "metadata": {"name": "settings"},
            "data": {"a": "<b>"}
        }));
        assert_eq!(hash.len(), 10);
        assert!(!hash.contains(['0', '1', '3', 'a', 'e']));
    }

    #[test]
    fn test_split_image() {
        assert_eq!(split_image("nginx:1.25"), ("nginx", ":1.25"));
        assert_eq!(split_image("registry:5000/app"), ("registry:5000/app", ""));
        assert_eq!(split_image("app@sha256:abc"), ("app", "@sha256:abc"));
    }
}
