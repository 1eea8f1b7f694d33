//! Strategic merge and JSON 6902 patches over built resources

use super::descriptor::Target;
use regex::Regex;
use serde_json::{Map, Value};

const PATCH_DIRECTIVE: &str = "$patch";
const DELETE: &str = "delete";
const REPLACE: &str = "replace";

/// Keys used to pair list items, in preference order
const MERGE_KEYS: [&str; 5] = ["name", "mountPath", "containerPort", "port", "ip"];

/// `$patch: delete` at the top of a patch removes the whole resource
pub fn deletes_resource(patch: &Value) -> bool {
    directive(patch) == Some(DELETE)
}

fn directive(value: &Value) -> Option<&str> {
    value.get(PATCH_DIRECTIVE).and_then(Value::as_str)
}

/// Apply a strategic merge patch in place.
///
/// Maps merge recursively and `null` deletes a key. Lists of maps are paired
/// by a merge key such as `name`; any other list is replaced.
pub fn strategic_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            if patch.get(PATCH_DIRECTIVE).and_then(Value::as_str) == Some(REPLACE) {
                *target = without_directives(patch);
                return;
            }
            for (key, value) in patch {
                if key.starts_with('$') {
                    continue;
                }
                if value.is_null() {
                    target.remove(key);
                    continue;
                }
                match target.get_mut(key) {
                    Some(existing) => strategic_merge(existing, value),
                    None => {
                        target.insert(key.clone(), strip(value));
                    }
                }
            }
        }
        (Value::Array(target), Value::Array(patch)) => match merge_key(patch) {
            Some(key) => merge_list(target, patch, key),
            None => *target = patch.iter().map(strip).collect(),
        },
        (target, patch) => *target = strip(patch),
    }
}

fn merge_key(items: &[Value]) -> Option<&'static str> {
    if items.is_empty() || !items.iter().all(Value::is_object) {
        return None;
    }
    MERGE_KEYS
        .into_iter()
        .find(|key| items.iter().all(|item| item.get(key).is_some()))
}

fn merge_list(target: &mut Vec<Value>, patch: &[Value], key: &str) {
    for item in patch {
        let id = item.get(key);
        let position = target.iter().position(|existing| existing.get(key) == id);
        match (position, directive(item)) {
            (Some(index), Some(DELETE)) => {
                target.remove(index);
            }
            (None, Some(DELETE)) => {}
            (Some(index), _) => strategic_merge(&mut target[index], item),
            (None, _) => target.push(strip(item)),
        }
    }
}

/// Copy of `value` with `$` directives removed at every level
fn strip(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(without_directives(map)),
        Value::Array(items) => Value::Array(items.iter().map(strip).collect()),
        other => other.clone(),
    }
}

fn without_directives(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .filter(|(key, _)| !key.starts_with('$'))
        .map(|(key, value)| (key.clone(), strip(value)))
        .collect()
}

/// Apply JSON 6902 operations in order
pub fn json6902(target: &mut Value, operations: &[Value]) -> Result<(), String> {
    for operation in operations {
        let op = operation
            .get("op")
            .and_then(Value::as_str)
            .ok_or("operation without op")?;
        let path = operation
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| format!("{} without path", op))?;
        let value = || {
            operation
                .get("value")
                .cloned()
                .ok_or_else(|| format!("{} {} without value", op, path))
        };
        let from = || {
            operation
                .get("from")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("{} {} without from", op, path))
        };

        match op {
            "add" => add(target, path, value()?)?,
            "remove" => {
                remove(target, path)?;
            }
            "replace" => {
                let slot = target
                    .pointer_mut(path)
                    .ok_or_else(|| format!("replace: {} does not exist", path))?;
                *slot = value()?;
            }
            "move" => {
                let moved = remove(target, from()?)?;
                add(target, path, moved)?;
            }
            "copy" => {
                let source = from()?;
                let copied = target
                    .pointer(source)
                    .cloned()
                    .ok_or_else(|| format!("copy: {} does not exist", source))?;
                add(target, path, copied)?;
            }
            "test" => {
                if target.pointer(path) != Some(&value()?) {
                    return Err(format!("test failed at {}", path));
                }
            }
            other => return Err(format!("unknown operation {}", other)),
        }
    }
    Ok(())
}

/// Split a pointer into its parent pointer and unescaped last token
fn split_pointer(path: &str) -> Result<(&str, String), String> {
    let index = path
        .rfind('/')
        .ok_or_else(|| format!("invalid pointer {}", path))?;
    let token = path[index + 1..].replace("~1", "/").replace("~0", "~");
    Ok((&path[..index], token))
}

fn add(target: &mut Value, path: &str, value: Value) -> Result<(), String> {
    if path.is_empty() {
        *target = value;
        return Ok(());
    }
    let (parent, token) = split_pointer(path)?;
    match target.pointer_mut(parent) {
        Some(Value::Object(map)) => {
            map.insert(token, value);
            Ok(())
        }
        Some(Value::Array(items)) => {
            let index = if token == "-" {
                items.len()
            } else {
                token
                    .parse::<usize>()
                    .map_err(|_| format!("add: invalid index {}", token))?
            };
            if index > items.len() {
                return Err(format!("add: index {} out of bounds", index));
            }
            items.insert(index, value);
            Ok(())
        }
        _ => Err(format!("add: parent of {} does not exist", path)),
    }
}

fn remove(target: &mut Value, path: &str) -> Result<Value, String> {
    let (parent, token) = split_pointer(path)?;
    let removed = match target.pointer_mut(parent) {
        Some(Value::Object(map)) => map.remove(&token),
        Some(Value::Array(items)) => token
            .parse::<usize>()
            .ok()
            .filter(|index| *index < items.len())
            .map(|index| items.remove(index)),
        _ => None,
    };
    removed.ok_or_else(|| format!("remove: {} does not exist", path))
}

/// Compiled form of a patch [`Target`]
#[derive(Debug)]
pub struct Selector {
    group: Option<String>,
    version: Option<String>,
    kind: Option<String>,
    name: Option<Regex>,
    namespace: Option<Regex>,
    labels: Vec<(String, String)>,
}

impl Selector {
    pub fn new(target: &Target) -> Result<Self, regex::Error> {
        let anchored = |pattern: &Option<String>| {
            pattern
                .as_ref()
                .map(|pattern| Regex::new(&format!("^(?:{})$", pattern)))
                .transpose()
        };
        let labels = target
            .label_selector
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .filter_map(|pair| pair.split_once('='))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect();

        Ok(Self {
            group: target.group.clone(),
            version: target.version.clone(),
            kind: target.kind.clone(),
            name: anchored(&target.name)?,
            namespace: anchored(&target.namespace)?,
            labels,
        })
    }

    pub fn matches(&self, resource: &Value) -> bool {
        let text = |pointer: &str| resource.pointer(pointer).and_then(Value::as_str).unwrap_or_default();
        let (group, version) = split_api_version(text("/apiVersion"));

        self.group.as_deref().map_or(true, |g| g == group)
            && self.version.as_deref().map_or(true, |v| v == version)
            && self.kind.as_deref().map_or(true, |k| k == text("/kind"))
            && self.name.as_ref().map_or(true, |re| re.is_match(text("/metadata/name")))
            && self
                .namespace
                .as_ref()
                .map_or(true, |re| re.is_match(text("/metadata/namespace")))
            && self.labels.iter().all(|(key, value)| {
                resource
                    .get("metadata")
                    .and_then(|metadata| metadata.get("labels"))
                    .and_then(|labels| labels.get(key))
                    .and_then(Value::as_str)
                    == Some(value.as_str())
            })
    }
}

/// `apps/v1` is `("apps", "v1")`, `v1` is `("", "v1")`
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    api_version.rsplit_once('/').unwrap_or(("", api_version))
}

/// Whether a strategic merge patch without a target applies to `resource`
pub fn same_object(resource: &Value, patch: &Value) -> bool {
    let field = |value: &Value, pointer: &str| value.pointer(pointer).and_then(Value::as_str).map(str::to_string);
    let namespace = field(patch, "/metadata/namespace");

    field(resource, "/kind") == field(patch, "/kind")
        && field(resource, "/metadata/name") == field(patch, "/metadata/name")
        && (namespace.is_none() || field(resource, "/metadata/namespace") == namespace)
}
