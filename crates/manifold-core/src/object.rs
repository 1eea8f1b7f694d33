//! Kubernetes object identity over a parsed document

use crate::error::CoreError;
use crate::yaml::{Field, Node};
use serde::Serialize;
use std::fmt;

pub const API_VERSION_FIELD: &str = "apiVersion";
pub const KIND_FIELD: &str = "kind";
pub const NAMESPACE_FIELD: &str = "metadata.namespace";
pub const NAME_FIELD: &str = "metadata.name";
pub const SPEC_FIELD: &str = "spec";

/// Stand-in for an absent namespace so identities are always total
pub const NO_NAMESPACE: &str = "[noNamespace]";

const SEPARATOR: &str = "/";

/// A single manifest document
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    node: Node,
}

impl Object {
    pub fn new(node: Node) -> Self {
        Self { node }
    }

    pub fn api_version(&self) -> String {
        self.field_value(API_VERSION_FIELD)
    }

    pub fn kind(&self) -> String {
        self.field_value(KIND_FIELD)
    }

    /// Namespace, or [`NO_NAMESPACE`] when the field is missing or empty
    pub fn namespace(&self) -> String {
        let namespace = self.field_value(NAMESPACE_FIELD);
        if namespace.is_empty() {
            NO_NAMESPACE.to_string()
        } else {
            namespace
        }
    }

    pub fn name(&self) -> String {
        self.field_value(NAME_FIELD)
    }

    /// `apiVersion/kind/namespace/name`
    ///
    /// This is the key used to pair raw and rendered forms of a manifest.
    pub fn id(&self) -> String {
        [self.api_version(), self.kind(), self.namespace(), self.name()].join(SEPARATOR)
    }

    pub fn get_field(&self, path: &str) -> Option<Field<'_>> {
        self.node.get_field(path)
    }

    pub fn find_field(&self, path: &str) -> Option<Field<'_>> {
        self.node.find_field(path)
    }

    pub fn set_field<T: Serialize + ?Sized>(&mut self, path: &str, value: &T) -> Result<(), CoreError> {
        self.node.set_field(path, value)
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn into_node(self) -> Node {
        self.node
    }

    pub fn start_line(&self) -> usize {
        self.node.start_line()
    }

    pub fn end_line(&self) -> usize {
        self.node.end_line()
    }

    /// Whole document as JSON
    pub fn to_json(&self) -> serde_json::Value {
        self.node.to_json()
    }

    /// The `spec` subtree as JSON, `Null` when absent
    pub fn spec(&self) -> serde_json::Value {
        self.get_field(SPEC_FIELD)
            .map(|field| field.value.to_json())
            .unwrap_or(serde_json::Value::Null)
    }

    fn field_value(&self, path: &str) -> String {
        self.node
            .get_field(path)
            .filter(|field| !field.value.is_null())
            .and_then(|field| field.value.as_str())
            .unwrap_or_default()
            .to_string()
    }
}

impl From<Node> for Object {
    fn from(node: Node) -> Self {
        Self::new(node)
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yaml::parse_str;

    fn object(content: &str) -> Object {
        Object::new(parse_str(content).unwrap().remove(0))
    }

    #[test]
    fn test_id_with_namespace() {
        let obj = object("apiVersion: v1\nkind: Service\nmetadata:\n  name: web\n  namespace: shop\n");
        assert_eq!(obj.id(), "v1/Service/shop/web");
    }

    #[test]
    fn test_id_without_namespace_uses_sentinel() {
        let obj = object("apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: frontend\n");
        assert_eq!(obj.namespace(), NO_NAMESPACE);
        assert_eq!(obj.id(), "apps/v1/Deployment/[noNamespace]/frontend");
    }

    #[test]
    fn test_null_namespace_uses_sentinel() {
        let obj = object("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n  namespace: ~\n");
        assert_eq!(obj.id(), "v1/ConfigMap/[noNamespace]/cfg");
    }

    #[test]
    fn test_quoted_identity_fields_match_plain() {
        let plain = object("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n");
        let quoted = object("apiVersion: \"v1\"\nkind: 'ConfigMap'\nmetadata:\n  name: \"cfg\"\n");
        assert_eq!(plain.id(), quoted.id());
    }

    #[test]
    fn test_spec_projection() {
        let obj = object("kind: Deployment\nspec:\n  replicas: 2\n");
        assert_eq!(obj.spec()["replicas"], 2);
        assert!(object("kind: Namespace\n").spec().is_null());
    }
}
