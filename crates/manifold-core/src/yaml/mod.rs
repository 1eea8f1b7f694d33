//! YAML documents with source positions
//!
//! [`Node`] is a parsed YAML tree that keeps the 1-based line and 0-based
//! column of every node, plus enough layout (scalar style, sequence
//! indentation, comments) to write untouched content back in the same shape.

mod comment;
mod emit;
mod parse;
mod value;

pub use comment::Comments;
pub use emit::{to_string, to_stream};
pub use parse::{parse_file, parse_str};
pub use value::format_number;

use crate::error::CoreError;
use crate::keypath::{self, Lookup};
use serde::Serialize;

/// Presentation style of a scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarStyle {
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
}

/// Where the `-` of a block sequence sits relative to its parent key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceIndent {
    /// `key:\n  - item`
    Indented,
    /// `key:\n- item`
    Flush,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Scalar { value: String, style: ScalarStyle },
    Mapping(Vec<(Node, Node)>),
    Sequence { items: Vec<Node>, indent: SequenceIndent },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    kind: NodeKind,
    line: usize,
    column: usize,
    tag: Option<String>,
    comments: Comments,
}

/// A key/value pair returned by a lookup.
///
/// For sequence elements the key is the element itself.
#[derive(Debug, Clone, Copy)]
pub struct Field<'a> {
    pub key: &'a Node,
    pub value: &'a Node,
}

impl Field<'_> {
    pub fn start_line(&self) -> usize {
        self.key.start_line()
    }

    pub fn end_line(&self) -> usize {
        self.value.end_line()
    }
}

impl Node {
    pub fn new(kind: NodeKind, line: usize, column: usize) -> Self {
        Self {
            kind,
            line,
            column,
            tag: None,
            comments: Comments::default(),
        }
    }

    pub fn scalar(value: impl Into<String>, style: ScalarStyle, line: usize, column: usize) -> Self {
        Self::new(
            NodeKind::Scalar {
                value: value.into(),
                style,
            },
            line,
            column,
        )
    }

    /// A string scalar, quoted only when the plain form would read as
    /// something else
    pub fn string(value: &str, line: usize, column: usize) -> Self {
        let style = if emit::plain_safe(value) {
            ScalarStyle::Plain
        } else {
            ScalarStyle::DoubleQuoted
        };
        Self::scalar(value, style, line, column)
    }

    pub fn mapping(entries: Vec<(Node, Node)>, line: usize, column: usize) -> Self {
        Self::new(NodeKind::Mapping(entries), line, column)
    }

    pub fn sequence(items: Vec<Node>, line: usize, column: usize) -> Self {
        Self::new(
            NodeKind::Sequence {
                items,
                indent: SequenceIndent::Indented,
            },
            line,
            column,
        )
    }

    /// Build a subtree from any serializable value
    pub fn from_serialize<T: Serialize + ?Sized>(
        value: &T,
        line: usize,
        column: usize,
    ) -> Result<Self, CoreError> {
        let value = serde_yaml::to_value(value)?;
        Ok(Self::from_value(&value, line, column))
    }

    pub fn with_tag(mut self, tag: Option<String>) -> Self {
        self.tag = tag;
        self
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn comments(&self) -> &Comments {
        &self.comments
    }

    pub fn comments_mut(&mut self) -> &mut Comments {
        &mut self.comments
    }

    pub fn column(&self) -> usize {
        self.column
    }

    /// Line of the node itself (1-based)
    pub fn start_line(&self) -> usize {
        self.line
    }

    /// Line of the deepest, last-in-document-order descendant.
    pub fn end_line(&self) -> usize {
        let mut current = self;
        while let Some(child) = current.last_child() {
            current = child;
        }
        current.line
    }

    fn last_child(&self) -> Option<&Node> {
        match &self.kind {
            NodeKind::Scalar { .. } => None,
            NodeKind::Mapping(entries) => entries.last().map(|(_, value)| value),
            NodeKind::Sequence { items, .. } => items.last(),
        }
    }

    /// Text of a scalar node
    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Scalar { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Plain `~`, `null` or empty scalar
    pub fn is_null(&self) -> bool {
        match &self.kind {
            NodeKind::Scalar {
                value,
                style: ScalarStyle::Plain,
            } => self.tag.is_none() && value::is_null_literal(value),
            _ => false,
        }
    }

    /// Look up a field by key path; `None` unless every segment resolves.
    pub fn get_field(&self, path: &str) -> Option<Field<'_>> {
        keypath::resolve(self, &keypath::parse(path), Lookup::Exact)
    }

    /// Look up a field or its nearest resolvable ancestor.
    pub fn find_field(&self, path: &str) -> Option<Field<'_>> {
        keypath::resolve(self, &keypath::parse(path), Lookup::Nearest)
    }

    /// Encode `value` at `path`, creating missing intermediate mappings.
    ///
    /// The document is left untouched when the path cannot be created.
    pub fn set_field<T: Serialize + ?Sized>(&mut self, path: &str, value: &T) -> Result<(), CoreError> {
        let segments = keypath::parse(path);
        if segments.is_empty() || !keypath::creatable(self, &segments) {
            return Err(CoreError::FieldNotFound(path.to_string()));
        }

        let value = serde_yaml::to_value(value)?;
        let target = keypath::create_path(self, &segments)?;
        let replacement = Node::from_value(&value, target.line, target.column);
        target.kind = replacement.kind;
        target.tag = replacement.tag;
        Ok(())
    }

    /// Generic nested value of the whole node
    pub fn to_map(&self) -> serde_yaml::Value {
        value::to_yaml_value(self)
    }

    /// JSON projection for consumers that expect string keys
    pub fn to_json(&self) -> serde_json::Value {
        value::to_json_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPLOYMENT: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: frontend
spec:
  replicas: 1
  template:
    spec:
      containers:
      - name: app
        image: "nginx:1.25"
        ports:
        - containerPort: 80
"#;

    #[test]
    fn test_start_and_end_lines() {
        let docs = parse_str(DEPLOYMENT).unwrap();
        let root = &docs[0];
        assert_eq!(root.start_line(), 1);
        assert_eq!(root.end_line(), 13);

        let spec = root.get_field("spec").unwrap();
        assert_eq!(spec.start_line(), 5);
        assert_eq!(spec.end_line(), 13);

        let replicas = root.get_field("spec.replicas").unwrap();
        assert_eq!((replicas.start_line(), replicas.end_line()), (6, 6));
    }

    #[test]
    fn test_get_field_vs_find_field() {
        let docs = parse_str(DEPLOYMENT).unwrap();
        let root = &docs[0];
        assert!(root.get_field("spec.strategy.type").is_none());

        let nearest = root.find_field("spec.template.spec.containers[0].resources.limits").unwrap();
        assert_eq!(nearest.start_line(), 10);
        assert!(root.find_field("status").is_none());
    }

    #[test]
    fn test_set_field_replaces_scalar() {
        let mut docs = parse_str(DEPLOYMENT).unwrap();
        let root = &mut docs[0];
        root.set_field("spec.replicas", &3).unwrap();
        assert_eq!(root.get_field("spec.replicas").unwrap().value.as_str(), Some("3"));
        assert_eq!(root.get_field("spec.replicas").unwrap().start_line(), 6);
    }

    #[test]
    fn test_set_field_creates_subtree() {
        let mut docs = parse_str(DEPLOYMENT).unwrap();
        let root = &mut docs[0];
        root.set_field(
            "spec.template.spec.containers[0].securityContext.privileged",
            &false,
        )
        .unwrap();
        let field = root
            .get_field("spec.template.spec.containers[0].securityContext.privileged")
            .unwrap();
        assert_eq!(field.value.as_str(), Some("false"));
    }

    #[test]
    fn test_set_field_failure_leaves_document_alone() {
        let mut docs = parse_str(DEPLOYMENT).unwrap();
        let before = docs[0].clone();
        let err = docs[0].set_field("spec.template.spec.volumes[0].name", "data");
        assert!(matches!(err, Err(CoreError::FieldNotFound(_))));
        assert_eq!(docs[0], before);
    }

    #[test]
    fn test_to_map_resolves_scalars() {
        let docs = parse_str(DEPLOYMENT).unwrap();
        let map = docs[0].to_map();
        assert_eq!(map["spec"]["replicas"].as_i64(), Some(1));
        assert_eq!(
            map["spec"]["template"]["spec"]["containers"][0]["image"].as_str(),
            Some("nginx:1.25")
        );
    }
}
