//! Dotted/bracketed key paths
//!
//! A key path addresses a field inside a document, e.g.
//! `spec.template.spec.containers[0].image`. The grammar is
//!
//! ```text
//! path    = segment ('.' segment)*
//! segment = identifier | identifier '[' integer ']'
//! ```
//!
//! There is no escaping: a `.` always separates segments.

use crate::error::CoreError;
use crate::yaml::{Field, Node, NodeKind};
use std::fmt;

/// One step of a key path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Mapping key
    Key(String),
    /// Sequence index
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{}", key),
            PathSegment::Index(index) => write!(f, "[{}]", index),
        }
    }
}

/// How [`resolve`] treats a segment it cannot follow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Any unresolved segment means "not found"
    Exact,
    /// Return the deepest field resolved before the walk stopped
    Nearest,
}

/// Parse a key path into segments.
///
/// `containers[0].image` becomes `["containers", 0, "image"]`. A part whose
/// brackets do not hold an integer is kept verbatim as a key.
pub fn parse(path: &str) -> Vec<PathSegment> {
    if path.is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    for part in path.split('.') {
        match split_index(part) {
            Some((key, index)) => {
                segments.push(PathSegment::Key(key.to_string()));
                segments.push(PathSegment::Index(index));
            }
            None => segments.push(PathSegment::Key(part.to_string())),
        }
    }
    segments
}

/// Split `name[3]` into `("name", 3)`
fn split_index(part: &str) -> Option<(&str, usize)> {
    let inner = part.strip_suffix(']')?;
    let (key, index) = inner.split_once('[')?;
    if key.is_empty() || index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    index.parse().ok().map(|index| (key, index))
}

/// Render segments back into path syntax
pub fn join(segments: &[PathSegment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            PathSegment::Key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
            PathSegment::Index(_) => out.push_str(&segment.to_string()),
        }
    }
    out
}

/// Walk `node` along `segments`.
///
/// Keys descend into mappings, indexes into sequences. Keying into a
/// non-mapping or indexing into a non-sequence stops the walk. In
/// [`Lookup::Nearest`] mode the last field reached before stopping is
/// returned; `None` means not even the first segment resolved.
pub fn resolve<'a>(node: &'a Node, segments: &[PathSegment], mode: Lookup) -> Option<Field<'a>> {
    let mut current = node;
    let mut found: Option<Field<'a>> = None;

    for segment in segments {
        match step(current, segment) {
            Some(field) => {
                current = field.value;
                found = Some(field);
            }
            None => {
                return match mode {
                    Lookup::Exact => None,
                    Lookup::Nearest => found,
                };
            }
        }
    }

    found
}

fn step<'a>(node: &'a Node, segment: &PathSegment) -> Option<Field<'a>> {
    match (segment, node.kind()) {
        (PathSegment::Key(key), NodeKind::Mapping(entries)) => entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(key.as_str()))
            .map(|(key, value)| Field { key, value }),
        (PathSegment::Index(index), NodeKind::Sequence { items, .. }) => {
            items.get(*index).map(|item| Field {
                key: item,
                value: item,
            })
        }
        _ => None,
    }
}

/// Check that [`create_path`] would succeed without touching the document.
pub fn creatable(node: &Node, segments: &[PathSegment]) -> bool {
    let mut current = node;
    for (position, segment) in segments.iter().enumerate() {
        match step(current, segment) {
            Some(field) => current = field.value,
            None => {
                let replaceable = matches!(current.kind(), NodeKind::Mapping(_)) || current.is_null();
                // Missing parts are created as mappings, so only keys can follow
                return matches!(segment, PathSegment::Key(_))
                    && replaceable
                    && segments[position..]
                        .iter()
                        .all(|s| matches!(s, PathSegment::Key(_)));
            }
        }
    }
    true
}

/// Descend along `segments`, creating empty mappings for missing keys, and
/// return the addressed node.
///
/// A null scalar on the way is replaced by an empty mapping. Indexes are never
/// created: an out-of-range index or a type mismatch is a
/// [`CoreError::FieldNotFound`].
pub fn create_path<'a>(
    node: &'a mut Node,
    segments: &[PathSegment],
) -> Result<&'a mut Node, CoreError> {
    let Some((first, rest)) = segments.split_first() else {
        return Ok(node);
    };

    if node.is_null() && matches!(first, PathSegment::Key(_)) {
        let (line, column) = (node.start_line(), node.column());
        *node = Node::mapping(Vec::new(), line, column);
    }

    let line = node.end_line();
    let column = node.column();
    let child = match (first, node.kind_mut()) {
        (PathSegment::Key(key), NodeKind::Mapping(entries)) => {
            let position = entries
                .iter()
                .position(|(k, _)| k.as_str() == Some(key.as_str()));
            let index = match position {
                Some(index) => index,
                None => {
                    entries.push((
                        Node::string(key, line, column),
                        Node::mapping(Vec::new(), line, column + 2),
                    ));
                    entries.len() - 1
                }
            };
            &mut entries[index].1
        }
        (PathSegment::Index(index), NodeKind::Sequence { items, .. }) => items
            .get_mut(*index)
            .ok_or_else(|| CoreError::FieldNotFound(join(segments)))?,
        _ => return Err(CoreError::FieldNotFound(join(segments))),
    };

    create_path(child, rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yaml;

    fn key(k: &str) -> PathSegment {
        PathSegment::Key(k.to_string())
    }

    #[test]
    fn test_parse_plain_and_indexed() {
        assert_eq!(
            parse("spec.containers[0].image"),
            vec![key("spec"), key("containers"), PathSegment::Index(0), key("image")]
        );
        assert_eq!(parse("metadata.name"), vec![key("metadata"), key("name")]);
        assert!(parse("").is_empty());
    }

    #[test]
    fn test_parse_malformed_brackets_stay_keys() {
        assert_eq!(parse("items[x]"), vec![key("items[x]")]);
        assert_eq!(parse("items[]"), vec![key("items[]")]);
        assert_eq!(parse("[3]"), vec![key("[3]")]);
    }

    #[test]
    fn test_join_roundtrips() {
        let path = "spec.template.spec.containers[1].ports[0].containerPort";
        assert_eq!(join(&parse(path)), path);
    }

    #[test]
    fn test_resolve_exact_and_nearest() {
        let docs = yaml::parse_str(
            "spec:\n  containers:\n  - name: app\n    image: nginx\n",
        )
        .unwrap();
        let root = &docs[0];

        let image = resolve(root, &parse("spec.containers[0].image"), Lookup::Exact).unwrap();
        assert_eq!(image.value.as_str(), Some("nginx"));
        assert_eq!(image.key.start_line(), 4);

        assert!(resolve(root, &parse("spec.containers[0].securityContext"), Lookup::Exact).is_none());

        let nearest =
            resolve(root, &parse("spec.containers[0].securityContext.privileged"), Lookup::Nearest)
                .unwrap();
        assert_eq!(nearest.key.start_line(), 3);
        assert_eq!(nearest.value.end_line(), 4);

        assert!(resolve(root, &parse("status.phase"), Lookup::Nearest).is_none());
    }

    #[test]
    fn test_resolve_type_mismatch_is_unresolved() {
        let docs = yaml::parse_str("spec:\n  replicas: 3\n").unwrap();
        assert!(resolve(&docs[0], &parse("spec[0]"), Lookup::Exact).is_none());
        assert!(resolve(&docs[0], &parse("spec.replicas.value"), Lookup::Exact).is_none());
    }

    #[test]
    fn test_create_path_builds_mappings() {
        let mut docs = yaml::parse_str("metadata:\n  name: web\n").unwrap();
        let root = &mut docs[0];
        let segments = parse("spec.template.metadata");
        assert!(creatable(root, &segments));
        let node = create_path(root, &segments).unwrap();
        assert!(matches!(node.kind(), NodeKind::Mapping(entries) if entries.is_empty()));
        assert!(resolve(root, &segments, Lookup::Exact).is_some());
    }

    #[test]
    fn test_create_path_rejects_missing_index() {
        let mut docs = yaml::parse_str("spec:\n  containers: []\n").unwrap();
        let segments = parse("spec.containers[0].image");
        assert!(!creatable(&docs[0], &segments));
        let err = create_path(&mut docs[0], &segments).unwrap_err();
        assert!(matches!(err, CoreError::FieldNotFound(_)));
    }
}
