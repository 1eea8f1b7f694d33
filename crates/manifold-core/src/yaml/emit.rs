//! Block-style YAML output
//!
//! Mappings and sequences are written in block style with two-space
//! indentation. Scalars keep the style they were parsed with; sequences keep
//! whether they were indented under their key. Head comments are written at
//! the indentation of their node.

use super::value::resolve_plain;
use super::{Node, NodeKind, ScalarStyle, SequenceIndent};
use serde_yaml::Value;

const INDENT: usize = 2;

/// Serialize a single document
pub fn to_string(node: &Node) -> String {
    let mut out = String::new();
    write_comments(&mut out, &node.comments().head, 0);
    match node.kind() {
        NodeKind::Mapping(entries) if !entries.is_empty() => {
            if let Some(tag) = node.tag() {
                out.push_str(tag);
                out.push('\n');
            }
            write_mapping(&mut out, entries, 0, false);
        }
        NodeKind::Sequence { items, .. } if !items.is_empty() => {
            if let Some(tag) = node.tag() {
                out.push_str(tag);
                out.push('\n');
            }
            write_sequence(&mut out, items, 0);
        }
        _ => {
            out.push_str(&inline(node));
            end_line(&mut out, node.comments().line.as_deref());
        }
    }
    write_comments(&mut out, &node.comments().foot, 0);
    out
}

/// Serialize documents into one stream separated by `---`
pub fn to_stream(documents: &[&Node]) -> String {
    documents
        .iter()
        .map(|doc| to_string(doc))
        .collect::<Vec<_>>()
        .join("---\n")
}

/// Whether a string can be written without quotes and still read back as
/// the same string
pub(crate) fn plain_safe(value: &str) -> bool {
    if value.is_empty() || value.trim() != value {
        return false;
    }
    if value.contains(['\n', '\r', '\t'])
        || value.contains(": ")
        || value.contains(" #")
        || value.ends_with(':')
        || value.starts_with("---")
        || value.starts_with("...")
    {
        return false;
    }

    let mut chars = value.chars();
    let first = chars.next().unwrap_or(' ');
    if "?:,[]{}#&*!|>'\"%@`".contains(first) {
        return false;
    }
    if first == '-' && matches!(chars.next(), None | Some(' ')) {
        return false;
    }

    // YAML 1.1 booleans still confuse older readers
    if matches!(
        value.to_ascii_lowercase().as_str(),
        "y" | "n" | "yes" | "no" | "on" | "off"
    ) {
        return false;
    }

    matches!(resolve_plain(value), Value::String(_))
}

fn pad(out: &mut String, indent: usize) {
    out.extend(std::iter::repeat(' ').take(indent));
}

fn write_comments(out: &mut String, comments: &[String], indent: usize) {
    for comment in comments {
        pad(out, indent);
        out.push_str(comment);
        out.push('\n');
    }
}

/// Finish a line, with its trailing comment if any
fn end_line(out: &mut String, comment: Option<&str>) {
    if let Some(comment) = comment {
        out.push(' ');
        out.push_str(comment);
    }
    out.push('\n');
}

fn is_block_collection(node: &Node) -> bool {
    match node.kind() {
        NodeKind::Mapping(entries) => !entries.is_empty(),
        NodeKind::Sequence { items, .. } => !items.is_empty(),
        NodeKind::Scalar { .. } => false,
    }
}

fn is_block_scalar(node: &Node) -> bool {
    matches!(
        node.kind(),
        NodeKind::Scalar { value, style: ScalarStyle::Literal | ScalarStyle::Folded }
            if !value.is_empty()
    )
}

/// Write mapping entries at `indent`. With `continued` the first entry goes
/// right after text already on the line (a `- ` marker).
fn write_mapping(out: &mut String, entries: &[(Node, Node)], indent: usize, continued: bool) {
    for (position, (key, value)) in entries.iter().enumerate() {
        if position > 0 || !continued {
            write_comments(out, &key.comments().head, indent);
            pad(out, indent);
        }
        out.push_str(&key_text(key));
        out.push(':');
        let trailing = value.comments().line.as_deref().or(key.comments().line.as_deref());
        write_value(out, value, indent, true, trailing);
    }
}

fn write_sequence(out: &mut String, items: &[Node], indent: usize) {
    for item in items {
        write_comments(out, &item.comments().head, indent);
        pad(out, indent);
        out.push('-');
        match item.kind() {
            NodeKind::Mapping(entries) if !entries.is_empty() && item.tag().is_none() => {
                out.push(' ');
                write_mapping(out, entries, indent + INDENT, true);
            }
            _ => write_value(out, item, indent, false, item.comments().line.as_deref()),
        }
    }
}

/// Write what follows a `key:` or `-` marker, ending with a newline.
///
/// `indent` is the column of the marker.
fn write_value(out: &mut String, value: &Node, indent: usize, under_key: bool, trailing: Option<&str>) {
    if is_block_collection(value) {
        if let Some(tag) = value.tag() {
            out.push(' ');
            out.push_str(tag);
        }
        end_line(out, trailing);
        match value.kind() {
            NodeKind::Mapping(entries) => write_mapping(out, entries, indent + INDENT, false),
            NodeKind::Sequence { items, indent: style } => {
                let child = if under_key && *style == SequenceIndent::Flush {
                    indent
                } else {
                    indent + INDENT
                };
                write_sequence(out, items, child);
            }
            NodeKind::Scalar { .. } => {}
        }
        return;
    }

    if is_block_scalar(value) {
        if let NodeKind::Scalar { value: text, .. } = value.kind() {
            out.push(' ');
            if let Some(tag) = value.tag() {
                out.push_str(tag);
                out.push(' ');
            }
            write_literal(out, text, indent + INDENT, trailing);
        }
        return;
    }

    let text = inline(value);
    if !text.is_empty() {
        out.push(' ');
        out.push_str(&text);
    }
    end_line(out, trailing);
}

fn write_literal(out: &mut String, text: &str, indent: usize, trailing: Option<&str>) {
    let (chomp, body) = if text.ends_with("\n\n") {
        ("+", &text[..text.len() - 1])
    } else if let Some(body) = text.strip_suffix('\n') {
        ("", body)
    } else {
        ("-", text)
    };

    out.push('|');
    if body.starts_with(' ') {
        out.push_str(&INDENT.to_string());
    }
    out.push_str(chomp);
    end_line(out, trailing);

    for line in body.split('\n') {
        if !line.is_empty() {
            pad(out, indent);
            out.push_str(line);
        }
        out.push('\n');
    }
}

fn key_text(key: &Node) -> String {
    match key.kind() {
        NodeKind::Scalar { .. } => inline(key),
        _ => flow(key),
    }
}

/// Single-line form of a scalar or empty collection
fn inline(node: &Node) -> String {
    let body = match node.kind() {
        NodeKind::Scalar { value, style } => scalar_text(value, *style),
        NodeKind::Mapping(entries) if entries.is_empty() => "{}".to_string(),
        NodeKind::Sequence { items, .. } if items.is_empty() => "[]".to_string(),
        _ => flow(node),
    };
    match node.tag() {
        Some(tag) if body.is_empty() => tag.to_string(),
        Some(tag) => format!("{} {}", tag, body),
        None => body,
    }
}

fn scalar_text(value: &str, style: ScalarStyle) -> String {
    if value.contains('\n') {
        return double_quoted(value);
    }
    match style {
        ScalarStyle::Plain => value.to_string(),
        ScalarStyle::SingleQuoted => format!("'{}'", value.replace('\'', "''")),
        ScalarStyle::DoubleQuoted => double_quoted(value),
        ScalarStyle::Literal | ScalarStyle::Folded => {
            if plain_safe(value) {
                value.to_string()
            } else {
                double_quoted(value)
            }
        }
    }
}

fn double_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\x{:02X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Flow form, used for collections in key position
fn flow(node: &Node) -> String {
    match node.kind() {
        NodeKind::Scalar { value, style } => match style {
            ScalarStyle::Plain if plain_safe(value) || !value.contains([',', '[', ']', '{', '}']) => {
                scalar_text(value, *style)
            }
            ScalarStyle::SingleQuoted => scalar_text(value, *style),
            _ => double_quoted(value),
        },
        NodeKind::Mapping(entries) => {
            let parts: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", flow(k), flow(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        NodeKind::Sequence { items, .. } => {
            let parts: Vec<String> = items.iter().map(flow).collect();
            format!("[{}]", parts.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yaml::parse_str;
    use pretty_assertions::assert_eq;

    fn roundtrip(input: &str) -> String {
        let docs = parse_str(input).unwrap();
        to_string(&docs[0])
    }

    #[test]
    fn test_untouched_document_is_stable() {
        let input = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: frontend
  labels:
    app: 'web'
spec:
  replicas: 1
  template:
    spec:
      containers:
      - name: app
        image: "nginx:1.25"
        args:
          - --port
          - "8080"
        env: []
"#;
        assert_eq!(roundtrip(input), input);
    }

    #[test]
    fn test_block_scalars() {
        let input = "script: |\n  echo one\n  echo two\nstripped: |-\n  no newline\n";
        assert_eq!(roundtrip(input), input);
    }

    #[test]
    fn test_nested_sequences_and_empty_mapping() {
        let input = "matrix:\n- - 1\n  - 2\nempty: {}\n";
        let output = roundtrip(input);
        let reparsed = parse_str(&output).unwrap();
        assert_eq!(reparsed[0].to_map(), parse_str(input).unwrap()[0].to_map());
    }

    #[test]
    fn test_plain_safety() {
        assert!(plain_safe("nginx:1.25"));
        assert!(plain_safe("web-frontend"));
        assert!(!plain_safe("true"));
        assert!(!plain_safe("8080"));
        assert!(!plain_safe("yes"));
        assert!(!plain_safe("- item"));
        assert!(!plain_safe("a: b"));
        assert!(!plain_safe(""));
        assert!(!plain_safe(" padded"));
    }

    #[test]
    fn test_comments_survive_a_rewrite() {
        let input = r#"# owned by team-web
apiVersion: apps/v1
kind: Deployment
spec:
  # keep in sync with the HPA
  replicas: 1 # scaled by HPA
  template:
    spec:
      containers:
      # main container
      - name: app # sidecars go below
        args: # flags
        - --port
# end of deployment
"#;
        assert_eq!(roundtrip(input), input);

        let mut docs = parse_str(input).unwrap();
        docs[0].set_field("spec.replicas", &2).unwrap();
        let output = to_string(&docs[0]);
        assert!(output.contains("  # keep in sync with the HPA\n  replicas: 2 # scaled by HPA\n"));
        assert!(output.starts_with("# owned by team-web\n"));
    }

    #[test]
    fn test_stream_separator() {
        let docs = parse_str("a: 1\n---\nb: 2\n").unwrap();
        let refs: Vec<&Node> = docs.iter().collect();
        assert_eq!(to_stream(&refs), "a: 1\n---\nb: 2\n");
    }
}
