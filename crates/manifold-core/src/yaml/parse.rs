//! Event-driven construction of [`Node`] trees with source marks

use super::{comment, Node, NodeKind, ScalarStyle, SequenceIndent};
use crate::error::CoreError;
use std::collections::HashMap;
use std::path::Path;
use tracing::trace;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser, Tag};
use yaml_rust2::scanner::{Marker, TScalarStyle};

/// Parse every document of a YAML stream.
///
/// Documents whose root is a null scalar (empty or comment-only) are dropped;
/// their comments move to the next document.
pub fn parse_str(content: &str) -> Result<Vec<Node>, CoreError> {
    parse_named(content, "<string>")
}

/// Read and parse a multi-document YAML file
pub fn parse_file(path: &Path) -> Result<Vec<Node>, CoreError> {
    let content = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_named(&content, &path.display().to_string())
}

fn parse_named(content: &str, origin: &str) -> Result<Vec<Node>, CoreError> {
    let mut builder = TreeBuilder::new(content);
    let mut parser = Parser::new(content.chars());
    parser
        .load(&mut builder, true)
        .map_err(|e| CoreError::Parse {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;

    if let Some(message) = builder.error {
        return Err(CoreError::Parse {
            origin: origin.to_string(),
            message,
        });
    }

    trace!("Parsed {} document(s) from {}", builder.documents.len(), origin);
    let mut documents: Vec<Node> = builder
        .documents
        .into_iter()
        .filter(|doc| !doc.is_null())
        .collect();
    comment::attach(content, &mut documents);
    Ok(documents)
}

/// Collection being filled while its events stream in
enum Frame {
    Mapping {
        anchor: usize,
        node: Node,
        entries: Vec<(Node, Node)>,
        pending_key: Option<Node>,
    },
    Sequence {
        anchor: usize,
        node: Node,
        items: Vec<Node>,
    },
}

struct TreeBuilder<'a> {
    lines: Vec<&'a str>,
    stack: Vec<Frame>,
    anchors: HashMap<usize, Node>,
    documents: Vec<Node>,
    error: Option<String>,
}

impl<'a> TreeBuilder<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            lines: content.lines().collect(),
            stack: Vec::new(),
            anchors: HashMap::new(),
            documents: Vec::new(),
            error: None,
        }
    }

    fn complete(&mut self, node: Node, anchor: usize) {
        if anchor > 0 {
            self.anchors.insert(anchor, node.clone());
        }

        match self.stack.last_mut() {
            None => self.documents.push(node),
            Some(Frame::Sequence { items, .. }) => items.push(node),
            Some(Frame::Mapping {
                entries,
                pending_key,
                ..
            }) => match pending_key.take() {
                None => *pending_key = Some(node),
                Some(key) => {
                    let value = with_sequence_indent(node, &key, &self.lines);
                    entries.push((key, value));
                }
            },
        }
    }
}

/// Record whether a block sequence value is indented past its key.
///
/// The `-` of the first item decides; sequence start marks sit elsewhere.
fn with_sequence_indent(mut value: Node, key: &Node, lines: &[&str]) -> Node {
    let first = match &value.kind {
        NodeKind::Sequence { items, .. } => items.first().map(|item| (item.line, item.column)),
        _ => None,
    };
    let Some((line, column)) = first else {
        return value;
    };

    let dash = line
        .checked_sub(1)
        .and_then(|index| lines.get(index))
        .and_then(|text| dash_column(text, column))
        .unwrap_or_else(|| column.saturating_sub(2));
    if let NodeKind::Sequence { indent, .. } = &mut value.kind {
        *indent = if dash > key.column {
            SequenceIndent::Indented
        } else {
            SequenceIndent::Flush
        };
    }
    value
}

/// Column of the `-` in front of the item starting at `column`
fn dash_column(line: &str, column: usize) -> Option<usize> {
    let before: Vec<char> = line.chars().take(column).collect();
    let position = before.iter().rposition(|c| !c.is_whitespace())?;
    (before[position] == '-').then_some(position)
}

fn tag_name(tag: Option<Tag>) -> Option<String> {
    tag.map(|tag| {
        if tag.handle == "tag:yaml.org,2002:" {
            format!("!!{}", tag.suffix)
        } else {
            format!("{}{}", tag.handle, tag.suffix)
        }
    })
}

fn scalar_style(style: TScalarStyle) -> ScalarStyle {
    match style {
        TScalarStyle::Plain => ScalarStyle::Plain,
        TScalarStyle::SingleQuoted => ScalarStyle::SingleQuoted,
        TScalarStyle::DoubleQuoted => ScalarStyle::DoubleQuoted,
        TScalarStyle::Literal => ScalarStyle::Literal,
        _ => ScalarStyle::Folded,
    }
}

impl MarkedEventReceiver for TreeBuilder<'_> {
    fn on_event(&mut self, event: Event, mark: Marker) {
        if self.error.is_some() {
            return;
        }

        let (line, column) = (mark.line(), mark.col());
        match event {
            Event::Scalar(value, style, anchor, tag) => {
                let node = Node::scalar(value, scalar_style(style), line, column).with_tag(tag_name(tag));
                self.complete(node, anchor);
            }
            Event::MappingStart(anchor, tag) => self.stack.push(Frame::Mapping {
                anchor,
                node: Node::mapping(Vec::new(), line, column).with_tag(tag_name(tag)),
                entries: Vec::new(),
                pending_key: None,
            }),
            Event::SequenceStart(anchor, tag) => self.stack.push(Frame::Sequence {
                anchor,
                node: Node::sequence(Vec::new(), line, column).with_tag(tag_name(tag)),
                items: Vec::new(),
            }),
            Event::MappingEnd | Event::SequenceEnd => match self.stack.pop() {
                Some(Frame::Mapping {
                    anchor,
                    mut node,
                    entries,
                    ..
                }) => {
                    node.kind = NodeKind::Mapping(entries);
                    self.complete(node, anchor);
                }
                Some(Frame::Sequence {
                    anchor,
                    mut node,
                    items,
                }) => {
                    node.kind = NodeKind::Sequence {
                        items,
                        indent: SequenceIndent::Indented,
                    };
                    self.complete(node, anchor);
                }
                None => self.error = Some(format!("unbalanced collection end at line {}", line)),
            },
            Event::Alias(id) => match self.anchors.get(&id).cloned() {
                Some(node) => self.complete(node, 0),
                None => self.error = Some(format!("unknown alias at line {}", line)),
            },
            _ => {}
        }
    }
}
