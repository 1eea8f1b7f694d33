//! Comments recovered from the source text
//!
//! The event parser drops comments, so a line scanner finds them and they
//! are attached by position: a full-line comment belongs to the next key or
//! sequence item, a trailing comment to the last node starting on its line.
//! Comments after the last node of a document become its foot.

use super::{Node, NodeKind};
use std::collections::{HashMap, VecDeque};

/// Comments attached to one node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comments {
    /// Full-line comments above the node
    pub head: Vec<String>,
    /// Comment at the end of the node's line
    pub line: Option<String>,
    /// Comments after the last node of a document
    pub foot: Vec<String>,
}

impl Comments {
    pub fn is_empty(&self) -> bool {
        self.head.is_empty() && self.line.is_none() && self.foot.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SourceComment {
    line: usize,
    text: String,
    /// Code precedes the comment on its line
    trailing: bool,
}

/// Comments of `content` plus the lines holding `---` markers
fn scan(content: &str) -> (Vec<SourceComment>, Vec<usize>) {
    let mut comments = Vec::new();
    let mut separators = Vec::new();
    let mut block_indent: Option<usize> = None;
    let mut quote: Option<char> = None;

    for (index, text) in content.lines().enumerate() {
        let number = index + 1;
        let indent = text.chars().take_while(|c| *c == ' ').count();
        if let Some(header) = block_indent {
            if text.trim().is_empty() || indent > header {
                continue;
            }
            block_indent = None;
        }
        if quote.is_none() && is_document_marker(text) {
            separators.push(number);
            continue;
        }

        let (code, comment) = split_comment(text, &mut quote);
        if let Some(comment) = comment {
            comments.push(SourceComment {
                line: number,
                text: comment.trim_end().to_string(),
                trailing: !code.trim().is_empty(),
            });
        }
        if quote.is_none() && opens_block_scalar(code) {
            block_indent = Some(indent);
        }
    }
    (comments, separators)
}

fn is_document_marker(text: &str) -> bool {
    text.strip_prefix("---")
        .is_some_and(|rest| rest.chars().next().map_or(true, char::is_whitespace))
}

/// Split off a `#` comment, tracking quoted scalars across lines
fn split_comment<'t>(text: &'t str, quote: &mut Option<char>) -> (&'t str, Option<&'t str>) {
    let mut previous: Option<char> = None;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match *quote {
            Some('"') => match c {
                '\\' => {
                    chars.next();
                }
                '"' => *quote = None,
                _ => {}
            },
            Some(_) => {
                if c == '\'' {
                    if chars.peek().map(|(_, next)| *next) == Some('\'') {
                        chars.next();
                    } else {
                        *quote = None;
                    }
                }
            }
            None => match c {
                '#' if previous.map_or(true, char::is_whitespace) => return (&text[..i], Some(&text[i..])),
                '"' | '\'' if previous.map_or(true, |p| p.is_whitespace() || "[{,:-".contains(p)) => {
                    *quote = Some(c)
                }
                _ => {}
            },
        }
        previous = Some(c);
    }
    (text, None)
}

/// `key: |`, `- >-` and friends
fn opens_block_scalar(code: &str) -> bool {
    let code = code.trim_end();
    let token = code.rsplit(char::is_whitespace).next().unwrap_or_default();
    let Some(indicators) = token.strip_prefix(['|', '>']) else {
        return false;
    };
    if !indicators.chars().all(|c| c.is_ascii_digit() || c == '+' || c == '-') {
        return false;
    }
    let before = code[..code.len() - token.len()].trim_end();
    before.is_empty()
        || before.ends_with(':')
        || before.ends_with('-')
        || before
            .rsplit(char::is_whitespace)
            .next()
            .is_some_and(|tag| tag.starts_with('!'))
}

/// Attach the comments of `content` to its parsed `documents`.
///
/// Comments between documents go to the document that follows them; those
/// after the last document go to its foot.
pub(super) fn attach(content: &str, documents: &mut [Node]) {
    let (comments, separators) = scan(content);
    if comments.is_empty() || documents.is_empty() {
        return;
    }

    let segment = |line: usize| separators.partition_point(|&marker| marker <= line);
    let mut queue: VecDeque<SourceComment> = comments.into();
    for document in documents.iter_mut() {
        let limit = segment(document.start_line());
        let mut owned = Vec::new();
        while queue.front().is_some_and(|comment| segment(comment.line) <= limit) {
            owned.extend(queue.pop_front());
        }
        attach_to_document(document, owned);
    }

    if let Some(last) = documents.last_mut() {
        last.comments.foot.extend(queue.into_iter().map(|comment| comment.text));
    }
}

fn attach_to_document(document: &mut Node, comments: Vec<SourceComment>) {
    if comments.is_empty() {
        return;
    }

    let mut positions = Vec::new();
    collect(document, true, &mut positions);

    let mut heads: HashMap<usize, Vec<String>> = HashMap::new();
    let mut trailing: HashMap<usize, String> = HashMap::new();
    let mut foot = Vec::new();
    for comment in comments {
        if comment.trailing {
            match positions.iter().rposition(|(line, _)| *line <= comment.line) {
                Some(index) if !trailing.contains_key(&index) => {
                    trailing.insert(index, comment.text);
                }
                _ => foot.push(comment.text),
            }
        } else {
            match positions
                .iter()
                .position(|(line, attachable)| *attachable && *line > comment.line)
            {
                Some(index) => heads.entry(index).or_default().push(comment.text),
                None => foot.push(comment.text),
            }
        }
    }

    let mut counter = 0;
    apply(document, &mut counter, &mut heads, &mut trailing);
    document.comments.foot.extend(foot);
}

/// Pre-order start lines; keys and sequence items can carry head comments
fn collect(node: &Node, attachable: bool, positions: &mut Vec<(usize, bool)>) {
    positions.push((node.start_line(), attachable));
    match node.kind() {
        NodeKind::Scalar { .. } => {}
        NodeKind::Mapping(entries) => {
            for (key, value) in entries {
                collect(key, true, positions);
                collect(value, false, positions);
            }
        }
        NodeKind::Sequence { items, .. } => {
            for item in items {
                collect(item, true, positions);
            }
        }
    }
}

fn apply(
    node: &mut Node,
    counter: &mut usize,
    heads: &mut HashMap<usize, Vec<String>>,
    trailing: &mut HashMap<usize, String>,
) {
    let index = *counter;
    *counter += 1;
    if let Some(head) = heads.remove(&index) {
        node.comments.head.extend(head);
    }
    if let Some(line) = trailing.remove(&index) {
        node.comments.line = Some(line);
    }

    match &mut node.kind {
        NodeKind::Scalar { .. } => {}
        NodeKind::Mapping(entries) => {
            for (key, value) in entries {
                apply(key, counter, heads, trailing);
                apply(value, counter, heads, trailing);
            }
        }
        NodeKind::Sequence { items, .. } => {
            for item in items {
                apply(item, counter, heads, trailing);
            }
        }
    }
}
