//! Go `text/template` subset used to render chart templates
//!
//! Templates are parsed once and rendered against a [`serde_json::Value`]
//! holding `.Values`, `.Chart`, `.Release` and friends. `define` blocks from
//! every added template are shared, so partials can be `include`d anywhere.

mod exec;
mod funcs;
mod lexer;
mod parse;

use crate::error::SourceError;
use indexmap::IndexMap;
use parse::Node;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{name}: {message}")]
pub struct TemplateError {
    pub name: String,
    pub message: String,
}

impl From<TemplateError> for SourceError {
    fn from(err: TemplateError) -> Self {
        SourceError::Template {
            name: err.name,
            message: err.message,
        }
    }
}

/// A set of named templates
#[derive(Debug, Default)]
pub struct Engine {
    templates: IndexMap<String, Vec<Node>>,
    defines: HashMap<String, Vec<Node>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `source` under `name`, registering its `define` blocks
    pub fn add(&mut self, name: &str, source: &str) -> Result<(), TemplateError> {
        let error = |message: String| TemplateError {
            name: name.to_string(),
            message,
        };
        let items = lexer::lex(source).map_err(error)?;
        let tree = parse::parse(items).map_err(error)?;

        trace!("Parsed template {} ({} define(s))", name, tree.defines.len());
        self.defines.extend(tree.defines);
        self.templates.insert(name.to_string(), tree.root);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Render the template `name` with `data` as both `.` and `$`
    pub fn render(&self, name: &str, data: &Value) -> Result<String, TemplateError> {
        let error = |message: String| TemplateError {
            name: name.to_string(),
            message,
        };
        let root = self
            .templates
            .get(name)
            .ok_or_else(|| error("template not found".to_string()))?;

        let mut state = exec::State::new(&self.defines, data);
        let mut out = String::new();
        state.walk(root, data, &mut out).map_err(error)?;
        Ok(out)
    }
}
