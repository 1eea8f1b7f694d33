//! Chart directory loading

use crate::error::{Result, SourceError};
use crate::paths::is_hidden_name;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

pub const CHART_FILE: &str = "Chart.yaml";
pub const VALUES_FILE: &str = "values.yaml";
pub const TEMPLATES_DIR: &str = "templates";

/// The fields of `Chart.yaml` templates can see
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChartMetadata {
    pub api_version: String,
    pub name: String,
    pub version: String,
    pub app_version: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub chart_type: Option<String>,
}

/// A template file; `name` is `<chart>/templates/<relative path>`
#[derive(Debug, Clone)]
pub struct TemplateFile {
    pub name: String,
    pub path: PathBuf,
    pub content: String,
}

impl TemplateFile {
    /// Files starting with `_` only hold `define` blocks
    pub fn is_partial(&self) -> bool {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('_'))
    }
}

#[derive(Debug, Clone)]
pub struct Chart {
    pub metadata: ChartMetadata,
    /// Default values, always a map
    pub values: Value,
    pub templates: Vec<TemplateFile>,
}

impl Chart {
    pub fn load(dir: &Path) -> Result<Self> {
        let chart_file = dir.join(CHART_FILE);
        let content = fs::read_to_string(&chart_file).map_err(|e| SourceError::chart(dir, e))?;
        let metadata: ChartMetadata =
            serde_yaml::from_str(&content).map_err(|e| SourceError::chart(dir, e))?;
        if metadata.name.is_empty() {
            return Err(SourceError::chart(dir, "chart.metadata.name is required"));
        }

        let values = read_values(&dir.join(VALUES_FILE))?;
        let templates = load_templates(dir, &metadata.name)?;
        debug!(
            "Loaded chart {} {} with {} template(s)",
            metadata.name,
            metadata.version,
            templates.len()
        );

        Ok(Self {
            metadata,
            values,
            templates,
        })
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// `.Chart` as templates see it
    pub fn to_value(&self) -> Value {
        json!({
            "Name": self.metadata.name,
            "Version": self.metadata.version,
            "AppVersion": self.metadata.app_version.clone().unwrap_or_default(),
            "Description": self.metadata.description.clone().unwrap_or_default(),
            "Type": self.metadata.chart_type.clone().unwrap_or_else(|| "application".to_string()),
            "APIVersion": self.metadata.api_version,
        })
    }
}

/// Read a values file; a missing default file or an empty one is an empty map
pub fn read_values(path: &Path) -> Result<Value> {
    if !path.exists() && path.file_name().is_some_and(|name| name == VALUES_FILE) {
        return Ok(Value::Object(Default::default()));
    }
    let content = fs::read_to_string(path).map_err(|e| SourceError::chart(path, e))?;
    let values: Value = serde_yaml::from_str(&content).map_err(|e| SourceError::chart(path, e))?;
    match values {
        Value::Null => Ok(Value::Object(Default::default())),
        Value::Object(_) => Ok(values),
        _ => Err(SourceError::chart(path, "values must be a map")),
    }
}

fn load_templates(dir: &Path, chart_name: &str) -> Result<Vec<TemplateFile>> {
    let templates_dir = dir.join(TEMPLATES_DIR);
    if !templates_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut templates = Vec::new();
    let walker = WalkDir::new(&templates_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_name().to_str().map(is_hidden_name).unwrap_or(false)
        });
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(&templates_dir)
            .map_err(|e| SourceError::chart(dir, e))?;
        let relative: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        templates.push(TemplateFile {
            name: format!("{}/{}/{}", chart_name, TEMPLATES_DIR, relative.join("/")),
            path: entry.path().to_path_buf(),
            content: fs::read_to_string(entry.path())?,
        });
    }
    Ok(templates)
}
