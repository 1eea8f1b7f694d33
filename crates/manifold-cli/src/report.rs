//! Output formats

use crate::validate::Violation;
use anyhow::Result;
use manifold_core::{File, Rendered};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

const RULE: &str = "====================================================================";

/// Outcome of a validation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub scanned: usize,
    #[serde(rename = "violations")]
    pub violation_count: usize,
    pub remediated: usize,
    pub items: Vec<Violation>,
    pub pull_request: Option<String>,
}

impl ValidationReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for violation in &self.items {
            writeln!(f, "{}", RULE)?;
            writeln!(f, "Policy : {}", violation.policy.name)?;
            writeln!(f, "Category : {}", violation.policy.category)?;
            writeln!(f, "Severity : {}", violation.policy.severity)?;
            writeln!(
                f,
                "File : {} {}",
                violation.location.path.display(),
                violation.location.lines()
            )?;
            writeln!(f, "Message : {}", violation.message)?;
        }
        writeln!(f, "{}", RULE)?;
        writeln!(f, "Summary :")?;
        writeln!(
            f,
            "scanned: {} violations: {} remediated: {}",
            self.scanned, self.violation_count, self.remediated
        )?;
        if let Some(url) = &self.pull_request {
            writeln!(f, "pull request: {}", url)?;
        }
        Ok(())
    }
}

/// How a scanned resource can be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Written on disk and evaluated as is
    Shared,
    /// Written on disk, evaluated in a rendered form
    RawAndRendered,
    /// Written on disk but never rendered, like a patch file
    RawOnly,
    /// Produced by rendering, no raw document to point at
    RenderedOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedResource {
    pub id: String,
    pub availability: Availability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub resources: Vec<ScannedResource>,
}

/// Inventory of a scan: files and the resources resolved in each
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub files: Vec<ScannedFile>,
}

impl ScanReport {
    pub fn from_files(files: &[File]) -> Self {
        let files = files
            .iter()
            .map(|file| ScannedFile {
                path: file.path().to_path_buf(),
                resources: file
                    .resources()
                    .iter()
                    .map(|(id, resource)| {
                        let availability = match (resource.raw().is_some(), resource.rendering()) {
                            (_, Rendered::SharedWithRaw) => Availability::Shared,
                            (true, Rendered::Distinct(_)) => Availability::RawAndRendered,
                            (false, Rendered::Distinct(_)) => Availability::RenderedOnly,
                            (_, Rendered::Absent) => Availability::RawOnly,
                        };
                        ScannedResource {
                            id: id.clone(),
                            availability,
                        }
                    })
                    .collect(),
            })
            .collect();
        Self { files }
    }

    pub fn resource_count(&self) -> usize {
        self.files.iter().map(|file| file.resources.len()).sum()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Shared => write!(f, "raw=rendered"),
            Availability::RawAndRendered => write!(f, "raw+rendered"),
            Availability::RawOnly => write!(f, "raw"),
            Availability::RenderedOnly => write!(f, "rendered"),
        }
    }
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for file in &self.files {
            writeln!(f, "{}", file.path.display())?;
            for resource in &file.resources {
                writeln!(f, "  {} ({})", resource.id, resource.availability)?;
            }
        }
        writeln!(
            f,
            "{} file(s), {} resource(s)",
            self.files.len(),
            self.resource_count()
        )
    }
}
