//! Handing remediated files to version control

use crate::report::ValidationReport;
use anyhow::{Context, Result};
use manifold_core::File;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Branches created for remediation start with this prefix
pub const BRANCH_PREFIX: &str = "manifold-fix-";

pub fn is_remediation_branch(name: &str) -> bool {
    name.starts_with(BRANCH_PREFIX)
}

pub fn remediation_branch(base: &str) -> String {
    format!("{}{}", BRANCH_PREFIX, base)
}

/// New content of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediatedFile {
    pub path: PathBuf,
    pub content: String,
}

/// Everything a provider needs to propose the remediation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationRequest {
    pub base_branch: String,
    pub sha: String,
    pub branch: String,
    pub title: String,
    pub commit_message: String,
    pub description: String,
    pub files: Vec<RemediatedFile>,
}

impl RemediationRequest {
    /// Collect remediated files; `None` when nothing changed
    pub fn new(base_branch: &str, sha: &str, files: &[File]) -> Option<Self> {
        let remediated: Vec<&File> = files.iter().filter(|file| file.remediated()).collect();
        if remediated.is_empty() {
            return None;
        }

        let resources: usize = remediated
            .iter()
            .map(|file| file.resources().values().filter(|resource| resource.remediated()).count())
            .sum();
        let short_sha: String = sha.chars().take(7).collect();

        Some(Self {
            base_branch: base_branch.to_string(),
            sha: sha.to_string(),
            branch: remediation_branch(base_branch),
            title: format!("Remediate violating resources of branch ({})", base_branch),
            commit_message: format!("fix policy violations of commit {}", short_sha),
            description: format!(
                "This PR remediates {} violating resource(s) in {} file(s)",
                resources,
                remediated.len()
            ),
            files: remediated
                .into_iter()
                .map(|file| RemediatedFile {
                    path: file.path().to_path_buf(),
                    content: file.content(),
                })
                .collect(),
        })
    }
}

/// Seam to a hosting service
pub trait VersionControlProvider {
    /// Propose `request` and return the pull request URL, if one was created
    fn open_pull_request(&self, request: &RemediationRequest) -> Result<Option<String>>;
}

/// Writes remediated files back into the working tree
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkingTreeWriter;

impl WorkingTreeWriter {
    pub fn new() -> Self {
        Self
    }

    pub fn write(&self, files: &[RemediatedFile]) -> Result<()> {
        for file in files {
            fs::write(&file.path, &file.content)
                .with_context(|| format!("Failed to write {}", file.path.display()))?;
            info!("Wrote {}", file.path.display());
        }
        Ok(())
    }
}

impl VersionControlProvider for WorkingTreeWriter {
    fn open_pull_request(&self, request: &RemediationRequest) -> Result<Option<String>> {
        self.write(&request.files)?;
        Ok(None)
    }
}

/// Propose the remediation unless the run is already on a remediation branch.
///
/// The pull request URL, if any, is recorded in `report`.
pub fn open_remediation(
    provider: &dyn VersionControlProvider,
    branch: &str,
    sha: &str,
    files: &[File],
    report: &mut ValidationReport,
) -> Result<()> {
    if is_remediation_branch(branch) {
        info!("{} is a remediation branch, not opening a pull request", branch);
        return Ok(());
    }

    let Some(request) = RemediationRequest::new(branch, sha, files) else {
        debug!("Nothing remediated on {}", branch);
        return Ok(());
    };

    report.pull_request = provider
        .open_pull_request(&request)
        .with_context(|| format!("Failed to open pull request for {}", request.branch))?;
    Ok(())
}
