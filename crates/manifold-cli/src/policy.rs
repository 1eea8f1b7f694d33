//! Policy documents loaded through the source drivers
//!
//! Policies are ordinary manifests, so they may live in plain files, a chart
//! or an overlay. Only the rendered `spec` of each `Policy` resource matters.

use crate::validate::Policy;
use anyhow::{Context, Result};
use manifold_source::{select_source, Source, SourceOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument};

pub const POLICY_KIND: &str = "Policy";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: serde_json::Value,
    pub required: bool,
}

/// The `spec` of a policy manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySpec {
    #[serde(flatten)]
    pub policy: Policy,
    /// Source of the rule, opaque to manifold
    pub code: String,
    pub tags: Vec<String>,
    pub parameters: Vec<PolicyParameter>,
}

#[derive(Debug, Clone, Default)]
pub struct PolicyCatalog {
    policies: Vec<PolicySpec>,
}

impl PolicyCatalog {
    #[instrument(skip(options), level = "debug")]
    pub fn from_path(path: &Path, options: &SourceOptions) -> Result<Self> {
        let driver = select_source(path, options)
            .with_context(|| format!("Failed to load policies from {}", path.display()))?;
        let files = driver.resource_files()?;

        let mut policies = Vec::new();
        for file in &files {
            for (id, resource) in file.resources() {
                let Some(rendered) = resource.rendered() else {
                    continue;
                };
                if rendered.kind() != POLICY_KIND {
                    debug!("Ignoring {} in {}", id, file.path().display());
                    continue;
                }
                let spec: PolicySpec = serde_json::from_value(rendered.spec())
                    .with_context(|| format!("Invalid policy {} in {}", id, file.path().display()))?;
                policies.push(spec);
            }
        }

        info!("Loaded {} policies from {}", policies.len(), path.display());
        Ok(Self { policies })
    }

    pub fn policies(&self) -> &[PolicySpec] {
        &self.policies
    }

    pub fn get(&self, id: &str) -> Option<&PolicySpec> {
        self.policies.iter().find(|spec| spec.policy.id == id)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const POLICY: &str = r#"apiVersion: pac.weave.works/v2beta2
kind: Policy
metadata:
  name: min-replicas
spec:
  id: min-replicas
  name: Minimum replica count
  severity: medium
  category: reliability
  how_to_solve: Raise spec.replicas
  code: |
    package replicas
  tags: [availability]
  parameters:
  - name: replicas
    type: integer
    value: 2
    required: true
"#;

    #[test]
    fn test_load_policies_from_manifests() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("policy.yaml"), POLICY)?;
        fs::write(
            dir.path().join("cm.yaml"),
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: unrelated\n",
        )?;

        let catalog = PolicyCatalog::from_path(dir.path(), &SourceOptions::default())?;
        assert_eq!(catalog.len(), 1);

        let spec = catalog.get("min-replicas").ok_or("missing policy")?;
        assert_eq!(spec.policy.severity, "medium");
        assert_eq!(spec.policy.how_to_solve, "Raise spec.replicas");
        assert_eq!(spec.code, "package replicas\n");
        assert_eq!(spec.tags, vec!["availability".to_string()]);
        assert_eq!(spec.parameters[0].kind, "integer");
        assert_eq!(spec.parameters[0].value, serde_json::json!(2));
        Ok(())
    }

    #[test]
    fn test_unrecognized_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PolicyCatalog::from_path(dir.path(), &SourceOptions::default()).is_err());
    }
}
