//! Policy evaluation over resolved files
//!
//! Evaluation itself is delegated to a [`PolicyEvaluator`]. The validator's
//! job is bookkeeping: feed it the rendered form of every resource, map each
//! finding back to the raw lines that produced it, and optionally apply the
//! recommended value to the raw document.

use crate::report::ValidationReport;
use anyhow::{Context, Result};
use manifold_core::{File, Object};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// Policy metadata attached to every violation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub id: String,
    pub name: String,
    pub severity: String,
    pub category: String,
    pub description: String,
    pub how_to_solve: String,
}

/// What an evaluator sees of a resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub id: String,
    pub api_version: String,
    pub kind: String,
    /// Empty for cluster-scoped or unset namespaces
    pub namespace: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    /// The whole rendered document
    pub manifest: serde_json::Value,
}

impl Entity {
    pub fn from_object(object: &Object) -> Self {
        let manifest = object.to_json();
        let metadata = &manifest["metadata"];
        let namespace = metadata["namespace"].as_str().unwrap_or_default().to_string();
        let labels = metadata["labels"]
            .as_object()
            .map(|labels| {
                labels
                    .iter()
                    .map(|(key, value)| {
                        let value = match value {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (key.clone(), value)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: object.id(),
            api_version: object.api_version(),
            kind: object.kind(),
            namespace,
            name: object.name(),
            labels,
            manifest,
        }
    }
}

/// A single policy failure reported by an evaluator
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    /// Groups occurrences of the same failure; becomes the violation id prefix
    pub id: String,
    pub policy: Policy,
    pub message: String,
    /// Key path of the offending field, if the evaluator knows it
    pub violating_key: Option<String>,
    pub recommended_value: Option<serde_json::Value>,
}

/// Seam to the policy engine
pub trait PolicyEvaluator {
    fn evaluate(&self, entity: &Entity) -> Result<Vec<Finding>>;
}

impl<E: PolicyEvaluator + ?Sized> PolicyEvaluator for &E {
    fn evaluate(&self, entity: &Entity) -> Result<Vec<Finding>> {
        (**self).evaluate(entity)
    }
}

/// Identity fields of the violating resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationEntity {
    pub name: String,
    pub namespace: String,
    pub kind: String,
}

/// Inclusive line span inside a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub path: PathBuf,
    pub start_line: usize,
    pub end_line: usize,
}

impl Location {
    /// `#8` or `#8-12`
    pub fn lines(&self) -> String {
        if self.start_line == self.end_line {
            format!("#{}", self.start_line)
        } else {
            format!("#{}-{}", self.start_line, self.end_line)
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.path.display(), self.start_line, self.end_line)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub id: String,
    pub message: String,
    pub policy: Policy,
    pub entity: ViolationEntity,
    pub location: Location,
}

pub struct Validator<E> {
    evaluator: E,
    remediate: bool,
}

impl<E: PolicyEvaluator> Validator<E> {
    pub fn new(evaluator: E, remediate: bool) -> Self {
        Self { evaluator, remediate }
    }

    /// Evaluate every rendered resource in `files`.
    ///
    /// Resources without a rendered form are not counted as scanned. A
    /// failing remediation is logged and leaves the violation in place.
    #[instrument(skip_all, fields(files = files.len(), remediate = self.remediate), level = "debug")]
    pub fn validate(&self, files: &mut [File]) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();

        for file in files.iter_mut() {
            let path = file.path().to_path_buf();
            for (id, resource) in file.resources_mut() {
                let Some(rendered) = resource.rendered() else {
                    debug!("Skipping {} in {}: not rendered", id, path.display());
                    continue;
                };

                let entity = Entity::from_object(rendered);
                let findings = self
                    .evaluator
                    .evaluate(&entity)
                    .with_context(|| format!("Failed to evaluate {} in {}", id, path.display()))?;

                let mut occurrences: HashMap<String, usize> = HashMap::new();
                for finding in findings {
                    let n = occurrences.entry(finding.id.clone()).or_default();
                    let violation_id = format!("{}_{}", finding.id, n);
                    *n += 1;

                    let (start_line, end_line) = match &finding.violating_key {
                        Some(key) => resource.find_key(key),
                        None => (1, 1),
                    };

                    if let (true, Some(key), Some(value)) =
                        (self.remediate, &finding.violating_key, &finding.recommended_value)
                    {
                        match resource.remediate(key, value) {
                            Ok(true) => report.remediated += 1,
                            Ok(false) => debug!("{} has no raw form to remediate", id),
                            Err(e) => warn!("Failed to remediate {} at {}: {}", id, key, e),
                        }
                    }

                    report.items.push(Violation {
                        id: violation_id,
                        message: finding.message,
                        policy: finding.policy,
                        entity: ViolationEntity {
                            name: entity.name.clone(),
                            namespace: entity.namespace.clone(),
                            kind: entity.kind.clone(),
                        },
                        location: Location {
                            path: path.clone(),
                            start_line,
                            end_line,
                        },
                    });
                    report.violation_count += 1;
                }
                report.scanned += 1;
            }
        }

        info!(
            "Scanned {} resource(s), found {} violation(s), remediated {}",
            report.scanned, report.violation_count, report.remediated
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifold_core::yaml::parse_str;
    use manifold_core::Resource;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const DEPLOYMENT: &str = "apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: shop
  labels:
    app: web
    tier: 1
spec:
  replicas: 1
";

    struct Always(Vec<Finding>);

    impl PolicyEvaluator for Always {
        fn evaluate(&self, _entity: &Entity) -> Result<Vec<Finding>> {
            Ok(self.0.clone())
        }
    }

    fn finding(key: Option<&str>, value: Option<serde_json::Value>) -> Finding {
        Finding {
            id: "replicas".to_string(),
            policy: Policy {
                id: "replica-count".to_string(),
                name: "Replica count".to_string(),
                ..Default::default()
            },
            message: "too few replicas".to_string(),
            violating_key: key.map(str::to_string),
            recommended_value: value,
        }
    }

    fn file(resource: fn(Object) -> Resource) -> File {
        let documents = parse_str(DEPLOYMENT).unwrap();
        File::from_documents("deploy.yaml", documents, resource)
    }

    #[test]
    fn test_entity_from_object() {
        let object = Object::new(parse_str(DEPLOYMENT).unwrap().remove(0));
        let entity = Entity::from_object(&object);
        assert_eq!(entity.id, "apps/v1/Deployment/shop/web");
        assert_eq!(entity.namespace, "shop");
        assert_eq!(entity.labels.get("tier").map(String::as_str), Some("1"));
        assert_eq!(entity.manifest["spec"]["replicas"], json!(1));
    }

    #[test]
    fn test_unrendered_resources_are_not_scanned() {
        let mut files = vec![file(Resource::from_raw)];
        let validator = Validator::new(Always(vec![finding(None, None)]), false);
        let report = validator.validate(&mut files).unwrap();
        assert_eq!(report.scanned, 0);
        assert!(report.items.is_empty());
    }

    #[test]
    fn test_occurrences_are_numbered_per_resource() {
        let mut files = vec![file(Resource::shared)];
        let findings = vec![finding(Some("spec.replicas"), None), finding(None, None)];
        let report = Validator::new(Always(findings), false).validate(&mut files).unwrap();

        let ids: Vec<_> = report.items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["replicas_0", "replicas_1"]);
        assert_eq!(report.items[0].location.start_line, 10);
        assert_eq!(report.items[1].location.start_line, 1);
        assert_eq!(report.items[1].location.end_line, 1);
        assert_eq!(report.violation_count, 2);
        assert_eq!(report.remediated, 0);
    }

    #[test]
    fn test_remediation_writes_raw() {
        let mut files = vec![file(Resource::shared)];
        let findings = vec![finding(Some("spec.replicas"), Some(json!(3)))];
        let report = Validator::new(Always(findings), true).validate(&mut files).unwrap();

        assert_eq!(report.remediated, 1);
        assert!(files[0].remediated());
        assert!(files[0].content().contains("replicas: 3"));
    }

    #[test]
    fn test_rendered_only_resources_are_reported_but_not_remediated() {
        let mut files = vec![file(Resource::from_rendered)];
        let findings = vec![finding(Some("spec.replicas"), Some(json!(3)))];
        let report = Validator::new(Always(findings), true).validate(&mut files).unwrap();

        assert_eq!(report.violation_count, 1);
        assert_eq!(report.remediated, 0);
        assert_eq!(report.items[0].location.start_line, 10);
        assert!(!files[0].remediated());
    }

    #[test]
    fn test_location_display() {
        let location = Location {
            path: PathBuf::from("deploy.yaml"),
            start_line: 8,
            end_line: 8,
        };
        assert_eq!(location.to_string(), "deploy.yaml:8-8");
        assert_eq!(location.lines(), "#8");
    }
}
