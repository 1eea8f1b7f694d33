//! Helm charts rendered in-process
//!
//! The chart's templates are rendered with the merged values, then every
//! rendered output is matched back to the template file it came from. When
//! that template is itself parseable YAML, rendered resources are attached to
//! its raw resources by identity; everything else stays rendered-only.

pub mod chart;
pub mod template;

use crate::error::{Result, SourceError};
use crate::merge::Merge;
use crate::paths::{is_hidden, is_yaml_file};
use crate::{Source, SourceKind};
use chart::{read_values, Chart, CHART_FILE, TEMPLATES_DIR};
use indexmap::IndexMap;
use manifold_core::{yaml, File, Object, Resource};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use template::Engine;
use tracing::{debug, info, instrument};

pub const DEFAULT_RELEASE_NAME: &str = "release-name";
pub const DEFAULT_NAMESPACE: &str = "default";

/// Kubernetes version reported through `.Capabilities`
const KUBE_VERSION: (&str, &str) = ("1", "30");

/// Group versions served by a stock cluster of `KUBE_VERSION`
const API_VERSIONS: &[&str] = &[
    "v1",
    "admissionregistration.k8s.io/v1",
    "apiextensions.k8s.io/v1",
    "apiregistration.k8s.io/v1",
    "apps/v1",
    "authentication.k8s.io/v1",
    "authorization.k8s.io/v1",
    "autoscaling/v1",
    "autoscaling/v2",
    "batch/v1",
    "certificates.k8s.io/v1",
    "coordination.k8s.io/v1",
    "discovery.k8s.io/v1",
    "events.k8s.io/v1",
    "flowcontrol.apiserver.k8s.io/v1",
    "networking.k8s.io/v1",
    "node.k8s.io/v1",
    "policy/v1",
    "rbac.authorization.k8s.io/v1",
    "scheduling.k8s.io/v1",
    "storage.k8s.io/v1",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HelmOptions {
    /// Values merged over the chart's `values.yaml`
    pub values_file: Option<PathBuf>,
    pub release_name: String,
    pub namespace: String,
}

impl Default for HelmOptions {
    fn default() -> Self {
        Self {
            values_file: None,
            release_name: DEFAULT_RELEASE_NAME.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Helm {
    path: PathBuf,
    options: HelmOptions,
}

impl Helm {
    pub fn new(path: impl Into<PathBuf>, options: HelmOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }

    pub fn options(&self) -> &HelmOptions {
        &self.options
    }

    pub fn set_values_file(&mut self, path: impl Into<PathBuf>) {
        self.options.values_file = Some(path.into());
    }

    /// Where the values file lives; relative paths missing from the working
    /// directory are looked up in the chart
    fn values_path(&self) -> Option<PathBuf> {
        let file = self.options.values_file.as_ref()?;
        if file.is_relative() && !file.exists() {
            Some(self.path.join(file))
        } else {
            Some(file.clone())
        }
    }

    fn values(&self, chart: &Chart) -> Result<Value> {
        let Some(path) = self.values_path() else {
            return Ok(chart.values.clone());
        };
        debug!("Merging values from {}", path.display());
        Ok(chart.values.clone().merge(read_values(&path)?))
    }

    fn context(&self, chart: &Chart, values: Value) -> Value {
        let (major, minor) = KUBE_VERSION;
        let version = format!("v{}.{}.0", major, minor);
        json!({
            "Values": values,
            "Chart": chart.to_value(),
            "Release": {
                "Name": self.options.release_name,
                "Namespace": self.options.namespace,
                "Service": "Helm",
                "IsInstall": true,
                "IsUpgrade": false,
                "Revision": 1,
            },
            "Capabilities": {
                "KubeVersion": {
                    "Version": version,
                    "GitVersion": version,
                    "Major": major,
                    "Minor": minor,
                },
                "APIVersions": API_VERSIONS,
            },
        })
    }

    /// Render every non-partial template, keyed by template name
    #[instrument(skip(self), fields(path = %self.path.display()), level = "debug")]
    pub fn render(&self) -> Result<(Chart, IndexMap<String, String>)> {
        let chart = Chart::load(&self.path)?;
        let values = self.values(&chart)?;

        let mut engine = Engine::new();
        for file in &chart.templates {
            engine.add(&file.name, &file.content)?;
        }

        let base_path = format!("{}/{}", chart.name(), TEMPLATES_DIR);
        let mut context = self.context(&chart, values);
        let mut rendered = IndexMap::new();
        for file in chart.templates.iter().filter(|file| !file.is_partial()) {
            context["Template"] = json!({ "Name": file.name, "BasePath": base_path });
            rendered.insert(file.name.clone(), engine.render(&file.name, &context)?);
        }

        info!("Rendered {} template(s) from chart {}", rendered.len(), chart.name());
        Ok((chart, rendered))
    }

    /// On-disk path of a rendered template: the chart name prefix is replaced
    /// by the chart directory
    fn source_path(&self, chart: &Chart, name: &str) -> PathBuf {
        let relative = name
            .strip_prefix(chart.name())
            .unwrap_or(name)
            .trim_start_matches('/');
        self.path.join(relative)
    }
}

/// The raw template parsed as YAML, or an empty file when it is not YAML
fn load_raw(path: &Path) -> File {
    if !path.is_file() {
        return File::new(path);
    }
    match File::from_path(path) {
        Ok(file) => file,
        Err(e) => {
            debug!("Template {} is not addressable YAML: {}", path.display(), e);
            File::new(path)
        }
    }
}

impl Source for Helm {
    fn kind(&self) -> SourceKind {
        SourceKind::Helm
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn is_valid_path(&self) -> bool {
        self.path.is_dir() && self.path.join(CHART_FILE).is_file()
    }

    #[instrument(skip(self), fields(path = %self.path.display()), level = "debug")]
    fn resource_files(&self) -> Result<Vec<File>> {
        let (chart, rendered) = self.render()?;

        let mut files = Vec::new();
        for (name, output) in rendered {
            let path = self.source_path(&chart, &name);
            let relative = Path::new(&name);
            if !is_yaml_file(relative) || is_hidden(relative) {
                debug!("Skipping rendered output {}", name);
                continue;
            }

            let documents = yaml::parse_str(&output).map_err(|e| SourceError::Template {
                name: name.clone(),
                message: e.to_string(),
            })?;
            if documents.is_empty() {
                debug!("Template {} rendered no documents", name);
                continue;
            }

            let mut file = load_raw(&path);
            for node in documents {
                let object = Object::new(node);
                let id = object.id();
                if let Err(object) = file.set_rendered(&id, object) {
                    file.insert(Resource::from_rendered(object));
                }
            }
            files.push(file);
        }

        info!("Resolved {} file(s) from chart {}", files.len(), chart.name());
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_chart(dir: &Path) -> std::io::Result<()> {
        fs::write(dir.join(CHART_FILE), "apiVersion: v2\nname: web\nversion: 0.1.0\n")?;
        fs::write(dir.join("values.yaml"), "replicaCount: 1\nservice:\n  port: 80\n")?;
        fs::create_dir(dir.join(TEMPLATES_DIR))?;
        fs::write(
            dir.join("templates/service.yaml"),
            "apiVersion: v1\nkind: Service\nmetadata:\n  name: web\n  labels:\n    release: \"{{ .Release.Name }}\"\nspec:\n  port: \"{{ .Values.service.port }}\"\n",
        )?;
        fs::write(dir.join("templates/NOTES.txt"), "Installed {{ .Chart.Name }}\n")
    }

    #[test]
    fn test_raw_and_rendered_are_paired() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        write_chart(dir.path())?;

        let helm = Helm::new(dir.path(), HelmOptions::default());
        assert!(helm.is_valid_path());
        let files = helm.resource_files()?;
        assert_eq!(files.len(), 1);

        let file = &files[0];
        assert_eq!(file.path(), dir.path().join("templates/service.yaml"));
        let resource = file.resource("v1/Service/[noNamespace]/web").ok_or("missing service")?;
        assert!(resource.raw().is_some());
        let rendered = resource.rendered().ok_or("missing rendered")?;
        assert_eq!(
            rendered.to_json()["metadata"]["labels"]["release"],
            json!(DEFAULT_RELEASE_NAME)
        );
        Ok(())
    }

    #[test]
    fn test_relative_values_file_resolves_against_chart() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        write_chart(dir.path())?;
        fs::write(dir.path().join("values-prod.yaml"), "service:\n  port: 443\n")?;

        let mut helm = Helm::new(dir.path(), HelmOptions::default());
        helm.set_values_file("values-prod.yaml");
        let (_, rendered) = helm.render()?;
        assert!(rendered["web/templates/service.yaml"].contains("port: \"443\""));
        Ok(())
    }

    #[test]
    fn test_missing_values_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_chart(dir.path()).unwrap();
        let options = HelmOptions {
            values_file: Some(PathBuf::from("nope.yaml")),
            ..HelmOptions::default()
        };
        assert!(matches!(
            Helm::new(dir.path(), options).resource_files(),
            Err(SourceError::Chart { .. })
        ));
    }

    #[test]
    fn test_capabilities_are_exposed() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        write_chart(dir.path())?;
        fs::write(
            dir.path().join("templates/capabilities.yaml"),
            "git: {{ .Capabilities.KubeVersion.GitVersion }}\napps: {{ .Capabilities.APIVersions.Has \"apps/v1\" }}\ncrd: {{ .Capabilities.APIVersions.Has \"example.com/v1\" }}\n",
        )?;

        let (_, rendered) = Helm::new(dir.path(), HelmOptions::default()).render()?;
        assert_eq!(
            rendered["web/templates/capabilities.yaml"],
            "git: v1.30.0\napps: true\ncrd: false\n"
        );
        Ok(())
    }

    #[test]
    fn test_directory_without_chart_is_not_valid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!Helm::new(dir.path(), HelmOptions::default()).is_valid_path());
    }
}
