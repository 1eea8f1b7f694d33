//! Test fixtures for manifold source drivers
//!
//! Writes small but representative source trees into temporary directories:
//! plain manifests, a Helm chart and a Kustomize base with two overlays.

use std::fs;
use std::path::{Path, PathBuf};

/// Test fixture categories
pub enum FixtureType {
    /// `manifests/`: two files, three resources, plus a hidden directory
    Kubernetes,
    /// `web/`: a chart with `values-dev.yaml` and `values-prod.yaml`
    HelmChart,
    /// `base/`, `overlays/dev/` and `overlays/prod/`
    KustomizeOverlays,
}

pub const FRONTEND_DEPLOYMENT: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: frontend
  labels:
    app: frontend
spec:
  replicas: 1
  selector:
    matchLabels:
      app: frontend
  template:
    metadata:
      labels:
        app: frontend
    spec:
      containers:
      - name: frontend
        image: nginx:1.25
        ports:
        - containerPort: 80
"#;

const FRONTEND_SERVICE: &str = r#"apiVersion: v1
kind: Service
metadata:
  name: frontend
spec:
  selector:
    app: frontend
  ports:
  - port: 80
    targetPort: 80
"#;

const REDIS_DEPLOYMENT: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: redis
  namespace: cache
spec:
  replicas: 1
  template:
    spec:
      containers:
      - name: redis
        image: redis:7
"#;

/// Main test fixtures provider
///
/// Every directory handed out stays alive as long as the provider does.
#[derive(Default)]
pub struct TestFixtures {
    temp_dirs: Vec<tempfile::TempDir>,
}

impl TestFixtures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a temporary directory holding the fixture and return the path
    /// a driver should be pointed at
    pub fn setup(&mut self, fixture_type: FixtureType) -> PathBuf {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_path_buf();

        let path = match fixture_type {
            FixtureType::Kubernetes => self.setup_kubernetes(&base),
            FixtureType::HelmChart => self.setup_helm_chart(&base),
            FixtureType::KustomizeOverlays => self.setup_kustomize(&base),
        };

        self.temp_dirs.push(dir);
        path
    }

    fn setup_kubernetes(&self, base: &Path) -> PathBuf {
        let dir = base.join("manifests");
        fs::create_dir_all(dir.join("cache")).unwrap();
        fs::create_dir_all(dir.join(".github")).unwrap();

        fs::write(
            dir.join("frontend.yaml"),
            format!("{}---\n{}", FRONTEND_DEPLOYMENT, FRONTEND_SERVICE),
        )
        .unwrap();
        fs::write(dir.join("cache/redis.yaml"), REDIS_DEPLOYMENT).unwrap();
        fs::write(dir.join(".github/ci.yaml"), "kind: Workflow\nname: ci\n").unwrap();
        fs::write(dir.join("README.md"), "# manifests\n").unwrap();
        dir
    }

    fn setup_helm_chart(&self, base: &Path) -> PathBuf {
        let dir = base.join("web");
        fs::create_dir_all(dir.join("templates")).unwrap();

        fs::write(
            dir.join("Chart.yaml"),
            "apiVersion: v2\nname: web\ndescription: A web frontend\nversion: 0.1.0\nappVersion: \"1.25\"\n",
        )
        .unwrap();
        fs::write(
            dir.join("values.yaml"),
            "replicaCount: 1\nimage:\n  repository: nginx\n  tag: \"\"\nservice:\n  port: 80\n",
        )
        .unwrap();
        fs::write(dir.join("values-dev.yaml"), "replicaCount: 1\n").unwrap();
        fs::write(dir.join("values-prod.yaml"), "replicaCount: 3\n").unwrap();

        fs::write(
            dir.join("templates/_helpers.tpl"),
            r#"{{- define "web.fullname" -}}
{{- printf "%s-%s" .Release.Name .Chart.Name | trunc 63 | trimSuffix "-" }}
{{- end }}

{{- define "web.labels" -}}
app.kubernetes.io/name: {{ .Chart.Name }}
app.kubernetes.io/instance: {{ .Release.Name }}
{{- end }}
"#,
        )
        .unwrap();
        fs::write(
            dir.join("templates/deployment.yaml"),
            r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: {{ include "web.fullname" . }}
  labels:
    {{- include "web.labels" . | nindent 4 }}
spec:
  replicas: {{ .Values.replicaCount }}
  selector:
    matchLabels:
      {{- include "web.labels" . | nindent 6 }}
  template:
    metadata:
      labels:
        {{- include "web.labels" . | nindent 8 }}
    spec:
      containers:
      - name: {{ .Chart.Name }}
        image: "{{ .Values.image.repository }}:{{ .Values.image.tag | default .Chart.AppVersion }}"
        ports:
        - containerPort: {{ .Values.service.port }}
"#,
        )
        .unwrap();
        fs::write(
            dir.join("templates/service.yaml"),
            r#"apiVersion: v1
kind: Service
metadata:
  name: web
  labels:
    release: "{{ .Release.Name }}"
spec:
  type: ClusterIP
  ports:
  - port: 80
    name: http
"#,
        )
        .unwrap();
        fs::write(
            dir.join("templates/NOTES.txt"),
            "Thank you for installing {{ .Chart.Name }}.\n",
        )
        .unwrap();
        dir
    }

    fn setup_kustomize(&self, base: &Path) -> PathBuf {
        let base_dir = base.join("base");
        let dev = base.join("overlays/dev");
        let prod = base.join("overlays/prod");
        for dir in [&base_dir, &dev, &prod] {
            fs::create_dir_all(dir).unwrap();
        }

        fs::write(base_dir.join("deployment.yaml"), FRONTEND_DEPLOYMENT).unwrap();
        fs::write(base_dir.join("service.yaml"), FRONTEND_SERVICE).unwrap();
        fs::write(
            base_dir.join("kustomization.yaml"),
            "apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\nresources:\n- deployment.yaml\n- service.yaml\n",
        )
        .unwrap();

        fs::write(
            dev.join("kustomization.yaml"),
            r#"apiVersion: kustomize.config.k8s.io/v1beta1
kind: Kustomization
namePrefix: dev-
namespace: dev
resources:
- ../../base
patchesStrategicMerge:
- replicas.yaml
"#,
        )
        .unwrap();
        fs::write(
            dev.join("replicas.yaml"),
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: frontend\nspec:\n  replicas: 2\n",
        )
        .unwrap();

        fs::write(
            prod.join("kustomization.yaml"),
            r#"apiVersion: kustomize.config.k8s.io/v1beta1
kind: Kustomization
nameSuffix: -prod
commonLabels:
  env: prod
resources:
- ../../base
images:
- name: nginx
  newTag: "1.27"
replicas:
- name: frontend
  count: 4
"#,
        )
        .unwrap();

        base.to_path_buf()
    }
}

/// The frontend deployment used across fixtures
pub fn frontend_deployment() -> serde_yaml::Value {
    serde_yaml::from_str(FRONTEND_DEPLOYMENT).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_are_valid() {
        let deployment = frontend_deployment();
        assert_eq!(deployment["kind"], "Deployment");
        assert_eq!(deployment["spec"]["replicas"], 1);
    }

    #[test]
    fn directories_outlive_setup() {
        let mut fixtures = TestFixtures::new();
        let chart = fixtures.setup(FixtureType::HelmChart);
        let manifests = fixtures.setup(FixtureType::Kubernetes);
        assert!(chart.join("Chart.yaml").is_file());
        assert!(manifests.join("frontend.yaml").is_file());
    }
}
