use insta::assert_snapshot;
use manifold_core::yaml::parse_str;
use manifold_core::{File, Object, Resource};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;

const SERVICES: &str = "apiVersion: v1
kind: Service
metadata:
  name: frontend
  namespace: shop
spec:
  selector:
    app: frontend
  ports:
  - port: 80
    targetPort: 8080
";

const DEPLOYMENTS: &str = "apiVersion: apps/v1
kind: Deployment
metadata:
  name: frontend
  namespace: shop
spec:
  replicas: 1
  template:
    spec:
      containers:
      - name: app
        image: \"nginx:1.25\"
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: backend
  namespace: shop
spec:
  replicas: 2
";

#[test]
fn test_raw_and_rendered_share_identity() {
    let raw = Object::new(parse_str(DEPLOYMENTS).unwrap().remove(0));
    let rendered = Object::new(
        parse_str("kind: Deployment\napiVersion: \"apps/v1\"\nmetadata: {name: frontend, namespace: shop}\nspec:\n  replicas: 5\n")
            .unwrap()
            .remove(0),
    );
    assert_eq!(raw.id(), rendered.id());
    assert_eq!(raw.id(), "apps/v1/Deployment/shop/frontend");
}

#[test]
fn test_remediation_changes_only_the_target() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("deployments.yaml");
    fs::write(&path, DEPLOYMENTS)?;

    let mut file = File::from_path(&path)?;
    assert!(file.remediate("apps/v1/Deployment/shop/frontend", "spec.replicas", &json!(2))?);
    assert!(file.remediate(
        "apps/v1/Deployment/shop/frontend",
        "spec.template.spec.containers[0].securityContext.runAsNonRoot",
        &json!(true),
    )?);

    assert_snapshot!(file.content(), @r###"
    apiVersion: apps/v1
    kind: Deployment
    metadata:
      name: frontend
      namespace: shop
    spec:
      replicas: 2
      template:
        spec:
          containers:
          - name: app
            image: "nginx:1.25"
            securityContext:
              runAsNonRoot: true
    ---
    apiVersion: apps/v1
    kind: Deployment
    metadata:
      name: backend
      namespace: shop
    spec:
      replicas: 2
    "###);
    Ok(())
}

#[test]
fn test_shared_resources_across_two_files() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let files = [("service.yaml", SERVICES), ("deployments.yaml", DEPLOYMENTS)];

    let mut total = 0;
    for (name, content) in files {
        let file = File::from_documents(name, parse_str(content)?, Resource::shared);
        fs::write(dir.path().join(name), content)?;
        for resource in file.resources().values() {
            let raw = resource.raw().expect("raw");
            let rendered = resource.rendered().expect("rendered");
            assert!(std::ptr::eq(raw, rendered));
        }
        total += file.len();
    }
    assert_eq!(total, 3);
    Ok(())
}

#[test]
fn test_find_key_on_rendered_only_resource() {
    let resource = Resource::from_rendered(Object::new(parse_str(SERVICES).unwrap().remove(0)));
    assert_eq!(resource.find_key("spec.ports[0].targetPort"), (11, 11));
    assert_eq!(resource.find_key("spec.ports[0].protocol"), (10, 11));
    assert_eq!(resource.find_key("status"), (1, 11));
}

#[test]
fn test_remediation_keeps_comments_and_flush_sequences() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("web.yaml");
    fs::write(
        &path,
        "# owned by team-web
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  replicas: 1 # scaled by HPA
  template:
    spec:
      containers:
      # the only container
      - name: web
        ports:
        - containerPort: 80
",
    )?;

    let mut file = File::from_path(&path)?;
    assert!(file.remediate("apps/v1/Deployment/[noNamespace]/web", "spec.replicas", &json!(2))?);
    assert_snapshot!(file.content(), @r###"
    # owned by team-web
    apiVersion: apps/v1
    kind: Deployment
    metadata:
      name: web
    spec:
      replicas: 2 # scaled by HPA
      template:
        spec:
          containers:
          # the only container
          - name: web
            ports:
            - containerPort: 80
    "###);
    Ok(())
}
