//! Scanning repositories that mix several sources

use manifold::{locate, scan, ScanReport};
use manifold_source::SourceOptions;
use manifold_test_fixtures::{FixtureType, TestFixtures};
use pretty_assertions::assert_eq;
use std::path::PathBuf;

const FRONTEND_ID: &str = "apps/v1/Deployment/[noNamespace]/frontend";

#[test]
fn test_each_kustomization_is_claimed_once() -> Result<(), Box<dyn std::error::Error>> {
    let mut fixtures = TestFixtures::new();
    let root = fixtures.setup(FixtureType::KustomizeOverlays);

    let files = scan(&root, &SourceOptions::default())?;
    let paths: Vec<PathBuf> = files.iter().map(|file| file.path().to_path_buf()).collect();
    assert_eq!(
        paths,
        vec![
            root.join("base/deployment.yaml"),
            root.join("base/service.yaml"),
            root.join("base/deployment.yaml"),
            root.join("base/service.yaml"),
            root.join("overlays/dev/replicas.yaml"),
            root.join("base/deployment.yaml"),
            root.join("base/service.yaml"),
        ]
    );

    let location = locate(&files, FRONTEND_ID, "spec.replicas").ok_or("frontend not found")?;
    assert_eq!(location.path, root.join("base/deployment.yaml"));
    assert_eq!((location.start_line, location.end_line), (8, 8));
    Ok(())
}

#[test]
fn test_chart_files_are_not_scanned_as_manifests() -> Result<(), Box<dyn std::error::Error>> {
    let mut fixtures = TestFixtures::new();
    let chart = fixtures.setup(FixtureType::HelmChart);
    let root = chart.parent().ok_or("chart has no parent")?;

    let files = scan(root, &SourceOptions::default())?;
    let paths: Vec<PathBuf> = files.iter().map(|file| file.path().to_path_buf()).collect();
    assert_eq!(
        paths,
        vec![chart.join("templates/deployment.yaml"), chart.join("templates/service.yaml")]
    );
    Ok(())
}

#[test]
fn test_scan_report_lists_resources() -> Result<(), Box<dyn std::error::Error>> {
    let mut fixtures = TestFixtures::new();
    let manifests = fixtures.setup(FixtureType::Kubernetes);

    let files = scan(&manifests, &SourceOptions::default())?;
    let report = ScanReport::from_files(&files);
    assert_eq!(report.files.len(), 2);
    assert_eq!(report.resource_count(), 3);

    let value: serde_json::Value = serde_json::from_str(&report.to_json()?)?;
    assert_eq!(value["files"][0]["resources"][0]["id"], "apps/v1/Deployment/cache/redis");
    assert_eq!(value["files"][0]["resources"][0]["availability"], "shared");
    Ok(())
}
