//! Driver selection and plain manifest loading

use manifold_core::Rendered;
use manifold_source::{select_source, Source, SourceError, SourceKind, SourceOptions};
use manifold_test_fixtures::{FixtureType, TestFixtures};
use pretty_assertions::assert_eq;

#[test]
fn test_each_fixture_selects_its_driver() -> Result<(), Box<dyn std::error::Error>> {
    let mut fixtures = TestFixtures::new();
    let options = SourceOptions::default();

    let chart = fixtures.setup(FixtureType::HelmChart);
    assert_eq!(select_source(&chart, &options)?.kind(), SourceKind::Helm);

    let overlays = fixtures.setup(FixtureType::KustomizeOverlays);
    assert_eq!(select_source(&overlays.join("overlays/dev"), &options)?.kind(), SourceKind::Kustomize);
    assert_eq!(select_source(&overlays.join("base"), &options)?.kind(), SourceKind::Kustomize);

    let manifests = fixtures.setup(FixtureType::Kubernetes);
    assert_eq!(select_source(&manifests, &options)?.kind(), SourceKind::Kubernetes);

    assert!(matches!(
        select_source(&overlays.join("overlays"), &options),
        Err(SourceError::NotRecognized(_))
    ));
    Ok(())
}

#[test]
fn test_kubernetes_files_share_raw_and_rendered() -> Result<(), Box<dyn std::error::Error>> {
    let mut fixtures = TestFixtures::new();
    let manifests = fixtures.setup(FixtureType::Kubernetes);

    let files = select_source(&manifests, &SourceOptions::default())?.resource_files()?;
    assert_eq!(files.len(), 2);
    assert_eq!(files.iter().map(|file| file.len()).sum::<usize>(), 3);

    let frontend = &files[1];
    assert!(frontend.path().ends_with("frontend.yaml"));
    let service = frontend
        .resource("v1/Service/[noNamespace]/frontend")
        .ok_or("missing service")?;
    assert_eq!(service.rendering(), &Rendered::SharedWithRaw);
    assert_eq!(service.find_key("spec.ports[0].port"), (31, 31));

    let redis = files[0].resource("apps/v1/Deployment/cache/redis").ok_or("missing redis")?;
    assert_eq!(redis.find_key("spec.template.spec.containers[0].image"), (12, 12));
    Ok(())
}
