use manifold_core::keypath::{self, PathSegment};
use manifold_core::yaml::parse_str;
use manifold_core::{Object, Resource};
use proptest::prelude::*;
use proptest::test_runner::Config;

const MANIFEST: &str = "apiVersion: apps/v1
kind: Deployment
metadata:
  name: frontend
  labels:
    app: web
spec:
  replicas: 1
  template:
    spec:
      containers:
      - name: app
        image: nginx
        ports:
        - containerPort: 80
      - name: sidecar
        image: envoy
";

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z][a-zA-Z0-9]{0,8}",
        ("[a-zA-Z][a-zA-Z0-9]{0,8}", 0_usize..5).prop_map(|(k, i)| format!("{k}[{i}]")),
    ]
}

fn known_segment() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "apiVersion", "kind", "metadata", "name", "labels", "app", "spec", "replicas",
        "template", "containers", "containers[0]", "containers[1]", "containers[2]",
        "image", "ports[0]", "containerPort", "status",
    ])
    .prop_map(str::to_string)
}

proptest! {
    #![proptest_config(Config::with_cases(256))]
    #[test]
    fn parse_join_roundtrip(parts in prop::collection::vec(segment(), 1..6)) {
        let path = parts.join(".");
        prop_assert_eq!(keypath::join(&keypath::parse(&path)), path);
    }

    #[test]
    fn indexes_follow_their_key(parts in prop::collection::vec(segment(), 1..6)) {
        let segments = keypath::parse(&parts.join("."));
        if let Some(PathSegment::Index(_)) = segments.first() {
            prop_assert!(false, "path cannot start with an index");
        }
        for pair in segments.windows(2) {
            if let [PathSegment::Index(_), PathSegment::Index(_)] = pair {
                prop_assert!(false, "consecutive indexes");
            }
        }
    }

    #[test]
    fn find_key_span_is_ordered(parts in prop::collection::vec(known_segment(), 1..7)) {
        let node = parse_str(MANIFEST).unwrap().remove(0);
        let resource = Resource::shared(Object::new(node));
        let (start, end) = resource.find_key(&parts.join("."));
        prop_assert!(start >= 1);
        prop_assert!(end >= start);
        prop_assert!(end <= 17);
    }

    #[test]
    fn exact_hit_implies_nearest_hit(parts in prop::collection::vec(known_segment(), 1..7)) {
        let node = parse_str(MANIFEST).unwrap().remove(0);
        let path = parts.join(".");
        if let Some(exact) = node.get_field(&path) {
            let nearest = node.find_field(&path).unwrap();
            prop_assert_eq!(exact.start_line(), nearest.start_line());
            prop_assert_eq!(exact.end_line(), nearest.end_line());
        }
    }
}
