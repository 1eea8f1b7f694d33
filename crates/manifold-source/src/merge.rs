//! Deep merge of generic values.
//!
//! Used to layer a Helm values file over the chart defaults, following
//! Helm's coalescing rules:
//!
//! - **Maps**: merge key by key, recursing into maps on both sides
//! - **`null` in the overlay**: removes the key from the result
//! - **Everything else** (scalars, lists, type changes): the overlay wins
//!
//! # Example
//!
//! ```rust
//! use manifold_source::merge::Merge;
//! use serde_json::json;
//!
//! let defaults = json!({"replicaCount": 1, "image": {"repository": "nginx", "tag": "1.25"}});
//! let overlay = json!({"replicaCount": 3, "image": {"tag": null}});
//! let values = defaults.merge(overlay);
//!
//! assert_eq!(values, json!({"replicaCount": 3, "image": {"repository": "nginx"}}));
//! ```

/// Trait for deep merging values.
pub trait Merge: Sized {
    /// Merge `other` into `self`, with `other` taking precedence.
    fn merge(self, other: Self) -> Self;

    /// Merge multiple overlays in sequence.
    ///
    /// Later overlays take precedence over earlier ones.
    fn merge_all<I>(self, overlays: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        overlays.into_iter().fold(self, |acc, overlay| acc.merge(overlay))
    }
}

impl Merge for serde_json::Value {
    fn merge(self, other: Self) -> Self {
        use serde_json::Value;

        match (self, other) {
            (Value::Object(mut base), Value::Object(overlay)) => {
                for (key, overlay_value) in overlay {
                    if overlay_value.is_null() {
                        base.remove(&key);
                        continue;
                    }
                    let merged = match base.remove(&key) {
                        Some(base_value) => base_value.merge(overlay_value),
                        None => overlay_value,
                    };
                    base.insert(key, merged);
                }
                Value::Object(base)
            }
            (_, overlay) => overlay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_value_merge() {
        let base = json!({
            "name": "app",
            "spec": {
                "replicas": 1,
                "image": "base:v1"
            }
        });

        let overlay = json!({
            "spec": {
                "replicas": 3
            },
            "labels": {
                "env": "prod"
            }
        });

        let merged = base.merge(overlay);

        assert_eq!(merged["name"], "app");
        assert_eq!(merged["spec"]["replicas"], 3);
        assert_eq!(merged["spec"]["image"], "base:v1");
        assert_eq!(merged["labels"]["env"], "prod");
    }

    #[test]
    fn test_null_removes_key() {
        let merged = json!({"a": 1, "b": {"c": 2, "d": 3}}).merge(json!({"a": null, "b": {"d": null}}));
        assert_eq!(merged, json!({"b": {"c": 2}}));
    }

    #[test]
    fn test_lists_are_replaced() {
        let merged = json!({"args": ["a", "b"]}).merge(json!({"args": ["c"]}));
        assert_eq!(merged, json!({"args": ["c"]}));
    }

    #[test]
    fn test_merge_all_last_wins() {
        let merged = json!({"n": 1}).merge_all(vec![json!({"n": 2}), json!({"n": 3})]);
        assert_eq!(merged["n"], 3);
    }
}
