//! Field-name rewriting for the document store, which rejects `.` in keys

use serde_json::{Map, Value};

/// Rewrite every `.` in object keys to `_`, recursively.
///
/// When a rewritten key collides with an existing key, the rewritten entry
/// replaces it. Applying this twice gives the same result as applying it once.
pub fn sanitize_field_names(fields: &mut Map<String, Value>) {
    let original = std::mem::take(fields);
    let (dotted, plain): (Vec<_>, Vec<_>) = original.into_iter().partition(|(key, _)| key.contains('.'));

    for (key, mut value) in plain {
        sanitize_value(&mut value);
        fields.insert(key, value);
    }
    for (key, mut value) in dotted {
        sanitize_value(&mut value);
        fields.insert(key.replace('.', "_"), value);
    }
}

fn sanitize_value(value: &mut Value) {
    match value {
        Value::Object(fields) => sanitize_field_names(fields),
        Value::Array(items) => items.iter_mut().for_each(sanitize_value),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_nested_labels_rewritten() {
        let mut fields = object(json!({
            "name": "/kubepods/abc",
            "spec": {
                "labels": {
                    "io.kubernetes.pod.name": "web-1",
                    "app": "web"
                }
            }
        }));

        sanitize_field_names(&mut fields);

        assert_eq!(
            Value::Object(fields),
            json!({
                "name": "/kubepods/abc",
                "spec": {
                    "labels": {
                        "io_kubernetes_pod_name": "web-1",
                        "app": "web"
                    }
                }
            })
        );
    }

    #[test]
    fn test_rewritten_key_wins_collision() {
        let mut fields = object(json!({ "a_b": "plain", "a.b": "dotted" }));

        sanitize_field_names(&mut fields);

        assert_eq!(fields.len(), 1);
        assert_eq!(fields["a_b"], "dotted");
    }

    #[test]
    fn test_objects_inside_arrays() {
        let mut fields = object(json!({ "mounts": [ { "x.y": 1 }, 2 ] }));

        sanitize_field_names(&mut fields);

        assert_eq!(fields["mounts"], json!([ { "x_y": 1 }, 2 ]));
    }

    #[test]
    fn test_idempotent() {
        let mut once = object(json!({
            "k.1": { "k.2": { "k.3": true } },
            "k_1": 0,
            "plain": [ { "z.z": null } ]
        }));
        sanitize_field_names(&mut once);

        let mut twice = once.clone();
        sanitize_field_names(&mut twice);

        assert_eq!(once, twice);
        assert!(once.keys().all(|k| !k.contains('.')));
    }
}
