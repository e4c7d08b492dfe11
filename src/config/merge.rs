//! Layer merge
//!
//! Rules, applied recursively:
//! - Objects: deep-merge by key
//! - Arrays: REPLACE (last wins)
//! - Scalars: override (last wins)

use serde_json::Value;

/// Deep merge `overlay` onto `base`. Null in the overlay clears a value.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = if let Some(base_value) = base_map.remove(&key) {
                    deep_merge(base_value, overlay_value)
                } else {
                    overlay_value
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }

        (Value::Array(_), overlay @ Value::Array(_)) => overlay,

        (_, overlay) => overlay,
    }
}

/// Merge layers in precedence order, lowest first
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_override() {
        let result = deep_merge(json!({"timeouts": {"sign_seconds": 300}}), json!({"timeouts": {"sign_seconds": 30}}));
        assert_eq!(result["timeouts"]["sign_seconds"], 30);
    }

    #[test]
    fn test_sibling_keys_survive() {
        let base = json!({
            "tools": {
                "apktool": "apktool",
                "keytool": "keytool"
            }
        });
        let overlay = json!({
            "tools": {
                "apktool": "/opt/apktool/apktool"
            }
        });
        let result = deep_merge(base, overlay);

        assert_eq!(result["tools"]["apktool"], "/opt/apktool/apktool");
        assert_eq!(result["tools"]["keytool"], "keytool");
    }

    #[test]
    fn test_array_replace() {
        let base = json!({"stored": ["arsc", "png", "ogg"]});
        let overlay = json!({"stored": ["arsc"]});
        let result = deep_merge(base, overlay);

        assert_eq!(result["stored"], json!(["arsc"]));
    }

    #[test]
    fn test_null_clears_value() {
        let result = deep_merge(json!({"upload": {"api_key": "k"}}), json!({"upload": {"api_key": null}}));
        assert!(result["upload"]["api_key"].is_null());
    }

    #[test]
    fn test_merge_layers_precedence() {
        let builtin = json!({
            "patch": {"default_port": 5055},
            "output": {"dir": "modified-apk", "write_summary": true}
        });
        let host = json!({"output": {"dir": "/srv/builds"}});
        let project = json!({"output": {"write_summary": false}});
        let cli = json!({"patch": {"default_port": 7000}});

        let result = merge_layers(vec![builtin, host, project, cli]);

        assert_eq!(result["patch"]["default_port"], 7000);
        assert_eq!(result["output"]["dir"], "/srv/builds");
        assert_eq!(result["output"]["write_summary"], false);
    }

    #[test]
    fn test_merge_no_layers() {
        assert!(merge_layers(Vec::new()).is_null());
    }
}
