use serde_json::Value;

/// Extract a value using the manifest's simplified JSONPath (§4.2): either
/// `$.a.b.c` (dot descent, array indices as integer tokens) or a bare
/// top-level key.
#[must_use]
pub fn extract<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let Some(rest) = path.strip_prefix("$.") else {
        return data.get(path);
    };

    let mut current = data;
    for part in rest.split('.') {
        current = match current {
            Value::Object(_) => current.get(part)?,
            Value::Array(items) => {
                let idx: usize = part.parse().ok()?;
                items.get(idx)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Render a JSON scalar as a string field value; `null` and missing values
/// have already been filtered out by the caller.
#[must_use]
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_key_is_top_level() {
        let data = json!({"status": "down"});
        assert_eq!(extract(&data, "status"), Some(&json!("down")));
    }

    #[test]
    fn dot_descent_with_array_index() {
        let data = json!({"a": {"b": [1, 2, {"c": "found"}]}});
        assert_eq!(extract(&data, "$.a.b.2.c"), Some(&json!("found")));
    }

    #[test]
    fn missing_path_yields_none() {
        let data = json!({"a": 1});
        assert_eq!(extract(&data, "$.a.b"), None);
    }
}
