pub mod concepts;
pub mod ops;
pub mod stats;
pub mod store;
pub mod types;

use serde_yaml::Value;

/// Render a YAML scalar as a memory string. Nulls and nested structures yield `None`.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}
