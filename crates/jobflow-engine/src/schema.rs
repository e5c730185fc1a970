//! Validates a job's output against its declared `output_schema`
//! (`SchemaViolationError` on mismatch). The schema itself is a [`Value`] using a small
//! JSON-Schema-flavored vocabulary — `type`, `properties`/`required` for
//! mappings, `items` for sequences — rather than a full JSON Schema
//! implementation, since jobflow's validation needs are narrow (see
//! `DESIGN.md`).

use jobflow_core::Value;

/// Check `value` against `schema`, returning a human-readable reason on
/// mismatch. `schema` is itself a [`Value::Mapping`]; anything else is
/// treated as "no constraint" and always passes.
pub fn validate(value: &Value, schema: &Value) -> Result<(), String> {
    let Some(schema) = schema.as_mapping() else {
        return Ok(());
    };

    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        check_type(value, expected)?;
    }

    if let (Value::Mapping(fields), Some(properties)) = (value, schema.get("properties").and_then(Value::as_mapping)) {
        for (key, sub_schema) in properties {
            match fields.get(key) {
                Some(sub_value) => validate(sub_value, sub_schema)?,
                None => {
                    let required = schema
                        .get("required")
                        .and_then(Value::as_sequence)
                        .map(|items| items.iter().any(|v| v.as_str() == Some(key)))
                        .unwrap_or(false);
                    if required {
                        return Err(format!("missing required property '{key}'"));
                    }
                }
            }
        }
    }

    if let (Value::Sequence(items), Some(item_schema)) = (value, schema.get("items")) {
        for item in items {
            validate(item, item_schema)?;
        }
    }

    Ok(())
}

fn check_type(value: &Value, expected: &str) -> Result<(), String> {
    let matches = match expected {
        "null" => matches!(value, Value::Null),
        "boolean" => matches!(value, Value::Bool(_)),
        "integer" => matches!(value, Value::Number(n) if n.is_i64() || n.is_u64()),
        "number" => matches!(value, Value::Number(_)),
        "string" => matches!(value, Value::String(_)),
        "array" => matches!(value, Value::Sequence(_) | Value::Set(_)),
        "object" => matches!(value, Value::Mapping(_) | Value::Typed(_)),
        other => return Err(format!("unknown schema type '{other}'")),
    };
    if matches {
        Ok(())
    } else {
        Err(format!("expected type '{expected}', got {}", describe(value)))
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "array",
        Value::Set(_) => "set",
        Value::Mapping(_) => "object",
        Value::Reference(_) => "reference",
        Value::Typed(_) => "typed object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_mismatch_is_rejected() {
        let schema = Value::mapping([("type", Value::from("integer"))]);
        assert!(validate(&Value::from("x"), &schema).is_err());
        assert!(validate(&Value::from(1i64), &schema).is_ok());
    }

    #[test]
    fn missing_required_property_is_rejected() {
        let schema = Value::mapping([
            ("type", Value::from("object")),
            ("properties", Value::mapping([("x", Value::mapping([("type", Value::from("integer"))]))])),
            ("required", Value::Sequence(vec![Value::from("x")])),
        ]);
        assert!(validate(&Value::mapping([("y", Value::from(1i64))]), &schema).is_err());
        assert!(validate(&Value::mapping([("x", Value::from(1i64))]), &schema).is_ok());
    }

    #[test]
    fn array_items_are_checked_elementwise() {
        let schema = Value::mapping([
            ("type", Value::from("array")),
            ("items", Value::mapping([("type", Value::from("integer"))])),
        ]);
        assert!(validate(&Value::Sequence(vec![Value::from(1i64), Value::from("bad")]), &schema).is_err());
        assert!(validate(&Value::Sequence(vec![Value::from(1i64), Value::from(2i64)]), &schema).is_ok());
    }
}
