//! YAML parsing into a [`StructuredValue`].

use mu_core::StructuredValue;
use serde_json::{Map, Number, Value};

use crate::error::ParseError;

/// Parse rendered text as a single YAML document.
///
/// Plain scalars are valid documents. Only syntax errors and values that have
/// no JSON equivalent (non-finite floats, non-scalar mapping keys) fail.
pub fn parse(text: &str) -> Result<StructuredValue, ParseError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(text)?;
    to_structured(yaml)
}

fn to_structured(yaml: serde_yaml::Value) -> Result<StructuredValue, ParseError> {
    match yaml {
        serde_yaml::Value::Null => Ok(Value::Null),
        serde_yaml::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_yaml::Value::Number(n) => number(&n).map(Value::Number),
        serde_yaml::Value::String(s) => Ok(Value::String(s)),
        serde_yaml::Value::Sequence(items) => items
            .into_iter()
            .map(to_structured)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                let key = mapping_key(key)?;
                if map.contains_key(&key) {
                    return Err(ParseError::Unsupported(format!(
                        "mapping key `{key}` appears twice once converted to a string"
                    )));
                }
                map.insert(key, to_structured(value)?);
            }
            Ok(Value::Object(map))
        }
        // Tags carry no meaning for configuration; keep the tagged value.
        serde_yaml::Value::Tagged(tagged) => to_structured(tagged.value),
    }
}

fn number(n: &serde_yaml::Number) -> Result<Number, ParseError> {
    if let Some(i) = n.as_i64() {
        Ok(Number::from(i))
    } else if let Some(u) = n.as_u64() {
        Ok(Number::from(u))
    } else {
        n.as_f64()
            .and_then(Number::from_f64)
            .ok_or_else(|| ParseError::Unsupported(format!("number `{n}` has no JSON form")))
    }
}

fn mapping_key(key: serde_yaml::Value) -> Result<String, ParseError> {
    match key {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Null => Ok("null".to_string()),
        other => Err(ParseError::Unsupported(format!(
            "mapping key must be a scalar, found {other:?}"
        ))),
    }
}
