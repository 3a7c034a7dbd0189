// Typed parameter values produced by the parsing pipeline

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ValidationError;

/// A parsed parameter value. Every schema type coerces into exactly one of
/// these variants, so handlers never cast untyped data.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    Bool(bool),
    Structured(Value),
    Sequence(Vec<ParamValue>),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[ParamValue]> {
        match self {
            ParamValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Short type name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ParamValue::String(_) => "string",
            ParamValue::Bool(_) => "boolean",
            ParamValue::Structured(_) => "structured value",
            ParamValue::Sequence(_) => "sequence",
        }
    }

    /// Renders the value back into the wire representation accepted by the parser.
    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::String(s) => Value::String(s.clone()),
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::Structured(v) => v.clone(),
            ParamValue::Sequence(items) => {
                Value::Array(items.iter().map(ParamValue::to_json).collect())
            }
        }
    }
}

/// Name of a JSON value's type, for type-mismatch errors.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parsed parameters of one request, keyed by canonical parameter name.
/// Owned by the request that produced it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMap {
    values: BTreeMap<String, ParamValue>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }

    /// Required string parameter.
    pub fn string(&self, name: &str) -> Result<&str, ValidationError> {
        match self.values.get(name) {
            Some(ParamValue::String(s)) => Ok(s),
            Some(other) => Err(mismatch(name, "string", other)),
            None => Err(ValidationError::Missing {
                param: name.to_string(),
            }),
        }
    }

    /// Boolean parameter; absent reads as `false`.
    pub fn flag(&self, name: &str) -> Result<bool, ValidationError> {
        match self.values.get(name) {
            Some(ParamValue::Bool(b)) => Ok(*b),
            Some(other) => Err(mismatch(name, "boolean", other)),
            None => Ok(false),
        }
    }

    /// Required parameter of any shape, as JSON.
    pub fn structured(&self, name: &str) -> Result<Value, ValidationError> {
        self.values
            .get(name)
            .map(ParamValue::to_json)
            .ok_or_else(|| ValidationError::Missing {
                param: name.to_string(),
            })
    }

    /// Required JSON object parameter.
    pub fn object(&self, name: &str) -> Result<serde_json::Map<String, Value>, ValidationError> {
        match self.structured(name)? {
            Value::Object(map) => Ok(map),
            other => Err(ValidationError::TypeMismatch {
                param: name.to_string(),
                expected: "object".to_string(),
                actual: json_kind(&other).to_string(),
            }),
        }
    }

    /// Optional list of strings; absent reads as `None`.
    pub fn string_list(&self, name: &str) -> Result<Option<Vec<String>>, ValidationError> {
        let Some(value) = self.values.get(name) else {
            return Ok(None);
        };
        let items = value
            .as_sequence()
            .ok_or_else(|| mismatch(name, "sequence", value))?;
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| mismatch(name, "sequence of strings", item))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

fn mismatch(name: &str, expected: &str, actual: &ParamValue) -> ValidationError {
    ValidationError::TypeMismatch {
        param: name.to_string(),
        expected: expected.to_string(),
        actual: actual.kind().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_getters() {
        let mut params = ParamMap::new();
        params.insert("alias", ParamValue::String("foo".to_string()));
        params.insert("untracked", ParamValue::Bool(true));
        params.insert(
            "attributes",
            ParamValue::Sequence(vec![ParamValue::String("owner".to_string())]),
        );

        assert_eq!(params.string("alias").unwrap(), "foo");
        assert!(params.flag("untracked").unwrap());
        assert!(!params.flag("missing").unwrap());
        assert_eq!(
            params.string_list("attributes").unwrap(),
            Some(vec!["owner".to_string()])
        );
        assert_eq!(params.string_list("nothing").unwrap(), None);
    }

    #[test]
    fn test_getter_type_mismatch() {
        let mut params = ParamMap::new();
        params.insert("alias", ParamValue::Bool(true));
        let err = params.string("alias").unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));
        assert!(matches!(
            params.string("key").unwrap_err(),
            ValidationError::Missing { .. }
        ));
    }

    #[test]
    fn test_object_getter() {
        let mut params = ParamMap::new();
        params.insert("options", ParamValue::Structured(json!({"pool": "research"})));
        params.insert("value", ParamValue::Structured(json!([1, 2])));

        assert_eq!(params.object("options").unwrap()["pool"], "research");
        assert!(params.object("value").is_err());
    }
}
