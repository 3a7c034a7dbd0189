// Request parameter parsing: binding, coercion, validation and transformation

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::ValidationError;
use crate::schema::{ParamType, ParameterSchema};
use crate::value::{json_kind, ParamMap, ParamValue};

/// Body of a command request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestParams {
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Values were typed by a human as plain strings; structured values
    /// are decoded from their JSON text before coercion.
    #[serde(default)]
    pub unparsed: bool,
}

impl RequestParams {
    pub fn new(params: Map<String, Value>) -> Self {
        Self {
            params,
            unparsed: false,
        }
    }

    /// Decodes a raw request body. An empty body is an empty parameter set.
    pub fn from_body(body: &[u8]) -> Result<Self, ValidationError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ValidationError::MalformedBody(e.to_string()))?;
        if !value.is_object() {
            return Err(ValidationError::MalformedBody(format!(
                "expected object, got {}",
                json_kind(&value)
            )));
        }
        serde_json::from_value(value).map_err(|e| ValidationError::MalformedBody(e.to_string()))
    }
}

/// Secondary place a parameter value may come from when the body omits it.
pub trait ValueSource: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;
}

/// No external values at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSource;

impl ValueSource for NoSource {
    fn lookup(&self, _key: &str) -> Option<String> {
        None
    }
}

/// Process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ValueSource for EnvSource {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed key/value table, handy for embedding callers and tests.
#[derive(Debug, Clone, Default)]
pub struct MapSource(pub HashMap<String, String>);

impl ValueSource for MapSource {
    fn lookup(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

/// Parses `request` against `schema`.
///
/// Parameters are processed in declaration order and the first failure
/// aborts the whole parse. A body value always beats the external source,
/// which is only consulted for parameters that declare an `env_var`.
pub fn parse(
    request: &RequestParams,
    schema: &[ParameterSchema],
    external: &dyn ValueSource,
) -> Result<ParamMap, ValidationError> {
    if let Some(unknown) = request
        .params
        .keys()
        .find(|key| !schema.iter().any(|param| param.answers_to(key)))
    {
        return Err(ValidationError::Unexpected {
            param: unknown.clone(),
        });
    }

    let mut parsed = ParamMap::new();
    for param in schema {
        let raw = resolve(request, param, external)?;

        if param.is_flag() {
            parsed.insert(param.name, ParamValue::Bool(raw.is_some()));
            continue;
        }

        let Some((raw, unparsed)) = raw else {
            if param.required {
                return Err(ValidationError::Missing {
                    param: param.name.to_string(),
                });
            }
            continue;
        };

        let value = match param.element {
            Some(element) => {
                let raw = if unparsed { decode_text(raw) } else { raw };
                let items = match raw {
                    Value::Array(items) => items,
                    other => {
                        return Err(ValidationError::TypeMismatch {
                            param: param.name.to_string(),
                            expected: format!("sequence of {}", element.param_type.as_str()),
                            actual: json_kind(&other).to_string(),
                        })
                    }
                };
                let mut values = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let element_error = |reason: String| ValidationError::Element {
                        param: param.name.to_string(),
                        index,
                        value: item.to_string(),
                        reason,
                    };
                    let value = coerce(item, element.param_type, unparsed).map_err(|actual| {
                        element_error(format!(
                            "expected {}, got {}",
                            element.param_type.as_str(),
                            actual
                        ))
                    })?;
                    if let Some(validator) = &param.validator {
                        validator.validate(&value).map_err(element_error)?;
                    }
                    values.push(value);
                }
                ParamValue::Sequence(values)
            }
            None => {
                let value = coerce(&raw, param.param_type, unparsed).map_err(|actual| {
                    ValidationError::TypeMismatch {
                        param: param.name.to_string(),
                        expected: param.param_type.as_str().to_string(),
                        actual: actual.to_string(),
                    }
                })?;
                if let Some(validator) = &param.validator {
                    validator
                        .validate(&value)
                        .map_err(|reason| ValidationError::Rejected {
                            param: param.name.to_string(),
                            reason,
                        })?;
                }
                value
            }
        };

        let value = match &param.transformer {
            Some(transformer) => transformer.apply(value),
            None => value,
        };
        parsed.insert(param.name, value);
    }

    Ok(parsed)
}

/// Renders parsed parameters back into a request body that parses to the
/// same map. A flag is written only when set: any present flag reads as
/// `true`.
pub fn render(params: &ParamMap, schema: &[ParameterSchema]) -> RequestParams {
    let mut body = Map::new();
    for param in schema {
        match params.get(param.name) {
            Some(ParamValue::Bool(false)) if param.is_flag() => {}
            Some(value) => {
                body.insert(param.name.to_string(), value.to_json());
            }
            None => {}
        }
    }
    RequestParams::new(body)
}

/// Finds the raw value for `param` and whether it still needs text decoding.
fn resolve(
    request: &RequestParams,
    param: &ParameterSchema,
    external: &dyn ValueSource,
) -> Result<Option<(Value, bool)>, ValidationError> {
    let mut found: Option<(&'static str, &Value)> = None;
    for spelling in param.spellings() {
        if let Some(value) = request.params.get(spelling) {
            if let Some((first, _)) = found {
                return Err(ValidationError::Duplicate {
                    param: param.name.to_string(),
                    first: first.to_string(),
                    second: spelling.to_string(),
                });
            }
            found = Some((spelling, value));
        }
    }

    if let Some((_, value)) = found {
        return Ok(Some((value.clone(), request.unparsed)));
    }

    Ok(param
        .env_var
        .and_then(|key| external.lookup(key))
        .map(|text| (Value::String(text), true)))
}

/// Text typed by a human: JSON when it parses as JSON, a plain string otherwise.
fn decode_text(raw: Value) -> Value {
    match raw {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}

/// Coerces one raw value; on failure returns the JSON kind that was seen.
fn coerce(raw: &Value, param_type: ParamType, unparsed: bool) -> Result<ParamValue, &'static str> {
    match param_type {
        ParamType::String => match raw {
            Value::String(s) => Ok(ParamValue::String(s.clone())),
            Value::Number(n) => Ok(ParamValue::String(n.to_string())),
            Value::Bool(b) => Ok(ParamValue::String(b.to_string())),
            other => Err(json_kind(other)),
        },
        ParamType::Boolean => match raw {
            Value::Bool(b) => Ok(ParamValue::Bool(*b)),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(ParamValue::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(ParamValue::Bool(false)),
            Value::Number(n) if n.as_u64() == Some(1) => Ok(ParamValue::Bool(true)),
            Value::Number(n) if n.as_u64() == Some(0) => Ok(ParamValue::Bool(false)),
            other => Err(json_kind(other)),
        },
        ParamType::Any => {
            let value = if unparsed {
                decode_text(raw.clone())
            } else {
                raw.clone()
            };
            Ok(ParamValue::Structured(value))
        }
    }
}
