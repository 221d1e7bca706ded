//! Parameter validation against a declared schema.

use protocol::{ParamType, ParameterSchema};
use serde_json::{Map, Value};
use thiserror::Error;

use super::{Params, ToolError};

/// The first parameter that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid parameter `{field}`: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<ValidationError> for ToolError {
    fn from(e: ValidationError) -> Self {
        ToolError::InvalidParameters {
            field: e.field,
            reason: e.reason,
        }
    }
}

/// Field name reported when the payload itself is not an object.
pub const PAYLOAD_FIELD: &str = "parameters";

/// Validate `raw` against `schema`, fail-fast on the first bad field.
///
/// Fields are checked in schema order (sorted by name). Keys the schema does
/// not declare are ignored and do not reach the handler. A `null` value is
/// treated as absent; a `null` payload as an empty one.
pub fn validate(schema: &ParameterSchema, raw: &Value) -> Result<Params, ValidationError> {
    let empty = Map::new();
    let values = match raw {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            return Err(ValidationError::new(
                PAYLOAD_FIELD,
                format!("expected object, got {}", type_name(other)),
            ));
        }
    };

    let mut validated = Map::new();
    for (name, spec) in schema.iter() {
        match values.get(name) {
            None | Some(Value::Null) => {
                if spec.required {
                    return Err(ValidationError::new(name, "missing required parameter"));
                }
            }
            Some(value) => {
                let coerced =
                    coerce(value, spec.kind).map_err(|reason| ValidationError::new(name, reason))?;
                validated.insert(name.to_string(), coerced);
            }
        }
    }

    Ok(Params::new(validated))
}

fn coerce(value: &Value, kind: ParamType) -> Result<Value, String> {
    let ok = match kind {
        ParamType::String => value.is_string(),
        ParamType::Number => value.is_number(),
        ParamType::Boolean => value.is_boolean(),
        ParamType::Object => value.is_object(),
        ParamType::Array => value.is_array(),
        ParamType::Integer => return coerce_integer(value),
    };
    if ok {
        Ok(value.clone())
    } else {
        Err(format!("expected {kind}, got {}", type_name(value)))
    }
}

// Integral floats (e.g. `3.0`) are accepted and normalized to integers.
fn coerce_integer(value: &Value) -> Result<Value, String> {
    let Value::Number(n) = value else {
        return Err(format!("expected integer, got {}", type_name(value)));
    };
    if n.is_i64() || n.is_u64() {
        return Ok(value.clone());
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Ok(Value::from(f as i64))
        }
        _ => Err(format!("expected integer, got non-integral number {n}")),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
