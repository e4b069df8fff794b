/// Property-value checks shared by the batch executor and edge properties
///
/// Graph property stores accept primitives (bool, integer, float, string) and
/// homogeneous arrays of one primitive type. Maps, nested arrays, and arrays
/// containing nulls or mixed types are rejected rather than coerced.
use serde_json::Value;

use crate::cypher_generator::statement::{CypherStatement, Params};

use super::errors::BatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrimitiveType {
    Bool,
    Integer,
    Float,
    String,
}

fn primitive_type(value: &Value) -> Option<PrimitiveType> {
    match value {
        Value::Bool(_) => Some(PrimitiveType::Bool),
        Value::Number(n) if n.is_f64() => Some(PrimitiveType::Float),
        Value::Number(_) => Some(PrimitiveType::Integer),
        Value::String(_) => Some(PrimitiveType::String),
        _ => None,
    }
}

/// Why `value` cannot be stored as a property, if it cannot
pub fn property_value_problem(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Object(_) => Some("maps are not property values".to_string()),
        Value::Array(items) => {
            let mut element_type = None;
            for item in items {
                match item {
                    Value::Null => return Some("arrays cannot contain null".to_string()),
                    Value::Array(_) => return Some("nested arrays are not property values".to_string()),
                    Value::Object(_) => return Some("arrays of maps are not property values".to_string()),
                    _ => {}
                }
                let current = primitive_type(item);
                match element_type {
                    None => element_type = current,
                    Some(expected) if Some(expected) != current => {
                        return Some("arrays must hold a single primitive type".to_string())
                    }
                    Some(_) => {}
                }
            }
            None
        }
        _ => None,
    }
}

/// Null, a primitive, or a homogeneous array of primitives
pub fn is_property_value(value: &Value) -> bool {
    property_value_problem(value).is_none()
}

fn check_params(index: usize, params: &Params) -> Result<(), BatchError> {
    for (name, value) in params {
        if let Some(reason) = property_value_problem(value) {
            return Err(BatchError::unbindable_with_context(index, name, reason));
        }
    }
    Ok(())
}

/// Check every statement; the first offending parameter fails the whole batch
pub fn validate_statements(statements: &[CypherStatement]) -> Result<(), BatchError> {
    statements
        .iter()
        .enumerate()
        .try_for_each(|(index, statement)| check_params(index, &statement.params))
}
