// =============================================================================
// Parameter schema + typed parameter values
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ValidationCode, ValidationIssue};

/// The declared type of a strategy parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    Int,
    Float,
    Bool,
    String,
    List,
}

/// A typed parameter value, as stored/resolved by the config manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    List(Vec<ParameterValue>),
}

impl ParameterValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Int(v) => Some(*v as f64),
            ParameterValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            ParameterValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn type_of(&self) -> ParameterType {
        match self {
            ParameterValue::Int(_) => ParameterType::Int,
            ParameterValue::Float(_) => ParameterType::Float,
            ParameterValue::Bool(_) => ParameterType::Bool,
            ParameterValue::String(_) => ParameterType::String,
            ParameterValue::List(_) => ParameterType::List,
        }
    }

    /// A declared type accepts both `Int` and `Float` values interchangeably
    /// since numeric env/JSON sources don't reliably distinguish them.
    fn matches_declared(&self, declared: ParameterType) -> bool {
        match declared {
            ParameterType::Float => matches!(self, ParameterValue::Int(_) | ParameterValue::Float(_)),
            ParameterType::Int => matches!(self, ParameterValue::Int(_) | ParameterValue::Float(_)),
            other => self.type_of() == other,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ParameterValue::Int(v) => Value::from(*v),
            ParameterValue::Float(v) => Value::from(*v),
            ParameterValue::Bool(v) => Value::from(*v),
            ParameterValue::String(v) => Value::from(v.clone()),
            ParameterValue::List(v) => Value::Array(v.iter().map(ParameterValue::to_json).collect()),
        }
    }
}

/// The declared shape and constraints of a single strategy parameter.
#[derive(Debug, Clone)]
pub struct ParameterSchema {
    pub name: &'static str,
    pub param_type: ParameterType,
    pub description: &'static str,
    pub default: ParameterValue,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub allowed_values: Option<Vec<ParameterValue>>,
    pub example: Option<ParameterValue>,
}

impl ParameterSchema {
    /// Validate a single proposed value against this schema entry. Returns
    /// `None` if valid, `Some(issue)` otherwise.
    pub fn validate(&self, value: &ParameterValue) -> Option<ValidationIssue> {
        if !value.matches_declared(self.param_type) {
            return Some(ValidationIssue::new(
                ValidationCode::InvalidType,
                self.name,
                format!(
                    "parameter '{}' expected type {:?}, got {:?}",
                    self.name,
                    self.param_type,
                    value.type_of()
                ),
            ));
        }

        if let (Some(min), Some(n)) = (self.min, value.as_f64()) {
            if n < min {
                return Some(ValidationIssue::new(
                    ValidationCode::OutOfRange,
                    self.name,
                    format!("parameter '{}' value {} below minimum {}", self.name, n, min),
                ));
            }
        }
        if let (Some(max), Some(n)) = (self.max, value.as_f64()) {
            if n > max {
                return Some(ValidationIssue::new(
                    ValidationCode::OutOfRange,
                    self.name,
                    format!("parameter '{}' value {} above maximum {}", self.name, n, max),
                ));
            }
        }

        if let Some(allowed) = &self.allowed_values {
            if !allowed.contains(value) {
                return Some(ValidationIssue::new(
                    ValidationCode::ValidationError,
                    self.name,
                    format!("parameter '{}' value not in allowed set", self.name),
                ));
            }
        }

        None
    }
}

/// Validate a full proposed parameter map against a strategy's schema.
///
/// This is the single `validate_parameters` function reused by every call
/// site (config manager writes, the `validate_only` path, and any admin
/// collaborator) — see the Open Question resolution in SPEC_FULL.md §11.
pub fn validate_parameters(
    schema: &[ParameterSchema],
    proposed: &HashMap<String, ParameterValue>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let by_name: HashMap<&str, &ParameterSchema> = schema.iter().map(|s| (s.name, s)).collect();

    for (name, value) in proposed {
        match by_name.get(name.as_str()) {
            Some(schema_entry) => {
                if let Some(issue) = schema_entry.validate(value) {
                    issues.push(issue);
                }
            }
            None => {
                issues.push(ValidationIssue::new(
                    ValidationCode::UnknownParameter,
                    name.clone(),
                    format!("'{name}' is not a recognised parameter for this strategy"),
                ));
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> Vec<ParameterSchema> {
        vec![ParameterSchema {
            name: "buy_threshold",
            param_type: ParameterType::Float,
            description: "buy imbalance threshold",
            default: ParameterValue::Float(1.2),
            min: Some(1.0),
            max: Some(5.0),
            allowed_values: None,
            example: None,
        }]
    }

    #[test]
    fn unknown_parameter_rejected() {
        let schema = sample_schema();
        let mut proposed = HashMap::new();
        proposed.insert("not_a_param".to_string(), ParameterValue::Float(1.0));
        let issues = validate_parameters(&schema, &proposed);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, ValidationCode::UnknownParameter);
    }

    #[test]
    fn out_of_range_rejected() {
        let schema = sample_schema();
        let mut proposed = HashMap::new();
        proposed.insert("buy_threshold".to_string(), ParameterValue::Float(10.0));
        let issues = validate_parameters(&schema, &proposed);
        assert_eq!(issues[0].code, ValidationCode::OutOfRange);
    }

    #[test]
    fn wrong_type_rejected() {
        let schema = sample_schema();
        let mut proposed = HashMap::new();
        proposed.insert("buy_threshold".to_string(), ParameterValue::String("nope".to_string()));
        let issues = validate_parameters(&schema, &proposed);
        assert_eq!(issues[0].code, ValidationCode::InvalidType);
    }

    #[test]
    fn valid_value_passes() {
        let schema = sample_schema();
        let mut proposed = HashMap::new();
        proposed.insert("buy_threshold".to_string(), ParameterValue::Float(1.5));
        assert!(validate_parameters(&schema, &proposed).is_empty());
    }

    #[test]
    fn int_value_satisfies_float_schema() {
        let schema = sample_schema();
        let mut proposed = HashMap::new();
        proposed.insert("buy_threshold".to_string(), ParameterValue::Int(2));
        assert!(validate_parameters(&schema, &proposed).is_empty());
    }
}
