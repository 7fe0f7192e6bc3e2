//! Validation of tool arguments against their JSON schema.
//!
//! Schemas are compiled once with `jsonschema` (formats asserted, so `"format": "date"` is
//! enforced). The first violation is rendered as a short message naming the argument path,
//! e.g. `'articles[1].content' is required`.

use anyhow::{anyhow, Result};
use jsonschema::error::ValidationErrorKind;
use jsonschema::{ValidationError, Validator};
use serde_json::Value;

/// A compiled tool input schema.
pub struct ArgumentValidator {
    validator: Validator,
}

impl ArgumentValidator {
    /// Compiles `schema`; unknown types and malformed keywords are rejected here.
    pub fn compile(schema: &Value) -> Result<Self> {
        let validator = jsonschema::options()
            .should_validate_formats(true)
            .build(schema)
            .map_err(|e| anyhow!("Invalid input schema: {}", e))?;
        Ok(Self { validator })
    }

    /// Checks `args`, describing the first violation found.
    pub fn validate(&self, args: &Value) -> Result<(), String> {
        match self.validator.iter_errors(args).next() {
            None => Ok(()),
            Some(error) => Err(describe(&error)),
        }
    }
}

fn describe(error: &ValidationError<'_>) -> String {
    let path = argument_path(&error.instance_path.to_string());
    match &error.kind {
        ValidationErrorKind::Required { property } => {
            let property = property
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| property.to_string());
            format!("'{}' is required", join_path(&path, &property))
        }
        ValidationErrorKind::MinLength { limit } => {
            format!("'{}' must be at least {} characters", path, limit)
        }
        ValidationErrorKind::MaxLength { limit } => {
            format!("'{}' must be at most {} characters", path, limit)
        }
        ValidationErrorKind::Minimum { limit } => format!("'{}' must be >= {}", path, limit),
        ValidationErrorKind::Maximum { limit } => format!("'{}' must be <= {}", path, limit),
        ValidationErrorKind::MinItems { limit } => {
            format!("'{}' must contain at least {} item(s)", path, limit)
        }
        ValidationErrorKind::Format { format } if format == "date" => {
            format!("'{}' must be a date in YYYY-MM-DD format", path)
        }
        _ if path.is_empty() => error.to_string(),
        _ => format!("'{}' is invalid: {}", path, error),
    }
}

/// `/articles/1/title` becomes `articles[1].title`.
fn argument_path(pointer: &str) -> String {
    pointer
        .split('/')
        .skip(1)
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .fold(String::new(), |path, segment| {
            if segment.parse::<usize>().is_ok() {
                format!("{}[{}]", path, segment)
            } else {
                join_path(&path, &segment)
            }
        })
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}
