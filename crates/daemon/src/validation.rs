// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative request validation.
//!
//! Each endpoint declares a rule table; `validate` walks it over the
//! JSON body, optionally injecting defaults and sanitizing boolean
//! strings in place. Failures collect into per-field errors for the
//! `InvalidParameters` envelope.

use corral_allocator::FieldError;
use serde_json::{Map, Value};

/// One check against a field's value.
#[derive(Debug, Clone)]
pub enum Check {
    IsString,
    IsNumber,
    IsBoolean,
    /// `"true"` / `"false"` as strings (agent vintage tolerance).
    IsBooleanString,
    IsArray,
    IsObject,
    /// Value must match this anchored pattern.
    Regex(&'static str),
    /// Missing field is fine.
    Optional,
    /// Missing field gets this default injected.
    Default(fn() -> Value),
    /// Coerce `"true"`/`"false"`/bool into a real bool in place.
    ToBoolean,
}

/// A field plus its checks.
#[derive(Debug, Clone)]
pub struct Rule {
    pub field: &'static str,
    pub checks: &'static [Check],
}

impl Rule {
    pub const fn new(field: &'static str, checks: &'static [Check]) -> Self {
        Self { field, checks }
    }
}

fn is_optional(checks: &[Check]) -> bool {
    checks.iter().any(|c| matches!(c, Check::Optional | Check::Default(_)))
}

/// Validate (and sanitize) `body` against a rule table.
///
/// With `strict`, keys outside the table are rejected.
pub fn validate(body: &mut Value, rules: &[Rule], strict: bool) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    let Some(obj) = body.as_object_mut() else {
        return Err(vec![FieldError::invalid("body", "request body must be a JSON object")]);
    };

    if strict {
        for key in obj.keys() {
            if !rules.iter().any(|r| r.field == key) {
                errors.push(FieldError::invalid(key.clone(), "unknown parameter"));
            }
        }
    }

    for rule in rules {
        apply_rule(obj, rule, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn apply_rule(obj: &mut Map<String, Value>, rule: &Rule, errors: &mut Vec<FieldError>) {
    if !obj.contains_key(rule.field) {
        for check in rule.checks {
            if let Check::Default(default) = check {
                obj.insert(rule.field.to_string(), default());
                return;
            }
        }
        if !is_optional(rule.checks) {
            errors.push(FieldError::invalid(rule.field, "missing required parameter"));
        }
        return;
    }

    for check in rule.checks {
        let value = &obj[rule.field];
        let failure = match check {
            Check::IsString if !value.is_string() => Some("must be a string"),
            Check::IsNumber if !value.is_number() => Some("must be a number"),
            Check::IsBoolean if !value.is_boolean() => Some("must be a boolean"),
            Check::IsBooleanString => match value.as_str() {
                Some("true") | Some("false") => None,
                _ => Some("must be the string \"true\" or \"false\""),
            },
            Check::IsArray if !value.is_array() => Some("must be an array"),
            Check::IsObject if !value.is_object() => Some("must be an object"),
            Check::Regex(pattern) => match value.as_str() {
                Some(s) => match regex::Regex::new(pattern) {
                    Ok(re) if re.is_match(s) => None,
                    Ok(_) => Some("does not match the expected format"),
                    Err(_) => Some("internal pattern error"),
                },
                None => Some("must be a string"),
            },
            Check::ToBoolean => {
                let coerced = match value {
                    Value::Bool(b) => Some(*b),
                    Value::String(s) if s == "true" => Some(true),
                    Value::String(s) if s == "false" => Some(false),
                    _ => None,
                };
                match coerced {
                    Some(b) => {
                        obj.insert(rule.field.to_string(), Value::Bool(b));
                        None
                    }
                    None => Some("cannot be interpreted as a boolean"),
                }
            }
            _ => None,
        };

        if let Some(message) = failure {
            errors.push(FieldError::invalid(rule.field, message));
            return;
        }
    }
}

/// Anchored v4-ish UUID pattern (the sentinel `default` is allowed
/// where routes opt into it explicitly).
pub const UUID_RE: &str = "^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$";

#[cfg(test)]
#[path = "validation_tests.rs"]
mod tests;
