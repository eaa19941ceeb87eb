// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured find filters over stored documents.
//!
//! Filters compare top-level document attributes. Numbers compare
//! numerically; strings compare lexicographically, which is what
//! ISO-8601 timestamps and platform stamps want.

use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// An AND/OR/NOT tree of attribute comparisons.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Eq(String, Value),
    Ne(String, Value),
    Ge(String, Value),
    Le(String, Value),
    Present(String),
    /// Matches every document.
    True,
}

impl Filter {
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(filters.into_iter().collect())
    }

    pub fn not(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    pub fn eq(attr: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(attr.into(), value.into())
    }

    pub fn ne(attr: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ne(attr.into(), value.into())
    }

    pub fn ge(attr: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ge(attr.into(), value.into())
    }

    pub fn le(attr: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Le(attr.into(), value.into())
    }

    pub fn present(attr: impl Into<String>) -> Self {
        Filter::Present(attr.into())
    }

    /// Evaluate against a document's top-level attributes.
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::And(fs) => fs.iter().all(|f| f.matches(doc)),
            Filter::Or(fs) => fs.iter().any(|f| f.matches(doc)),
            Filter::Not(f) => !f.matches(doc),
            Filter::Eq(attr, want) => doc.get(attr).map(|v| loose_eq(v, want)).unwrap_or(false),
            Filter::Ne(attr, want) => doc.get(attr).map(|v| !loose_eq(v, want)).unwrap_or(true),
            Filter::Ge(attr, want) => cmp_attr(doc, attr, want)
                .map(|o| o != Ordering::Less)
                .unwrap_or(false),
            Filter::Le(attr, want) => cmp_attr(doc, attr, want)
                .map(|o| o != Ordering::Greater)
                .unwrap_or(false),
            Filter::Present(attr) => doc.get(attr).map(|v| !v.is_null()).unwrap_or(false),
            Filter::True => true,
        }
    }
}

/// Equality with numeric coercion: 5 == 5.0.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn cmp_attr(doc: &Value, attr: &str, want: &Value) -> Option<Ordering> {
    let have = doc.get(attr)?;
    match (have.as_f64(), want.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => match (have.as_str(), want.as_str()) {
            (Some(x), Some(y)) => Some(x.cmp(y)),
            _ => None,
        },
    }
}

// LDAP-ish rendering for logs.
impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn scalar(v: &Value) -> String {
            match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }
        }
        match self {
            Filter::And(fs) => {
                write!(f, "(&")?;
                for sub in fs {
                    write!(f, "{sub}")?;
                }
                write!(f, ")")
            }
            Filter::Or(fs) => {
                write!(f, "(|")?;
                for sub in fs {
                    write!(f, "{sub}")?;
                }
                write!(f, ")")
            }
            Filter::Not(sub) => write!(f, "(!{sub})"),
            Filter::Eq(a, v) => write!(f, "({a}={})", scalar(v)),
            Filter::Ne(a, v) => write!(f, "(!({a}={}))", scalar(v)),
            Filter::Ge(a, v) => write!(f, "({a}>={})", scalar(v)),
            Filter::Le(a, v) => write!(f, "({a}<={})", scalar(v)),
            Filter::Present(a) => write!(f, "({a}=*)"),
            Filter::True => write!(f, "(objectclass=*)"),
        }
    }
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;
