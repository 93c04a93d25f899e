//! Answer comparators used by declarative modules.
//!
//! A comparator decides whether one submitted answer field matches the true
//! answer field. Strategy objects so a module can mix exact and toleranced
//! checks per field.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub trait AnswerComparator: Send + Sync {
    fn matches(&self, expected: &Value, submitted: &Value) -> bool;
}

/// Structural equality, with numbers compared by value and strings trimmed.
pub struct ExactComparator;

impl AnswerComparator for ExactComparator {
    fn matches(&self, expected: &Value, submitted: &Value) -> bool {
        match (expected, submitted) {
            (Value::String(e), Value::String(s)) => e.trim() == s.trim(),
            (Value::Number(_), _) => match (as_number(expected), as_number(submitted)) {
                (Some(e), Some(s)) => e == s,
                _ => false,
            },
            _ => expected == submitted,
        }
    }
}

/// Numeric comparison within relative and absolute tolerance:
/// `|s - e| <= atol + rtol * |e|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericComparator {
    pub rtol: f64,
    pub atol: f64,
}

impl Default for NumericComparator {
    fn default() -> Self {
        Self {
            rtol: 1e-2,
            atol: 1e-8,
        }
    }
}

impl AnswerComparator for NumericComparator {
    fn matches(&self, expected: &Value, submitted: &Value) -> bool {
        match (as_number(expected), as_number(submitted)) {
            (Some(e), Some(s)) => (s - e).abs() <= self.atol + self.rtol * e.abs(),
            _ => false,
        }
    }
}

/// Numbers, and strings holding numbers (raw form input), as f64.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}
