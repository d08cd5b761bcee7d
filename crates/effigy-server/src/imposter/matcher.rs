//! Request matching: deterministic stub selection for a request context.
//!
//! Predicates within a stub are AND-combined; an empty predicate list is a
//! catch-all. Stubs are evaluated lazily in insertion order and the first
//! full match wins.

use super::types::{Predicate, PredicateField, PredicateOperator, RequestContext, Stub};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

/// Select the earliest stub whose predicates all pass.
pub fn find_matching_stub<'a>(stubs: &'a [Stub], ctx: &RequestContext) -> Option<&'a Stub> {
    stubs.iter().find(|stub| stub_matches(stub, ctx))
}

/// Evaluate all predicates of one stub against the request.
pub fn stub_matches(stub: &Stub, ctx: &RequestContext) -> bool {
    stub.predicates.iter().all(|p| predicate_matches(p, ctx))
}

/// Evaluate a single predicate. Never panics; malformed predicate values
/// (including invalid regexes) evaluate to false.
pub fn predicate_matches(predicate: &Predicate, ctx: &RequestContext) -> bool {
    match predicate.field {
        PredicateField::Method => match_scalar(predicate, &ctx.method),
        PredicateField::Path => match_scalar(predicate, &ctx.path),
        PredicateField::Headers => match_map(predicate, &ctx.headers),
        PredicateField::Query => match_map(predicate, &ctx.query),
        PredicateField::Body => match_body(predicate, ctx.body.as_ref()),
    }
}

/// String form of a predicate or body value: strings verbatim, everything
/// else JSON-encoded.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn match_scalar(predicate: &Predicate, actual: &str) -> bool {
    if predicate.operator == PredicateOperator::Exists {
        return true;
    }
    let expected = value_to_string(&predicate.value);
    apply_string_op(
        predicate.operator,
        &expected,
        actual,
        predicate.case_sensitive,
    )
}

/// Headers and query predicates: the expected value is an object whose
/// entries must all hold against the actual map (case-insensitive keys).
fn match_map(predicate: &Predicate, actual: &HashMap<String, String>) -> bool {
    let expected = match predicate.value.as_object() {
        Some(obj) => obj,
        // A non-object value with `exists` matches everything; with any
        // other operator it matches nothing.
        None => return predicate.operator == PredicateOperator::Exists,
    };

    if predicate.operator == PredicateOperator::Exists {
        return expected
            .keys()
            .all(|k| lookup_case_insensitive(actual, k).is_some());
    }

    expected.iter().all(|(key, value)| {
        let expected_str = match value.as_str() {
            Some(s) => s,
            None => return false,
        };
        match lookup_case_insensitive(actual, key) {
            Some(actual_value) => apply_string_op(
                predicate.operator,
                expected_str,
                actual_value,
                predicate.case_sensitive,
            ),
            None => false,
        }
    })
}

fn lookup_case_insensitive<'a>(map: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

fn match_body(predicate: &Predicate, body: Option<&Value>) -> bool {
    match predicate.operator {
        PredicateOperator::Exists => matches!(body, Some(v) if !v.is_null()),
        PredicateOperator::Equals => match body {
            Some(actual) => deep_subset(&predicate.value, actual, predicate.case_sensitive),
            None => false,
        },
        PredicateOperator::Contains | PredicateOperator::StartsWith | PredicateOperator::Matches => {
            let actual = match body {
                Some(v) => value_to_string(v),
                None => return false,
            };
            let expected = value_to_string(&predicate.value);
            apply_string_op(predicate.operator, &expected, &actual, predicate.case_sensitive)
        }
    }
}

/// Deep-subset match: every leaf of `expected` must be present and equal in
/// `actual`; arrays compare element-wise with `expected.len() <= actual.len()`.
pub fn deep_subset(expected: &Value, actual: &Value, case_sensitive: bool) -> bool {
    match (expected, actual) {
        (Value::Object(e), Value::Object(a)) => e.iter().all(|(k, ev)| {
            a.get(k)
                .map(|av| deep_subset(ev, av, case_sensitive))
                .unwrap_or(false)
        }),
        (Value::Array(e), Value::Array(a)) => {
            e.len() <= a.len()
                && e.iter()
                    .zip(a.iter())
                    .all(|(ev, av)| deep_subset(ev, av, case_sensitive))
        }
        (Value::String(e), Value::String(a)) => {
            if case_sensitive {
                e == a
            } else {
                e.eq_ignore_ascii_case(a)
            }
        }
        (e, a) => e == a,
    }
}

fn apply_string_op(
    operator: PredicateOperator,
    expected: &str,
    actual: &str,
    case_sensitive: bool,
) -> bool {
    match operator {
        PredicateOperator::Equals => {
            if case_sensitive {
                actual == expected
            } else {
                actual.eq_ignore_ascii_case(expected)
            }
        }
        PredicateOperator::Contains => {
            if case_sensitive {
                actual.contains(expected)
            } else {
                actual.to_lowercase().contains(&expected.to_lowercase())
            }
        }
        PredicateOperator::StartsWith => {
            if case_sensitive {
                actual.starts_with(expected)
            } else {
                actual.to_lowercase().starts_with(&expected.to_lowercase())
            }
        }
        // The stored value is compiled as-is; metacharacters are not
        // escaped, and case-insensitivity uses the `i` flag.
        PredicateOperator::Matches => {
            let pattern = if case_sensitive {
                expected.to_string()
            } else {
                format!("(?i){expected}")
            };
            match Regex::new(&pattern) {
                Ok(re) => re.is_match(actual),
                Err(_) => false,
            }
        }
        PredicateOperator::Exists => true,
    }
}
