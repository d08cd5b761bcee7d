//! Response templating: `{{dotted.key}}` substitution and `${expr}`
//! evaluation over a flattened request context.
//!
//! # Supported forms
//!
//! - `{{request.path}}`, `{{request.query.name}}`, `{{request.headers.x-id}}`,
//!   `{{request.body.user.name}}` - literal textual replacement; unknown keys
//!   are left verbatim.
//! - `${request.body.user.name}` - expression evaluation. When the whole
//!   string is a single `${...}`, the raw typed result is returned; otherwise
//!   results are string-joined, JSON-encoding non-string values. A failed
//!   evaluation leaves the `${...}` text in place.
//!
//! Both forms recurse through objects and arrays; primitives other than
//! strings pass through untouched. Total rendered output is capped at 1 MiB.

use crate::imposter::types::RequestContext;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Cap on rendered template output.
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX.get_or_init(|| Regex::new(r"\{\{([^{}]+)\}\}").unwrap())
}

/// Pluggable `${expr}` evaluator. The built-in [`PathEvaluator`] resolves
/// dotted paths; a richer expression engine can be swapped in at the
/// composition root.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expr: &str, context: &Value) -> Result<Value, String>;
}

/// Default evaluator: dotted-path lookup over the `{request}` context,
/// with numeric segments indexing into arrays.
pub struct PathEvaluator;

impl ExpressionEvaluator for PathEvaluator {
    fn evaluate(&self, expr: &str, context: &Value) -> Result<Value, String> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err("empty expression".to_string());
        }
        let mut current = context;
        for segment in expr.split('.') {
            current = match current {
                Value::Object(map) => map
                    .get(segment)
                    .ok_or_else(|| format!("unknown key: {segment}"))?,
                Value::Array(items) => {
                    let index: usize = segment
                        .parse()
                        .map_err(|_| format!("not an array index: {segment}"))?;
                    items
                        .get(index)
                        .ok_or_else(|| format!("index out of bounds: {index}"))?
                }
                _ => return Err(format!("cannot descend into scalar at {segment}")),
            };
        }
        Ok(current.clone())
    }
}

pub struct TemplateEngine {
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    pub fn new() -> Self {
        Self {
            evaluator: Arc::new(PathEvaluator),
        }
    }

    pub fn with_evaluator(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self { evaluator }
    }

    /// Render a JSON value, substituting templates in every string leaf.
    pub fn render_value(&self, value: &Value, ctx: &RequestContext) -> Value {
        match value {
            Value::String(s) => self.render_string(s, ctx),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.render_value(v, ctx)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.render_value(v, ctx)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Render one string. The result is a `Value` because a whole-string
    /// `${...}` preserves the type of its evaluation result.
    pub fn render_string(&self, template: &str, ctx: &RequestContext) -> Value {
        let flat = flatten_context(ctx);
        let substituted = placeholder_regex()
            .replace_all(template, |caps: &regex::Captures| {
                let key = caps[1].trim();
                match flat.get(key) {
                    Some(v) => v.clone(),
                    None => caps[0].to_string(),
                }
            })
            .to_string();

        self.eval_expressions(&substituted, ctx)
    }

    /// Render a string for a header value or similar plain-text slot.
    pub fn render_text(&self, template: &str, ctx: &RequestContext) -> String {
        value_display(&self.render_string(template, ctx))
    }

    fn eval_expressions(&self, input: &str, ctx: &RequestContext) -> Value {
        if !input.contains("${") {
            return Value::String(cap_output(input.to_string()));
        }
        let context = context_value(ctx);
        let spans = find_expressions(input);

        // Whole-string expression: preserve the evaluation result's type.
        if let [(start, end)] = spans.as_slice() {
            if *start == 0 && *end == input.len() {
                let expr = &input[start + 2..end - 1];
                return match self.evaluator.evaluate(expr, &context) {
                    Ok(Value::String(s)) => Value::String(cap_output(s)),
                    Ok(v) => v,
                    Err(_) => Value::String(input.to_string()),
                };
            }
        }

        let mut out = String::new();
        let mut cursor = 0;
        for (start, end) in spans {
            out.push_str(&input[cursor..start]);
            let expr = &input[start + 2..end - 1];
            match self.evaluator.evaluate(expr, &context) {
                Ok(Value::String(s)) => out.push_str(&s),
                Ok(v) => out.push_str(&v.to_string()),
                Err(_) => out.push_str(&input[start..end]),
            }
            cursor = end;
        }
        out.push_str(&input[cursor..]);
        Value::String(cap_output(out))
    }
}

/// Locate `${...}` spans using brace-depth counting. Returns byte ranges
/// covering `${` through the matching `}` inclusive; an unterminated
/// expression is left as literal text.
fn find_expressions(input: &str) -> Vec<(usize, usize)> {
    let bytes = input.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'$' && bytes[i + 1] == b'{' {
            let start = i;
            let mut depth = 1;
            let mut j = i + 2;
            while j < bytes.len() && depth > 0 {
                match bytes[j] {
                    b'{' => depth += 1,
                    b'}' => depth -= 1,
                    _ => {}
                }
                j += 1;
            }
            if depth == 0 {
                spans.push((start, j));
                i = j;
                continue;
            }
            break;
        }
        i += 1;
    }
    spans
}

/// Flatten the request into dotted keys for `{{...}}` substitution: header
/// keys lowercased, nested body values exposed as dotted paths, arrays both
/// JSON-stringified at the array key and indexed by ordinal.
pub fn flatten_context(ctx: &RequestContext) -> HashMap<String, String> {
    let mut flat = HashMap::new();
    flat.insert("request.method".to_string(), ctx.method.clone());
    flat.insert("request.path".to_string(), ctx.path.clone());
    for (k, v) in &ctx.headers {
        flat.insert(format!("request.headers.{}", k.to_lowercase()), v.clone());
    }
    for (k, v) in &ctx.query {
        flat.insert(format!("request.query.{k}"), v.clone());
    }
    if let Some(body) = &ctx.body {
        flatten_value("request.body", body, &mut flat);
    }
    flat
}

fn flatten_value(prefix: &str, value: &Value, out: &mut HashMap<String, String>) {
    match value {
        Value::Object(map) => {
            out.insert(prefix.to_string(), value.to_string());
            for (k, v) in map {
                flatten_value(&format!("{prefix}.{k}"), v, out);
            }
        }
        Value::Array(items) => {
            out.insert(prefix.to_string(), value.to_string());
            for (i, v) in items.iter().enumerate() {
                flatten_value(&format!("{prefix}.{i}"), v, out);
            }
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

/// Build the `{request}` object expression evaluation runs against.
pub fn context_value(ctx: &RequestContext) -> Value {
    let headers: serde_json::Map<String, Value> = ctx
        .headers
        .iter()
        .map(|(k, v)| (k.to_lowercase(), Value::String(v.clone())))
        .collect();
    let query: serde_json::Map<String, Value> = ctx
        .query
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    serde_json::json!({
        "request": {
            "method": ctx.method,
            "path": ctx.path,
            "headers": headers,
            "query": query,
            "body": ctx.body.clone().unwrap_or(Value::Null),
        }
    })
}

/// String form of a rendered value: strings verbatim, everything else JSON.
pub fn value_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn cap_output(mut s: String) -> String {
    if s.len() > MAX_OUTPUT_BYTES {
        let mut cut = MAX_OUTPUT_BYTES;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> RequestContext {
        let mut headers = HashMap::new();
        headers.insert("x-request-id".to_string(), "req-7".to_string());
        let mut query = HashMap::new();
        query.insert("name".to_string(), "World".to_string());
        RequestContext {
            method: "GET".to_string(),
            path: "/api".to_string(),
            search: "?name=World".to_string(),
            headers,
            query,
            body: Some(json!({"user": {"name": "ada"}, "tags": ["x", "y"]})),
            body_bytes: bytes::Bytes::new(),
        }
    }

    #[test]
    fn test_placeholder_substitution() {
        let engine = TemplateEngine::new();
        let out = engine.render_string("Hello {{request.query.name}} at {{request.path}}", &ctx());
        assert_eq!(out, Value::String("Hello World at /api".to_string()));
    }

    #[test]
    fn test_unknown_placeholder_left_verbatim() {
        let engine = TemplateEngine::new();
        let out = engine.render_string("{{request.query.missing}}", &ctx());
        assert_eq!(out, Value::String("{{request.query.missing}}".to_string()));
    }

    #[test]
    fn test_placeholder_nested_body() {
        let engine = TemplateEngine::new();
        let out = engine.render_string("{{request.body.user.name}}", &ctx());
        assert_eq!(out, Value::String("ada".to_string()));
    }

    #[test]
    fn test_array_flattening_json_and_ordinal() {
        let flat = flatten_context(&ctx());
        assert_eq!(flat.get("request.body.tags").unwrap(), r#"["x","y"]"#);
        assert_eq!(flat.get("request.body.tags.0").unwrap(), "x");
        assert_eq!(flat.get("request.body.tags.1").unwrap(), "y");
    }

    #[test]
    fn test_whole_string_expression_preserves_type() {
        let engine = TemplateEngine::new();
        let out = engine.render_string("${request.body.user}", &ctx());
        assert_eq!(out, json!({"name": "ada"}));
    }

    #[test]
    fn test_embedded_expression_joins_as_string() {
        let engine = TemplateEngine::new();
        let out = engine.render_string("user=${request.body.user}", &ctx());
        assert_eq!(out, Value::String(r#"user={"name":"ada"}"#.to_string()));
    }

    #[test]
    fn test_expression_failure_left_in_place() {
        let engine = TemplateEngine::new();
        let out = engine.render_string("x=${request.nope.nothing}", &ctx());
        assert_eq!(out, Value::String("x=${request.nope.nothing}".to_string()));

        // Whole-string failure returns the original string
        let out = engine.render_string("${request.nope}", &ctx());
        assert_eq!(out, Value::String("${request.nope}".to_string()));
    }

    #[test]
    fn test_brace_depth_counting() {
        let spans = find_expressions("a ${x{y}z} b");
        assert_eq!(spans, vec![(2, 10)]);

        // Unterminated expression produces no span
        assert!(find_expressions("a ${open").is_empty());
    }

    #[test]
    fn test_array_index_expression() {
        let engine = TemplateEngine::new();
        let out = engine.render_string("${request.body.tags.1}", &ctx());
        assert_eq!(out, Value::String("y".to_string()));
    }

    #[test]
    fn test_render_value_recurses() {
        let engine = TemplateEngine::new();
        let body = json!({
            "greeting": "Hello {{request.query.name}}",
            "nested": {"path": "{{request.path}}"},
            "list": ["{{request.method}}", 7],
            "number": 42
        });
        let out = engine.render_value(&body, &ctx());
        assert_eq!(
            out,
            json!({
                "greeting": "Hello World",
                "nested": {"path": "/api"},
                "list": ["GET", 7],
                "number": 42
            })
        );
    }

    #[test]
    fn test_header_lookup_lowercased() {
        let engine = TemplateEngine::new();
        let out = engine.render_string("{{request.headers.x-request-id}}", &ctx());
        assert_eq!(out, Value::String("req-7".to_string()));
    }

    #[test]
    fn test_output_cap() {
        let engine = TemplateEngine::new();
        let big = "a".repeat(MAX_OUTPUT_BYTES + 100);
        let mut c = ctx();
        c.query.insert("big".to_string(), big);
        let out = engine.render_string("{{request.query.big}}!", &c);
        match out {
            Value::String(s) => assert_eq!(s.len(), MAX_OUTPUT_BYTES),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn test_non_string_primitives_pass_through() {
        let engine = TemplateEngine::new();
        assert_eq!(engine.render_value(&json!(true), &ctx()), json!(true));
        assert_eq!(engine.render_value(&json!(3.5), &ctx()), json!(3.5));
        assert_eq!(engine.render_value(&json!(null), &ctx()), json!(null));
    }
}
