//! Response cycling state and response materialisation.
//!
//! Each `(imposter, stub)` pair owns a monotone counter driving the stub's
//! response mode; the generator renders headers and body through the
//! template engine and applies content-type defaults.

use super::types::{RequestContext, ResponseConfig, ResponseMode};
use crate::template::TemplateEngine;
use parking_lot::Mutex;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;

/// Per-stub response cursor store.
#[derive(Default)]
pub struct ResponseState {
    counters: Mutex<HashMap<(String, String), u64>>,
}

impl ResponseState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the next response index for a stub with `count` responses.
    /// `sequential` and `repeat` advance the counter; `random` does not.
    pub fn next_index(
        &self,
        imposter_id: &str,
        stub_id: &str,
        count: usize,
        mode: ResponseMode,
    ) -> usize {
        if count == 0 {
            return 0;
        }
        match mode {
            ResponseMode::Random => rand::thread_rng().gen_range(0..count),
            ResponseMode::Sequential => {
                let mut counters = self.counters.lock();
                let counter = counters
                    .entry((imposter_id.to_string(), stub_id.to_string()))
                    .or_insert(0);
                let index = (*counter as usize) % count;
                *counter += 1;
                index
            }
            ResponseMode::Repeat => {
                let mut counters = self.counters.lock();
                let counter = counters
                    .entry((imposter_id.to_string(), stub_id.to_string()))
                    .or_insert(0);
                let index = (*counter as usize).min(count - 1);
                *counter += 1;
                index
            }
        }
    }

    /// Discard every counter belonging to the imposter.
    pub fn reset(&self, imposter_id: &str) {
        self.counters
            .lock()
            .retain(|(owner, _), _| owner != imposter_id);
    }
}

/// A fully materialised response, ready for the runtime to ship.
#[derive(Debug, Clone)]
pub struct BuiltResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    /// Delay the runtime suspends for before returning, in milliseconds.
    pub delay: u64,
}

/// Render a configured response against the request. Configured headers are
/// templated and never overridden by the content-type defaults.
pub fn build_response(
    config: &ResponseConfig,
    ctx: &RequestContext,
    engine: &TemplateEngine,
) -> BuiltResponse {
    let mut headers: HashMap<String, String> = config
        .headers
        .iter()
        .flatten()
        .map(|(k, v)| (k.clone(), engine.render_text(v, ctx)))
        .collect();

    let body = match &config.body {
        Some(value) => {
            let rendered = engine.render_value(value, ctx);
            match rendered {
                Value::String(s) => {
                    default_content_type(&mut headers, "text/plain");
                    s
                }
                other => {
                    default_content_type(&mut headers, "application/json");
                    other.to_string()
                }
            }
        }
        None => String::new(),
    };

    BuiltResponse {
        status: config.status,
        headers,
        body,
        delay: config.delay.unwrap_or(0),
    }
}

fn default_content_type(headers: &mut HashMap<String, String>, value: &str) {
    let present = headers.keys().any(|k| k.eq_ignore_ascii_case("content-type"));
    if !present {
        headers.insert("Content-Type".to_string(), value.to_string());
    }
}
