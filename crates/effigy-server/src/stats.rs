//! Per-imposter rolling statistics: totals, method/status histograms, and
//! response-time percentiles over a fixed 1000-slot ring.

use crate::imposter::types::RequestLogEntry;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;

/// Response-time samples retained per imposter.
pub const RING_SIZE: usize = 1000;

struct MetricsSlot {
    total: u64,
    by_method: HashMap<String, u64>,
    by_status: HashMap<String, u64>,
    first_request_at: Option<DateTime<Utc>>,
    last_request_at: Option<DateTime<Utc>>,
    ring: Vec<f64>,
    cursor: usize,
    error_count: u64,
}

impl MetricsSlot {
    fn new() -> Self {
        Self {
            total: 0,
            by_method: HashMap::new(),
            by_status: HashMap::new(),
            first_request_at: None,
            last_request_at: None,
            ring: Vec::with_capacity(RING_SIZE),
            cursor: 0,
            error_count: 0,
        }
    }

    fn record(&mut self, entry: &RequestLogEntry) {
        self.total += 1;
        *self
            .by_method
            .entry(entry.request.method.clone())
            .or_insert(0) += 1;
        *self
            .by_status
            .entry(entry.response.status.to_string())
            .or_insert(0) += 1;

        if self.ring.len() < RING_SIZE {
            self.ring.push(entry.duration);
        } else {
            self.ring[self.cursor] = entry.duration;
        }
        self.cursor = (self.cursor + 1) % RING_SIZE;

        if entry.response.status >= 400 {
            self.error_count += 1;
        }
        if self.first_request_at.is_none() {
            self.first_request_at = Some(entry.timestamp);
        }
        self.last_request_at = Some(entry.timestamp);
    }
}

/// Computed statistics as exposed by the admin API.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImposterStats {
    pub total_requests: u64,
    pub requests_per_minute: f64,
    pub average_response_time: f64,
    pub error_rate: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub requests_by_method: HashMap<String, u64>,
    pub requests_by_status: HashMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_request_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_request_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct StatsAggregator {
    slots: RwLock<HashMap<String, MetricsSlot>>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, entry: &RequestLogEntry) {
        let mut slots = self.slots.write();
        slots
            .entry(entry.imposter_id.clone())
            .or_insert_with(MetricsSlot::new)
            .record(entry);
    }

    /// Compute stats for an imposter; zeroed when nothing was recorded.
    pub fn get_stats(&self, imposter_id: &str) -> ImposterStats {
        let slots = self.slots.read();
        let slot = match slots.get(imposter_id) {
            Some(slot) => slot,
            None => return ImposterStats::default(),
        };

        let elapsed_minutes = match (slot.first_request_at, slot.last_request_at) {
            (Some(first), Some(last)) => {
                (last - first).num_milliseconds() as f64 / 60_000.0
            }
            _ => 0.0,
        };
        let total = slot.total as f64;
        // A single request has elapsed 0 and reports the raw total.
        let rpm = if elapsed_minutes > 0.0 {
            total / elapsed_minutes
        } else {
            total
        };

        let average = if slot.ring.is_empty() {
            0.0
        } else {
            slot.ring.iter().sum::<f64>() / slot.ring.len() as f64
        };

        let error_rate = if slot.total > 0 {
            slot.error_count as f64 / total
        } else {
            0.0
        };

        let mut sorted = slot.ring.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        ImposterStats {
            total_requests: slot.total,
            requests_per_minute: round2(rpm),
            average_response_time: round2(average),
            error_rate: round4(error_rate),
            p50: percentile(&sorted, 50.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
            requests_by_method: slot.by_method.clone(),
            requests_by_status: slot.by_status.clone(),
            first_request_at: slot.first_request_at,
            last_request_at: slot.last_request_at,
        }
    }

    /// Drop the imposter's metrics slot.
    pub fn reset_stats(&self, imposter_id: &str) {
        self.slots.write().remove(imposter_id);
    }
}

/// Nearest-rank percentile over an already-sorted sample:
/// index `ceil(p/100 * n) - 1`.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len() as f64;
    let rank = (p / 100.0 * n).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
