//! Per-imposter request log: bounded ring with filtering and broadcast
//! fan-out for live subscribers.

use crate::imposter::types::RequestLogEntry;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use tokio::sync::broadcast;

/// Entries retained per imposter.
pub const MAX_ENTRIES: usize = 100;
/// Buffered entries per lagging subscriber.
pub const BROADCAST_CAPACITY: usize = 256;
/// Entries returned when no limit is given.
pub const DEFAULT_LIMIT: usize = 50;

/// Optional filters for log queries.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub limit: Option<usize>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub status: Option<u16>,
}

pub struct RequestLogger {
    logs: RwLock<HashMap<String, VecDeque<RequestLogEntry>>>,
    tx: broadcast::Sender<RequestLogEntry>,
}

impl Default for RequestLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLogger {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            logs: RwLock::new(HashMap::new()),
            tx,
        }
    }

    /// Append an entry, trim the ring, and publish to subscribers.
    pub fn log(&self, entry: RequestLogEntry) {
        {
            let mut logs = self.logs.write();
            let ring = logs.entry(entry.imposter_id.clone()).or_default();
            ring.push_back(entry.clone());
            while ring.len() > MAX_ENTRIES {
                ring.pop_front();
            }
        }
        // No subscribers is not an error.
        let _ = self.tx.send(entry);
    }

    /// Filtered view: the last `limit` entries (default 50) after filtering.
    pub fn get_entries(&self, imposter_id: &str, filter: &LogFilter) -> Vec<RequestLogEntry> {
        let logs = self.logs.read();
        let ring = match logs.get(imposter_id) {
            Some(ring) => ring,
            None => return Vec::new(),
        };

        let filtered: Vec<&RequestLogEntry> = ring
            .iter()
            .filter(|e| {
                filter
                    .method
                    .as_ref()
                    .map(|m| e.request.method.eq_ignore_ascii_case(m))
                    .unwrap_or(true)
                    && filter
                        .path
                        .as_ref()
                        .map(|p| &e.request.path == p)
                        .unwrap_or(true)
                    && filter
                        .status
                        .map(|s| e.response.status == s)
                        .unwrap_or(true)
            })
            .collect();

        let limit = filter.limit.unwrap_or(DEFAULT_LIMIT);
        let skip = filtered.len().saturating_sub(limit);
        filtered.into_iter().skip(skip).cloned().collect()
    }

    pub fn get_count(&self, imposter_id: &str) -> usize {
        self.logs
            .read()
            .get(imposter_id)
            .map(|ring| ring.len())
            .unwrap_or(0)
    }

    /// Empty the imposter's ring but keep the slot.
    pub fn clear(&self, imposter_id: &str) {
        if let Some(ring) = self.logs.write().get_mut(imposter_id) {
            ring.clear();
        }
    }

    pub fn get_entry_by_id(&self, imposter_id: &str, entry_id: &str) -> Option<RequestLogEntry> {
        self.logs
            .read()
            .get(imposter_id)
            .and_then(|ring| ring.iter().find(|e| e.id == entry_id).cloned())
    }

    /// Discard the imposter's slot entirely.
    pub fn remove_imposter(&self, imposter_id: &str) {
        self.logs.write().remove(imposter_id);
    }

    /// Attach a fresh broadcast consumer.
    pub fn subscribe(&self) -> broadcast::Receiver<RequestLogEntry> {
        self.tx.subscribe()
    }
}
