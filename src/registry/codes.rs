use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Datelike, Utc};
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct TrackingCodeGenerator {
    sequences: DashMap<(i32, u32), AtomicU64>,
}

impl TrackingCodeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(&self, at: DateTime<Utc>) -> String {
        let key = (at.year(), at.month());
        let entry = self.sequences.entry(key).or_default();
        let sequence = entry.fetch_add(1, Ordering::Relaxed) + 1;

        format!("DEL-{:04}-{:02}-{:05}", key.0, key.1, sequence)
    }
}
