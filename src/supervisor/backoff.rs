//! Per-UID exponential backoff shared by the Stream Supervisor and
//! Registration Sync (§4.6, §8 property 6): `min(cap, base * 2^n)`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

const BASE: Duration = Duration::from_secs(1);
const CAP: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Entry {
    attempts: u32,
    retry_at: Instant,
}

#[derive(Default)]
pub struct BackoffTracker {
    entries: HashMap<String, Entry>,
}

impl BackoffTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `uid` is allowed to be retried at `now`. Absent UIDs are
    /// always eligible.
    pub fn is_ready(&self, uid: &str, now: Instant) -> bool {
        match self.entries.get(uid) {
            Some(e) => now >= e.retry_at,
            None => true,
        }
    }

    /// Record a failed attempt for `uid`, scheduling its next eligible
    /// retry time.
    pub fn record_failure(&mut self, uid: &str, now: Instant) {
        let entry = self.entries.entry(uid.to_string()).or_insert(Entry { attempts: 0, retry_at: now });
        entry.attempts += 1;
        let delay = BASE.saturating_mul(1 << entry.attempts.min(6)).min(CAP);
        entry.retry_at = now + delay;
    }

    /// Clear backoff state for `uid` after a successful operation.
    pub fn record_success(&mut self, uid: &str) {
        self.entries.remove(uid);
    }
}
