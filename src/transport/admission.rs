//! Per-source connection admission
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use chrono::Utc;

/// Table size above which stale sources are pruned
const MAX_TRACKED_SOURCES: usize = 4096;

/// Enforces a minimum interval between admitted connections from one address.
///
/// Rejected connections do not refresh the source's timestamp, so a client
/// retrying too fast is admitted again once the interval has passed since
/// its last *admitted* connection.
#[derive(Clone, Debug)]
pub struct ConnectionLimiter {
    interval_ms: i64,
    last_seen: HashMap<IpAddr, i64>,
}

impl ConnectionLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_ms: i64::try_from(interval.as_millis()).unwrap_or(i64::MAX),
            last_seen: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    pub fn admit(&mut self, source: IpAddr) -> bool {
        self.admit_at(source, Utc::now().timestamp_millis())
    }

    /// Admission decision at `now_ms` (epoch milliseconds)
    pub fn admit_at(&mut self, source: IpAddr, now_ms: i64) -> bool {
        if let Some(&last) = self.last_seen.get(&source) {
            if now_ms - last < self.interval_ms {
                return false;
            }
        }
        self.last_seen.insert(source, now_ms);
        if self.last_seen.len() > MAX_TRACKED_SOURCES {
            self.prune(now_ms);
        }
        true
    }

    /// Forget sources whose last admission is older than the interval
    pub fn prune(&mut self, now_ms: i64) {
        let interval_ms = self.interval_ms;
        self.last_seen
            .retain(|_source, last| now_ms - *last < interval_ms);
    }
}
