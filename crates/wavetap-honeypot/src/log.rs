//! Bounded connection log
//!
//! Every inbound request to the deceptive responder lands here before a
//! response is produced. The log is a fixed-capacity FIFO; overflow
//! evicts the oldest record. Handlers on the server path and readers on
//! the control path share it through a mutex held only for push/clone.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Maximum number of retained connection records.
pub const LOG_CAPACITY: usize = 10;

/// One logged inbound connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub client_ip: IpAddr,
    pub client_port: u16,
    pub timestamp_ms: u64,
    /// Request line plus a handful of header/parameter lines
    pub request_summary: String,
}

/// Shared fixed-capacity connection log.
#[derive(Debug, Clone, Default)]
pub struct ConnectionLog {
    records: Arc<Mutex<VecDeque<ConnectionRecord>>>,
}

impl ConnectionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, evicting the oldest when full.
    pub fn record(&self, record: ConnectionRecord) {
        let Ok(mut records) = self.records.lock() else {
            return;
        };
        if records.len() >= LOG_CAPACITY {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Snapshot of the log, oldest first.
    pub fn snapshot(&self) -> Vec<ConnectionRecord> {
        self.records
            .lock()
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }

    /// Replace contents from a persisted snapshot, capping at capacity.
    pub fn restore(&self, mut snapshot: Vec<ConnectionRecord>) {
        if snapshot.len() > LOG_CAPACITY {
            snapshot.drain(..snapshot.len() - LOG_CAPACITY);
        }
        if let Ok(mut records) = self.records.lock() {
            records.clear();
            records.extend(snapshot);
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn record(n: u64) -> ConnectionRecord {
        ConnectionRecord {
            client_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 4, 10)),
            client_port: 40000 + n as u16,
            timestamp_ms: n,
            request_summary: format!("GET /{n}"),
        }
    }

    #[test]
    fn log_is_fifo_with_bounded_capacity() {
        let log = ConnectionLog::new();
        for n in 0..(LOG_CAPACITY as u64 + 3) {
            log.record(record(n));
        }
        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), LOG_CAPACITY);
        assert_eq!(snapshot.first().unwrap().timestamp_ms, 3);
        assert_eq!(snapshot.last().unwrap().timestamp_ms, LOG_CAPACITY as u64 + 2);
    }

    #[test]
    fn clear_empties_the_log() {
        let log = ConnectionLog::new();
        log.record(record(1));
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn restore_caps_oversized_snapshots() {
        let log = ConnectionLog::new();
        let snapshot: Vec<_> = (0..20).map(record).collect();
        log.restore(snapshot);
        assert_eq!(log.len(), LOG_CAPACITY);
        assert_eq!(log.snapshot().first().unwrap().timestamp_ms, 10);
    }
}
