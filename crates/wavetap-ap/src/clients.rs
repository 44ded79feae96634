//! Connected clients and access control
//!
//! The registry is a snapshot producer: every refresh rebuilds the client
//! list from the live station table, then annotates it from the persisted
//! blocklist and the capture engine's traffic ledger. The blocklist is
//! the source of truth for the `blocked` flag; the driver-level address
//! filter and the admission hook are enforcement arms of it.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use wavetap_radio::{MacAddr, RadioDriver};
use wavetap_store::Store;

use crate::capture::TrafficLedger;
use crate::error::{ApError, Result, TransitionStage};

const BLOCKLIST_RECORD: &str = "blocked_clients";

/// One row of the client snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedClient {
    pub mac: MacAddr,
    pub ip: Option<Ipv4Addr>,
    pub blocked: bool,
    pub total_bytes_observed: u64,
    pub last_frame_summary: String,
    pub last_seen_ms: u64,
}

/// Persisted form of the blocked-address set.
#[derive(Debug, Default, Serialize, Deserialize)]
struct BlocklistRecord {
    addresses: Vec<String>,
}

/// Fast shared lookup handle, safe to consult from the driver's
/// admission callback path.
#[derive(Clone)]
pub struct BlocklistView {
    shared: Arc<RwLock<HashSet<MacAddr>>>,
}

impl BlocklistView {
    pub fn is_blocked(&self, mac: MacAddr) -> bool {
        self.shared
            .read()
            .map(|set| set.contains(&mac))
            .unwrap_or(false)
    }
}

/// The persisted blocked-address set.
pub struct Blocklist {
    shared: Arc<RwLock<HashSet<MacAddr>>>,
    store: Store,
}

impl Blocklist {
    /// Load from the store; a missing record is an empty set, a damaged
    /// record is logged and treated as empty rather than bricking boot.
    pub fn load(store: Store) -> Self {
        let record: BlocklistRecord = match store.load_or_default(BLOCKLIST_RECORD) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!("Blocklist record unreadable, starting empty: {err}");
                BlocklistRecord::default()
            }
        };
        let set: HashSet<MacAddr> = record
            .addresses
            .iter()
            .filter_map(|addr| addr.parse().ok())
            .collect();
        Self {
            shared: Arc::new(RwLock::new(set)),
            store,
        }
    }

    /// Lookup handle for the admission hook.
    pub fn view(&self) -> BlocklistView {
        BlocklistView {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn contains(&self, mac: MacAddr) -> bool {
        self.shared
            .read()
            .map(|set| set.contains(&mac))
            .unwrap_or(false)
    }

    /// Add an address. Returns false when it was already present; the
    /// persisted set never holds duplicates either way.
    pub fn insert(&self, mac: MacAddr) -> bool {
        let inserted = self
            .shared
            .write()
            .map(|mut set| set.insert(mac))
            .unwrap_or(false);
        if inserted {
            self.persist();
        }
        inserted
    }

    /// Remove an address. Returns false when it was not present.
    pub fn remove(&self, mac: MacAddr) -> bool {
        let removed = self
            .shared
            .write()
            .map(|mut set| set.remove(&mac))
            .unwrap_or(false);
        if removed {
            self.persist();
        }
        removed
    }

    /// Sorted copy of the set.
    pub fn snapshot(&self) -> Vec<MacAddr> {
        let mut addresses: Vec<MacAddr> = self
            .shared
            .read()
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        addresses.sort();
        addresses
    }

    // In-memory state stays authoritative when the flash write fails;
    // the divergence heals at the next successful write or reboot.
    fn persist(&self) {
        let record = BlocklistRecord {
            addresses: self
                .snapshot()
                .into_iter()
                .map(|mac| mac.to_string())
                .collect(),
        };
        if let Err(err) = self.store.save(BLOCKLIST_RECORD, &record) {
            tracing::warn!("Persisting blocklist failed: {err}");
        }
    }
}

/// Snapshot producer over the driver's station table.
#[derive(Default)]
pub struct ClientRegistry {
    snapshot: Vec<ConnectedClient>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard the previous snapshot and rebuild from the live station
    /// table, merging `blocked` and traffic accounting by MAC.
    pub fn refresh<D>(
        &mut self,
        driver: &mut D,
        blocklist: &Blocklist,
        ledger: &TrafficLedger,
        now_ms: u64,
    ) -> Result<&[ConnectedClient]>
    where
        D: RadioDriver + ?Sized,
    {
        let stations = driver
            .stations()
            .map_err(|source| ApError::radio(TransitionStage::StationQuery, source))?;

        self.snapshot = stations
            .into_iter()
            .map(|station| {
                let totals = ledger.totals_for(station.mac).unwrap_or_default();
                ConnectedClient {
                    mac: station.mac,
                    ip: station.ip,
                    blocked: blocklist.contains(station.mac),
                    total_bytes_observed: totals.total_bytes,
                    last_frame_summary: totals.last_frame_summary,
                    last_seen_ms: totals.last_seen_ms.max(now_ms),
                }
            })
            .collect();

        Ok(&self.snapshot)
    }

    pub fn snapshot(&self) -> Vec<ConnectedClient> {
        self.snapshot.clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    pub fn get(&self, mac: MacAddr) -> Option<&ConnectedClient> {
        self.snapshot.iter().find(|client| client.mac == mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> Store {
        let dir = std::env::temp_dir().join(format!(
            "wavetap-blocklist-{tag}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        Store::open(dir).unwrap()
    }

    fn mac(n: u8) -> MacAddr {
        MacAddr::new([0xAA, 0xBB, 0xCC, 0x00, 0x11, n])
    }

    #[test]
    fn insert_is_deduplicated_and_persisted() {
        let store = temp_store("dedup");
        let blocklist = Blocklist::load(store.clone());
        assert!(blocklist.insert(mac(1)));
        assert!(!blocklist.insert(mac(1)));
        assert!(blocklist.remove(mac(1)));
        assert!(blocklist.insert(mac(1)));

        let reloaded = Blocklist::load(store);
        assert_eq!(reloaded.snapshot(), vec![mac(1)]);
    }

    #[test]
    fn remove_of_absent_address_reports_false() {
        let blocklist = Blocklist::load(temp_store("absent"));
        assert!(!blocklist.remove(mac(9)));
    }

    #[test]
    fn view_tracks_mutations() {
        let blocklist = Blocklist::load(temp_store("view"));
        let view = blocklist.view();
        assert!(!view.is_blocked(mac(2)));
        blocklist.insert(mac(2));
        assert!(view.is_blocked(mac(2)));
        blocklist.remove(mac(2));
        assert!(!view.is_blocked(mac(2)));
    }

    #[test]
    fn damaged_record_loads_as_empty() {
        let store = temp_store("damaged");
        std::fs::write(store.root().join("blocked_clients.json"), "{oops").unwrap();
        let blocklist = Blocklist::load(store);
        assert!(blocklist.snapshot().is_empty());
    }
}
