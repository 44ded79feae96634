//! Single-client packet capture
//!
//! One sniffing session at a time, system-wide. The driver's frame hook
//! feeds a fixed-capacity ring of frame records plus a per-target traffic
//! ledger; both live behind one mutex that the hook holds only long
//! enough to push. The hook path does no I/O and no persistence.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use wavetap_radio::{FrameClass, FrameMeta, MacAddr, RadioDriver};

use crate::error::{ApError, Result, TransitionStage};

/// Maximum number of retained frame records.
pub const FRAME_CAPACITY: usize = 20;

/// One captured frame, as exposed to the management surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedFrameRecord {
    pub source_mac: MacAddr,
    pub dest_mac: MacAddr,
    pub frame_class: FrameClass,
    pub size_bytes: u32,
    pub signal_dbm: Option<i8>,
    pub timestamp_ms: u64,
}

/// Accumulated per-client traffic accounting.
///
/// Kept across registry refreshes and across sniffing sessions; the
/// registry merges these into each client snapshot by MAC.
#[derive(Debug, Clone, Default)]
pub struct TrafficTotals {
    pub total_bytes: u64,
    pub last_frame_summary: String,
    pub last_seen_ms: u64,
}

#[derive(Default)]
struct CaptureState {
    target: Option<MacAddr>,
    frames: VecDeque<CapturedFrameRecord>,
    totals: HashMap<MacAddr, TrafficTotals>,
}

impl CaptureState {
    /// Hook-path entry point. Must stay cheap: one comparison, one ring
    /// push, one ledger update.
    fn observe(&mut self, meta: &FrameMeta) {
        let Some(target) = self.target else {
            return;
        };
        if meta.source != target {
            return;
        }

        let totals = self.totals.entry(target).or_default();
        totals.total_bytes += u64::from(meta.size_bytes);
        totals.last_seen_ms = meta.timestamp_ms;
        totals.last_frame_summary = summarize_frame(meta);

        if self.frames.len() >= FRAME_CAPACITY {
            self.frames.pop_front();
        }
        self.frames.push_back(CapturedFrameRecord {
            source_mac: meta.source,
            dest_mac: meta.dest,
            frame_class: meta.class,
            size_bytes: meta.size_bytes,
            signal_dbm: meta.signal_dbm,
            timestamp_ms: meta.timestamp_ms,
        });
    }
}

fn summarize_frame(meta: &FrameMeta) -> String {
    let class = match meta.class {
        FrameClass::Management => "mgmt",
        FrameClass::Control => "ctrl",
        FrameClass::Data => "data",
    };
    match meta.signal_dbm {
        Some(signal) => format!("{class} {}B to {} at {signal}dBm", meta.size_bytes, meta.dest),
        None => format!("{class} {}B to {}", meta.size_bytes, meta.dest),
    }
}

/// Shared read view of the traffic ledger, used by the client registry.
#[derive(Clone, Default)]
pub struct TrafficLedger {
    state: Arc<Mutex<CaptureState>>,
}

impl TrafficLedger {
    pub fn totals_for(&self, mac: MacAddr) -> Option<TrafficTotals> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.totals.get(&mac).cloned())
    }
}

/// The capture engine: owns the session and the ring.
pub struct CaptureEngine {
    state: Arc<Mutex<CaptureState>>,
    active: bool,
}

impl Default for CaptureEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureEngine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CaptureState::default())),
            active: false,
        }
    }

    /// Begin sniffing `target`. Fails with [`ApError::SnifferBusy`] while
    /// a session is active, leaving the existing session untouched.
    /// Starting discards frames captured for the previous target.
    pub fn start<D>(&mut self, driver: &mut D, target: MacAddr) -> Result<()>
    where
        D: RadioDriver + ?Sized,
    {
        if self.active {
            return Err(ApError::SnifferBusy);
        }

        if let Ok(mut state) = self.state.lock() {
            state.frames.clear();
            state.target = Some(target);
        }

        let hook_state = Arc::clone(&self.state);
        let install = driver.install_frame_hook(Box::new(move |meta| {
            if let Ok(mut state) = hook_state.lock() {
                state.observe(meta);
            }
        }));
        if let Err(source) = install {
            if let Ok(mut state) = self.state.lock() {
                state.target = None;
            }
            return Err(ApError::radio(TransitionStage::CaptureHook, source));
        }

        self.active = true;
        tracing::info!("Sniffing session started for {target}");
        Ok(())
    }

    /// End the session and release the promiscuous hook. Captured frames
    /// stay readable until [`CaptureEngine::clear`] or the next start.
    pub fn stop<D>(&mut self, driver: &mut D)
    where
        D: RadioDriver + ?Sized,
    {
        if !self.active {
            return;
        }
        driver.remove_frame_hook();
        if let Ok(mut state) = self.state.lock() {
            state.target = None;
        }
        self.active = false;
        tracing::info!("Sniffing session stopped");
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn target(&self) -> Option<MacAddr> {
        self.state.lock().ok().and_then(|state| state.target)
    }

    /// Snapshot of captured frames, oldest first.
    pub fn frames(&self) -> Vec<CapturedFrameRecord> {
        self.state
            .lock()
            .map(|state| state.frames.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.frames.clear();
        }
    }

    /// Read view for merging traffic accounting into client snapshots.
    pub fn ledger(&self) -> TrafficLedger {
        TrafficLedger {
            state: Arc::clone(&self.state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> MacAddr {
        "AA:BB:CC:00:11:22".parse().unwrap()
    }

    fn frame(source: MacAddr, n: u64) -> FrameMeta {
        FrameMeta {
            source,
            dest: MacAddr::BROADCAST,
            class: FrameClass::Data,
            size_bytes: 100,
            signal_dbm: Some(-42),
            timestamp_ms: n,
        }
    }

    fn observe_all(state: &Arc<Mutex<CaptureState>>, frames: &[FrameMeta]) {
        let mut state = state.lock().unwrap();
        for meta in frames {
            state.observe(meta);
        }
    }

    #[test]
    fn ring_keeps_the_newest_twenty_in_order() {
        let engine = CaptureEngine::new();
        engine.state.lock().unwrap().target = Some(target());

        let frames: Vec<_> = (0..FRAME_CAPACITY as u64 + 1)
            .map(|n| frame(target(), n))
            .collect();
        observe_all(&engine.state, &frames);

        let captured = engine.frames();
        assert_eq!(captured.len(), FRAME_CAPACITY);
        assert_eq!(captured.first().unwrap().timestamp_ms, 1);
        assert_eq!(captured.last().unwrap().timestamp_ms, FRAME_CAPACITY as u64);
        assert!(captured.windows(2).all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
    }

    #[test]
    fn frames_from_other_sources_are_ignored() {
        let engine = CaptureEngine::new();
        engine.state.lock().unwrap().target = Some(target());

        let other: MacAddr = "DE:AD:BE:EF:00:01".parse().unwrap();
        observe_all(&engine.state, &[frame(other, 1), frame(target(), 2)]);

        let captured = engine.frames();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].source_mac, target());
    }

    #[test]
    fn ledger_accumulates_bytes_for_the_target() {
        let engine = CaptureEngine::new();
        engine.state.lock().unwrap().target = Some(target());

        observe_all(&engine.state, &[frame(target(), 1), frame(target(), 2)]);

        let totals = engine.ledger().totals_for(target()).unwrap();
        assert_eq!(totals.total_bytes, 200);
        assert_eq!(totals.last_seen_ms, 2);
        assert!(totals.last_frame_summary.contains("data 100B"));
    }

    #[test]
    fn no_target_means_nothing_recorded() {
        let engine = CaptureEngine::new();
        observe_all(&engine.state, &[frame(target(), 1)]);
        assert!(engine.frames().is_empty());
    }
}
