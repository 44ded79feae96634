//! The radio driver seam
//!
//! The mode controller talks to the wireless stack exclusively through
//! this trait. Implementations wrap a vendor stack (hostapd on Linux,
//! the SoC SDK on the handheld); tests script a mock.

use std::sync::Arc;

use crate::error::Result;
use crate::types::{ApParams, DhcpParams, FrameMeta, MacAddr, StationInfo, UplinkInfo};

/// Frame-observation hook, invoked on the driver's capture path.
///
/// Runs with the driver's timing, not the main loop's: it must return
/// quickly and must not block or perform I/O. Bounded-buffer mutation
/// only.
pub type FrameHook = Box<dyn FnMut(&FrameMeta) + Send>;

/// Station-admission hook, consulted when a new station associates.
///
/// Returning `false` denies the station; the driver disconnects it
/// without waiting for the control plane. Same timing constraints as
/// [`FrameHook`].
pub type AdmissionHook = Arc<dyn Fn(MacAddr) -> bool + Send + Sync>;

/// Operations the control plane needs from the wireless stack.
pub trait RadioDriver {
    /// Bring up the access point. Returns the AP interface address.
    ///
    /// Implementations must leave the radio in its prior state when this
    /// fails; the caller treats failure as "still down".
    fn start_ap(&mut self, params: &ApParams) -> Result<std::net::Ipv4Addr>;

    /// Tear the access point down, leaving station-only operation.
    fn stop_ap(&mut self) -> Result<()>;

    /// Enable simultaneous station + AP operation (repeater prerequisite).
    fn enable_concurrent_station(&mut self) -> Result<()>;

    /// Toggle inter-interface IP forwarding between uplink and AP.
    fn set_forwarding(&mut self, enabled: bool) -> Result<()>;

    /// Configure the DHCP lease range, gateway and DNS for the AP side.
    fn configure_dhcp(&mut self, params: &DhcpParams) -> Result<()>;

    /// Current uplink (station) connectivity, if any.
    fn uplink(&mut self) -> Result<Option<UplinkInfo>>;

    /// Enumerate currently associated stations.
    fn stations(&mut self) -> Result<Vec<StationInfo>>;

    /// Administratively disconnect one station.
    fn disconnect_station(&mut self, mac: MacAddr) -> Result<()>;

    /// Best-effort address-level filter at the driver. Failures are
    /// reported but the caller's own bookkeeping remains authoritative.
    fn set_address_filter(&mut self, mac: MacAddr, blocked: bool) -> Result<()>;

    /// Install the promiscuous frame-observation hook. At most one hook
    /// is installed at a time; installing replaces the previous one.
    fn install_frame_hook(&mut self, hook: FrameHook) -> Result<()>;

    /// Remove the frame-observation hook, releasing promiscuous mode.
    fn remove_frame_hook(&mut self);

    /// Install or clear the station-admission hook.
    fn set_admission_hook(&mut self, hook: Option<AdmissionHook>);
}
