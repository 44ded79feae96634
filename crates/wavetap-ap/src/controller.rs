//! Access-point mode controller
//!
//! The one orchestration context for the AP subsystem. Owns the radio
//! driver, the persisted configuration, the client registry/blocklist,
//! the capture engine and the honeypot responder, and is the only writer
//! of all of them. Mode transitions are planned by `transition::plan`
//! and executed here; a failed transition reverts to Off and surfaces
//! which driver step broke.

use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use wavetap_honeypot::{ConnectionLog, ConnectionRecord, HoneypotConfig, Responder};
use wavetap_radio::{MacAddr, RadioDriver, UplinkInfo};
use wavetap_store::Store;

use crate::capture::{CaptureEngine, CapturedFrameRecord};
use crate::clients::{Blocklist, ClientRegistry, ConnectedClient};
use crate::config::{AccessPointConfig, ApMode, ApSettings};
use crate::error::{ApError, Result, TransitionStage};
use crate::transition::{plan, Action, Preconditions};

const CONFIG_RECORD: &str = "access_point";
const HONEYPOT_LOG_RECORD: &str = "honeypot_log";

/// Snapshot of the AP subsystem for the management surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApStatus {
    pub mode: ApMode,
    pub ap_address: Option<Ipv4Addr>,
    pub connected_clients: usize,
    pub uplink_address: Option<Ipv4Addr>,
}

/// The access-point subsystem controller.
pub struct ApController<R: RadioDriver> {
    driver: R,
    store: Store,
    config: AccessPointConfig,
    /// Actual radio state; diverges from `config.mode` only after a
    /// failed transition, until the next successful one or reboot
    mode: ApMode,
    ap_address: Option<Ipv4Addr>,
    registry: ClientRegistry,
    blocklist: Blocklist,
    capture: CaptureEngine,
    honeypot_config: HoneypotConfig,
    honeypot_log: ConnectionLog,
    responder: Option<Responder>,
}

impl<R: RadioDriver> ApController<R> {
    /// Build the controller from persisted state. The radio is left
    /// untouched; call [`ApController::resume`] to re-apply the persisted
    /// mode after boot.
    pub fn new(mut driver: R, store: Store, honeypot_config: HoneypotConfig) -> Self {
        let config: AccessPointConfig = match store.load_or_default(CONFIG_RECORD) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("AP config record unreadable, using defaults: {err}");
                AccessPointConfig::default()
            }
        };

        let honeypot_log = ConnectionLog::new();
        match store.load_or_default::<Vec<ConnectionRecord>>(HONEYPOT_LOG_RECORD) {
            Ok(snapshot) => honeypot_log.restore(snapshot),
            Err(err) => tracing::warn!("Honeypot log record unreadable, starting empty: {err}"),
        }

        let blocklist = Blocklist::load(store.clone());

        // Blocked stations are turned away the moment they associate,
        // not at the next scheduled refresh.
        let view = blocklist.view();
        driver.set_admission_hook(Some(std::sync::Arc::new(move |mac| !view.is_blocked(mac))));

        Self {
            driver,
            store,
            config,
            mode: ApMode::Off,
            ap_address: None,
            registry: ClientRegistry::new(),
            blocklist,
            capture: CaptureEngine::new(),
            honeypot_config,
            honeypot_log,
            responder: None,
        }
    }

    /// Re-apply the persisted mode (boot behavior).
    pub fn resume(&mut self) -> Result<ApStatus> {
        let settings = self.config.settings.clone();
        self.set_mode(self.config.mode, settings)
    }

    /// Switch the AP subsystem to `requested` with the given settings.
    ///
    /// The transition either completes as a whole or reverts to Off; a
    /// repeater request without an uplink degrades to Normal and reports
    /// that in the returned status.
    pub fn set_mode(&mut self, requested: ApMode, settings: ApSettings) -> Result<ApStatus> {
        settings.validate().map_err(ApError::Config)?;

        let pre = Preconditions {
            uplink: self.query_uplink(),
            decoy_address: self.honeypot_config.listen_ip,
        };
        let plan = plan(self.mode, requested, &settings, &pre);
        tracing::info!(
            "Mode transition {} -> {} ({} steps)",
            self.mode,
            plan.target,
            plan.actions.len()
        );

        for action in plan.actions {
            if let Err(err) = self.execute(action) {
                tracing::warn!("Transition to {} failed: {err}", plan.target);
                self.abort_to_off();
                return Err(err);
            }
        }

        self.mode = plan.target;
        self.config = AccessPointConfig {
            mode: plan.target,
            settings,
        };
        self.persist_config();
        self.persist_honeypot_log();

        Ok(self.status())
    }

    /// Current subsystem snapshot.
    pub fn status(&mut self) -> ApStatus {
        let connected_clients = match self.driver.stations() {
            Ok(stations) => stations.len(),
            Err(err) => {
                tracing::debug!("Station query failed, using last snapshot: {err}");
                self.registry.len()
            }
        };
        ApStatus {
            mode: self.mode,
            ap_address: self.ap_address,
            connected_clients,
            uplink_address: self.query_uplink().map(|uplink| uplink.address),
        }
    }

    pub fn config(&self) -> &AccessPointConfig {
        &self.config
    }

    // --- client registry & access control ---

    /// Rebuild and return the client snapshot.
    pub fn refresh_clients(&mut self) -> Result<Vec<ConnectedClient>> {
        let ledger = self.capture.ledger();
        self.registry
            .refresh(&mut self.driver, &self.blocklist, &ledger, now_ms())
            .map(<[ConnectedClient]>::to_vec)
    }

    /// Last refreshed snapshot, without touching the driver.
    pub fn clients(&self) -> Vec<ConnectedClient> {
        self.registry.snapshot()
    }

    /// Block an address: persist it, mirror it to the driver filter, and
    /// kick the station if it is currently associated. The in-memory set
    /// is mutated first and stays authoritative even when the driver
    /// calls fail.
    pub fn block_client(&mut self, mac: MacAddr) -> Result<()> {
        self.blocklist.insert(mac);

        if let Err(err) = self.driver.set_address_filter(mac, true) {
            tracing::warn!("Driver-level block for {mac} failed: {err}");
        }

        let live = match self.driver.stations() {
            Ok(stations) => stations.iter().any(|station| station.mac == mac),
            Err(err) => {
                tracing::warn!("Station query during block failed: {err}");
                false
            }
        };
        if live {
            self.driver
                .disconnect_station(mac)
                .map_err(|source| ApError::radio(TransitionStage::Disconnect, source))?;
            tracing::info!("Disconnected blocked client {mac}");
        }
        Ok(())
    }

    /// Unblock an address. Unknown addresses are rejected untouched.
    pub fn unblock_client(&mut self, mac: MacAddr) -> Result<()> {
        if !self.blocklist.remove(mac) {
            return Err(ApError::UnknownClient(mac));
        }
        if let Err(err) = self.driver.set_address_filter(mac, false) {
            tracing::warn!("Driver-level unblock for {mac} failed: {err}");
        }
        Ok(())
    }

    pub fn is_blocked(&self, mac: MacAddr) -> bool {
        self.blocklist.contains(mac)
    }

    pub fn blocked_addresses(&self) -> Vec<MacAddr> {
        self.blocklist.snapshot()
    }

    // --- packet capture ---

    /// Start sniffing a connected client. Rejected while another session
    /// is active; rejected for addresses not in the station table.
    pub fn start_sniffing(&mut self, mac: MacAddr) -> Result<()> {
        if self.capture.is_active() {
            return Err(ApError::SnifferBusy);
        }
        self.refresh_clients()?;
        if self.registry.get(mac).is_none() {
            return Err(ApError::UnknownClient(mac));
        }
        self.capture.start(&mut self.driver, mac)
    }

    pub fn stop_sniffing(&mut self) {
        self.capture.stop(&mut self.driver);
    }

    pub fn sniffing_target(&self) -> Option<MacAddr> {
        self.capture.target()
    }

    /// Captured frames, oldest first.
    pub fn captured_frames(&self) -> Vec<CapturedFrameRecord> {
        self.capture.frames()
    }

    pub fn clear_captured_frames(&self) {
        self.capture.clear()
    }

    // --- honeypot log ---

    pub fn honeypot_log(&self) -> Vec<ConnectionRecord> {
        self.honeypot_log.snapshot()
    }

    pub fn clear_honeypot_log(&self) {
        self.honeypot_log.clear();
        self.persist_honeypot_log();
    }

    /// Address the deceptive responder is bound to, while active.
    pub fn honeypot_address(&self) -> Option<std::net::SocketAddr> {
        self.responder.as_ref().map(Responder::local_addr)
    }

    // --- transition execution ---

    fn execute(&mut self, action: Action) -> Result<()> {
        match action {
            Action::StopSniffing => {
                self.capture.stop(&mut self.driver);
                Ok(())
            }
            Action::DeactivateHoneypot => {
                if let Some(responder) = self.responder.take() {
                    responder.stop();
                }
                Ok(())
            }
            Action::TearDownAp => {
                self.driver
                    .stop_ap()
                    .map_err(|source| ApError::radio(TransitionStage::ApStop, source))?;
                self.ap_address = None;
                Ok(())
            }
            Action::EnableConcurrentStation => self
                .driver
                .enable_concurrent_station()
                .map_err(|source| ApError::radio(TransitionStage::ConcurrentStation, source)),
            Action::StartAp(params) => {
                let address = self
                    .driver
                    .start_ap(&params)
                    .map_err(|source| ApError::radio(TransitionStage::ApStart, source))?;
                self.ap_address = Some(address);
                Ok(())
            }
            Action::EnableForwarding => self
                .driver
                .set_forwarding(true)
                .map_err(|source| ApError::radio(TransitionStage::Forwarding, source)),
            Action::DisableForwarding => {
                if let Err(err) = self.driver.set_forwarding(false) {
                    tracing::warn!("Forwarding disable failed: {err}");
                }
                Ok(())
            }
            Action::ConfigureDhcp(params) => self
                .driver
                .configure_dhcp(&params)
                .map_err(|source| ApError::radio(TransitionStage::DhcpConfig, source)),
            Action::ActivateHoneypot => {
                if let Some(previous) = self.responder.take() {
                    previous.stop();
                }
                let responder = Responder::start(&self.honeypot_config, self.honeypot_log.clone())
                    .map_err(|err| ApError::Honeypot(format!("{err:#}")))?;
                self.responder = Some(responder);
                Ok(())
            }
        }
    }

    /// Revert to Off after a partial transition. Everything here is
    /// best-effort; the error that triggered the abort is what the
    /// caller sees.
    fn abort_to_off(&mut self) {
        if let Some(responder) = self.responder.take() {
            responder.stop();
        }
        if let Err(err) = self.driver.set_forwarding(false) {
            tracing::debug!("Forwarding disable during abort: {err}");
        }
        if let Err(err) = self.driver.stop_ap() {
            tracing::warn!("AP teardown during abort failed: {err}");
        }
        self.mode = ApMode::Off;
        self.ap_address = None;
    }

    fn query_uplink(&mut self) -> Option<UplinkInfo> {
        match self.driver.uplink() {
            Ok(uplink) => uplink,
            Err(err) => {
                tracing::warn!("Uplink query failed: {err}");
                None
            }
        }
    }

    fn persist_config(&self) {
        if let Err(err) = self.store.save(CONFIG_RECORD, &self.config) {
            tracing::warn!("Persisting AP config failed: {err}");
        }
    }

    fn persist_honeypot_log(&self) {
        if let Err(err) = self
            .store
            .save(HONEYPOT_LOG_RECORD, &self.honeypot_log.snapshot())
        {
            tracing::warn!("Persisting honeypot log failed: {err}");
        }
    }
}

impl<R: RadioDriver> Drop for ApController<R> {
    fn drop(&mut self) {
        self.driver.set_admission_hook(None);
        if let Some(responder) = self.responder.take() {
            responder.stop();
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
