//! Linux radio driver backed by hostapd + dnsmasq
//!
//! Bench/appliance implementation of [`RadioDriver`] for a Linux host
//! with a wireless NIC. AP bring-up writes hostapd/dnsmasq configuration
//! and verifies the daemons actually started; station enumeration parses
//! `iw station dump` merged with the dnsmasq lease file; the frame hook
//! is fed from a raw packet socket on the AP interface; admission is
//! polled from the station table.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::mem;
use std::net::Ipv4Addr;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use libc::{c_int, c_void, sockaddr_ll, AF_PACKET, SOCK_RAW};

use crate::driver::{AdmissionHook, FrameHook, RadioDriver};
use crate::error::{RadioError, Result};
use crate::types::{ApParams, DhcpParams, FrameClass, FrameMeta, MacAddr, StationInfo, UplinkInfo};

const CONF_DIR: &str = "/tmp/wavetap_ap";
const RECV_BUFFER_SIZE: usize = 4096;
const ADMISSION_POLL: Duration = Duration::from_secs(1);

/// hostapd/dnsmasq-backed driver for a Linux wireless interface.
pub struct HostapdRadio {
    ap_interface: String,
    ap_address: Option<Ipv4Addr>,
    upstream_interface: Option<String>,
    forwarding_rules: bool,
    frame_hook: Arc<Mutex<Option<FrameHook>>>,
    admission_hook: Arc<Mutex<Option<AdmissionHook>>>,
    capture_stop: Option<Arc<AtomicBool>>,
    capture_thread: Option<JoinHandle<()>>,
    admission_stop: Option<Arc<AtomicBool>>,
    admission_thread: Option<JoinHandle<()>>,
}

impl HostapdRadio {
    pub fn new(ap_interface: impl Into<String>) -> Self {
        Self {
            ap_interface: ap_interface.into(),
            ap_address: None,
            upstream_interface: None,
            forwarding_rules: false,
            frame_hook: Arc::new(Mutex::new(None)),
            admission_hook: Arc::new(Mutex::new(None)),
            capture_stop: None,
            capture_thread: None,
            admission_stop: None,
            admission_thread: None,
        }
    }

    fn spawn_admission_watcher(&mut self) {
        if self.admission_thread.is_some() {
            return;
        }
        let stop = Arc::new(AtomicBool::new(false));
        let hook = Arc::clone(&self.admission_hook);
        let interface = self.ap_interface.clone();
        let thread_stop = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("wavetap-admission".to_string())
            .spawn(move || {
                let mut seen: HashSet<MacAddr> = HashSet::new();
                while !thread_stop.load(Ordering::Relaxed) {
                    if let Ok(stations) = dump_stations(&interface) {
                        for mac in &stations {
                            if seen.insert(*mac) {
                                let admit = hook
                                    .lock()
                                    .ok()
                                    .and_then(|guard| guard.as_ref().map(|h| h(*mac)))
                                    .unwrap_or(true);
                                if !admit {
                                    tracing::info!("Denying station {mac}");
                                    let _ = deauth_station(&interface, *mac);
                                    seen.remove(mac);
                                }
                            }
                        }
                        seen.retain(|mac| stations.contains(mac));
                    }
                    std::thread::sleep(ADMISSION_POLL);
                }
            });
        match handle {
            Ok(handle) => {
                self.admission_stop = Some(stop);
                self.admission_thread = Some(handle);
            }
            Err(err) => tracing::warn!("Admission watcher not started: {err}"),
        }
    }

    fn stop_admission_watcher(&mut self) {
        if let Some(stop) = self.admission_stop.take() {
            stop.store(true, Ordering::Relaxed);
        }
        if let Some(handle) = self.admission_thread.take() {
            let _ = handle.join();
        }
    }
}

impl RadioDriver for HostapdRadio {
    fn start_ap(&mut self, params: &ApParams) -> Result<Ipv4Addr> {
        tracing::info!(
            "Starting AP on {}: ssid={}, channel={}, hidden={}",
            self.ap_interface,
            params.ssid,
            params.channel,
            params.hidden
        );

        ensure_tools_present()?;
        ensure_interface_exists(&self.ap_interface)?;
        ensure_ap_capability(&self.ap_interface)?;

        fs::create_dir_all(CONF_DIR).map_err(|e| RadioError::System(format!("mkdir: {e}")))?;

        // Previous instances keep the DHCP port bound
        let _ = Command::new("pkill").args(["-f", "hostapd"]).status();
        let _ = Command::new("pkill").args(["-f", "dnsmasq"]).status();
        std::thread::sleep(Duration::from_millis(500));

        run_cmd("ip", &["link", "set", &self.ap_interface, "down"])?;
        run_cmd("ip", &["addr", "flush", "dev", &self.ap_interface])?;
        run_cmd(
            "ip",
            &[
                "addr",
                "add",
                &format!("{}/24", params.address),
                "dev",
                &self.ap_interface,
            ],
        )?;
        run_cmd("ip", &["link", "set", &self.ap_interface, "up"])?;

        let mut conf = format!(
            "interface={}\ndriver=nl80211\nctrl_interface={CONF_DIR}/hostapd\nssid={}\nhw_mode=g\nchannel={}\nwmm_enabled=1\n",
            self.ap_interface, params.ssid, params.channel
        );
        if params.hidden {
            conf.push_str("ignore_broadcast_ssid=1\n");
        }
        match &params.passphrase {
            Some(pass) if !pass.is_empty() => {
                conf.push_str(&format!(
                    "wpa=2\nwpa_passphrase={pass}\nwpa_key_mgmt=WPA-PSK\nrsn_pairwise=CCMP\n"
                ));
            }
            _ => conf.push_str("auth_algs=1\n"),
        }
        let conf_path = format!("{CONF_DIR}/hostapd.conf");
        fs::write(&conf_path, conf)
            .map_err(|e| RadioError::System(format!("writing hostapd.conf: {e}")))?;

        std::thread::sleep(Duration::from_millis(500));

        let output = Command::new("hostapd")
            .args(["-B", &conf_path])
            .output()
            .map_err(|e| RadioError::System(format!("spawn hostapd: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!("hostapd failed: {stderr}");
            return Err(RadioError::AccessPoint(format!(
                "hostapd failed to start: {stderr}"
            )));
        }

        // hostapd daemonizes; give it time, then make sure it survived
        std::thread::sleep(Duration::from_secs(2));
        if !process_running("hostapd") {
            return Err(RadioError::AccessPoint(
                "hostapd started but is not running; check AP mode support".to_string(),
            ));
        }

        self.ap_address = Some(params.address);
        if self.admission_hook.lock().map(|g| g.is_some()).unwrap_or(false) {
            self.spawn_admission_watcher();
        }
        tracing::info!("AP up at {}", params.address);
        Ok(params.address)
    }

    fn stop_ap(&mut self) -> Result<()> {
        self.stop_admission_watcher();
        self.remove_frame_hook();

        let _ = Command::new("pkill").args(["-f", "hostapd"]).status();
        let _ = Command::new("pkill").args(["-f", "dnsmasq"]).status();
        if self.forwarding_rules {
            let _ = self.set_forwarding(false);
        }
        let _ = Command::new("ip")
            .args(["addr", "flush", "dev", &self.ap_interface])
            .status();
        self.ap_address = None;
        tracing::info!("AP on {} stopped", self.ap_interface);
        Ok(())
    }

    fn enable_concurrent_station(&mut self) -> Result<()> {
        // The kernel multiplexes station+AP on separate vifs of the same
        // phy; nothing to switch as long as the uplink interface differs
        // from the AP interface.
        let uplink = self.uplink()?;
        match uplink {
            Some(info) if info.interface != self.ap_interface => {
                self.upstream_interface = Some(info.interface);
                Ok(())
            }
            Some(info) => Err(RadioError::Interface(format!(
                "uplink and AP share interface {}",
                info.interface
            ))),
            None => Err(RadioError::Interface("no uplink present".to_string())),
        }
    }

    fn set_forwarding(&mut self, enabled: bool) -> Result<()> {
        let upstream = self
            .upstream_interface
            .clone()
            .ok_or_else(|| RadioError::Forwarding("no upstream interface".to_string()))?;

        if enabled {
            run_cmd("sysctl", &["-w", "net.ipv4.ip_forward=1"])
                .map_err(|e| RadioError::Forwarding(e.to_string()))?;
            run_cmd(
                "iptables",
                &[
                    "-t", "nat", "-A", "POSTROUTING", "-o", &upstream, "-j", "MASQUERADE",
                ],
            )
            .map_err(|e| RadioError::Forwarding(e.to_string()))?;
            run_cmd(
                "iptables",
                &[
                    "-A", "FORWARD", "-i", &self.ap_interface, "-o", &upstream, "-j", "ACCEPT",
                ],
            )
            .map_err(|e| RadioError::Forwarding(e.to_string()))?;
            run_cmd(
                "iptables",
                &[
                    "-A",
                    "FORWARD",
                    "-i",
                    &upstream,
                    "-o",
                    &self.ap_interface,
                    "-m",
                    "state",
                    "--state",
                    "RELATED,ESTABLISHED",
                    "-j",
                    "ACCEPT",
                ],
            )
            .map_err(|e| RadioError::Forwarding(e.to_string()))?;
            self.forwarding_rules = true;
        } else {
            let _ = run_cmd(
                "iptables",
                &[
                    "-t", "nat", "-D", "POSTROUTING", "-o", &upstream, "-j", "MASQUERADE",
                ],
            );
            let _ = run_cmd(
                "iptables",
                &[
                    "-D", "FORWARD", "-i", &self.ap_interface, "-o", &upstream, "-j", "ACCEPT",
                ],
            );
            let _ = run_cmd(
                "iptables",
                &[
                    "-D",
                    "FORWARD",
                    "-i",
                    &upstream,
                    "-o",
                    &self.ap_interface,
                    "-m",
                    "state",
                    "--state",
                    "RELATED,ESTABLISHED",
                    "-j",
                    "ACCEPT",
                ],
            );
            self.forwarding_rules = false;
        }
        Ok(())
    }

    fn configure_dhcp(&mut self, params: &DhcpParams) -> Result<()> {
        let conf = format!(
            "interface={iface}\n\
             bind-interfaces\n\
             listen-address={gw}\n\
             dhcp-range={start},{end},255.255.255.0,{lease}\n\
             dhcp-option=3,{gw}\n\
             dhcp-option=6,{dns}\n\
             dhcp-authoritative\n\
             dhcp-leasefile={dir}/dnsmasq.leases\n\
             no-resolv\n\
             server=8.8.8.8\n",
            iface = self.ap_interface,
            gw = params.gateway,
            start = params.range_start,
            end = params.range_end,
            lease = params.lease_secs,
            dns = params.dns,
            dir = CONF_DIR,
        );
        let conf_path = format!("{CONF_DIR}/dnsmasq.conf");
        fs::write(&conf_path, conf).map_err(|e| RadioError::Dhcp(format!("writing dnsmasq.conf: {e}")))?;

        let _ = Command::new("pkill").args(["-f", "dnsmasq"]).status();
        Command::new("dnsmasq")
            .args(["--conf-file", &conf_path])
            .spawn()
            .map_err(|e| RadioError::Dhcp(format!("spawn dnsmasq: {e}")))?;

        std::thread::sleep(Duration::from_millis(500));
        if !process_running(&format!("dnsmasq.*{conf_path}")) {
            return Err(RadioError::Dhcp(
                "dnsmasq failed to start; port may be in use".to_string(),
            ));
        }
        Ok(())
    }

    fn uplink(&mut self) -> Result<Option<UplinkInfo>> {
        let output = Command::new("ip")
            .args(["route", "show", "default"])
            .output()
            .map_err(|e| RadioError::System(format!("ip route show failed: {e}")))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let interface = match stdout
            .split_whitespace()
            .skip_while(|w| *w != "dev")
            .nth(1)
        {
            Some(dev) => dev.to_string(),
            None => return Ok(None),
        };

        let output = Command::new("ip")
            .args(["-4", "addr", "show", "dev", &interface])
            .output()
            .map_err(|e| RadioError::System(format!("ip addr show failed: {e}")))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            let line = line.trim_start();
            if let Some(rest) = line.strip_prefix("inet ") {
                if let Some((addr, prefix)) = rest
                    .split_whitespace()
                    .next()
                    .and_then(|cidr| cidr.split_once('/'))
                {
                    if let (Ok(address), Ok(prefix_len)) = (addr.parse(), prefix.parse()) {
                        return Ok(Some(UplinkInfo {
                            interface,
                            address,
                            prefix_len,
                        }));
                    }
                }
            }
        }
        Ok(None)
    }

    fn stations(&mut self) -> Result<Vec<StationInfo>> {
        let macs = dump_stations(&self.ap_interface)?;
        let leases = read_leases();
        Ok(macs
            .into_iter()
            .map(|mac| StationInfo {
                mac,
                ip: leases
                    .iter()
                    .find(|(lease_mac, _)| *lease_mac == mac)
                    .map(|(_, ip)| *ip),
                signal_dbm: None,
            })
            .collect())
    }

    fn disconnect_station(&mut self, mac: MacAddr) -> Result<()> {
        deauth_station(&self.ap_interface, mac)
    }

    fn set_address_filter(&mut self, mac: MacAddr, blocked: bool) -> Result<()> {
        let mac_str = mac.to_string();
        let op = if blocked { "-I" } else { "-D" };
        run_cmd(
            "iptables",
            &[
                op,
                "FORWARD",
                "-m",
                "mac",
                "--mac-source",
                &mac_str,
                "-j",
                "DROP",
            ],
        )
        .map_err(|e| RadioError::Station(e.to_string()))
    }

    fn install_frame_hook(&mut self, hook: FrameHook) -> Result<()> {
        self.remove_frame_hook();

        let fd = open_packet_socket(&self.ap_interface)?;
        *self
            .frame_hook
            .lock()
            .map_err(|_| RadioError::Capture("hook lock poisoned".to_string()))? = Some(hook);

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread_hook = Arc::clone(&self.frame_hook);
        let handle = std::thread::Builder::new()
            .name("wavetap-capture".to_string())
            .spawn(move || {
                let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
                while !thread_stop.load(Ordering::Relaxed) {
                    let received = unsafe {
                        libc::recv(fd, buffer.as_mut_ptr() as *mut c_void, buffer.len(), 0)
                    };
                    if received < 0 {
                        let err = io::Error::last_os_error();
                        if err.kind() == io::ErrorKind::WouldBlock
                            || err.kind() == io::ErrorKind::TimedOut
                        {
                            continue;
                        }
                        tracing::warn!("Capture receive failed: {err}");
                        break;
                    }
                    if let Some(meta) = parse_ethernet(&buffer[..received as usize]) {
                        if let Ok(mut guard) = thread_hook.lock() {
                            if let Some(hook) = guard.as_mut() {
                                hook(&meta);
                            }
                        }
                    }
                }
                unsafe { libc::close(fd) };
            })
            .map_err(|e| RadioError::Capture(format!("spawn capture thread: {e}")))?;

        self.capture_stop = Some(stop);
        self.capture_thread = Some(handle);
        Ok(())
    }

    fn remove_frame_hook(&mut self) {
        if let Some(stop) = self.capture_stop.take() {
            stop.store(true, Ordering::Relaxed);
        }
        if let Some(handle) = self.capture_thread.take() {
            let _ = handle.join();
        }
        if let Ok(mut guard) = self.frame_hook.lock() {
            *guard = None;
        }
    }

    fn set_admission_hook(&mut self, hook: Option<AdmissionHook>) {
        let installing = hook.is_some();
        if let Ok(mut guard) = self.admission_hook.lock() {
            *guard = hook;
        }
        if installing && self.ap_address.is_some() {
            self.spawn_admission_watcher();
        } else if !installing {
            self.stop_admission_watcher();
        }
    }
}

impl Drop for HostapdRadio {
    fn drop(&mut self) {
        self.stop_admission_watcher();
        self.remove_frame_hook();
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn parse_ethernet(data: &[u8]) -> Option<FrameMeta> {
    if data.len() < 14 {
        return None;
    }
    let dest = MacAddr::from_slice(&data[0..6]).ok()?;
    let source = MacAddr::from_slice(&data[6..12]).ok()?;
    Some(FrameMeta {
        source,
        dest,
        // A non-monitor interface only surfaces data frames
        class: FrameClass::Data,
        size_bytes: data.len() as u32,
        signal_dbm: None,
        timestamp_ms: now_ms(),
    })
}

fn open_packet_socket(interface: &str) -> Result<i32> {
    let ifindex = interface_index(interface)?;

    let fd = unsafe {
        libc::socket(
            AF_PACKET,
            SOCK_RAW,
            (libc::ETH_P_ALL as u16).to_be() as c_int,
        )
    };
    if fd < 0 {
        return Err(RadioError::Capture(format!(
            "Failed to create capture socket: {}",
            io::Error::last_os_error()
        )));
    }

    let mut addr: sockaddr_ll = unsafe { mem::zeroed() };
    addr.sll_family = AF_PACKET as u16;
    addr.sll_ifindex = ifindex;
    addr.sll_protocol = (libc::ETH_P_ALL as u16).to_be();

    let bind_result = unsafe {
        libc::bind(
            fd,
            &addr as *const sockaddr_ll as *const libc::sockaddr,
            mem::size_of::<sockaddr_ll>() as u32,
        )
    };
    if bind_result < 0 {
        let err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(RadioError::Capture(format!(
            "Failed to bind capture socket: {err}"
        )));
    }

    let timeout = libc::timeval {
        tv_sec: 1,
        tv_usec: 0,
    };
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVTIMEO,
            &timeout as *const _ as *const c_void,
            mem::size_of::<libc::timeval>() as u32,
        );
    }

    Ok(fd)
}

fn interface_index(interface: &str) -> Result<i32> {
    let path = format!("/sys/class/net/{interface}/ifindex");
    fs::read_to_string(&path)
        .map_err(|e| RadioError::Interface(format!("reading {path}: {e}")))?
        .trim()
        .parse()
        .map_err(|e| RadioError::Interface(format!("parsing ifindex: {e}")))
}

fn dump_stations(interface: &str) -> Result<Vec<MacAddr>> {
    let output = Command::new("iw")
        .args(["dev", interface, "station", "dump"])
        .output()
        .map_err(|e| RadioError::Station(format!("iw station dump failed: {e}")))?;
    if !output.status.success() {
        return Err(RadioError::Station(format!(
            "iw station dump failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut stations = Vec::new();
    for line in stdout.lines() {
        if let Some(rest) = line.strip_prefix("Station ") {
            if let Some(mac) = rest.split_whitespace().next() {
                if let Ok(mac) = mac.parse() {
                    stations.push(mac);
                }
            }
        }
    }
    Ok(stations)
}

fn deauth_station(interface: &str, mac: MacAddr) -> Result<()> {
    let ctrl = format!("{CONF_DIR}/hostapd");
    let output = Command::new("hostapd_cli")
        .args([
            "-p",
            &ctrl,
            "-i",
            interface,
            "deauthenticate",
            &mac.to_string(),
        ])
        .output()
        .map_err(|e| RadioError::Station(format!("hostapd_cli failed: {e}")))?;
    if !output.status.success() {
        return Err(RadioError::Station(format!(
            "deauthenticate {mac} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

fn read_leases() -> Vec<(MacAddr, Ipv4Addr)> {
    let path = format!("{CONF_DIR}/dnsmasq.leases");
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _expiry = fields.next()?;
            let mac = fields.next()?.parse().ok()?;
            let ip = fields.next()?.parse().ok()?;
            Some((mac, ip))
        })
        .collect()
}

fn run_cmd(cmd: &str, args: &[&str]) -> Result<()> {
    let output = Command::new(cmd)
        .args(args)
        .output()
        .map_err(|e| RadioError::System(format!("Failed to run {cmd} {args:?}: {e}")))?;
    if !output.status.success() {
        return Err(RadioError::System(format!(
            "{cmd} {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

fn process_running(pattern: &str) -> bool {
    Command::new("pgrep")
        .arg("-f")
        .arg(pattern)
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn ensure_tools_present() -> Result<()> {
    for tool in ["hostapd", "dnsmasq", "iptables", "iw"] {
        let found = Command::new("sh")
            .arg("-c")
            .arg(format!("command -v {tool} >/dev/null 2>&1"))
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if !found {
            return Err(RadioError::System(format!("Required tool missing: {tool}")));
        }
    }
    Ok(())
}

fn ensure_interface_exists(name: &str) -> Result<()> {
    let path = format!("/sys/class/net/{name}");
    if !Path::new(&path).exists() {
        return Err(RadioError::Interface(format!("Interface {name} not found")));
    }
    Ok(())
}

fn ensure_ap_capability(interface: &str) -> Result<()> {
    let phy_check = Command::new("iw")
        .args(["dev", interface, "info"])
        .output()
        .map_err(|e| RadioError::System(format!("iw dev info failed: {e}")))?;
    if !phy_check.status.success() {
        return Err(RadioError::Interface(format!(
            "{interface} is not a wireless interface: {}",
            String::from_utf8_lossy(&phy_check.stderr)
        )));
    }

    let output = Command::new("iw")
        .arg("list")
        .output()
        .map_err(|e| RadioError::System(format!("iw list failed: {e}")))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.contains("* AP") && !stdout.contains("AP/VLAN") {
        // Let hostapd make the final call
        tracing::warn!("{interface} may not support AP mode; attempting anyway");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ethernet_parse_extracts_addresses() {
        let mut frame = vec![0u8; 64];
        frame[0..6].copy_from_slice(&[0xFF; 6]);
        frame[6..12].copy_from_slice(&[0xAA, 0xBB, 0xCC, 0x00, 0x11, 0x22]);
        let meta = parse_ethernet(&frame).unwrap();
        assert_eq!(meta.dest, MacAddr::BROADCAST);
        assert_eq!(meta.source.to_string(), "AA:BB:CC:00:11:22");
        assert_eq!(meta.size_bytes, 64);
    }

    #[test]
    fn ethernet_parse_rejects_runt() {
        assert!(parse_ethernet(&[0u8; 10]).is_none());
    }
}
