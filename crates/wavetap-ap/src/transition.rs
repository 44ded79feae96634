//! Mode transition planning
//!
//! Pure function from (current mode, requested mode, preconditions) to an
//! ordered action list. Nothing in here touches the driver; the
//! controller executes plans and handles failure/rollback. Keeping the
//! table side-effect-free makes every branch testable in isolation,
//! including the repeater degrade path.

use std::net::Ipv4Addr;

use wavetap_radio::{ApParams, DhcpParams, UplinkInfo};

use crate::config::{ApMode, ApSettings};

/// Preferred AP gateway address block.
pub const PRIMARY_AP_ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 20, 30, 1);
/// Alternate block, used when the uplink already occupies the primary.
pub const FALLBACK_AP_ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 40, 50, 1);

const DHCP_RANGE_FIRST_HOST: u8 = 10;
const DHCP_RANGE_LAST_HOST: u8 = 200;
const DHCP_LEASE_SECS: u32 = 43200;

/// Facts gathered before planning a transition.
#[derive(Debug, Clone)]
pub struct Preconditions {
    /// The device's own station-mode connection, if any
    pub uplink: Option<UplinkInfo>,
    /// Address the deceptive responder listens on (honeypot AP gateway)
    pub decoy_address: Ipv4Addr,
}

/// One step of a transition, executed in order against the driver.
#[derive(Debug, Clone)]
pub enum Action {
    StopSniffing,
    DeactivateHoneypot,
    TearDownAp,
    EnableConcurrentStation,
    StartAp(ApParams),
    EnableForwarding,
    DisableForwarding,
    ConfigureDhcp(DhcpParams),
    ActivateHoneypot,
}

/// The planned transition: the mode that will be reported on success
/// (which may differ from the requested mode, see repeater degrade) and
/// the ordered driver actions to get there.
#[derive(Debug)]
pub struct TransitionPlan {
    pub target: ApMode,
    pub actions: Vec<Action>,
}

/// Build the action list for a mode change.
pub fn plan(
    current: ApMode,
    requested: ApMode,
    settings: &ApSettings,
    pre: &Preconditions,
) -> TransitionPlan {
    let mut actions = Vec::new();

    if current == ApMode::Honeypot && requested != ApMode::Honeypot {
        actions.push(Action::DeactivateHoneypot);
    }
    if current == ApMode::Repeater && requested != ApMode::Repeater {
        actions.push(Action::DisableForwarding);
    }

    match requested {
        ApMode::Off => {
            actions.push(Action::StopSniffing);
            if current != ApMode::Off {
                actions.push(Action::TearDownAp);
            }
            TransitionPlan {
                target: ApMode::Off,
                actions,
            }
        }
        ApMode::Normal => {
            actions.push(Action::StartAp(broadcast_params(settings, false)));
            TransitionPlan {
                target: ApMode::Normal,
                actions,
            }
        }
        ApMode::Hidden => {
            actions.push(Action::StartAp(broadcast_params(settings, true)));
            TransitionPlan {
                target: ApMode::Hidden,
                actions,
            }
        }
        ApMode::Repeater => match &pre.uplink {
            None => {
                // No upstream to relay through; run a plain AP instead of
                // failing the request.
                if current == ApMode::Repeater {
                    actions.push(Action::DisableForwarding);
                }
                actions.push(Action::StartAp(broadcast_params(settings, false)));
                TransitionPlan {
                    target: ApMode::Normal,
                    actions,
                }
            }
            Some(uplink) => {
                let gateway = pick_ap_address(uplink);
                actions.push(Action::EnableConcurrentStation);
                actions.push(Action::StartAp(ApParams {
                    ssid: settings.ssid.clone(),
                    passphrase: passphrase(settings),
                    channel: settings.channel,
                    hidden: false,
                    address: gateway,
                }));
                actions.push(Action::EnableForwarding);
                actions.push(Action::ConfigureDhcp(dhcp_params(gateway)));
                TransitionPlan {
                    target: ApMode::Repeater,
                    actions,
                }
            }
        },
        ApMode::Honeypot => {
            actions.push(Action::StartAp(ApParams {
                ssid: settings.ssid.clone(),
                // The trap is always an open network
                passphrase: None,
                channel: settings.channel,
                hidden: false,
                address: pre.decoy_address,
            }));
            actions.push(Action::ActivateHoneypot);
            TransitionPlan {
                target: ApMode::Honeypot,
                actions,
            }
        }
    }
}

/// Choose the AP gateway so its /24 never collides with the uplink.
pub fn pick_ap_address(uplink: &UplinkInfo) -> Ipv4Addr {
    if uplink.contains(PRIMARY_AP_ADDRESS) {
        FALLBACK_AP_ADDRESS
    } else {
        PRIMARY_AP_ADDRESS
    }
}

fn broadcast_params(settings: &ApSettings, hidden: bool) -> ApParams {
    ApParams {
        ssid: settings.ssid.clone(),
        passphrase: passphrase(settings),
        channel: settings.channel,
        hidden,
        address: PRIMARY_AP_ADDRESS,
    }
}

fn passphrase(settings: &ApSettings) -> Option<String> {
    if settings.is_open() {
        None
    } else {
        Some(settings.password.clone())
    }
}

fn dhcp_params(gateway: Ipv4Addr) -> DhcpParams {
    let [a, b, c, _] = gateway.octets();
    DhcpParams {
        range_start: Ipv4Addr::new(a, b, c, DHCP_RANGE_FIRST_HOST),
        range_end: Ipv4Addr::new(a, b, c, DHCP_RANGE_LAST_HOST),
        gateway,
        dns: gateway,
        lease_secs: DHCP_LEASE_SECS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ApSettings {
        ApSettings {
            ssid: "Test".to_string(),
            password: "passw0rd1".to_string(),
            hidden: false,
            channel: 6,
        }
    }

    fn no_uplink() -> Preconditions {
        Preconditions {
            uplink: None,
            decoy_address: Ipv4Addr::new(192, 168, 4, 1),
        }
    }

    fn with_uplink(address: Ipv4Addr, prefix_len: u8) -> Preconditions {
        Preconditions {
            uplink: Some(UplinkInfo {
                interface: "wlan0".to_string(),
                address,
                prefix_len,
            }),
            decoy_address: Ipv4Addr::new(192, 168, 4, 1),
        }
    }

    #[test]
    fn normal_is_a_single_broadcast_bring_up() {
        let plan = plan(ApMode::Off, ApMode::Normal, &settings(), &no_uplink());
        assert_eq!(plan.target, ApMode::Normal);
        assert_eq!(plan.actions.len(), 1);
        match &plan.actions[0] {
            Action::StartAp(params) => {
                assert!(!params.hidden);
                assert_eq!(params.passphrase.as_deref(), Some("passw0rd1"));
                assert_eq!(params.channel, 6);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn hidden_suppresses_broadcast() {
        let plan = plan(ApMode::Off, ApMode::Hidden, &settings(), &no_uplink());
        assert_eq!(plan.target, ApMode::Hidden);
        assert!(matches!(&plan.actions[0], Action::StartAp(p) if p.hidden));
    }

    #[test]
    fn empty_password_plans_an_open_network() {
        let mut open = settings();
        open.password = String::new();
        let plan = plan(ApMode::Off, ApMode::Normal, &open, &no_uplink());
        assert!(matches!(&plan.actions[0], Action::StartAp(p) if p.passphrase.is_none()));
    }

    #[test]
    fn repeater_without_uplink_degrades_to_normal() {
        let plan = plan(ApMode::Off, ApMode::Repeater, &settings(), &no_uplink());
        assert_eq!(plan.target, ApMode::Normal);
        assert_eq!(plan.actions.len(), 1);
        assert!(matches!(&plan.actions[0], Action::StartAp(_)));
    }

    #[test]
    fn repeater_with_uplink_plans_the_full_chain() {
        let pre = with_uplink(Ipv4Addr::new(192, 168, 1, 17), 24);
        let plan = plan(ApMode::Off, ApMode::Repeater, &settings(), &pre);
        assert_eq!(plan.target, ApMode::Repeater);
        assert!(matches!(plan.actions[0], Action::EnableConcurrentStation));
        match &plan.actions[1] {
            Action::StartAp(params) => assert_eq!(params.address, PRIMARY_AP_ADDRESS),
            other => panic!("unexpected action {other:?}"),
        }
        assert!(matches!(plan.actions[2], Action::EnableForwarding));
        match &plan.actions[3] {
            Action::ConfigureDhcp(dhcp) => {
                assert_eq!(dhcp.gateway, PRIMARY_AP_ADDRESS);
                assert_eq!(dhcp.dns, PRIMARY_AP_ADDRESS);
                assert_eq!(dhcp.range_start, Ipv4Addr::new(10, 20, 30, 10));
                assert_eq!(dhcp.range_end, Ipv4Addr::new(10, 20, 30, 200));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn repeater_avoids_colliding_with_the_uplink_subnet() {
        let pre = with_uplink(Ipv4Addr::new(10, 20, 30, 99), 24);
        let plan = plan(ApMode::Off, ApMode::Repeater, &settings(), &pre);
        match &plan.actions[1] {
            Action::StartAp(params) => assert_eq!(params.address, FALLBACK_AP_ADDRESS),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn honeypot_is_open_regardless_of_password() {
        let plan = plan(ApMode::Off, ApMode::Honeypot, &settings(), &no_uplink());
        assert_eq!(plan.target, ApMode::Honeypot);
        match &plan.actions[0] {
            Action::StartAp(params) => {
                assert!(params.passphrase.is_none());
                assert_eq!(params.address, Ipv4Addr::new(192, 168, 4, 1));
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert!(matches!(plan.actions[1], Action::ActivateHoneypot));
    }

    #[test]
    fn leaving_honeypot_deactivates_the_responder_first() {
        let plan = plan(ApMode::Honeypot, ApMode::Normal, &settings(), &no_uplink());
        assert!(matches!(plan.actions[0], Action::DeactivateHoneypot));
        assert!(matches!(plan.actions[1], Action::StartAp(_)));
    }

    #[test]
    fn off_stops_sniffing_and_tears_down() {
        let plan = plan(ApMode::Normal, ApMode::Off, &settings(), &no_uplink());
        assert!(matches!(plan.actions[0], Action::StopSniffing));
        assert!(matches!(plan.actions[1], Action::TearDownAp));
    }

    #[test]
    fn leaving_repeater_disables_forwarding() {
        let plan = plan(ApMode::Repeater, ApMode::Normal, &settings(), &no_uplink());
        assert!(matches!(plan.actions[0], Action::DisableForwarding));
        assert!(matches!(plan.actions[1], Action::StartAp(_)));
    }

    #[test]
    fn off_from_off_skips_teardown() {
        let plan = plan(ApMode::Off, ApMode::Off, &settings(), &no_uplink());
        assert_eq!(plan.actions.len(), 1);
        assert!(matches!(plan.actions[0], Action::StopSniffing));
    }
}
