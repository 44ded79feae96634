//! # wavetap-honeypot
//!
//! The deceptive side of Honeypot mode: an HTTP responder that plays a
//! plausible captive network while logging every inbound request into a
//! bounded connection log. No submitted credential is ever accepted or
//! validated; the login endpoint exists purely to record what was tried.
//!
//! The responder runs on its own thread with a dedicated single-worker
//! runtime so the device's main control loop never blocks on it.

mod config;
mod log;
mod responder;
mod server;

pub use config::HoneypotConfig;
pub use log::{ConnectionLog, ConnectionRecord, LOG_CAPACITY};
pub use responder::Responder;
pub use server::{build_router, run_server, HoneypotState};

use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};

/// A plausible-looking decoy SSID with a random suffix.
pub fn random_decoy_ssid() -> String {
    let rand: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(4)
        .map(char::from)
        .collect();
    format!("Guest-{rand}")
}

#[cfg(test)]
mod tests {
    use super::random_decoy_ssid;

    #[test]
    fn decoy_ssid_is_short_and_prefixed() {
        let ssid = random_decoy_ssid();
        assert!(ssid.starts_with("Guest-"));
        assert_eq!(ssid.len(), "Guest-".len() + 4);
        assert!(ssid.len() <= 32);
    }
}
