//! Error taxonomy for the access-point control plane

use std::fmt;

use thiserror::Error;

use wavetap_radio::{MacAddr, RadioError};

/// Result type alias for control-plane operations
pub type Result<T> = std::result::Result<T, ApError>;

/// The driver-facing step a transition was executing when it failed.
///
/// Repeater bring-up is multi-step; callers need to know which step
/// broke, not just that "the radio failed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionStage {
    ApStart,
    ApStop,
    ConcurrentStation,
    Forwarding,
    DhcpConfig,
    StationQuery,
    Disconnect,
    CaptureHook,
}

impl fmt::Display for TransitionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ApStart => "access point bring-up",
            Self::ApStop => "access point teardown",
            Self::ConcurrentStation => "concurrent station enable",
            Self::Forwarding => "forwarding enable",
            Self::DhcpConfig => "DHCP configuration",
            Self::StationQuery => "station enumeration",
            Self::Disconnect => "station disconnect",
            Self::CaptureHook => "capture hook install",
        };
        f.write_str(name)
    }
}

/// Control-plane errors surfaced to the management layer.
#[derive(Error, Debug)]
pub enum ApError {
    /// Rejected before any driver call
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A driver call failed; the transition was aborted
    #[error("Radio unavailable during {stage}: {source}")]
    Radio {
        stage: TransitionStage,
        source: RadioError,
    },

    /// A sniffing session is already active; the existing one is untouched
    #[error("A sniffing session is already active")]
    SnifferBusy,

    /// Operation referenced an address with no matching client
    #[error("No client with address {0}")]
    UnknownClient(MacAddr),

    /// The deceptive responder could not be started
    #[error("Honeypot responder error: {0}")]
    Honeypot(String),
}

impl ApError {
    pub(crate) fn radio(stage: TransitionStage, source: RadioError) -> Self {
        Self::Radio { stage, source }
    }
}
