//! Error types for radio driver operations

use thiserror::Error;

/// Result type alias for radio operations
pub type Result<T> = std::result::Result<T, RadioError>;

/// Main error type for radio driver operations
#[derive(Error, Debug)]
pub enum RadioError {
    /// Interface not found or not usable
    #[error("Interface error: {0}")]
    Interface(String),

    /// Access point bring-up or teardown failed
    #[error("Access point error: {0}")]
    AccessPoint(String),

    /// Inter-interface forwarding could not be toggled
    #[error("Forwarding error: {0}")]
    Forwarding(String),

    /// DHCP service configuration failed
    #[error("DHCP error: {0}")]
    Dhcp(String),

    /// Station enumeration or disconnect failed
    #[error("Station error: {0}")]
    Station(String),

    /// Frame observation hook could not be installed
    #[error("Capture error: {0}")]
    Capture(String),

    /// Invalid MAC address
    #[error("Invalid MAC address: {0}")]
    InvalidMac(String),

    /// Driver or hardware doesn't support the operation
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// System/OS error
    #[error("System error: {0}")]
    System(String),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RadioError {
    /// Create an interface error
    pub fn interface(msg: impl Into<String>) -> Self {
        Self::Interface(msg.into())
    }

    /// Create an access point error
    pub fn access_point(msg: impl Into<String>) -> Self {
        Self::AccessPoint(msg.into())
    }

    /// Create a system error
    pub fn system(msg: impl Into<String>) -> Self {
        Self::System(msg.into())
    }
}
