//! Access point configuration
//!
//! The persisted AP record: operating mode plus radio settings. The mode
//! serializes as its stable numeric tag so records written by earlier
//! firmware revisions keep loading; an out-of-range tag degrades to Off.

use serde::{Deserialize, Serialize};

pub const SSID_MAX_BYTES: usize = 32;
pub const PASSWORD_MIN_BYTES: usize = 8;
pub const PASSWORD_MAX_BYTES: usize = 63;
pub const CHANNEL_RANGE: std::ops::RangeInclusive<u8> = 1..=13;

/// The five access-point operating modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ApMode {
    Off,
    Normal,
    Hidden,
    Repeater,
    Honeypot,
}

impl Default for ApMode {
    fn default() -> Self {
        Self::Off
    }
}

impl From<u8> for ApMode {
    fn from(tag: u8) -> Self {
        match tag {
            1 => Self::Normal,
            2 => Self::Hidden,
            3 => Self::Repeater,
            4 => Self::Honeypot,
            _ => Self::Off,
        }
    }
}

impl From<ApMode> for u8 {
    fn from(mode: ApMode) -> Self {
        match mode {
            ApMode::Off => 0,
            ApMode::Normal => 1,
            ApMode::Hidden => 2,
            ApMode::Repeater => 3,
            ApMode::Honeypot => 4,
        }
    }
}

impl std::fmt::Display for ApMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Off => "off",
            Self::Normal => "normal",
            Self::Hidden => "hidden",
            Self::Repeater => "repeater",
            Self::Honeypot => "honeypot",
        };
        f.write_str(name)
    }
}

/// Radio settings supplied with a mode change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApSettings {
    pub ssid: String,
    /// Empty means an open network
    pub password: String,
    pub hidden: bool,
    pub channel: u8,
}

impl Default for ApSettings {
    fn default() -> Self {
        Self {
            ssid: "WavetapSetup".to_string(),
            password: "12345678".to_string(),
            hidden: false,
            channel: 1,
        }
    }
}

impl ApSettings {
    /// Validate before any driver call is made.
    pub fn validate(&self) -> Result<(), String> {
        if self.ssid.is_empty() || self.ssid.len() > SSID_MAX_BYTES {
            return Err(format!(
                "ssid must be 1-{SSID_MAX_BYTES} bytes, got {}",
                self.ssid.len()
            ));
        }
        if !self.password.is_empty()
            && !(PASSWORD_MIN_BYTES..=PASSWORD_MAX_BYTES).contains(&self.password.len())
        {
            return Err(format!(
                "password must be empty or {PASSWORD_MIN_BYTES}-{PASSWORD_MAX_BYTES} bytes, got {}",
                self.password.len()
            ));
        }
        if !CHANNEL_RANGE.contains(&self.channel) {
            return Err(format!("channel must be 1-13, got {}", self.channel));
        }
        Ok(())
    }

    /// True when no passphrase is configured.
    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

/// The persisted access point record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPointConfig {
    pub mode: ApMode,
    #[serde(flatten)]
    pub settings: ApSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        ApSettings::default().validate().unwrap();
    }

    #[test]
    fn ssid_length_is_enforced() {
        let mut settings = ApSettings::default();
        settings.ssid = String::new();
        assert!(settings.validate().is_err());
        settings.ssid = "x".repeat(33);
        assert!(settings.validate().is_err());
        settings.ssid = "x".repeat(32);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn password_is_empty_or_wpa2_sized() {
        let mut settings = ApSettings::default();
        settings.password = String::new();
        assert!(settings.validate().is_ok());
        assert!(settings.is_open());
        settings.password = "short".to_string();
        assert!(settings.validate().is_err());
        settings.password = "x".repeat(64);
        assert!(settings.validate().is_err());
        settings.password = "x".repeat(63);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn channel_must_be_in_range() {
        let mut settings = ApSettings::default();
        for channel in 1..=13 {
            settings.channel = channel;
            assert!(settings.validate().is_ok());
        }
        settings.channel = 0;
        assert!(settings.validate().is_err());
        settings.channel = 14;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn mode_round_trips_through_numeric_tag() {
        for mode in [
            ApMode::Off,
            ApMode::Normal,
            ApMode::Hidden,
            ApMode::Repeater,
            ApMode::Honeypot,
        ] {
            let json = serde_json::to_string(&mode).unwrap();
            let back: ApMode = serde_json::from_str(&json).unwrap();
            assert_eq!(back, mode);
        }
    }

    #[test]
    fn unknown_mode_tag_loads_as_off() {
        let mode: ApMode = serde_json::from_str("9").unwrap();
        assert_eq!(mode, ApMode::Off);
    }

    #[test]
    fn config_record_round_trips() {
        let config = AccessPointConfig {
            mode: ApMode::Hidden,
            settings: ApSettings {
                ssid: "Lab".to_string(),
                password: "correcthorse".to_string(),
                hidden: true,
                channel: 11,
            },
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: AccessPointConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
