use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::light::DeviceLightState;
use crate::types::{ConnectivityMode, FailurePolicy};

pub const SSID_MAX_LEN: usize = 32;
pub const PASS_MAX_LEN: usize = 63;
pub const AP_PASS_MIN_LEN: usize = 8;

/// Station credentials submitted through onboarding or `/api/wifi/connect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiCredentials {
    pub ssid: String,
    pub pass: String,
}

impl WifiCredentials {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.ssid.is_empty() || self.ssid.len() > SSID_MAX_LEN {
            return Err(ValidationError::InvalidInput);
        }
        if self.pass.len() > PASS_MAX_LEN {
            return Err(ValidationError::InvalidInput);
        }
        Ok(())
    }
}

/// Access-point credentials. An empty password means an open network;
/// anything else must satisfy WPA2 length rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApCredentials {
    pub ssid: String,
    pub pass: String,
}

impl ApCredentials {
    /// Deterministic default SSID derived from the hardware MAC suffix.
    pub fn defaulted(mac: [u8; 6]) -> Self {
        Self {
            ssid: format!("Lumen-Setup-{:02X}{:02X}", mac[4], mac[5]),
            pass: String::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.ssid.is_empty() || self.ssid.len() > SSID_MAX_LEN {
            return Err(ValidationError::InvalidInput);
        }
        if !self.pass.is_empty()
            && !(AP_PASS_MIN_LEN..=PASS_MAX_LEN).contains(&self.pass.len())
        {
            return Err(ValidationError::InvalidInput);
        }
        Ok(())
    }
}

/// Persisted `light` namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightConfig {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(rename = "int")]
    pub intensity_pct: u8,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self { r: 255, g: 255, b: 255, intensity_pct: 100 }
    }
}

impl LightConfig {
    pub fn sanitize(&mut self) {
        self.intensity_pct = self.intensity_pct.min(100);
    }
}

impl From<DeviceLightState> for LightConfig {
    fn from(state: DeviceLightState) -> Self {
        Self {
            r: state.r,
            g: state.g,
            b: state.b,
            intensity_pct: state.intensity_pct,
        }
    }
}

impl From<LightConfig> for DeviceLightState {
    fn from(config: LightConfig) -> Self {
        Self {
            r: config.r,
            g: config.g,
            b: config.b,
            intensity_pct: config.intensity_pct,
        }
    }
}

/// Persisted `network` namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub enabled: bool,
    pub mode: ConnectivityMode,
    pub ssid: String,
    pub pass: String,
    pub ap_ssid: String,
    pub ap_pass: String,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: ConnectivityMode::Sta,
            ssid: String::new(),
            pass: String::new(),
            ap_ssid: String::new(),
            ap_pass: String::new(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl NetworkConfig {
    pub fn sta_credentials(&self) -> Option<WifiCredentials> {
        if self.ssid.is_empty() {
            return None;
        }
        Some(WifiCredentials {
            ssid: self.ssid.clone(),
            pass: self.pass.clone(),
        })
    }

    /// Effective AP credentials, defaulted from the MAC when unset.
    pub fn ap_credentials(&self, mac: [u8; 6]) -> ApCredentials {
        if self.ap_ssid.is_empty() {
            ApCredentials::defaulted(mac)
        } else {
            ApCredentials {
                ssid: self.ap_ssid.clone(),
                pass: self.ap_pass.clone(),
            }
        }
    }

    pub fn sanitize(&mut self) {
        self.ssid.truncate(SSID_MAX_LEN);
        self.pass.truncate(PASS_MAX_LEN);
        self.ap_ssid.truncate(SSID_MAX_LEN);
        self.ap_pass.truncate(PASS_MAX_LEN);
        if !self.ap_pass.is_empty() && self.ap_pass.len() < AP_PASS_MIN_LEN {
            self.ap_pass.clear();
        }
    }
}

/// Persisted `misc` namespace. 0 = Spanish, 1 = English; the translation
/// tables themselves live with the UI, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiscConfig {
    pub lang: u8,
}

impl Default for MiscConfig {
    fn default() -> Self {
        Self { lang: 0 }
    }
}
