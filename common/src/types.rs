use serde::{Deserialize, Serialize};

/// Radio mode. Persisted; survives reboot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectivityMode {
    Off,
    Sta,
    Ap,
}

impl ConnectivityMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Sta => "STA",
            Self::Ap => "AP",
        }
    }
}

/// Derived link status. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectivityStatus {
    Disabled,
    Connecting,
    Connected,
    Failed,
    ApActive,
}

impl ConnectivityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "DISABLED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Failed => "FAILED",
            Self::ApActive => "AP_ACTIVE",
        }
    }
}

/// What the controller does after a failed station attempt. Both policies
/// appear in deployed firmware of this kind; the choice is persisted
/// configuration, not hardcoded behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    FallbackToAp,
    StayFailed,
}

/// Snapshot served by `GET /api/wifi/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WifiStatusView {
    pub mode: &'static str,
    pub status: &'static str,
    pub ssid: String,
    pub ip: String,
    pub rssi: Option<i32>,
}
