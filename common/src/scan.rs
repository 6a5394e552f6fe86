use serde::{Deserialize, Serialize};

/// How long a completed scan can be served from cache.
pub const SCAN_CACHE_MAX_AGE_SECS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEntry {
    pub ssid: String,
    pub rssi: i32,
    pub secure: bool,
}

/// Completed scan with the epoch second it finished at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSnapshot {
    pub networks: Vec<ScanEntry>,
    #[serde(rename = "completedEpoch")]
    pub completed_epoch: i64,
}

impl ScanSnapshot {
    pub fn new(mut networks: Vec<ScanEntry>, completed_epoch: i64) -> Self {
        sort_networks(&mut networks);
        Self { networks, completed_epoch }
    }

    pub fn is_fresh(&self, now_epoch: i64) -> bool {
        now_epoch.saturating_sub(self.completed_epoch) < SCAN_CACHE_MAX_AGE_SECS
    }
}

/// Strongest signal first; equal-RSSI entries in SSID lexical order so
/// result pages are stable between scans.
pub fn sort_networks(networks: &mut [ScanEntry]) {
    networks.sort_by(|a, b| b.rssi.cmp(&a.rssi).then_with(|| a.ssid.cmp(&b.ssid)));
}
