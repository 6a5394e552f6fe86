use std::net::Ipv4Addr;

use crate::config::{ApCredentials, NetworkConfig, WifiCredentials};
use crate::error::ConnectError;
use crate::types::{ConnectivityMode, ConnectivityStatus, FailurePolicy};

/// Side effects the network-owning task must execute, in order. The
/// machine itself never touches the radio; exactly one task consumes
/// these actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetAction {
    StartSta(WifiCredentials),
    StartAp(ApCredentials),
    StartPortal,
    StopPortal,
    StopRadio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Disabled,
    StaConnecting,
    StaConnected,
    StaFailed,
    ApActive,
}

/// Connectivity state machine. Owns mode selection, the STA attempt
/// lifecycle, the AP/portal entry decision and the teardown ordering
/// (portal always stops before the radio is reconfigured).
#[derive(Debug, Clone)]
pub struct ConnectivityMachine {
    enabled: bool,
    mode: ConnectivityMode,
    creds: Option<WifiCredentials>,
    ap: ApCredentials,
    policy: FailurePolicy,

    state: State,
    portal_active: bool,
    sta_ip: Option<Ipv4Addr>,
    last_error: Option<ConnectError>,
}

impl ConnectivityMachine {
    pub fn new(config: &NetworkConfig, mac: [u8; 6]) -> Self {
        Self {
            enabled: config.enabled,
            mode: config.mode,
            creds: config.sta_credentials(),
            ap: config.ap_credentials(mac),
            policy: config.failure_policy,
            state: State::Disabled,
            portal_active: false,
            sta_ip: None,
            last_error: None,
        }
    }

    /// Boot entry from persisted `(enabled, mode)`.
    pub fn begin(&mut self) -> Vec<NetAction> {
        if !self.enabled || self.mode == ConnectivityMode::Off {
            self.state = State::Disabled;
            return Vec::new();
        }

        match (self.mode, self.creds.clone()) {
            (ConnectivityMode::Sta, Some(creds)) => {
                self.state = State::StaConnecting;
                vec![NetAction::StartSta(creds)]
            }
            // STA requested with nothing stored: broadcast for onboarding.
            (ConnectivityMode::Sta, None) | (ConnectivityMode::Ap, _) => self.enter_ap(),
            (ConnectivityMode::Off, _) => unreachable!("handled above"),
        }
    }

    /// Result of the bounded station attempt. A late result after a
    /// disable still yields the radio teardown.
    pub fn on_sta_result(
        &mut self,
        result: Result<Ipv4Addr, ConnectError>,
    ) -> Vec<NetAction> {
        match self.state {
            State::StaConnecting => {}
            State::Disabled => return vec![NetAction::StopRadio],
            _ => return Vec::new(),
        }

        match result {
            Ok(ip) => {
                self.state = State::StaConnected;
                self.sta_ip = Some(ip);
                self.last_error = None;
                Vec::new()
            }
            Err(err) => {
                self.last_error = Some(err);
                self.sta_ip = None;
                match self.policy {
                    FailurePolicy::FallbackToAp => self.enter_ap(),
                    FailurePolicy::StayFailed => {
                        self.state = State::StaFailed;
                        Vec::new()
                    }
                }
            }
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Vec<NetAction> {
        if enabled {
            self.enabled = true;
            return match self.state {
                State::Disabled => self.begin(),
                _ => Vec::new(),
            };
        }

        self.enabled = false;
        if self.state == State::Disabled {
            return Vec::new();
        }
        let actions = self.teardown();
        self.state = State::Disabled;
        actions
    }

    pub fn set_mode(&mut self, mode: ConnectivityMode) -> Vec<NetAction> {
        if mode == self.mode {
            return Vec::new();
        }
        self.mode = mode;

        let mut actions = self.teardown();
        actions.extend(self.begin());
        actions
    }

    /// Factory-reset network flow: clear credentials, become an AP.
    pub fn force_ap(&mut self) -> Vec<NetAction> {
        self.creds = None;
        self.mode = ConnectivityMode::Ap;
        self.sta_ip = None;

        let mut actions = self.teardown();
        actions.extend(self.begin());
        actions
    }

    pub fn set_ap_credentials(&mut self, ap: ApCredentials) -> Vec<NetAction> {
        self.ap = ap.clone();
        if self.state == State::ApActive {
            // Restart the broadcast in place; the portal, if any, keeps
            // serving the same address.
            vec![NetAction::StartAp(ap)]
        } else {
            Vec::new()
        }
    }

    /// New station credentials from onboarding or `/api/wifi/connect`.
    pub fn connect(&mut self, creds: WifiCredentials) -> Vec<NetAction> {
        self.creds = Some(creds.clone());
        self.mode = ConnectivityMode::Sta;
        self.enabled = true;

        let mut actions = self.teardown();
        self.state = State::StaConnecting;
        actions.push(NetAction::StartSta(creds));
        actions
    }

    fn enter_ap(&mut self) -> Vec<NetAction> {
        self.state = State::ApActive;
        self.sta_ip = None;

        let mut actions = vec![NetAction::StartAp(self.ap.clone())];
        // Onboarding case only: an AP with stored station credentials is
        // a deliberate operating mode, not a setup flow.
        if self.creds.is_none() {
            self.portal_active = true;
            actions.push(NetAction::StartPortal);
        }
        actions
    }

    fn teardown(&mut self) -> Vec<NetAction> {
        let mut actions = Vec::new();
        if self.portal_active {
            actions.push(NetAction::StopPortal);
            self.portal_active = false;
        }
        actions.push(NetAction::StopRadio);
        actions
    }

    pub fn mode(&self) -> ConnectivityMode {
        self.mode
    }

    pub fn status(&self) -> ConnectivityStatus {
        match self.state {
            State::Disabled => ConnectivityStatus::Disabled,
            State::StaConnecting => ConnectivityStatus::Connecting,
            State::StaConnected => ConnectivityStatus::Connected,
            State::StaFailed => ConnectivityStatus::Failed,
            State::ApActive => ConnectivityStatus::ApActive,
        }
    }

    pub fn portal_active(&self) -> bool {
        self.portal_active
    }

    pub fn sta_ip(&self) -> Option<Ipv4Addr> {
        self.sta_ip
    }

    pub fn last_error(&self) -> Option<ConnectError> {
        self.last_error
    }

    /// SSID relevant to the current state: the station network when
    /// connecting/connected, the broadcast SSID in AP mode.
    pub fn active_ssid(&self) -> &str {
        match self.state {
            State::ApActive => &self.ap.ssid,
            _ => self.creds.as_ref().map_or("", |creds| creds.ssid.as_str()),
        }
    }

    pub fn ap_ssid(&self) -> &str {
        &self.ap.ssid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: ConnectivityMode, ssid: &str) -> NetworkConfig {
        NetworkConfig {
            enabled: true,
            mode,
            ssid: ssid.to_string(),
            pass: if ssid.is_empty() { String::new() } else { "secret123".into() },
            ..NetworkConfig::default()
        }
    }

    fn machine(mode: ConnectivityMode, ssid: &str) -> ConnectivityMachine {
        ConnectivityMachine::new(&config(mode, ssid), [0, 0, 0, 0, 0xAB, 0xCD])
    }

    #[test]
    fn disabled_stays_disabled() {
        let mut m = ConnectivityMachine::new(
            &NetworkConfig { enabled: false, ..config(ConnectivityMode::Sta, "home") },
            [0; 6],
        );
        assert!(m.begin().is_empty());
        assert_eq!(m.status(), ConnectivityStatus::Disabled);
    }

    #[test]
    fn sta_with_credentials_attempts_connection() {
        let mut m = machine(ConnectivityMode::Sta, "home");
        let actions = m.begin();

        assert_eq!(actions.len(), 1);
        assert!(matches!(&actions[0], NetAction::StartSta(creds) if creds.ssid == "home"));
        assert_eq!(m.status(), ConnectivityStatus::Connecting);
    }

    #[test]
    fn sta_without_credentials_enters_onboarding_ap() {
        let mut m = machine(ConnectivityMode::Sta, "");
        let actions = m.begin();

        assert!(matches!(&actions[0], NetAction::StartAp(ap) if ap.ssid == "Lumen-Setup-ABCD"));
        assert_eq!(actions[1], NetAction::StartPortal);
        assert_eq!(m.status(), ConnectivityStatus::ApActive);
        assert!(m.portal_active());
    }

    #[test]
    fn ap_mode_with_credentials_skips_portal() {
        let mut m = machine(ConnectivityMode::Ap, "home");
        let actions = m.begin();

        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], NetAction::StartAp(_)));
        assert!(!m.portal_active());
    }

    #[test]
    fn successful_attempt_records_ip() {
        let mut m = machine(ConnectivityMode::Sta, "home");
        let _ = m.begin();
        let actions = m.on_sta_result(Ok(Ipv4Addr::new(192, 168, 1, 42)));

        assert!(actions.is_empty());
        assert_eq!(m.status(), ConnectivityStatus::Connected);
        assert_eq!(m.sta_ip(), Some(Ipv4Addr::new(192, 168, 1, 42)));
    }

    #[test]
    fn failed_attempt_falls_back_to_ap_by_default() {
        let mut m = machine(ConnectivityMode::Sta, "home");
        let _ = m.begin();
        let actions = m.on_sta_result(Err(ConnectError::Timeout));

        assert!(matches!(actions[0], NetAction::StartAp(_)));
        assert_eq!(m.status(), ConnectivityStatus::ApActive);
        assert_eq!(m.last_error(), Some(ConnectError::Timeout));
        // Credentials are still stored, so no onboarding portal.
        assert!(!m.portal_active());
    }

    #[test]
    fn stay_failed_policy_awaits_user_action() {
        let mut m = ConnectivityMachine::new(
            &NetworkConfig {
                failure_policy: FailurePolicy::StayFailed,
                ..config(ConnectivityMode::Sta, "home")
            },
            [0; 6],
        );
        let _ = m.begin();
        let actions = m.on_sta_result(Err(ConnectError::AuthFailed));

        assert!(actions.is_empty());
        assert_eq!(m.status(), ConnectivityStatus::Failed);
    }

    #[test]
    fn disable_tears_portal_down_before_radio() {
        let mut m = machine(ConnectivityMode::Sta, "");
        let _ = m.begin();
        assert!(m.portal_active());

        let actions = m.set_enabled(false);
        assert_eq!(actions, vec![NetAction::StopPortal, NetAction::StopRadio]);
        assert_eq!(m.status(), ConnectivityStatus::Disabled);

        // Idempotent.
        assert!(m.set_enabled(false).is_empty());
    }

    #[test]
    fn reenable_reruns_entry_logic() {
        let mut m = machine(ConnectivityMode::Sta, "home");
        let _ = m.begin();
        let _ = m.set_enabled(false);

        let actions = m.set_enabled(true);
        assert!(matches!(actions[0], NetAction::StartSta(_)));
        assert_eq!(m.status(), ConnectivityStatus::Connecting);
    }

    #[test]
    fn late_attempt_result_after_disable_still_stops_radio() {
        let mut m = machine(ConnectivityMode::Sta, "home");
        let _ = m.begin();
        let _ = m.set_enabled(false);

        let actions = m.on_sta_result(Ok(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(actions, vec![NetAction::StopRadio]);
        assert_eq!(m.status(), ConnectivityStatus::Disabled);
    }

    #[test]
    fn unchanged_mode_is_a_no_op() {
        let mut m = machine(ConnectivityMode::Sta, "home");
        let _ = m.begin();
        assert!(m.set_mode(ConnectivityMode::Sta).is_empty());
    }

    #[test]
    fn mode_switch_tears_down_then_reenters() {
        let mut m = machine(ConnectivityMode::Sta, "");
        let _ = m.begin();

        let actions = m.set_mode(ConnectivityMode::Ap);
        assert_eq!(actions[0], NetAction::StopPortal);
        assert_eq!(actions[1], NetAction::StopRadio);
        assert!(matches!(actions[2], NetAction::StartAp(_)));
        // Still no credentials stored: the portal comes back.
        assert_eq!(actions[3], NetAction::StartPortal);
    }

    #[test]
    fn force_ap_clears_credentials_and_starts_portal() {
        let mut m = machine(ConnectivityMode::Sta, "home");
        let _ = m.begin();
        let _ = m.on_sta_result(Ok(Ipv4Addr::new(192, 168, 1, 42)));

        let actions = m.force_ap();
        assert_eq!(actions[0], NetAction::StopRadio);
        assert!(matches!(actions[1], NetAction::StartAp(_)));
        assert_eq!(actions[2], NetAction::StartPortal);
        assert_eq!(m.mode(), ConnectivityMode::Ap);
        assert!(m.sta_ip().is_none());
    }

    #[test]
    fn connect_from_portal_stops_portal_first() {
        let mut m = machine(ConnectivityMode::Sta, "");
        let _ = m.begin();

        let actions = m.connect(WifiCredentials {
            ssid: "home".into(),
            pass: "secret123".into(),
        });
        assert_eq!(actions[0], NetAction::StopPortal);
        assert_eq!(actions[1], NetAction::StopRadio);
        assert!(matches!(&actions[2], NetAction::StartSta(creds) if creds.ssid == "home"));
        assert_eq!(m.status(), ConnectivityStatus::Connecting);
        assert_eq!(m.mode(), ConnectivityMode::Sta);
    }

    #[test]
    fn new_ap_credentials_restart_active_broadcast() {
        let mut m = machine(ConnectivityMode::Ap, "home");
        let _ = m.begin();

        let actions = m.set_ap_credentials(ApCredentials {
            ssid: "Workshop".into(),
            pass: "letmein12".into(),
        });
        assert!(matches!(&actions[0], NetAction::StartAp(ap) if ap.ssid == "Workshop"));

        // Not broadcasting: nothing to restart.
        let mut idle = machine(ConnectivityMode::Sta, "home");
        let _ = idle.begin();
        assert!(idle
            .set_ap_credentials(ApCredentials { ssid: "X".into(), pass: String::new() })
            .is_empty());
    }
}
