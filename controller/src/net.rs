use std::{future::Future, net::Ipv4Addr, sync::Arc, time::Duration};

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{info, warn};

use lumen_common::{
    ApCredentials, ConnectError, ConnectivityMachine, ConnectivityMode, ConnectivityStatus,
    NetAction, NetworkConfig, ScanEntry, WifiCredentials, WifiStatusView,
};

use crate::portal::{PortalConfig, PortalHandle};
use crate::store::ConfigStore;

/// Bound on a station connection attempt.
pub const STA_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

const REQUEST_QUEUE_DEPTH: usize = 16;

/// Radio access seam. The controller logic never touches hardware
/// directly; a real build implements this against the platform WiFi
/// stack, the host build ships [`SimWifi`].
pub trait WifiDriver: Send + Sync + 'static {
    fn mac(&self) -> [u8; 6];
    fn connect(
        &self,
        creds: &WifiCredentials,
    ) -> impl Future<Output = Result<Ipv4Addr, ConnectError>> + Send;
    fn start_ap(&self, ap: &ApCredentials) -> impl Future<Output = anyhow::Result<Ipv4Addr>> + Send;
    fn stop(&self) -> impl Future<Output = ()> + Send;
    fn scan(&self) -> impl Future<Output = anyhow::Result<Vec<ScanEntry>>> + Send;
    fn link_rssi(&self) -> impl Future<Output = Option<i32>> + Send;
}

#[derive(Debug, Clone)]
pub struct SimNetwork {
    pub ssid: String,
    pub pass: String,
    pub rssi: i32,
    pub secure: bool,
}

#[derive(Debug)]
enum SimLink {
    Down,
    Sta { rssi: i32 },
    Ap,
}

/// Simulated WiFi neighborhood for host runs and tests. Entries come from
/// `LUMEN_SIM_NETWORKS` (`ssid:pass:rssi[:open]`, comma separated) or a
/// built-in default set.
pub struct SimWifi {
    mac: [u8; 6],
    networks: Vec<SimNetwork>,
    latency: Duration,
    link: Mutex<SimLink>,
}

impl SimWifi {
    pub fn from_env() -> Self {
        let networks = std::env::var("LUMEN_SIM_NETWORKS")
            .ok()
            .map(|raw| parse_sim_networks(&raw))
            .filter(|networks| !networks.is_empty())
            .unwrap_or_else(default_neighborhood);
        Self::new(networks, Duration::from_millis(200))
    }

    pub fn new(networks: Vec<SimNetwork>, latency: Duration) -> Self {
        Self {
            mac: [0x4C, 0x11, 0xAE, 0x5F, 0x12, 0xAB],
            networks,
            latency,
            link: Mutex::new(SimLink::Down),
        }
    }
}

fn default_neighborhood() -> Vec<SimNetwork> {
    vec![
        SimNetwork { ssid: "home".into(), pass: "secret123".into(), rssi: -48, secure: true },
        SimNetwork { ssid: "workshop".into(), pass: "hackme42".into(), rssi: -61, secure: true },
        SimNetwork { ssid: "cafe-guest".into(), pass: String::new(), rssi: -74, secure: false },
    ]
}

fn parse_sim_networks(raw: &str) -> Vec<SimNetwork> {
    raw.split(',')
        .filter_map(|entry| {
            let mut parts = entry.trim().split(':');
            let ssid = parts.next()?.to_string();
            if ssid.is_empty() {
                return None;
            }
            let pass = parts.next().unwrap_or_default().to_string();
            let rssi = parts.next().and_then(|v| v.parse().ok()).unwrap_or(-60);
            let open = parts.next() == Some("open") || pass.is_empty();
            Some(SimNetwork { ssid, pass, rssi, secure: !open })
        })
        .collect()
}

impl WifiDriver for SimWifi {
    fn mac(&self) -> [u8; 6] {
        self.mac
    }

    async fn connect(&self, creds: &WifiCredentials) -> Result<Ipv4Addr, ConnectError> {
        tokio::time::sleep(self.latency).await;

        let (index, network) = self
            .networks
            .iter()
            .enumerate()
            .find(|(_, network)| network.ssid == creds.ssid)
            .ok_or(ConnectError::SsidNotFound)?;
        if network.secure && network.pass != creds.pass {
            return Err(ConnectError::AuthFailed);
        }

        let rssi = network.rssi;
        *self.link.lock().await = SimLink::Sta { rssi };
        Ok(Ipv4Addr::new(192, 168, 1, 50 + index as u8))
    }

    async fn start_ap(&self, _ap: &ApCredentials) -> anyhow::Result<Ipv4Addr> {
        *self.link.lock().await = SimLink::Ap;
        Ok(Ipv4Addr::new(192, 168, 4, 1))
    }

    async fn stop(&self) {
        *self.link.lock().await = SimLink::Down;
    }

    async fn scan(&self) -> anyhow::Result<Vec<ScanEntry>> {
        tokio::time::sleep(self.latency).await;
        Ok(self
            .networks
            .iter()
            .map(|network| ScanEntry {
                ssid: network.ssid.clone(),
                rssi: network.rssi,
                secure: network.secure,
            })
            .collect())
    }

    async fn link_rssi(&self) -> Option<i32> {
        match *self.link.lock().await {
            SimLink::Sta { rssi } => Some(rssi),
            _ => None,
        }
    }
}

/// Requests to the network-owning task. Every other actor goes through
/// this queue; nothing else reconfigures the radio.
#[derive(Debug)]
pub enum NetRequest {
    SetEnabled(bool),
    SetMode(ConnectivityMode),
    Connect {
        creds: WifiCredentials,
        reply: Option<oneshot::Sender<Result<Ipv4Addr, ConnectError>>>,
    },
    ForceAp,
    SetApCredentials(ApCredentials),
}

#[derive(Clone)]
pub struct NetHandle {
    tx: mpsc::Sender<NetRequest>,
    status: watch::Receiver<WifiStatusView>,
}

impl NetHandle {
    pub fn status(&self) -> WifiStatusView {
        self.status.borrow().clone()
    }

    /// Waits until the published status satisfies the predicate. Used by
    /// actors that need to observe a transition rather than poll.
    #[allow(dead_code)]
    pub async fn status_when(
        &self,
        mut predicate: impl FnMut(&WifiStatusView) -> bool,
    ) -> WifiStatusView {
        let mut rx = self.status.clone();
        loop {
            if predicate(&rx.borrow()) {
                return rx.borrow().clone();
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    pub async fn connect(&self, creds: WifiCredentials) -> Result<Ipv4Addr, ConnectError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(NetRequest::Connect { creds, reply: Some(reply_tx) })
            .await
            .is_err()
        {
            return Err(ConnectError::Unknown);
        }
        reply_rx.await.unwrap_or(Err(ConnectError::Unknown))
    }

    pub async fn force_ap(&self) {
        let _ = self.tx.send(NetRequest::ForceAp).await;
    }

    // Seams for the physical UI task; only tests drive these today.
    #[allow(dead_code)]
    pub async fn set_enabled(&self, enabled: bool) {
        let _ = self.tx.send(NetRequest::SetEnabled(enabled)).await;
    }

    #[allow(dead_code)]
    pub async fn set_mode(&self, mode: ConnectivityMode) {
        let _ = self.tx.send(NetRequest::SetMode(mode)).await;
    }

    #[allow(dead_code)]
    pub async fn set_ap_credentials(&self, ap: ApCredentials) {
        let _ = self.tx.send(NetRequest::SetApCredentials(ap)).await;
    }
}

/// Spawns the network-owning task and runs the boot entry logic for the
/// persisted `(enabled, mode)`.
pub fn spawn<W: WifiDriver>(
    driver: Arc<W>,
    store: ConfigStore,
    config: &NetworkConfig,
    portal_config: PortalConfig,
    sta_timeout: Duration,
) -> NetHandle {
    let machine = ConnectivityMachine::new(config, driver.mac());
    let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
    let (status_tx, status_rx) = watch::channel(WifiStatusView {
        mode: machine.mode().as_str(),
        status: machine.status().as_str(),
        ssid: String::new(),
        ip: String::new(),
        rssi: None,
    });

    let task = NetworkTask {
        driver,
        machine,
        store,
        status_tx,
        portal: None,
        portal_config,
        portal_tx: tx.clone(),
        ap_ip: None,
        sta_timeout,
    };
    tokio::spawn(task.run(rx));

    NetHandle { tx, status: status_rx }
}

struct NetworkTask<W: WifiDriver> {
    driver: Arc<W>,
    machine: ConnectivityMachine,
    store: ConfigStore,
    status_tx: watch::Sender<WifiStatusView>,
    portal: Option<PortalHandle>,
    portal_config: PortalConfig,
    portal_tx: mpsc::Sender<NetRequest>,
    ap_ip: Option<Ipv4Addr>,
    sta_timeout: Duration,
}

impl<W: WifiDriver> NetworkTask<W> {
    async fn run(mut self, mut rx: mpsc::Receiver<NetRequest>) {
        let actions = self.machine.begin();
        self.execute(actions).await;
        self.publish_status().await;

        while let Some(request) = rx.recv().await {
            self.handle(request).await;
            self.publish_status().await;
        }

        // Request side dropped: tear everything down before exiting.
        let actions = self.machine.set_enabled(false);
        self.execute(actions).await;
    }

    async fn handle(&mut self, request: NetRequest) {
        match request {
            NetRequest::SetEnabled(enabled) => {
                self.persist_network(|config| config.enabled = enabled).await;
                let actions = self.machine.set_enabled(enabled);
                self.execute(actions).await;
            }
            NetRequest::SetMode(mode) => {
                if mode == self.machine.mode() {
                    return;
                }
                self.persist_network(|config| config.mode = mode).await;
                let actions = self.machine.set_mode(mode);
                self.execute(actions).await;
            }
            NetRequest::Connect { creds, reply } => {
                self.persist_network(|config| {
                    config.ssid = creds.ssid.clone();
                    config.pass = creds.pass.clone();
                    config.mode = ConnectivityMode::Sta;
                    config.enabled = true;
                })
                .await;

                let actions = self.machine.connect(creds);
                let outcome = self.execute(actions).await;
                if let Some(reply) = reply {
                    let _ = reply.send(outcome.unwrap_or(Err(ConnectError::Unknown)));
                }
            }
            NetRequest::ForceAp => {
                self.persist_network(|config| {
                    config.ssid.clear();
                    config.pass.clear();
                    config.mode = ConnectivityMode::Ap;
                })
                .await;
                let actions = self.machine.force_ap();
                self.execute(actions).await;
            }
            NetRequest::SetApCredentials(ap) => {
                if ap.validate().is_err() {
                    warn!("rejecting AP credentials with invalid bounds");
                    return;
                }
                self.persist_network(|config| {
                    config.ap_ssid = ap.ssid.clone();
                    config.ap_pass = ap.pass.clone();
                })
                .await;
                let actions = self.machine.set_ap_credentials(ap);
                self.execute(actions).await;
            }
        }
    }

    /// Executes machine actions in order. Returns the outcome of a
    /// station attempt when one was part of the batch.
    async fn execute(&mut self, actions: Vec<NetAction>) -> Option<Result<Ipv4Addr, ConnectError>> {
        let mut outcome = None;
        for action in actions {
            if let NetAction::StartSta(creds) = action {
                self.publish_status().await;
                info!("connecting to `{}`", creds.ssid);

                let result = match tokio::time::timeout(
                    self.sta_timeout,
                    self.driver.connect(&creds),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ConnectError::Timeout),
                };
                match &result {
                    Ok(ip) => info!("station connected, ip {ip}"),
                    Err(err) => warn!("station attempt failed: {}", err.code()),
                }

                // Follow-up actions never include another attempt.
                let follow = self.machine.on_sta_result(result);
                for follow_action in follow {
                    self.execute_one(follow_action).await;
                }
                outcome = Some(result);
            } else {
                self.execute_one(action).await;
            }
        }
        outcome
    }

    async fn execute_one(&mut self, action: NetAction) {
        match action {
            NetAction::StartSta(_) => unreachable!("handled in execute"),
            NetAction::StartAp(ap) => match self.driver.start_ap(&ap).await {
                Ok(ip) => {
                    info!("access point `{}` up at {ip}", ap.ssid);
                    self.ap_ip = Some(ip);
                }
                Err(err) => warn!("failed to start access point: {err:#}"),
            },
            NetAction::StartPortal => {
                let Some(ap_ip) = self.ap_ip else {
                    warn!("portal requested without an AP address");
                    return;
                };
                match PortalHandle::start(
                    &self.portal_config,
                    ap_ip,
                    self.store.clone(),
                    self.portal_tx.clone(),
                )
                .await
                {
                    Ok(portal) => self.portal = Some(portal),
                    Err(err) => warn!("failed to start captive portal: {err:#}"),
                }
            }
            NetAction::StopPortal => {
                if let Some(portal) = self.portal.take() {
                    portal.stop().await;
                }
            }
            NetAction::StopRadio => {
                self.driver.stop().await;
                self.ap_ip = None;
            }
        }
    }

    async fn persist_network(&self, mutate: impl FnOnce(&mut NetworkConfig)) {
        match self.store.load_network().await {
            Ok(mut config) => {
                mutate(&mut config);
                if let Err(err) = self.store.save_network(&config).await {
                    warn!("network config persist failed: {err:#}");
                }
            }
            Err(err) => warn!("network config load failed, skipping persist: {err:#}"),
        }
    }

    async fn publish_status(&self) {
        let status = self.machine.status();
        let ip = match status {
            ConnectivityStatus::Connected => self.machine.sta_ip().map(|ip| ip.to_string()),
            ConnectivityStatus::ApActive => self.ap_ip.map(|ip| ip.to_string()),
            _ => None,
        };

        let view = WifiStatusView {
            mode: self.machine.mode().as_str(),
            status: status.as_str(),
            ssid: self.machine.active_ssid().to_string(),
            ip: ip.unwrap_or_default(),
            rssi: self.driver.link_rssi().await,
        };
        self.status_tx.send_replace(view);
    }
}
