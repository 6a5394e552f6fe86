use std::net::{Ipv4Addr, SocketAddr};

use anyhow::Context;
use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tokio::{
    net::{TcpListener, UdpSocket},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use lumen_common::{ConnectivityMode, WifiCredentials};

use crate::net::NetRequest;
use crate::store::ConfigStore;

/// OS connectivity probes that must land on the onboarding page for the
/// captive-portal banner to appear.
const PROBE_PATHS: [&str; 6] = [
    "/generate_204",
    "/gen_204",
    "/hotspot-detect.html",
    "/connecttest.txt",
    "/ncsi.txt",
    "/fwlink",
];

const DNS_TTL: u32 = 60;
const DNS_MAX_PACKET: usize = 512;

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub http_addr: SocketAddr,
    pub dns_addr: SocketAddr,
}

impl PortalConfig {
    pub fn from_env() -> Self {
        Self {
            http_addr: (Ipv4Addr::UNSPECIFIED, env_port("LUMEN_PORTAL_HTTP_PORT", 80)).into(),
            dns_addr: (Ipv4Addr::UNSPECIFIED, env_port("LUMEN_PORTAL_DNS_PORT", 53)).into(),
        }
    }

    /// Ephemeral loopback ports, for host runs without root and tests.
    pub fn loopback() -> Self {
        Self {
            http_addr: (Ipv4Addr::LOCALHOST, 0).into(),
            dns_addr: (Ipv4Addr::LOCALHOST, 0).into(),
        }
    }
}

fn env_port(key: &str, fallback: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(fallback)
}

/// Running captive portal: a wildcard DNS responder plus the onboarding
/// HTTP server. Both stop when the handle is stopped.
pub struct PortalHandle {
    dns_task: JoinHandle<()>,
    http_task: JoinHandle<()>,
    pub dns_addr: SocketAddr,
    pub http_addr: SocketAddr,
}

impl PortalHandle {
    pub async fn start(
        config: &PortalConfig,
        ap_ip: Ipv4Addr,
        store: ConfigStore,
        net: mpsc::Sender<NetRequest>,
    ) -> anyhow::Result<Self> {
        let dns_socket = UdpSocket::bind(config.dns_addr)
            .await
            .with_context(|| format!("binding portal DNS socket on {}", config.dns_addr))?;
        let dns_addr = dns_socket.local_addr().context("portal DNS local addr")?;
        let dns_task = tokio::spawn(dns_responder(dns_socket, ap_ip));

        let listener = TcpListener::bind(config.http_addr)
            .await
            .with_context(|| format!("binding portal HTTP listener on {}", config.http_addr))?;
        let http_addr = listener.local_addr().context("portal HTTP local addr")?;
        let router = onboarding_router(store, net);
        let http_task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router).await {
                warn!("portal HTTP server exited: {err}");
            }
        });

        info!("captive portal up, dns {dns_addr}, http {http_addr}");
        Ok(Self { dns_task, http_task, dns_addr, http_addr })
    }

    /// DNS goes down first so clients stop being steered at a dying
    /// HTTP endpoint.
    pub async fn stop(self) {
        self.dns_task.abort();
        let _ = self.dns_task.await;
        self.http_task.abort();
        let _ = self.http_task.await;
        info!(
            "captive portal stopped, dns {}, http {}",
            self.dns_addr, self.http_addr
        );
    }
}

// --- wildcard DNS ---

async fn dns_responder(socket: UdpSocket, answer: Ipv4Addr) {
    let mut buf = [0u8; DNS_MAX_PACKET];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(err) => {
                warn!("portal DNS receive failed: {err}");
                continue;
            }
        };
        let query = &buf[..len];
        let Some(question) = parse_dns_question(query) else {
            continue;
        };
        debug!("portal DNS answering `{}` for {peer}", question.name);
        let Some(response) = build_dns_response(query, &question, answer) else {
            continue;
        };
        if let Err(err) = socket.send_to(&response, peer).await {
            warn!("portal DNS send failed: {err}");
        }
    }
}

struct DnsQuestion {
    /// Length of the encoded QNAME, including the terminating zero.
    encoded_len: usize,
    name: String,
}

/// Pulls the first question out of a DNS query packet. Returns `None`
/// for packets too short to hold a header plus one question.
fn parse_dns_question(packet: &[u8]) -> Option<DnsQuestion> {
    // Header is 12 bytes; QDCOUNT lives at offset 4.
    if packet.len() < 12 || u16::from_be_bytes([packet[4], packet[5]]) == 0 {
        return None;
    }

    let mut pos = 12;
    let mut labels = Vec::new();
    loop {
        let len = *packet.get(pos)? as usize;
        if len == 0 {
            pos += 1;
            break;
        }
        let label = packet.get(pos + 1..pos + 1 + len)?;
        labels.push(String::from_utf8_lossy(label).into_owned());
        pos += 1 + len;
    }
    // QTYPE and QCLASS must follow the name.
    if packet.len() < pos + 4 {
        return None;
    }

    Some(DnsQuestion { encoded_len: pos - 12, name: labels.join(".") })
}

/// Builds a response that answers any name with a single A record
/// pointing at the portal address.
fn build_dns_response(query: &[u8], question: &DnsQuestion, answer: Ipv4Addr) -> Option<Vec<u8>> {
    let question_end = 12 + question.encoded_len + 4;
    if query.len() < question_end {
        return None;
    }

    let mut response = Vec::with_capacity(question_end + 16);
    response.extend_from_slice(&query[..2]); // transaction id
    response.extend_from_slice(&[0x81, 0x80]); // standard response, no error
    response.extend_from_slice(&[0x00, 0x01]); // QDCOUNT
    response.extend_from_slice(&[0x00, 0x01]); // ANCOUNT
    response.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // NSCOUNT, ARCOUNT
    response.extend_from_slice(&query[12..question_end]); // question echoed back

    response.extend_from_slice(&[0xC0, 0x0C]); // pointer to the question name
    response.extend_from_slice(&[0x00, 0x01]); // TYPE A
    response.extend_from_slice(&[0x00, 0x01]); // CLASS IN
    response.extend_from_slice(&DNS_TTL.to_be_bytes());
    response.extend_from_slice(&[0x00, 0x04]); // RDLENGTH
    response.extend_from_slice(&answer.octets());
    Some(response)
}

// --- onboarding HTTP ---

#[derive(Clone)]
struct PortalState {
    store: ConfigStore,
    net: mpsc::Sender<NetRequest>,
}

pub fn onboarding_router(store: ConfigStore, net: mpsc::Sender<NetRequest>) -> Router {
    let mut router = Router::new().route("/", get(portal_index));
    for path in PROBE_PATHS {
        router = router.route(path, get(portal_index));
    }
    router
        .route("/save", post(portal_save))
        .with_state(PortalState { store, net })
}

async fn portal_index() -> Html<&'static str> {
    Html(PORTAL_INDEX_HTML)
}

#[derive(Debug, Deserialize)]
struct SaveForm {
    #[serde(default)]
    ssid: String,
    #[serde(default)]
    pass: String,
}

async fn portal_save(State(state): State<PortalState>, Form(form): Form<SaveForm>) -> Response {
    let creds = WifiCredentials { ssid: form.ssid, pass: form.pass };
    if let Err(err) = creds.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Html(format!("<p>Invalid credentials: {err}.</p><a href=\"/\">Back</a>")),
        )
            .into_response();
    }

    let mut config = match state.store.load_network().await {
        Ok(config) => config,
        Err(err) => {
            warn!("portal could not load network config: {err:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html("<p>Could not store settings, try again.</p>".to_string()),
            )
                .into_response();
        }
    };
    config.ssid = creds.ssid.clone();
    config.pass = creds.pass.clone();
    config.mode = ConnectivityMode::Sta;
    config.enabled = true;
    if let Err(err) = state.store.save_network(&config).await {
        warn!("portal could not save network config: {err:#}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html("<p>Could not store settings, try again.</p>".to_string()),
        )
            .into_response();
    }

    info!("portal stored credentials for `{}`", creds.ssid);
    // Kick the connection attempt after responding; the portal itself
    // is torn down as part of the attempt.
    if state
        .net
        .try_send(NetRequest::Connect { creds, reply: None })
        .is_err()
    {
        warn!("network task not accepting requests, credentials stored only");
    }

    Html(
        "<p>Saved. The device is now connecting to your network.</p>\
         <p>You can close this page.</p>"
            .to_string(),
    )
    .into_response()
}

const PORTAL_INDEX_HTML: &str = r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Lumen Setup</title>
  <style>
    body { font-family: sans-serif; max-width: 22rem; margin: 2rem auto; padding: 0 1rem; }
    label { display: block; margin-top: 1rem; }
    input { width: 100%; padding: .4rem; }
    button { margin-top: 1.5rem; padding: .5rem 1.5rem; }
  </style>
</head>
<body>
  <h1>Lumen Setup</h1>
  <p>Enter your WiFi network so the lamp can join it.</p>
  <form method="post" action="/save">
    <label>Network name <input name="ssid" maxlength="32" required></label>
    <label>Password <input name="pass" type="password" maxlength="63"></label>
    <button type="submit">Save</button>
  </form>
</body>
</html>
"#;
