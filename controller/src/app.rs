use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use lumen_common::{DeviceLightState, LightConfig, NetworkConfig};

use crate::api::{self, AppState};
use crate::net::{self, SimWifi, STA_CONNECT_TIMEOUT};
use crate::portal::PortalConfig;
use crate::scan::ScanService;
use crate::store::{ConfigStore, DeviceStateStore};

const COMMIT_INTERVAL: Duration = Duration::from_secs(10);

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = ConfigStore::from_env();
    let light_config = store.load_light().await.unwrap_or_else(|err| {
        warn!("failed to load light config from store: {err:#}");
        LightConfig::default()
    });
    let network_config = store.load_network().await.unwrap_or_else(|err| {
        warn!("failed to load network config from store: {err:#}");
        NetworkConfig::default()
    });

    let driver = Arc::new(SimWifi::from_env());
    let light = DeviceStateStore::new(store.clone(), DeviceLightState::from(light_config));
    let net = net::spawn(
        Arc::clone(&driver),
        store.clone(),
        &network_config,
        PortalConfig::from_env(),
        STA_CONNECT_TIMEOUT,
    );
    let scan = ScanService::new(driver);

    spawn_commit_loop(light.clone());

    let app_state = AppState { light, net, scan, store };
    let web_root = format!("{}/web", env!("CARGO_MANIFEST_DIR"));
    let app: Router = api::router(app_state).fallback_service(ServeDir::new(web_root));

    let port = std::env::var("LUMEN_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr: SocketAddr = format!("0.0.0.0:{port}")
        .parse()
        .context("invalid HTTP listen address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Retries failed persists and picks up mutations that reached the store
/// between request-driven commits.
fn spawn_commit_loop(light: DeviceStateStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(COMMIT_INTERVAL);
        loop {
            interval.tick().await;
            light.commit().await;
        }
    });
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        return;
    }
    info!("shutting down");
}
