use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use lumen_common::{
    preset_names, preset_state, ApplyPolicy, ConcurrencyTimeout, LightChange, MiscConfig,
    ValidationError, WifiCredentials,
};

use crate::net::{NetHandle, WifiDriver};
use crate::scan::ScanService;
use crate::store::{ApplyError, ConfigStore, DeviceStateStore};

pub struct AppState<W> {
    pub light: DeviceStateStore,
    pub net: NetHandle,
    pub scan: ScanService<W>,
    pub store: ConfigStore,
}

impl<W> Clone for AppState<W> {
    fn clone(&self) -> Self {
        Self {
            light: self.light.clone(),
            net: self.net.clone(),
            scan: self.scan.clone(),
            store: self.store.clone(),
        }
    }
}

pub fn router<W: WifiDriver>(state: AppState<W>) -> Router {
    Router::new()
        .route("/api/light", get(get_light::<W>).post(post_light::<W>))
        .route("/api/presets", get(get_presets::<W>))
        .route("/api/preset/{name}", post(post_preset::<W>))
        .route("/api/lang", get(get_lang::<W>).post(post_lang::<W>))
        .route("/api/wifi/reset", post(post_wifi_reset::<W>))
        .route("/api/wifi/status", get(get_wifi_status::<W>))
        .route("/api/wifi/scan", get(get_wifi_scan::<W>))
        .route("/api/wifi/results", get(get_wifi_results::<W>))
        .route("/api/wifi/connect", post(post_wifi_connect::<W>))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, code: &str) -> Response {
    (status, Json(ErrorBody { error: code.to_string() })).into_response()
}

fn apply_error_response(err: ApplyError) -> Response {
    match err {
        ApplyError::Validation(err) => error_response(StatusCode::BAD_REQUEST, err.code()),
        ApplyError::Busy(ConcurrencyTimeout) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "busy")
        }
    }
}

async fn get_light<W: WifiDriver>(State(state): State<AppState<W>>) -> Response {
    match state.light.read().await {
        Ok(light) => Json(light).into_response(),
        Err(ConcurrencyTimeout) => error_response(StatusCode::SERVICE_UNAVAILABLE, "busy"),
    }
}

#[derive(Debug, Deserialize)]
struct LightBody {
    r: Option<i64>,
    g: Option<i64>,
    b: Option<i64>,
    intensity: Option<i64>,
}

async fn post_light<W: WifiDriver>(
    State(state): State<AppState<W>>,
    Json(body): Json<LightBody>,
) -> Response {
    let (Some(r), Some(g), Some(b), Some(intensity)) = (body.r, body.g, body.b, body.intensity)
    else {
        return error_response(StatusCode::BAD_REQUEST, ValidationError::MissingField.code());
    };

    let change = LightChange::Set { r, g, b, intensity };
    match state.light.apply(change, ApplyPolicy::Reject).await {
        Ok(next) => {
            state.light.commit().await;
            Json(next).into_response()
        }
        Err(err) => apply_error_response(err),
    }
}

async fn get_presets<W: WifiDriver>(State(_): State<AppState<W>>) -> Response {
    Json(preset_names()).into_response()
}

async fn post_preset<W: WifiDriver>(
    State(state): State<AppState<W>>,
    Path(name): Path<String>,
) -> Response {
    let Some(preset) = preset_state(&name) else {
        return error_response(StatusCode::NOT_FOUND, "preset_not_found");
    };

    let change = LightChange::Set {
        r: i64::from(preset.r),
        g: i64::from(preset.g),
        b: i64::from(preset.b),
        intensity: i64::from(preset.intensity_pct),
    };
    match state.light.apply(change, ApplyPolicy::Reject).await {
        Ok(next) => {
            state.light.commit().await;
            Json(next).into_response()
        }
        Err(err) => apply_error_response(err),
    }
}

async fn get_lang<W: WifiDriver>(State(state): State<AppState<W>>) -> Response {
    match state.store.load_misc().await {
        Ok(misc) => Json(misc).into_response(),
        Err(err) => {
            warn!("failed to load misc config: {err:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage")
        }
    }
}

#[derive(Debug, Deserialize)]
struct LangBody {
    lang: Option<i64>,
}

async fn post_lang<W: WifiDriver>(
    State(state): State<AppState<W>>,
    Json(body): Json<LangBody>,
) -> Response {
    let Some(lang) = body.lang else {
        return error_response(StatusCode::BAD_REQUEST, ValidationError::MissingField.code());
    };
    if !(0..=1).contains(&lang) {
        return error_response(StatusCode::BAD_REQUEST, ValidationError::OutOfRange.code());
    }

    let misc = MiscConfig { lang: lang as u8 };
    match state.store.save_misc(&misc).await {
        Ok(()) => Json(misc).into_response(),
        Err(err) => {
            warn!("failed to persist misc config: {err:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage")
        }
    }
}

async fn post_wifi_reset<W: WifiDriver>(State(state): State<AppState<W>>) -> Response {
    info!("wifi reset requested over the API");
    state.net.force_ap().await;
    (
        StatusCode::OK,
        "WiFi credentials cleared; the device is starting its setup network.\n",
    )
        .into_response()
}

async fn get_wifi_status<W: WifiDriver>(State(state): State<AppState<W>>) -> Response {
    Json(state.net.status()).into_response()
}

async fn get_wifi_scan<W: WifiDriver>(State(state): State<AppState<W>>) -> Response {
    if let Ok(snapshot) = state.scan.results().await {
        if snapshot.is_fresh(Utc::now().timestamp()) {
            return Json(snapshot).into_response();
        }
    }
    match state.scan.start() {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "scanning": true }))).into_response(),
        Err(_) => error_response(StatusCode::TOO_MANY_REQUESTS, "scan_in_progress"),
    }
}

async fn get_wifi_results<W: WifiDriver>(State(state): State<AppState<W>>) -> Response {
    match state.scan.results().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(_) => error_response(StatusCode::NOT_FOUND, "no_results"),
    }
}

#[derive(Debug, Deserialize)]
struct ConnectBody {
    ssid: Option<String>,
    password: Option<String>,
}

async fn post_wifi_connect<W: WifiDriver>(
    State(state): State<AppState<W>>,
    Json(body): Json<ConnectBody>,
) -> Response {
    let Some(ssid) = body.ssid else {
        return error_response(StatusCode::BAD_REQUEST, "INVALID_INPUT");
    };
    let creds = WifiCredentials { ssid, pass: body.password.unwrap_or_default() };
    if creds.validate().is_err() {
        return error_response(StatusCode::BAD_REQUEST, "INVALID_INPUT");
    }

    match state.net.connect(creds).await {
        Ok(ip) => Json(json!({ "connected": true, "ip": ip.to_string() })).into_response(),
        Err(err) => Json(json!({ "connected": false, "error": err.code() })).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{self, SimNetwork, SimWifi, STA_CONNECT_TIMEOUT};
    use crate::portal::PortalConfig;
    use crate::store::ConfigStore;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use lumen_common::{DeviceLightState, NetworkConfig};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct Harness {
        router: Router,
        light: DeviceStateStore,
        store: ConfigStore,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        harness_with_latency(Duration::from_millis(20))
    }

    fn harness_with_latency(latency: Duration) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path().to_path_buf());
        let driver = Arc::new(SimWifi::new(
            vec![
                SimNetwork { ssid: "home".into(), pass: "secret123".into(), rssi: -48, secure: true },
                SimNetwork { ssid: "cafe-guest".into(), pass: String::new(), rssi: -74, secure: false },
            ],
            latency,
        ));

        let light = DeviceStateStore::new(store.clone(), DeviceLightState::default());
        let net = net::spawn(
            Arc::clone(&driver),
            store.clone(),
            &NetworkConfig::default(),
            PortalConfig::loopback(),
            STA_CONNECT_TIMEOUT,
        );
        let scan = ScanService::new(driver);

        let router = router(AppState {
            light: light.clone(),
            net,
            scan,
            store: store.clone(),
        });
        Harness { router, light, store, _dir: dir }
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::String(
                String::from_utf8_lossy(&bytes).into_owned(),
            ))
        };
        (status, value)
    }

    fn get(path: &str) -> Request<Body> {
        Request::get(path).body(Body::empty()).unwrap()
    }

    fn post_json(path: &str, body: Value) -> Request<Body> {
        Request::post(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn light_round_trip_updates_and_echoes() {
        let h = harness();
        let (status, body) = send(
            &h.router,
            post_json("/api/light", json!({"r": 10, "g": 20, "b": 30, "intensity": 40})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["intensity"], 40);

        let (status, body) = send(&h.router, get("/api/light")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"r": 10, "g": 20, "b": 30, "intensity": 40}));
    }

    #[tokio::test]
    async fn out_of_range_post_is_rejected_and_state_unchanged() {
        let h = harness();
        let (status, body) = send(
            &h.router,
            post_json("/api/light", json!({"r": 999, "g": 0, "b": 0, "intensity": 50})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "out_of_range");

        assert_eq!(h.light.read().await.unwrap(), DeviceLightState::default());
    }

    #[tokio::test]
    async fn missing_field_is_its_own_error() {
        let h = harness();
        let (status, body) = send(
            &h.router,
            post_json("/api/light", json!({"r": 1, "g": 2, "b": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing_field");
    }

    #[tokio::test]
    async fn light_post_commits_to_disk() {
        let h = harness();
        send(
            &h.router,
            post_json("/api/light", json!({"r": 1, "g": 2, "b": 3, "intensity": 4})),
        )
        .await;
        let persisted = h.store.load_light().await.unwrap();
        assert_eq!((persisted.r, persisted.intensity_pct), (1, 4));
    }

    #[tokio::test]
    async fn presets_list_and_apply() {
        let h = harness();
        let (status, body) = send(&h.router, get("/api/presets")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["warm", "cool", "sunset"]));

        let (status, body) = send(
            &h.router,
            post_json("/api/preset/Sunset", Value::Null),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"r": 255, "g": 100, "b": 40, "intensity": 100}));
    }

    #[tokio::test]
    async fn unknown_preset_is_404() {
        let h = harness();
        let (status, body) = send(&h.router, post_json("/api/preset/disco", Value::Null)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "preset_not_found");
    }

    #[tokio::test]
    async fn lang_round_trips_and_rejects_unknown_ids() {
        let h = harness();
        let (status, body) = send(&h.router, get("/api/lang")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"lang": 0}));

        let (status, body) = send(&h.router, post_json("/api/lang", json!({"lang": 1}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"lang": 1}));
        assert_eq!(h.store.load_misc().await.unwrap().lang, 1);

        let (status, body) = send(&h.router, post_json("/api/lang", json!({"lang": 7}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "out_of_range");
    }

    #[tokio::test]
    async fn connect_end_to_end_reports_and_persists() {
        let h = harness();
        let (status, body) = send(
            &h.router,
            post_json("/api/wifi/connect", json!({"ssid": "home", "password": "secret123"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connected"], true);
        assert_eq!(body["ip"], "192.168.1.50");

        let (_, status_body) = send(&h.router, get("/api/wifi/status")).await;
        assert_eq!(status_body["mode"], "STA");
        assert_eq!(status_body["status"], "CONNECTED");
        assert_eq!(status_body["ssid"], "home");

        assert_eq!(h.store.load_network().await.unwrap().ssid, "home");
    }

    #[tokio::test]
    async fn connect_failure_carries_machine_readable_code() {
        let h = harness();
        let (status, body) = send(
            &h.router,
            post_json("/api/wifi/connect", json!({"ssid": "home", "password": "nope1234"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connected"], false);
        assert_eq!(body["error"], "AUTH_FAILED");
    }

    #[tokio::test]
    async fn connect_input_is_validated_before_the_radio() {
        let h = harness();
        let (status, body) = send(
            &h.router,
            post_json("/api/wifi/connect", json!({"password": "secret123"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_INPUT");

        let long = "x".repeat(40);
        let (status, _) = send(
            &h.router,
            post_json("/api/wifi/connect", json!({"ssid": long, "password": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn scan_endpoint_starts_then_rejects_concurrent_then_serves() {
        let h = harness_with_latency(Duration::from_millis(150));

        let (status, body) = send(&h.router, get("/api/wifi/scan")).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["scanning"], true);

        let (status, body) = send(&h.router, get("/api/wifi/scan")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "scan_in_progress");

        tokio::time::sleep(Duration::from_millis(300)).await;
        let (status, body) = send(&h.router, get("/api/wifi/scan")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["networks"][0]["ssid"], "home");
    }

    #[tokio::test]
    async fn results_are_404_until_a_scan_completed() {
        let h = harness();
        let (status, body) = send(&h.router, get("/api/wifi/results")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "no_results");
    }

    #[tokio::test]
    async fn reset_returns_plain_text_and_enters_setup() {
        let h = harness();
        send(
            &h.router,
            post_json("/api/wifi/connect", json!({"ssid": "home", "password": "secret123"})),
        )
        .await;

        let (status, _) = send(
            &h.router,
            Request::post("/api/wifi/reset").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let (_, body) = send(&h.router, get("/api/wifi/status")).await;
        assert_eq!(body["status"], "AP_ACTIVE");
        assert_eq!(body["mode"], "AP");
        assert!(h.store.load_network().await.unwrap().ssid.is_empty());
    }
}
