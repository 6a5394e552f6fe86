use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use lumen_common::{ScanError, ScanSnapshot};

use crate::net::WifiDriver;

/// Single-flight WiFi scanning with a shared result cache. Any number of
/// clients may ask; at most one radio scan runs at a time.
pub struct ScanService<W> {
    driver: Arc<W>,
    running: Arc<AtomicBool>,
    cache: Arc<Mutex<Option<ScanSnapshot>>>,
}

impl<W> Clone for ScanService<W> {
    fn clone(&self) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
            running: Arc::clone(&self.running),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<W: WifiDriver> ScanService<W> {
    pub fn new(driver: Arc<W>) -> Self {
        Self {
            driver,
            running: Arc::new(AtomicBool::new(false)),
            cache: Arc::new(Mutex::new(None)),
        }
    }

    /// Kicks off a background scan. Fails if one is already in flight.
    pub fn start(&self) -> Result<(), ScanError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ScanError::AlreadyInProgress);
        }
        let service = self.clone();
        tokio::spawn(async move {
            service.run_scan().await;
        });
        Ok(())
    }

    /// Latest completed snapshot, however old.
    pub async fn results(&self) -> Result<ScanSnapshot, ScanError> {
        self.cache
            .lock()
            .await
            .clone()
            .ok_or(ScanError::NoResultsYet)
    }

    #[allow(dead_code)]
    pub fn in_progress(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Blocking variant for callers that can wait, like the on-device
    /// network picker: returns a fresh-enough cached snapshot, or runs a
    /// scan inline.
    #[allow(dead_code)]
    pub async fn scan(&self, force: bool) -> Result<ScanSnapshot, ScanError> {
        if !force {
            if let Some(snapshot) = self.cache.lock().await.clone() {
                if snapshot.is_fresh(Utc::now().timestamp()) {
                    debug!("serving cached scan results");
                    return Ok(snapshot);
                }
            }
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ScanError::AlreadyInProgress);
        }
        self.run_scan().await;
        self.results().await
    }

    /// `running` is held for the whole scan and cleared here, success or
    /// not. A failed scan keeps the previous snapshot.
    async fn run_scan(&self) {
        match self.driver.scan().await {
            Ok(networks) => {
                let snapshot = ScanSnapshot::new(networks, Utc::now().timestamp());
                debug!("scan finished, {} networks", snapshot.networks.len());
                *self.cache.lock().await = Some(snapshot);
            }
            Err(err) => warn!("scan failed: {err:#}"),
        }
        self.running.store(false, Ordering::SeqCst);
    }
}
