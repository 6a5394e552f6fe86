use std::{io::ErrorKind, path::PathBuf, sync::Arc, time::Duration};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

use lumen_common::{
    ApplyPolicy, ConcurrencyTimeout, DeviceLightState, LightChange, LightConfig, MiscConfig,
    NetworkConfig, ValidationError,
};

/// Bound on waiting for the shared light state. Callers that miss it skip
/// the tick instead of stalling a render or request path.
const LOCK_WAIT: Duration = Duration::from_millis(50);

const LIGHT_FILE: &str = "light.json";
const NETWORK_FILE: &str = "network.json";
const MISC_FILE: &str = "misc.json";

/// Key/value persistence gateway: one JSON file per namespace under the
/// data dir. Reads of a missing namespace yield defaults; writes replace
/// the whole file behind a single lock.
#[derive(Clone)]
pub struct ConfigStore {
    data_dir: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl ConfigStore {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("LUMEN_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.lumen"));
        Self::at(data_dir)
    }

    pub fn at(data_dir: PathBuf) -> Self {
        Self {
            data_dir: Arc::new(data_dir),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load<T: DeserializeOwned + Default>(&self, file: &str) -> anyhow::Result<T> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.data_dir.join(file)).await {
            Ok(raw) => Ok(serde_json::from_slice::<T>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(T::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save<T: Serialize>(&self, file: &str, value: &T) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        tokio::fs::create_dir_all(self.data_dir.as_ref()).await?;
        let payload = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(self.data_dir.join(file), payload).await?;
        Ok(())
    }

    pub async fn load_light(&self) -> anyhow::Result<LightConfig> {
        let mut config: LightConfig = self.load(LIGHT_FILE).await?;
        config.sanitize();
        Ok(config)
    }

    pub async fn save_light(&self, config: &LightConfig) -> anyhow::Result<()> {
        self.save(LIGHT_FILE, config).await
    }

    pub async fn load_network(&self) -> anyhow::Result<NetworkConfig> {
        let mut config: NetworkConfig = self.load(NETWORK_FILE).await?;
        config.sanitize();
        Ok(config)
    }

    pub async fn save_network(&self, config: &NetworkConfig) -> anyhow::Result<()> {
        self.save(NETWORK_FILE, config).await
    }

    pub async fn load_misc(&self) -> anyhow::Result<MiscConfig> {
        self.load(MISC_FILE).await
    }

    pub async fn save_misc(&self, config: &MiscConfig) -> anyhow::Result<()> {
        self.save(MISC_FILE, config).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Busy(#[from] ConcurrencyTimeout),
}

#[derive(Debug)]
struct Inner {
    state: DeviceLightState,
    dirty: bool,
    generation: u64,
}

/// Concurrency-safe shared light state. One mutator at a time; readers
/// always see all four fields from the same mutation. Persistence happens
/// only on explicit `commit` boundaries to bound storage wear.
#[derive(Clone)]
pub struct DeviceStateStore {
    inner: Arc<Mutex<Inner>>,
    store: ConfigStore,
}

impl DeviceStateStore {
    pub fn new(store: ConfigStore, initial: DeviceLightState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: initial,
                dirty: false,
                generation: 0,
            })),
            store,
        }
    }

    async fn lock_bounded(&self) -> Result<tokio::sync::MutexGuard<'_, Inner>, ConcurrencyTimeout> {
        tokio::time::timeout(LOCK_WAIT, self.inner.lock())
            .await
            .map_err(|_| ConcurrencyTimeout)
    }

    pub async fn read(&self) -> Result<DeviceLightState, ConcurrencyTimeout> {
        Ok(self.lock_bounded().await?.state)
    }

    pub async fn apply(
        &self,
        change: LightChange,
        policy: ApplyPolicy,
    ) -> Result<DeviceLightState, ApplyError> {
        let mut inner = self.lock_bounded().await?;
        let next = inner.state.apply(change, policy)?;
        inner.state = next;
        inner.dirty = true;
        inner.generation += 1;
        Ok(next)
    }

    /// Persists the current snapshot iff it changed since the last
    /// successful commit. Failures are logged and retried on the next
    /// commit; callers of `read`/`apply` are never blocked or failed by
    /// storage.
    pub async fn commit(&self) {
        let (snapshot, generation) = {
            let inner = match self.lock_bounded().await {
                Ok(inner) => inner,
                // Skip this cycle; the dirty flag survives.
                Err(ConcurrencyTimeout) => return,
            };
            if !inner.dirty {
                return;
            }
            (inner.state, inner.generation)
        };

        match self.store.save_light(&LightConfig::from(snapshot)).await {
            Ok(()) => {
                if let Ok(mut inner) = self.lock_bounded().await {
                    // A mutation that landed mid-write stays dirty.
                    if inner.generation == generation {
                        inner.dirty = false;
                    }
                }
            }
            Err(err) => {
                warn!("light state persist failed, retrying on next commit: {err:#}");
            }
        }
    }

    #[cfg(test)]
    async fn is_dirty(&self) -> bool {
        self.inner.lock().await.dirty
    }

    #[cfg(test)]
    fn hold_lock(&self) -> impl std::future::Future<Output = tokio::sync::OwnedMutexGuard<Inner>> {
        Arc::clone(&self.inner).lock_owned()
    }
}
