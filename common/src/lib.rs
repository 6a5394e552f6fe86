pub mod config;
pub mod connectivity;
pub mod error;
pub mod light;
pub mod scan;
pub mod types;

pub use config::{ApCredentials, LightConfig, MiscConfig, NetworkConfig, WifiCredentials};
pub use connectivity::{ConnectivityMachine, NetAction};
pub use error::{ConcurrencyTimeout, ConnectError, ScanError, ValidationError};
pub use light::{preset_names, preset_state, ApplyPolicy, DeviceLightState, LightChange, LightChannel};
pub use scan::{ScanEntry, ScanSnapshot};
pub use types::{ConnectivityMode, ConnectivityStatus, FailurePolicy, WifiStatusView};
