use crate::errors::SettingsError;
use config::{Config, Environment, File, FileFormat};
use hex::FromHex;
use interledger_packet::{Address, AddressPrefix};
use interledger_service::AccountId;
use parking_lot::RwLock;
use serde::{de::Error as DeserializeError, Deserialize, Deserializer};
use std::{sync::Arc, time::Duration};

// The route expiry is also the hold-down time we advertise, so it should
// stay comfortably above the broadcast interval.
const DEFAULT_ROUTE_EXPIRY_MS: u64 = 30000;
const DEFAULT_BROADCAST_INTERVAL_MS: u64 = 30000;
const DEFAULT_MAX_EPOCH_LOG_LEN: usize = 10000;

/// Live settings handle. Readers always see the latest values.
pub type SharedSettings = Arc<RwLock<ConnectorSettings>>;

fn default_global_prefix() -> AddressPrefix {
    AddressPrefix::global()
}

fn default_route_expiry_ms() -> u64 {
    DEFAULT_ROUTE_EXPIRY_MS
}

fn default_broadcast_interval_ms() -> u64 {
    DEFAULT_BROADCAST_INTERVAL_MS
}

fn default_max_epoch_log_len() -> usize {
    DEFAULT_MAX_EPOCH_LOG_LEN
}

fn deserialize_32_bytes_hex<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
where
    D: Deserializer<'de>,
{
    <[u8; 32]>::from_hex(String::deserialize(deserializer)?).map_err(|err| {
        DeserializeError::custom(format!(
            "Invalid hex value (must be 32 hex-encoded bytes): {:?}",
            err
        ))
    })
}

/// A route that always sends `target_prefix` to the given peer, regardless of
/// what the peers advertise.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct StaticRoute {
    pub target_prefix: AddressPrefix,
    pub peer_account_id: AccountId,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GlobalRoutingSettings {
    /// Root of the address space we route in. Routes outside of it are neither
    /// accepted nor advertised.
    #[serde(default = "default_global_prefix")]
    pub global_prefix: AddressPrefix,
    /// Key used to authenticate the routes we originate.
    #[serde(deserialize_with = "deserialize_32_bytes_hex")]
    pub routing_secret: [u8; 32],
    /// Send everything we have no better route for to our parent.
    #[serde(default)]
    pub use_parent_for_default_route: bool,
    /// Next hop of the default route when `use_parent_for_default_route` is off.
    #[serde(default)]
    pub default_route: Option<AccountId>,
    #[serde(default)]
    pub static_routes: Vec<StaticRoute>,
    #[serde(default = "default_route_expiry_ms")]
    pub route_expiry_ms: u64,
    #[serde(default = "default_broadcast_interval_ms")]
    pub route_broadcast_interval_ms: u64,
    /// Number of epochs of route updates kept for peers that fall behind.
    #[serde(default = "default_max_epoch_log_len")]
    pub max_epoch_log_len: usize,
}

impl GlobalRoutingSettings {
    pub fn new(routing_secret: [u8; 32]) -> Self {
        GlobalRoutingSettings {
            global_prefix: default_global_prefix(),
            routing_secret,
            use_parent_for_default_route: false,
            default_route: None,
            static_routes: Vec::new(),
            route_expiry_ms: DEFAULT_ROUTE_EXPIRY_MS,
            route_broadcast_interval_ms: DEFAULT_BROADCAST_INTERVAL_MS,
            max_epoch_log_len: DEFAULT_MAX_EPOCH_LOG_LEN,
        }
    }

    pub fn route_expiry(&self) -> Duration {
        Duration::from_millis(self.route_expiry_ms)
    }

    pub fn route_broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.route_broadcast_interval_ms)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ConnectorSettings {
    /// ILP address of this node
    pub operator_address: Address,
    pub global_routing_settings: GlobalRoutingSettings,
}

impl ConnectorSettings {
    pub fn new(operator_address: Address, global_routing_settings: GlobalRoutingSettings) -> Self {
        ConnectorSettings {
            operator_address,
            global_routing_settings,
        }
    }

    /// Load settings from an optional config file (TOML, JSON or YAML,
    /// detected from the extension) with `ILP_` environment variables taking
    /// precedence. Nested keys use `__` as a separator, for example
    /// `ILP_GLOBAL_ROUTING_SETTINGS__ROUTING_SECRET`.
    pub fn load(config_path: Option<&str>) -> Result<Self, SettingsError> {
        let mut config = Config::new();
        if let Some(path) = config_path {
            config.merge(File::with_name(path))?;
        }
        config.merge(Environment::with_prefix("ILP").separator("__"))?;
        Ok(config.try_into()?)
    }

    pub fn from_toml(toml: &str) -> Result<Self, SettingsError> {
        let mut config = Config::new();
        config.merge(File::from_str(toml, FileFormat::Toml))?;
        Ok(config.try_into()?)
    }

    pub fn into_shared(self) -> SharedSettings {
        Arc::new(RwLock::new(self))
    }
}
