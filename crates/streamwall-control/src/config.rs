//! Control plane configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use streamwall_protocols::{ReconnectPolicy, StreamWindowConfig};
use tracing::warn;
use url::Url;

/// Configuration for a Streamwall control node.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Wall geometry; `grid_count²` view slots
    pub window: StreamWindowConfig,

    /// Polling interval for JSON feeds
    pub data_interval: Duration,

    /// Remote JSON stream lists
    pub json_urls: Vec<String>,

    /// Local TOML stream files
    pub toml_files: Vec<PathBuf>,

    /// Control relay to keep an uplink to
    pub control_endpoint: Option<Url>,

    /// Listen address for direct peer connections
    pub listen_addr: Option<SocketAddr>,

    /// Persisted custom streams and view assignments
    pub storage_path: PathBuf,

    /// Sender id stamped on outgoing messages
    pub client_id: String,

    /// Minimum interval between persistence writes
    pub persist_interval: Duration,

    pub reconnect: ReconnectPolicy,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ControlConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary `STREAMWALL_*` variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = StreamWindowConfig::default();
        let window = StreamWindowConfig {
            grid_count: grid_count(&lookup, defaults.grid_count),
            width: parse_or(&lookup, "STREAMWALL_WINDOW_WIDTH", defaults.width),
            height: parse_or(&lookup, "STREAMWALL_WINDOW_HEIGHT", defaults.height),
            x: parse_opt(&lookup, "STREAMWALL_WINDOW_X"),
            y: parse_opt(&lookup, "STREAMWALL_WINDOW_Y"),
            frameless: parse_or(&lookup, "STREAMWALL_WINDOW_FRAMELESS", defaults.frameless),
            active_color: lookup("STREAMWALL_ACTIVE_COLOR").unwrap_or(defaults.active_color),
            background_color: lookup("STREAMWALL_BACKGROUND_COLOR").unwrap_or(defaults.background_color),
        };

        let data_interval = Duration::from_secs(parse_or(&lookup, "STREAMWALL_DATA_INTERVAL", 30u64).max(1));

        let json_urls = list(&lookup, "STREAMWALL_JSON_URLS");
        let toml_files = list(&lookup, "STREAMWALL_TOML_FILES")
            .into_iter()
            .map(PathBuf::from)
            .collect();

        let control_endpoint = lookup("STREAMWALL_CONTROL_ENDPOINT")
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| match Url::parse(s.trim()) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(value = %s, error = %e, "ignoring invalid STREAMWALL_CONTROL_ENDPOINT");
                    None
                }
            });

        let listen_addr = parse_opt(&lookup, "STREAMWALL_LISTEN_ADDR");

        let storage_path = lookup("STREAMWALL_STORAGE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./streamwall-storage.json"));

        let client_id = lookup("STREAMWALL_CLIENT_ID").unwrap_or_else(|| hex::encode(rand::random::<[u8; 8]>()));

        Self {
            window,
            data_interval,
            json_urls,
            toml_files,
            control_endpoint,
            listen_addr,
            storage_path,
            client_id,
            persist_interval: Duration::from_secs(1),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Number of view slots on the wall.
    pub fn slot_count(&self) -> usize {
        self.window.slot_count()
    }
}

fn grid_count<F>(lookup: &F, default: usize) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    let requested = parse_or(lookup, "STREAMWALL_GRID_COUNT", default);
    let clamped = requested.clamp(1, StreamWindowConfig::MAX_GRID_COUNT);
    if clamped != requested {
        warn!(requested, clamped, "STREAMWALL_GRID_COUNT out of range");
    }
    clamped
}

fn parse_opt<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    parse_opt(lookup, key).unwrap_or(default)
}

fn list<F>(lookup: &F, key: &str) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|s| s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect())
        .unwrap_or_default()
}
