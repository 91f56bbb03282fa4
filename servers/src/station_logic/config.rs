use clap::Parser;
use lib_common::ingestors::WcsHubConfig;
use serde::{Deserialize, Serialize};
use station_sync::SyncConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "station_monitor.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Live station occupancy and goods monitor", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "STATION_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "STATION_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(
        long,
        env = "STATION_LOG_LEVEL",
        help = "Logging level or filter directive (trace, debug, info, warn, error)."
    )]
    pub log_level: Option<String>,

    #[clap(
        long,
        env = "STATION_WMS_URL",
        help = "Base URL of the warehouse API (.../api/warehouse)."
    )]
    pub wms_base_url: Option<String>,

    #[clap(long, env = "STATION_WCS_URL", help = "Base URL of the control API (.../api/WCS).")]
    pub wcs_base_url: Option<String>,

    #[clap(long, env = "STATION_HUB_URL", help = "URL of the WCS device hub.")]
    pub hub_url: Option<String>,

    #[clap(
        long,
        env = "STATION_CODES",
        value_delimiter = ',',
        help = "Comma separated station slot codes."
    )]
    pub stations: Option<Vec<String>>,

    #[clap(
        long,
        env = "STATION_MONITOR",
        value_delimiter = ',',
        help = "Stations monitored from startup."
    )]
    pub monitor: Option<Vec<String>>,

    #[clap(
        long,
        env = "STATION_REFRESH_INTERVAL_SECS",
        help = "Background refresh period for occupied stations."
    )]
    pub refresh_interval_secs: Option<u64>,

    #[clap(
        long,
        env = "STATION_REQUEST_TIMEOUT_MS",
        help = "Timeout in milliseconds for each HTTP request."
    )]
    pub request_timeout_ms: Option<u64>,

    #[clap(long, env = "STATION_MAX_RETRIES", help = "Retries for transient HTTP failures.")]
    pub max_retries: Option<u32>,

    #[clap(
        long,
        env = "STATION_RECONNECT_BASE_DELAY_MS",
        help = "Base delay in milliseconds for hub reconnect attempts."
    )]
    pub reconnect_base_delay_ms: Option<u64>,

    #[clap(
        long,
        env = "STATION_RECONNECT_MAX_DELAY_MS",
        help = "Maximum delay in milliseconds for hub reconnect attempts."
    )]
    pub reconnect_max_delay_ms: Option<u64>,
}

impl Config {
    // 'other' wins wherever it has a value
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            wms_base_url: other.wms_base_url.or(self.wms_base_url),
            wcs_base_url: other.wcs_base_url.or(self.wcs_base_url),
            hub_url: other.hub_url.or(self.hub_url),
            stations: other.stations.or(self.stations),
            monitor: other.monitor.or(self.monitor),
            refresh_interval_secs: other.refresh_interval_secs.or(self.refresh_interval_secs),
            request_timeout_ms: other.request_timeout_ms.or(self.request_timeout_ms),
            max_retries: other.max_retries.or(self.max_retries),
            reconnect_base_delay_ms: other.reconnect_base_delay_ms.or(self.reconnect_base_delay_ms),
            reconnect_max_delay_ms: other.reconnect_max_delay_ms.or(self.reconnect_max_delay_ms),
        }
    }

    fn defaults() -> Config {
        let hub = WcsHubConfig::default();
        Config {
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            wms_base_url: Some("http://10.20.88.14:8008/api/warehouse".to_string()),
            wcs_base_url: Some("http://10.20.88.14:8009/api/WCS".to_string()),
            hub_url: Some(hub.hub_url),
            stations: Some(SyncConfig::default().stations),
            monitor: Some(Vec::new()),
            refresh_interval_secs: Some(SyncConfig::default().refresh_interval_secs),
            request_timeout_ms: Some(10_000),
            max_retries: Some(2),
            reconnect_base_delay_ms: Some(hub.reconnect_base_delay.as_millis() as u64),
            reconnect_max_delay_ms: Some(hub.reconnect_max_delay.as_millis() as u64),
            ..Default::default()
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.unwrap_or(10_000))
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(2)
    }

    /// Stations monitored from startup.
    pub fn initial_monitors(&self) -> Vec<String> {
        self.monitor.clone().unwrap_or_default()
    }

    pub fn sync_config(&self) -> SyncConfig {
        let mut sync = SyncConfig::default();
        if let Some(stations) = self.stations.as_ref().filter(|s| !s.is_empty()) {
            sync.stations = stations.iter().map(|s| s.trim().to_string()).collect();
        }
        if let Some(secs) = self.refresh_interval_secs {
            sync.refresh_interval_secs = secs;
        }
        sync
    }

    pub fn hub_config(&self) -> WcsHubConfig {
        let mut hub = WcsHubConfig::default();
        if let Some(url) = &self.hub_url {
            hub.hub_url = url.clone();
        }
        if let Some(ms) = self.reconnect_base_delay_ms {
            hub.reconnect_base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.reconnect_max_delay_ms {
            hub.reconnect_max_delay = Duration::from_millis(ms);
        }
        hub
    }
}

/// Reads a JSON config file. `None` when missing or unreadable, so the
/// remaining sources still apply.
fn read_file_config(path: &Path) -> Option<Config> {
    if !path.exists() {
        eprintln!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            path.display()
        );
        return None;
    }
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Failed to read config file {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str::<Config>(&text) {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("Failed to parse config file {}: {}", path.display(), e);
            None
        }
    }
}

/// defaults <- file <- environment/CLI
pub fn resolve_config(cli: Config) -> Config {
    let path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut config = Config::defaults();
    if let Some(file_config) = read_file_config(&path) {
        config = config.merge(file_config);
    }
    config.merge(cli)
}

pub fn load_config() -> Config {
    // .env is optional
    let _ = dotenvy::dotenv();
    resolve_config(Config::parse())
}
