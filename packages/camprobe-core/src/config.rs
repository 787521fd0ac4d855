//! Runtime configuration.
//!
//! Priority (highest first):
//! 1. Environment variables (`CAMPROBE_SUBNET`, `CAMPROBE_RTSP_PORT`)
//! 2. Config file (`~/.config/camprobe/config.toml`)
//! 3. Built-in defaults

use crate::auth::Credential;
use crate::discovery::SubnetBase;
use crate::rtsp::dictionary;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable forcing the scanned subnet (e.g. "192.168.1")
pub const ENV_SUBNET: &str = "CAMPROBE_SUBNET";

/// Environment variable overriding the RTSP port
pub const ENV_RTSP_PORT: &str = "CAMPROBE_RTSP_PORT";

pub const DEFAULT_RTSP_PORT: u16 = 554;
pub const DEFAULT_ONVIF_PORT: u16 = 80;
pub const DEFAULT_PROFILE_TOKEN: &str = "Profile_1";
pub const DEFAULT_USER_AGENT: &str = "camprobe";

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    scan: Option<ScanSection>,
    rtsp: Option<RtspSection>,
    onvif: Option<OnvifSection>,
}

#[derive(Debug, Deserialize, Default)]
struct ScanSection {
    /// Port probed on every subnet address
    port: Option<u16>,
    /// Simultaneous connect attempts
    concurrency: Option<usize>,
    connect_timeout_ms: Option<u64>,
    discovery_timeout_ms: Option<u64>,
    /// Run the WS-Discovery phase before the port scan
    ws_discovery: Option<bool>,
    /// Three-octet subnet base, skips interface detection
    subnet: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RtspSection {
    timeout_ms: Option<u64>,
    user_agent: Option<String>,
    /// Replaces the built-in path dictionary
    paths: Option<Vec<String>>,
    /// Replaces the built-in factory credential list
    credentials: Option<Vec<Credential>>,
}

#[derive(Debug, Deserialize, Default)]
struct OnvifSection {
    port: Option<u16>,
    timeout_ms: Option<u64>,
    profile_token: Option<String>,
}

/// Network scan settings
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub port: u16,
    pub concurrency: usize,
    pub connect_timeout: Duration,
    pub discovery_timeout: Duration,
    pub ws_discovery: bool,
    pub subnet: Option<SubnetBase>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_RTSP_PORT,
            concurrency: 30,
            connect_timeout: Duration::from_secs(1),
            discovery_timeout: Duration::from_secs(3),
            ws_discovery: true,
            subnet: None,
        }
    }
}

/// RTSP prober settings
#[derive(Debug, Clone)]
pub struct RtspConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub paths: Vec<String>,
    pub credentials: Vec<Credential>,
}

impl Default for RtspConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            paths: dictionary::default_paths(),
            credentials: dictionary::default_credentials(),
        }
    }
}

/// ONVIF PTZ client settings
#[derive(Debug, Clone)]
pub struct OnvifConfig {
    pub port: u16,
    pub timeout: Duration,
    pub profile_token: String,
}

impl Default for OnvifConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_ONVIF_PORT,
            timeout: Duration::from_secs(5),
            profile_token: DEFAULT_PROFILE_TOKEN.to_string(),
        }
    }
}

/// Effective configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub scan: ScanConfig,
    pub rtsp: RtspConfig,
    pub onvif: OnvifConfig,
    /// Highest-priority layer that contributed a value
    pub source: ConfigSource,
}

/// Where the configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigSource {
    /// Using default hardcoded values
    #[default]
    Default,
    /// Loaded from config file
    ConfigFile,
    /// Loaded from environment variable
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::ConfigFile => write!(f, "config file"),
            ConfigSource::Environment => write!(f, "environment variable"),
        }
    }
}

/// Get the path to the configuration file
fn get_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("camprobe").join("config.toml"))
}

/// Load configuration from the config file
fn load_config_file(path: &Path) -> Option<ConfigFile> {
    if !path.exists() {
        return None;
    }

    match fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!("Loaded config from {:?}", path);
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read config file {:?}: {}", path, e);
            None
        }
    }
}

/// Load configuration from the default file location and the process environment.
pub fn load_config() -> Config {
    let file = get_config_file_path().and_then(|p| load_config_file(&p));
    build_config(file, |key| std::env::var(key).ok())
}

/// Load configuration from an explicit file, still honouring the environment.
pub fn load_config_from(path: &Path) -> Config {
    build_config(load_config_file(path), |key| std::env::var(key).ok())
}

fn build_config(file: Option<ConfigFile>, env: impl Fn(&str) -> Option<String>) -> Config {
    let mut config = Config::default();

    if let Some(file) = file {
        config.source = ConfigSource::ConfigFile;
        apply_file(&mut config, file);
    }

    if let Some(raw) = env(ENV_SUBNET) {
        match raw.parse::<SubnetBase>() {
            Ok(subnet) => {
                tracing::info!("Using subnet from environment variable: {}", subnet);
                config.scan.subnet = Some(subnet);
                config.source = ConfigSource::Environment;
            }
            Err(e) => tracing::warn!("Ignoring {}={:?}: {}", ENV_SUBNET, raw, e),
        }
    }

    if let Some(raw) = env(ENV_RTSP_PORT) {
        match raw.trim().parse::<u16>() {
            Ok(port) if port > 0 => {
                tracing::info!("Using RTSP port from environment variable: {}", port);
                config.scan.port = port;
                config.source = ConfigSource::Environment;
            }
            _ => tracing::warn!("Ignoring {}={:?}: not a port number", ENV_RTSP_PORT, raw),
        }
    }

    config
}

fn apply_file(config: &mut Config, file: ConfigFile) {
    if let Some(scan) = file.scan {
        if let Some(port) = scan.port.filter(|p| *p > 0) {
            config.scan.port = port;
        }
        match scan.concurrency {
            Some(0) => tracing::warn!("scan.concurrency must be at least 1, keeping default"),
            Some(n) => config.scan.concurrency = n,
            None => {}
        }
        if let Some(ms) = scan.connect_timeout_ms.filter(|ms| *ms > 0) {
            config.scan.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = scan.discovery_timeout_ms {
            config.scan.discovery_timeout = Duration::from_millis(ms);
        }
        if let Some(enabled) = scan.ws_discovery {
            config.scan.ws_discovery = enabled;
        }
        if let Some(raw) = scan.subnet {
            match raw.parse::<SubnetBase>() {
                Ok(subnet) => config.scan.subnet = Some(subnet),
                Err(e) => tracing::warn!("Ignoring scan.subnet {:?}: {}", raw, e),
            }
        }
    }

    if let Some(rtsp) = file.rtsp {
        if let Some(ms) = rtsp.timeout_ms.filter(|ms| *ms > 0) {
            config.rtsp.timeout = Duration::from_millis(ms);
        }
        if let Some(agent) = rtsp.user_agent.filter(|a| !a.trim().is_empty()) {
            config.rtsp.user_agent = agent;
        }
        if let Some(paths) = rtsp.paths.filter(|p| !p.is_empty()) {
            config.rtsp.paths = paths;
        }
        if let Some(credentials) = rtsp.credentials {
            config.rtsp.credentials = credentials;
        }
    }

    if let Some(onvif) = file.onvif {
        if let Some(port) = onvif.port.filter(|p| *p > 0) {
            config.onvif.port = port;
        }
        if let Some(ms) = onvif.timeout_ms.filter(|ms| *ms > 0) {
            config.onvif.timeout = Duration::from_millis(ms);
        }
        if let Some(token) = onvif.profile_token.filter(|t| !t.trim().is_empty()) {
            config.onvif.profile_token = token;
        }
    }
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/camprobe/config.toml".to_string())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# camprobe configuration
# Place this file at: ~/.config/camprobe/config.toml

[scan]
# port = 554
# concurrency = 30
# connect_timeout_ms = 1000
# discovery_timeout_ms = 3000
# ws_discovery = true
# subnet = "192.168.1"

[rtsp]
# timeout_ms = 2000
# user_agent = "camprobe"
# paths = ["/live/ch00_0", "/stream1"]
# credentials = [{ username = "admin", password = "admin" }]

[onvif]
# port = 80
# timeout_ms = 5000
# profile_token = "Profile_1"
"#
    .to_string()
}
