//! Camera records, resolved stream targets and their storage.
//!
//! These are the plain data records exchanged with the streaming, recording
//! and persistence collaborators.

use crate::auth::Credential;
use crate::config::{DEFAULT_ONVIF_PORT, DEFAULT_RTSP_PORT, OnvifConfig};
use crate::error::{Error, Result};
use crate::onvif::OnvifPtzClient;
use crate::rtsp::ProbeResult;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use uuid::Uuid;

const CAMERAS_FILE: &str = "cameras.json";
const DEFAULT_RTSP_PATH: &str = "/stream1";

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?)*$")
        .expect("static regex")
});

/// Check a host string is a dotted IPv4 address or an RFC 1123 hostname.
pub fn validate_host(host: &str) -> Result<()> {
    let host = host.trim();
    let invalid = || Error::Configuration(format!("invalid host: {:?}", host));
    if host.is_empty() || host.len() > 253 {
        return Err(invalid());
    }
    // All-numeric dotted strings must be a real address, not a "hostname"
    if host.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return host.parse::<Ipv4Addr>().map(|_| ()).map_err(|_| invalid());
    }
    if HOSTNAME.is_match(host) {
        Ok(())
    } else {
        Err(invalid())
    }
}

pub fn validate_port(port: u16) -> Result<()> {
    if port == 0 {
        return Err(Error::Configuration("port must be 1-65535".to_string()));
    }
    Ok(())
}

/// `rtsp://` or `rtsps://` URL with a host.
pub fn is_valid_rtsp_url(value: &str) -> bool {
    match url::Url::parse(value.trim()) {
        Ok(url) => {
            matches!(url.scheme(), "rtsp" | "rtsps")
                && url.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

/// Build `rtsp://[user[:pass]@]host:port/path` with percent-encoded userinfo.
pub fn build_rtsp_url(
    host: &str,
    port: u16,
    path: &str,
    username: Option<&str>,
    password: Option<&str>,
) -> String {
    let base = if path.starts_with('/') {
        format!("rtsp://{}:{}{}", host, port, path)
    } else {
        format!("rtsp://{}:{}/{}", host, port, path)
    };
    let Some(username) = username.filter(|u| !u.is_empty()) else {
        return base;
    };

    match url::Url::parse(&base) {
        Ok(mut url) => {
            let password = password.filter(|p| !p.is_empty());
            if url.set_username(username).is_ok() && url.set_password(password).is_ok() {
                url.to_string()
            } else {
                base
            }
        }
        Err(e) => {
            tracing::warn!("Could not add credentials to {}: {}", base, e);
            base
        }
    }
}

/// PTZ support of a camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PtzCapability {
    #[default]
    None,
    Onvif,
}

/// Resolved stream location handed to streaming and recording consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamTarget {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl StreamTarget {
    pub fn from_probe(host: &str, port: u16, result: &ProbeResult) -> Self {
        Self {
            host: host.to_string(),
            port,
            path: result.path.clone(),
            username: result.username.clone(),
            password: result.password.clone(),
        }
    }

    pub fn url(&self) -> String {
        build_rtsp_url(
            &self.host,
            self.port,
            &self.path,
            self.username.as_deref(),
            self.password.as_deref(),
        )
    }
}

/// A saved camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Camera {
    pub id: Uuid,
    pub name: String,
    pub host: String,
    pub rtsp_port: u16,
    pub rtsp_path: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub onvif_port: u16,
    #[serde(default)]
    pub ptz_capability: PtzCapability,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

fn enabled_default() -> bool {
    true
}

impl Camera {
    /// New camera with default ports and path. Fails on an invalid host.
    pub fn new(name: impl Into<String>, host: &str) -> Result<Self> {
        validate_host(host)?;
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            host: host.trim().to_string(),
            rtsp_port: DEFAULT_RTSP_PORT,
            rtsp_path: DEFAULT_RTSP_PATH.to_string(),
            username: String::new(),
            password: String::new(),
            onvif_port: DEFAULT_ONVIF_PORT,
            ptz_capability: PtzCapability::None,
            enabled: true,
            created_at: Utc::now(),
        })
    }

    /// Camera record for a successful probe.
    pub fn from_probe(name: impl Into<String>, host: &str, port: u16, result: &ProbeResult) -> Result<Self> {
        validate_port(port)?;
        let mut camera = Self::new(name, host)?;
        camera.rtsp_port = port;
        camera.rtsp_path = result.path.clone();
        camera.username = result.username.clone().unwrap_or_default();
        camera.password = result.password.clone().unwrap_or_default();
        Ok(camera)
    }

    pub fn rtsp_url(&self) -> String {
        self.stream_target().url()
    }

    pub fn stream_target(&self) -> StreamTarget {
        let username = (!self.username.is_empty()).then(|| self.username.clone());
        StreamTarget {
            host: self.host.clone(),
            port: self.rtsp_port,
            path: self.rtsp_path.clone(),
            password: username.as_ref().map(|_| self.password.clone()),
            username,
        }
    }

    pub fn credential(&self) -> Credential {
        Credential::new(self.username.clone(), self.password.clone())
    }

    /// PTZ client for this camera, or `None` when it has no ONVIF PTZ.
    pub fn ptz_client(&self, config: &OnvifConfig) -> Result<Option<OnvifPtzClient>> {
        match self.ptz_capability {
            PtzCapability::None => Ok(None),
            PtzCapability::Onvif => OnvifPtzClient::with_config(
                &self.host,
                self.onvif_port,
                self.credential(),
                config,
            )
            .map(Some),
        }
    }

    fn matches(&self, name_or_id: &str) -> bool {
        self.name.eq_ignore_ascii_case(name_or_id) || self.id.to_string() == name_or_id
    }
}

/// Provider and sink for camera records.
pub trait CameraStore {
    fn list(&self) -> Result<Vec<Camera>>;

    /// Find by name (case-insensitive) or id.
    fn get(&self, name_or_id: &str) -> Result<Option<Camera>> {
        Ok(self.list()?.into_iter().find(|c| c.matches(name_or_id)))
    }

    /// Insert, or replace the record with the same id or name.
    fn save(&self, camera: &Camera) -> Result<()>;

    /// Returns whether a record was removed.
    fn remove(&self, name_or_id: &str) -> Result<bool>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CameraFile {
    cameras: Vec<Camera>,
}

/// Camera records in a JSON file.
#[derive(Debug, Clone)]
pub struct JsonCameraStore {
    path: PathBuf,
}

impl JsonCameraStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `cameras.json` in the user's local data directory.
    pub fn default_location() -> Result<Self> {
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .ok_or_else(|| Error::Storage("could not find data directory".to_string()))?;
        Ok(Self::new(data_dir.join("camprobe").join(CAMERAS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<CameraFile> {
        if !self.path.exists() {
            tracing::debug!("No camera file at {}, starting empty", self.path.display());
            return Ok(CameraFile::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Storage(format!("failed to parse {}: {}", self.path.display(), e)))
    }

    fn store(&self, file: &CameraFile) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(file)
            .map_err(|e| Error::Storage(format!("failed to serialize cameras: {}", e)))?;
        std::fs::write(&self.path, content)?;
        tracing::debug!("Saved {} camera(s) to {}", file.cameras.len(), self.path.display());
        Ok(())
    }
}

impl CameraStore for JsonCameraStore {
    fn list(&self) -> Result<Vec<Camera>> {
        Ok(self.load()?.cameras)
    }

    fn save(&self, camera: &Camera) -> Result<()> {
        let mut file = self.load()?;
        file.cameras
            .retain(|c| c.id != camera.id && !c.name.eq_ignore_ascii_case(&camera.name));
        file.cameras.push(camera.clone());
        self.store(&file)
    }

    fn remove(&self, name_or_id: &str) -> Result<bool> {
        let mut file = self.load()?;
        let before = file.cameras.len();
        file.cameras.retain(|c| !c.matches(name_or_id));
        if file.cameras.len() == before {
            return Ok(false);
        }
        self.store(&file)?;
        Ok(true)
    }
}
