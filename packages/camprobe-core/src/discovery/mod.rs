//! Camera discovery on the local network.
//!
//! A scan runs two phases. WS-Discovery multicasts an ONVIF probe and
//! collects responders, then a TCP connect sweep of the local /24 looks for
//! an open RTSP port on every host discovery did not already report.

pub mod network;
pub mod port_scan;
pub mod ws_discovery;

pub use network::{NetworkInfo, SubnetBase, get_full_network_info, local_subnet};
pub use port_scan::{PortProbe, PortScanner};
pub use ws_discovery::{DiscoveryResponse, WsDiscoveryClient};

use crate::config::ScanConfig;
use crate::diagnostics::{self, Diagnostic, DiagnosticsSink};
use crate::error::Result;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Share of overall progress given to the WS-Discovery phase
const DISCOVERY_SHARE: f64 = 0.3;

/// How a host was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    WsDiscovery,
    PortScan,
}

impl std::fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoverySource::WsDiscovery => write!(f, "ONVIF"),
            DiscoverySource::PortScan => write!(f, "RTSP scan"),
        }
    }
}

/// A candidate camera found during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredHost {
    pub host: Ipv4Addr,
    pub port: u16,
    pub source: DiscoverySource,
    pub display_name: Option<String>,
}

/// Progress updates during a scan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub stage: ScanStage,
    pub message: String,
    pub fraction: f64,
    pub hosts_found: usize,
    pub elapsed_secs: f64,
}

/// Stages of a scan session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanStage {
    Starting,
    WsDiscovery,
    PortScan,
    Complete,
    Cancelled,
}

/// Point-in-time copy of the scanner's published state
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    pub hosts: Vec<DiscoveredHost>,
    pub progress: f64,
    pub status: String,
    pub is_scanning: bool,
}

#[derive(Debug, Default)]
struct ScanState {
    published: ScanSnapshot,
    stage: Option<ScanStage>,
    /// Bumped on every start and stop; updates tagged with an older
    /// generation are dropped.
    generation: u64,
    started: Option<Instant>,
}

struct Session {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

struct Inner {
    config: ScanConfig,
    discovery: WsDiscoveryClient,
    sink: Option<DiagnosticsSink>,
    state: RwLock<ScanState>,
    session: Mutex<Option<Session>>,
}

/// Two-phase scan orchestrator.
///
/// Single-flight: `start_scan` while a scan is running does nothing.
/// Cloning yields another handle to the same scanner.
#[derive(Clone)]
pub struct NetworkScanner {
    inner: Arc<Inner>,
}

impl NetworkScanner {
    pub fn new(config: ScanConfig) -> Self {
        let discovery = WsDiscoveryClient::new(config.discovery_timeout);
        Self {
            inner: Arc::new(Inner {
                config,
                discovery,
                sink: None,
                state: RwLock::new(ScanState::default()),
                session: Mutex::new(None),
            }),
        }
    }

    /// Receive progress, status and host events as they happen.
    pub fn with_diagnostics(self, sink: DiagnosticsSink) -> Self {
        self.rebuild(|inner| inner.sink = Some(sink))
    }

    /// Replace the WS-Discovery client, e.g. to probe a unicast address.
    pub fn with_discovery_client(self, client: WsDiscoveryClient) -> Self {
        self.rebuild(|inner| inner.discovery = client)
    }

    fn rebuild(self, apply: impl FnOnce(&mut Inner)) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                apply(&mut inner);
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(shared) => {
                let mut inner = Inner {
                    config: shared.config.clone(),
                    discovery: shared.discovery.clone(),
                    sink: shared.sink.clone(),
                    state: RwLock::new(ScanState::default()),
                    session: Mutex::new(None),
                };
                apply(&mut inner);
                Self {
                    inner: Arc::new(inner),
                }
            }
        }
    }

    /// Begin a scan in the background. Returns `false` (and does nothing)
    /// when a scan is already running. Must be called within a tokio runtime.
    pub fn start_scan(&self) -> bool {
        let mut session = lock(&self.inner.session);
        let Some(generation) = self.inner.begin() else {
            tracing::debug!("Scan already running, ignoring start");
            return false;
        };

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_scan(
            Arc::clone(&self.inner),
            generation,
            cancel.clone(),
        ));
        *session = Some(Session {
            cancel,
            handle: Some(handle),
        });
        true
    }

    /// Cancel the running scan. Safe to call repeatedly or when idle; the
    /// cancelled status is published once.
    pub fn stop_scan(&self) {
        let session = lock(&self.inner.session);
        if let Some(session) = session.as_ref() {
            session.cancel.cancel();
        }

        let progress = {
            let mut state = write(&self.inner.state);
            if !state.published.is_scanning {
                return;
            }
            state.generation += 1;
            state.stage = Some(ScanStage::Cancelled);
            state.published.is_scanning = false;
            state.published.status = "Scan cancelled".to_string();
            state.published.progress
        };
        drop(session);

        tracing::info!("[Scan] Scan cancelled");
        self.inner
            .emit_progress(ScanStage::Cancelled, "Scan cancelled", progress);
        diagnostics::emit(
            &self.inner.sink,
            Diagnostic::Status("Scan cancelled".to_string()),
        );
    }

    /// Wait for the current scan task to finish.
    pub async fn wait(&self) {
        let handle = lock(&self.inner.session)
            .as_mut()
            .and_then(|s| s.handle.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!("Scan task ended abnormally: {}", e);
            }
        }
    }

    /// Run a full scan and return the hosts it found.
    pub async fn scan(&self) -> Vec<DiscoveredHost> {
        self.start_scan();
        self.wait().await;
        self.discovered_hosts()
    }

    pub fn discovered_hosts(&self) -> Vec<DiscoveredHost> {
        read(&self.inner.state).published.hosts.clone()
    }

    pub fn progress(&self) -> f64 {
        read(&self.inner.state).published.progress
    }

    pub fn status_message(&self) -> String {
        read(&self.inner.state).published.status.clone()
    }

    pub fn is_scanning(&self) -> bool {
        read(&self.inner.state).published.is_scanning
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        read(&self.inner.state).published.clone()
    }
}

impl Inner {
    /// Reset published state for a new session and return its generation,
    /// or `None` while a session is live.
    fn begin(&self) -> Option<u64> {
        let generation = {
            let mut state = write(&self.state);
            if state.published.is_scanning {
                return None;
            }
            state.generation += 1;
            state.started = Some(Instant::now());
            state.stage = Some(ScanStage::Starting);
            state.published = ScanSnapshot {
                hosts: Vec::new(),
                progress: 0.0,
                status: "Starting scan...".to_string(),
                is_scanning: true,
            };
            state.generation
        };
        self.publish(ScanStage::Starting, "Starting scan...", 0.0, generation);
        Some(generation)
    }

    /// Apply `update` if `generation` is still the live session.
    fn update<T>(&self, generation: u64, update: impl FnOnce(&mut ScanState) -> T) -> Option<T> {
        let mut state = write(&self.state);
        if state.generation != generation || !state.published.is_scanning {
            return None;
        }
        Some(update(&mut state))
    }

    /// Set stage, status and progress, then log and notify.
    fn publish(&self, stage: ScanStage, message: &str, fraction: f64, generation: u64) {
        let applied = self.update(generation, |state| {
            state.stage = Some(stage);
            state.published.status = message.to_string();
            state.published.progress = state.published.progress.max(fraction);
            state.published.progress
        });
        if let Some(fraction) = applied {
            tracing::info!("[Scan] {}", message);
            self.emit_progress(stage, message, fraction);
            diagnostics::emit(&self.sink, Diagnostic::Status(message.to_string()));
        }
    }

    /// Raise progress without changing the status line.
    fn advance(&self, fraction: f64, generation: u64) {
        let applied = self.update(generation, |state| {
            let before = state.published.progress;
            state.published.progress = before.max(fraction);
            let stage = state.stage.unwrap_or(ScanStage::PortScan);
            (stage, state.published.status.clone(), state.published.progress, before)
        });
        if let Some((stage, message, now, before)) = applied {
            if now > before {
                self.emit_progress(stage, &message, now);
            }
        }
    }

    fn emit_progress(&self, stage: ScanStage, message: &str, fraction: f64) {
        if self.sink.is_none() {
            return;
        }
        let (hosts_found, elapsed_secs) = {
            let state = read(&self.state);
            (
                state.published.hosts.len(),
                state
                    .started
                    .map(|s| s.elapsed().as_secs_f64())
                    .unwrap_or_default(),
            )
        };
        diagnostics::emit(
            &self.sink,
            Diagnostic::Scan(ScanProgress {
                stage,
                message: message.to_string(),
                fraction,
                hosts_found,
                elapsed_secs,
            }),
        );
    }

    fn add_host(&self, host: DiscoveredHost, generation: u64) {
        let added = self
            .update(generation, |state| merge_host(&mut state.published.hosts, host.clone()))
            .unwrap_or(false);
        if added {
            tracing::info!("Found {} on port {} via {}", host.host, host.port, host.source);
            diagnostics::emit(&self.sink, Diagnostic::HostDiscovered(host));
        }
    }

    fn known_hosts(&self) -> HashSet<Ipv4Addr> {
        read(&self.state)
            .published
            .hosts
            .iter()
            .map(|h| h.host)
            .collect()
    }

    /// Close the session with a final status.
    fn finish(&self, stage: ScanStage, message: &str, generation: u64) {
        let applied = self.update(generation, |state| {
            state.stage = Some(stage);
            state.published.status = message.to_string();
            if stage == ScanStage::Complete {
                state.published.progress = 1.0;
            }
            state.published.is_scanning = false;
            state.published.progress
        });
        if let Some(fraction) = applied {
            tracing::info!("[Scan] {}", message);
            self.emit_progress(stage, message, fraction);
            diagnostics::emit(&self.sink, Diagnostic::Status(message.to_string()));
        }
    }
}

/// Insert `host` unless its address is already listed. First source wins.
fn merge_host(hosts: &mut Vec<DiscoveredHost>, host: DiscoveredHost) -> bool {
    if hosts.iter().any(|h| h.host == host.host) {
        return false;
    }
    hosts.push(host);
    true
}

async fn run_scan(inner: Arc<Inner>, generation: u64, cancel: CancellationToken) {
    let configured = inner.config.subnet;
    let subnet = async move {
        match configured {
            Some(base) => Ok(base),
            None => local_subnet().await,
        }
    };
    run_phases(inner, generation, cancel, subnet).await;
}

/// Both phases of a session. `subnet` is only awaited once WS-Discovery is
/// done; when it fails the sweep is skipped and the session still completes
/// with whatever discovery found.
async fn run_phases(
    inner: Arc<Inner>,
    generation: u64,
    cancel: CancellationToken,
    subnet: impl Future<Output = Result<SubnetBase>>,
) {
    let config = &inner.config;

    // Phase 1: WS-Discovery
    if config.ws_discovery {
        inner.publish(ScanStage::WsDiscovery, "ONVIF Discovery...", 0.0, generation);
        let mut responses = inner.discovery.discover(cancel.clone());
        while let Some(response) = responses.next().await {
            inner.add_host(
                DiscoveredHost {
                    host: response.ip,
                    port: config.port,
                    source: DiscoverySource::WsDiscovery,
                    display_name: response.name,
                },
                generation,
            );
        }
    }
    if cancel.is_cancelled() {
        return;
    }
    inner.advance(DISCOVERY_SHARE, generation);

    // Phase 2: port sweep of the local /24
    match subnet.await {
        Ok(base) => sweep_subnet(&inner, base, generation, &cancel).await,
        Err(e) => {
            tracing::warn!("Port scan skipped: {}", e);
            inner.publish(
                ScanStage::PortScan,
                "Could not determine local network",
                DISCOVERY_SHARE,
                generation,
            );
        }
    }
    if cancel.is_cancelled() {
        return;
    }

    let found = read(&inner.state).published.hosts.len();
    let message = if found == 0 {
        "No cameras found".to_string()
    } else {
        format!("Found {} camera(s)", found)
    };
    inner.finish(ScanStage::Complete, &message, generation);
}

async fn sweep_subnet(
    inner: &Inner,
    base: SubnetBase,
    generation: u64,
    cancel: &CancellationToken,
) {
    let config = &inner.config;
    inner.publish(
        ScanStage::PortScan,
        "Scanning RTSP ports...",
        DISCOVERY_SHARE,
        generation,
    );
    tracing::debug!("Sweeping {}.1-254 port {}", base, config.port);

    let scanner = PortScanner::new(config.port)
        .with_concurrency(config.concurrency)
        .with_timeout(config.connect_timeout);
    let mut probes = scanner.scan(base, inner.known_hosts(), cancel.clone());
    while let Some(probe) = probes.next().await {
        if probe.open {
            inner.add_host(
                DiscoveredHost {
                    host: probe.ip,
                    port: config.port,
                    source: DiscoverySource::PortScan,
                    display_name: None,
                },
                generation,
            );
        }
        inner.advance(
            DISCOVERY_SHARE + (1.0 - DISCOVERY_SHARE) * probe.fraction(),
            generation,
        );
    }
}

// Poisoning only happens if a holder panicked; the data is plain values
// and stays usable.
fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::{TcpListener, UdpSocket};

    async fn listener_pair() -> (TcpListener, TcpListener, u16) {
        for _ in 0..20 {
            let first = TcpListener::bind("127.0.0.10:0").await.unwrap();
            let port = first.local_addr().unwrap().port();
            if let Ok(second) = TcpListener::bind(("127.0.0.20", port)).await {
                return (first, second, port);
            }
        }
        panic!("could not bind loopback listeners");
    }

    fn loopback_config(port: u16) -> ScanConfig {
        ScanConfig {
            port,
            concurrency: 64,
            connect_timeout: Duration::from_millis(300),
            discovery_timeout: Duration::from_millis(300),
            ws_discovery: false,
            subnet: Some(SubnetBase::new(127, 0, 0)),
        }
    }

    fn host(last: u8, source: DiscoverySource) -> DiscoveredHost {
        DiscoveredHost {
            host: Ipv4Addr::new(192, 168, 1, last),
            port: 554,
            source,
            display_name: None,
        }
    }

    #[test]
    fn test_merge_keeps_first_source() {
        let mut hosts = Vec::new();
        assert!(merge_host(&mut hosts, host(5, DiscoverySource::WsDiscovery)));
        assert!(!merge_host(&mut hosts, host(5, DiscoverySource::PortScan)));
        assert!(merge_host(&mut hosts, host(6, DiscoverySource::PortScan)));

        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].source, DiscoverySource::WsDiscovery);
    }

    #[tokio::test]
    async fn test_scan_reports_open_hosts() {
        let (_a, _b, port) = listener_pair().await;
        let (sink, events) = diagnostics::collecting();
        let scanner = NetworkScanner::new(loopback_config(port)).with_diagnostics(sink);

        let mut hosts: Vec<Ipv4Addr> = scanner.scan().await.into_iter().map(|h| h.host).collect();
        hosts.sort();

        assert_eq!(hosts, vec![Ipv4Addr::new(127, 0, 0, 10), Ipv4Addr::new(127, 0, 0, 20)]);
        assert!(!scanner.is_scanning());
        assert_eq!(scanner.progress(), 1.0);
        assert_eq!(scanner.status_message(), "Found 2 camera(s)");

        let fractions: Vec<f64> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Diagnostic::Scan(p) => Some(p.fraction),
                _ => None,
            })
            .collect();
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(fractions.last().copied(), Some(1.0));
    }

    #[tokio::test]
    async fn test_no_cameras_found() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut config = loopback_config(port);
        config.subnet = Some(SubnetBase::new(127, 0, 1));
        let scanner = NetworkScanner::new(config);
        assert!(scanner.scan().await.is_empty());
        assert_eq!(scanner.status_message(), "No cameras found");
    }

    #[tokio::test]
    async fn test_start_while_running_is_noop() {
        let (_a, _b, port) = listener_pair().await;
        let scanner = NetworkScanner::new(loopback_config(port));

        assert!(scanner.start_scan());
        assert!(!scanner.start_scan());
        scanner.wait().await;
        assert_eq!(scanner.discovered_hosts().len(), 2);
    }

    #[tokio::test]
    async fn test_stop_scan_is_idempotent_and_freezes_hosts() {
        let (_a, _b, port) = listener_pair().await;
        let (sink, events) = diagnostics::collecting();
        let scanner = NetworkScanner::new(loopback_config(port)).with_diagnostics(sink);

        assert!(scanner.start_scan());
        scanner.stop_scan();
        scanner.stop_scan();
        let frozen = scanner.discovered_hosts().len();
        scanner.wait().await;

        assert!(!scanner.is_scanning());
        assert_eq!(scanner.status_message(), "Scan cancelled");
        assert_eq!(scanner.discovered_hosts().len(), frozen);

        let cancelled = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, Diagnostic::Status(s) if s == "Scan cancelled"))
            .count();
        assert_eq!(cancelled, 1);

        // a fresh scan can start afterwards
        assert!(scanner.start_scan());
        scanner.wait().await;
        assert_eq!(scanner.discovered_hosts().len(), 2);
    }

    #[tokio::test]
    async fn test_host_found_by_both_phases_listed_once() {
        let (_a, _b, port) = listener_pair().await;

        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target: SocketAddr = device.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            let (_, from) = device.recv_from(&mut buf).await.unwrap();
            let reply = "<Envelope><XAddrs>http://127.0.0.10/onvif/device_service</XAddrs>\
                         <Scopes>onvif://www.onvif.org/name/Porch</Scopes></Envelope>";
            device.send_to(reply.as_bytes(), from).await.unwrap();
        });

        let mut config = loopback_config(port);
        config.ws_discovery = true;
        let client = WsDiscoveryClient::new(Duration::from_millis(300)).with_target(target);
        let scanner = NetworkScanner::new(config).with_discovery_client(client);

        let hosts = scanner.scan().await;
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].host, Ipv4Addr::new(127, 0, 0, 10));
        assert_eq!(hosts[0].source, DiscoverySource::WsDiscovery);
        assert_eq!(hosts[0].display_name.as_deref(), Some("Porch"));
        assert_eq!(hosts[1].host, Ipv4Addr::new(127, 0, 0, 20));
        assert_eq!(hosts[1].source, DiscoverySource::PortScan);
    }

    async fn spawn_onvif_device(xaddr_ip: &str) -> SocketAddr {
        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = device.local_addr().unwrap();
        let reply = format!(
            "<Envelope><XAddrs>http://{}/onvif/device_service</XAddrs></Envelope>",
            xaddr_ip
        );
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            let (_, from) = device.recv_from(&mut buf).await.unwrap();
            device.send_to(reply.as_bytes(), from).await.unwrap();
        });
        target
    }

    #[tokio::test]
    async fn test_unknown_subnet_skips_sweep_but_completes() {
        let target = spawn_onvif_device("192.168.1.64").await;
        let (sink, events) = diagnostics::collecting();

        let mut config = loopback_config(554);
        config.ws_discovery = true;
        config.subnet = None;
        let client = WsDiscoveryClient::new(Duration::from_millis(300)).with_target(target);
        let scanner = NetworkScanner::new(config)
            .with_discovery_client(client)
            .with_diagnostics(sink);

        let generation = scanner.inner.begin().unwrap();
        let no_network = async { Err::<SubnetBase, _>(Error::Configuration("no local network".to_string())) };
        run_phases(
            Arc::clone(&scanner.inner),
            generation,
            CancellationToken::new(),
            no_network,
        )
        .await;

        assert!(!scanner.is_scanning());
        assert_eq!(scanner.progress(), 1.0);
        assert_eq!(scanner.status_message(), "Found 1 camera(s)");
        let hosts = scanner.discovered_hosts();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].host, Ipv4Addr::new(192, 168, 1, 64));
        assert_eq!(hosts[0].source, DiscoverySource::WsDiscovery);

        let statuses: Vec<String> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Diagnostic::Status(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        assert!(statuses.iter().any(|s| s == "Could not determine local network"));
        assert_eq!(statuses.last().map(String::as_str), Some("Found 1 camera(s)"));
    }

    #[tokio::test]
    async fn test_unknown_subnet_without_discovery_reports_none_found() {
        let mut config = loopback_config(554);
        config.subnet = None;
        let scanner = NetworkScanner::new(config);

        let generation = scanner.inner.begin().unwrap();
        let no_network = async { Err::<SubnetBase, _>(Error::Configuration("no local network".to_string())) };
        run_phases(
            Arc::clone(&scanner.inner),
            generation,
            CancellationToken::new(),
            no_network,
        )
        .await;

        assert!(!scanner.is_scanning());
        assert_eq!(scanner.progress(), 1.0);
        assert_eq!(scanner.status_message(), "No cameras found");
        assert!(scanner.discovered_hosts().is_empty());
    }

    #[tokio::test]
    async fn test_stop_mid_sweep_halts_within_one_connect_timeout() {
        let connect_timeout = Duration::from_millis(300);
        // 10.255.255.0/24 is normally unrouted, so connects hang until the timeout.
        let config = ScanConfig {
            port: 554,
            concurrency: 30,
            connect_timeout,
            discovery_timeout: connect_timeout,
            ws_discovery: false,
            subnet: Some(SubnetBase::new(10, 255, 255)),
        };
        let scanner = NetworkScanner::new(config);

        assert!(scanner.start_scan());
        tokio::time::sleep(connect_timeout + connect_timeout / 2).await;
        scanner.stop_scan();
        let hosts = scanner.discovered_hosts();
        let progress = scanner.progress();

        let stopped = Instant::now();
        tokio::time::timeout(connect_timeout + Duration::from_millis(200), scanner.wait())
            .await
            .expect("scan task still running after one connect timeout");
        assert!(stopped.elapsed() <= connect_timeout + Duration::from_millis(200));
        assert!(!scanner.is_scanning());

        tokio::time::sleep(connect_timeout).await;
        assert_eq!(scanner.discovered_hosts(), hosts);
        assert_eq!(scanner.progress(), progress);
    }
}
