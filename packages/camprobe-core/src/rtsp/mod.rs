//! RTSP path and credential probing.
//!
//! For each dictionary path the prober sends an unauthenticated DESCRIBE.
//! A 200 ends the session. A 404 or 400 drops the path for good. A 401
//! starts challenge-response, either with the caller's credentials or by
//! walking the factory-default credential list. Every classification lands
//! in the attempt log in the order it happened.
//!
//! Paths are probed strictly one after another and every request uses a
//! fresh connection, since low-power firmware often closes the socket after
//! sending a challenge.

pub mod dictionary;
pub mod message;

use crate::auth::{Challenge, Credential};
use crate::config::RtspConfig;
use crate::diagnostics::{self, Diagnostic, DiagnosticsSink};
use crate::error::{Error, Result};
use crate::net;
use message::{Method, Request, Response, request_url};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// How one request was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthState {
    Ok,
    AuthRequired,
    WrongCredentials,
    Failed,
}

/// One entry of the attempt log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeAttempt {
    pub path: String,
    /// Username sent with the request, if any
    pub username: Option<String>,
    pub succeeded: bool,
    pub auth_state: AuthState,
}

/// A working path and the credentials it accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub path: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// How a probe session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Found(ProbeResult),
    NotFound,
    Cancelled,
    /// Another probe was already running on this prober
    Busy,
}

#[derive(Debug, Default)]
struct ProbeState {
    is_probing: bool,
    progress: f64,
    status: String,
    attempts: Vec<ProbeAttempt>,
    found: Option<ProbeResult>,
    cancel: Option<CancellationToken>,
    generation: u64,
}

enum PathOutcome {
    Found(ProbeResult),
    Next,
    Cancelled,
}

/// Finds a working RTSP path (and credentials) on one camera.
///
/// Single-flight per instance; clones share state so one clone can
/// `stop()` a probe another clone is running.
#[derive(Clone)]
pub struct RtspProber {
    config: Arc<RtspConfig>,
    sink: Option<DiagnosticsSink>,
    state: Arc<Mutex<ProbeState>>,
}

impl RtspProber {
    pub fn new(config: RtspConfig) -> Self {
        Self {
            config: Arc::new(config),
            sink: None,
            state: Arc::new(Mutex::new(ProbeState::default())),
        }
    }

    pub fn with_diagnostics(mut self, sink: DiagnosticsSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Probe `host:port` until a path answers 200, the dictionary runs out
    /// or `stop()` is called.
    ///
    /// With `credentials` set, only those are offered when a path asks for
    /// authentication; otherwise the configured credential dictionary is
    /// tried in order.
    pub async fn probe(&self, host: &str, port: u16, credentials: Option<Credential>) -> ProbeOutcome {
        let (cancel, generation) = {
            let mut state = self.lock();
            if state.is_probing {
                tracing::debug!("Probe already running, ignoring request for {}", host);
                return ProbeOutcome::Busy;
            }
            let cancel = CancellationToken::new();
            state.generation += 1;
            state.is_probing = true;
            state.progress = 0.0;
            state.attempts.clear();
            state.found = None;
            state.cancel = Some(cancel.clone());
            (cancel, state.generation)
        };
        let session = Session {
            prober: self,
            generation,
        };
        session.set_status("Probing RTSP paths...", 0.0);

        let addr = match resolve(host, port).await {
            Ok(addr) => addr,
            Err(e) => {
                tracing::warn!("Cannot probe {}: {}", host, e);
                session.finish(&format!("Could not resolve {}", host), None);
                return ProbeOutcome::NotFound;
            }
        };
        tracing::info!("Probing RTSP paths on {} ({})", host, addr);

        let paths = &self.config.paths;
        let total = paths.len().max(1);
        for (index, path) in paths.iter().enumerate() {
            if cancel.is_cancelled() {
                return ProbeOutcome::Cancelled;
            }
            session.set_status(&format!("Trying {}...", path), index as f64 / total as f64);

            let url = request_url(host, port, path);
            match session
                .try_path(addr, &url, path, credentials.as_ref(), &cancel)
                .await
            {
                PathOutcome::Found(result) => {
                    tracing::info!("Found working path {} on {}", result.path, host);
                    session.finish(&format!("Found: {}", result.path), Some(result.clone()));
                    return ProbeOutcome::Found(result);
                }
                PathOutcome::Cancelled => return ProbeOutcome::Cancelled,
                PathOutcome::Next => {}
            }
        }

        if cancel.is_cancelled() {
            return ProbeOutcome::Cancelled;
        }
        let rejected = credentials.is_some()
            && self
                .attempts()
                .iter()
                .any(|a| a.auth_state == AuthState::WrongCredentials);
        let message = if rejected {
            Error::Authentication.to_string()
        } else {
            "No working path found".to_string()
        };
        tracing::info!("No working RTSP path on {}", host);
        session.finish(&message, None);
        ProbeOutcome::NotFound
    }

    /// Cancel the running probe. The attempt in flight finishes or times out
    /// first; no further requests are sent.
    pub fn stop(&self) {
        let mut state = self.lock();
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }
        if !state.is_probing {
            return;
        }
        state.generation += 1;
        state.is_probing = false;
        state.status = "Probe cancelled".to_string();
        drop(state);

        tracing::info!("Probe cancelled");
        diagnostics::emit(&self.sink, Diagnostic::Status("Probe cancelled".to_string()));
    }

    /// Send OPTIONS to the server root to check an RTSP service answers.
    pub async fn check_service(&self, host: &str, port: u16) -> Result<Response> {
        let addr = resolve(host, port).await?;
        let request = Request::new(
            Method::Options,
            request_url(host, port, "/"),
            1,
            self.config.user_agent.clone(),
        );
        let head = net::exchange(addr, &request.encode(), self.config.timeout).await?;
        Response::parse(&head)
    }

    pub fn is_probing(&self) -> bool {
        self.lock().is_probing
    }

    /// Paths tried so far over the dictionary size
    pub fn progress(&self) -> f64 {
        self.lock().progress
    }

    pub fn status_message(&self) -> String {
        self.lock().status.clone()
    }

    pub fn attempts(&self) -> Vec<ProbeAttempt> {
        self.lock().attempts.clone()
    }

    pub fn found(&self) -> Option<ProbeResult> {
        self.lock().found.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One probe run; state writes from a stopped run are dropped.
struct Session<'a> {
    prober: &'a RtspProber,
    generation: u64,
}

impl Session<'_> {
    fn update(&self, apply: impl FnOnce(&mut ProbeState)) -> bool {
        let mut state = self.prober.lock();
        if state.generation != self.generation || !state.is_probing {
            return false;
        }
        apply(&mut state);
        true
    }

    fn set_status(&self, message: &str, progress: f64) {
        let applied = self.update(|state| {
            state.status = message.to_string();
            state.progress = state.progress.max(progress);
        });
        if applied {
            diagnostics::emit(&self.prober.sink, Diagnostic::Status(message.to_string()));
        }
    }

    fn record(&self, path: &str, credential: Option<&Credential>, auth_state: AuthState) {
        let attempt = ProbeAttempt {
            path: path.to_string(),
            username: credential.map(|c| c.username.clone()),
            succeeded: auth_state == AuthState::Ok,
            auth_state,
        };
        tracing::debug!(
            "{} as {:?}: {:?}",
            attempt.path,
            attempt.username,
            attempt.auth_state
        );
        let entry = attempt.clone();
        if self.update(|state| state.attempts.push(entry)) {
            diagnostics::emit(&self.prober.sink, Diagnostic::Probe(attempt));
        }
    }

    fn finish(&self, message: &str, found: Option<ProbeResult>) {
        let applied = self.update(|state| {
            state.status = message.to_string();
            state.progress = 1.0;
            state.found = found;
            state.is_probing = false;
            state.cancel = None;
        });
        if applied {
            diagnostics::emit(&self.prober.sink, Diagnostic::Status(message.to_string()));
        }
    }

    async fn describe(
        &self,
        addr: SocketAddr,
        url: &str,
        cseq: u32,
        authorization: Option<String>,
    ) -> Result<Response> {
        let config = &self.prober.config;
        let mut request = Request::new(Method::Describe, url, cseq, config.user_agent.clone());
        if let Some(value) = authorization {
            request = request.with_authorization(value);
        }
        let head = net::exchange(addr, &request.encode(), config.timeout).await?;
        Response::parse(&head)
    }

    async fn try_path(
        &self,
        addr: SocketAddr,
        url: &str,
        path: &str,
        supplied: Option<&Credential>,
        cancel: &CancellationToken,
    ) -> PathOutcome {
        let response = match self.describe(addr, url, 1, None).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("DESCRIBE {} failed: {}", url, e);
                self.record(path, None, AuthState::Failed);
                return PathOutcome::Next;
            }
        };

        match response.status {
            200 => {
                self.record(path, None, AuthState::Ok);
                return PathOutcome::Found(ProbeResult {
                    path: path.to_string(),
                    username: supplied.map(|c| c.username.clone()),
                    password: supplied.map(|c| c.password.clone()),
                });
            }
            401 => self.record(path, None, AuthState::AuthRequired),
            status => {
                tracing::debug!("DESCRIBE {} answered {}", url, status);
                self.record(path, None, AuthState::Failed);
                return PathOutcome::Next;
            }
        }

        let mut challenge = match Challenge::select(response.challenges()) {
            Ok(challenge) => challenge,
            Err(e) => {
                tracing::debug!("Unusable challenge from {}: {}", url, e);
                self.record(path, None, AuthState::Failed);
                return PathOutcome::Next;
            }
        };

        let candidates: Vec<Credential> = match supplied {
            Some(credential) => vec![credential.clone()],
            None => self.prober.config.credentials.clone(),
        };

        for (n, credential) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                return PathOutcome::Cancelled;
            }
            let authorization = challenge.authorization(
                &credential.username,
                &credential.password,
                Method::Describe.as_str(),
                url,
            );
            let cseq = n as u32 + 2;
            match self.describe(addr, url, cseq, Some(authorization)).await {
                Ok(r) if r.status == 200 => {
                    self.record(path, Some(credential), AuthState::Ok);
                    return PathOutcome::Found(ProbeResult {
                        path: path.to_string(),
                        username: Some(credential.username.clone()),
                        password: Some(credential.password.clone()),
                    });
                }
                Ok(r) if r.status == 401 => {
                    self.record(path, Some(credential), AuthState::WrongCredentials);
                    // The next try must answer the newest nonce.
                    if let Ok(fresh) = Challenge::select(r.challenges()) {
                        challenge = fresh;
                    }
                }
                Ok(r) => {
                    tracing::debug!("Authenticated DESCRIBE {} answered {}", url, r.status);
                    self.record(path, Some(credential), AuthState::Failed);
                    return PathOutcome::Next;
                }
                Err(e) => {
                    tracing::debug!("Authenticated DESCRIBE {} failed: {}", url, e);
                    self.record(path, Some(credential), AuthState::Failed);
                    return PathOutcome::Next;
                }
            }
        }
        PathOutcome::Next
    }
}

impl Drop for Session<'_> {
    // A probe future dropped mid-run must not leave the prober busy.
    fn drop(&mut self) {
        self.update(|state| {
            state.status = "Probe cancelled".to_string();
            state.is_probing = false;
            state.cancel = None;
        });
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    crate::camera::validate_host(host)?;
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::Configuration(format!("invalid host {}: {}", host, e)))?;
    addrs
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| Error::Configuration(format!("no IPv4 address for {}", host)))
}
