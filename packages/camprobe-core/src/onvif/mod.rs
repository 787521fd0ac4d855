//! ONVIF PTZ control over SOAP with WS-Security.
//!
//! Each command is one HTTP POST carrying a fresh UsernameToken. Only the
//! HTTP status is inspected; SOAP fault bodies are not parsed and nothing
//! is retried here.

pub mod ptz;

pub use ptz::{DEFAULT_PAN_TILT_SPEED, DEFAULT_ZOOM_SPEED, PtzCommand, clamp_speed};

use crate::auth::{Credential, ws_security_header};
use crate::config::OnvifConfig;
use crate::error::{Error, Result};
use reqwest::Client;

/// Sends PTZ commands to one camera's ONVIF PTZ service.
#[derive(Debug, Clone)]
pub struct OnvifPtzClient {
    endpoint: String,
    credential: Credential,
    profile_token: String,
    client: Client,
}

impl OnvifPtzClient {
    /// Client for `http://host:port/onvif/PTZ` with default settings.
    pub fn new(host: &str, port: u16, credential: Credential) -> Result<Self> {
        Self::with_config(host, port, credential, &OnvifConfig::default())
    }

    pub fn with_config(
        host: &str,
        port: u16,
        credential: Credential,
        config: &OnvifConfig,
    ) -> Result<Self> {
        crate::camera::validate_host(host)?;
        crate::camera::validate_port(port)?;
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            endpoint: format!("http://{}:{}/onvif/PTZ", host, port),
            credential,
            profile_token: config.profile_token.clone(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn profile_token(&self) -> &str {
        &self.profile_token
    }

    /// Start moving at the given velocities, each clamped to [-1, 1].
    pub async fn continuous_move(&self, pan: f32, tilt: f32, zoom: f32) -> Result<()> {
        self.send(&PtzCommand::continuous_move(pan, tilt, zoom))
            .await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(&PtzCommand::Stop).await
    }

    pub async fn goto_preset(&self, token: &str) -> Result<()> {
        self.send(&PtzCommand::goto_preset(token)).await
    }

    /// POST one command. Non-2xx answers become `Error::CommandFailed`.
    pub async fn send(&self, command: &PtzCommand) -> Result<()> {
        let body = ptz::envelope(
            &ws_security_header(&self.credential.username, &self.credential.password),
            &command.body_xml(&self.profile_token),
        );
        let content_type = format!(
            "application/soap+xml; charset=utf-8; action=\"{}\"",
            command.action()
        );

        tracing::debug!("PTZ {} -> {}", command.operation(), self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                "PTZ {} on {} failed with status {}",
                command.operation(),
                self.endpoint,
                status
            );
            return Err(Error::CommandFailed {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Loopback HTTP endpoint answering every request with `status`.
    /// `None` accepts and never answers.
    async fn spawn_endpoint(status: Option<u16>) -> (u16, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let request = read_request(&mut socket).await;
                    log.lock().unwrap().push(request);
                    match status {
                        Some(code) => {
                            let reply = format!(
                                "HTTP/1.1 {} Status\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                                code
                            );
                            let _ = socket.write_all(reply.as_bytes()).await;
                        }
                        None => tokio::time::sleep(Duration::from_secs(10)).await,
                    }
                });
            }
        });
        (port, requests)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn client(port: u16, timeout: Duration) -> OnvifPtzClient {
        let config = OnvifConfig {
            timeout,
            ..OnvifConfig::default()
        };
        OnvifPtzClient::with_config("127.0.0.1", port, Credential::new("admin", "pw"), &config)
            .unwrap()
    }

    #[tokio::test]
    async fn test_server_error_is_command_failed() {
        let (port, _) = spawn_endpoint(Some(500)).await;
        let result = client(port, Duration::from_secs(5))
            .continuous_move(0.5, -0.3, 0.0)
            .await;
        assert!(matches!(result, Err(Error::CommandFailed { status: 500 })));
    }

    #[tokio::test]
    async fn test_failure_does_not_affect_other_commands() {
        let (bad, _) = spawn_endpoint(Some(500)).await;
        let (good, _) = spawn_endpoint(Some(200)).await;
        let failing = client(bad, Duration::from_secs(5));
        let working = client(good, Duration::from_secs(5));

        let (a, b) = tokio::join!(failing.continuous_move(0.5, -0.3, 0.0), working.stop());
        assert!(matches!(a, Err(Error::CommandFailed { status: 500 })));
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_request_shape() {
        let (port, requests) = spawn_endpoint(Some(200)).await;
        let ptz = client(port, Duration::from_secs(5));
        ptz.continuous_move(1.5, -2.0, 0.3).await.unwrap();

        let requests = requests.lock().unwrap();
        let request = &requests[0];
        assert!(request.starts_with("POST /onvif/PTZ HTTP/1.1"));
        assert!(request.contains(
            "action=\"http://www.onvif.org/ver20/ptz/wsdl/ContinuousMove\""
        ));
        assert!(request.contains("<Username>admin</Username>"));
        assert!(request.contains("#PasswordDigest"));
        assert!(request.contains("<tptz:ProfileToken>Profile_1</tptz:ProfileToken>"));
        assert!(request.contains(r#"x="1" y="-1""#));
        assert!(!request.contains(">pw<"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = client(port, Duration::from_secs(5)).stop().await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_silent_endpoint_times_out() {
        let (port, _) = spawn_endpoint(None).await;
        let result = client(port, Duration::from_millis(200))
            .goto_preset("1")
            .await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[test]
    fn test_rejects_invalid_host() {
        let result = OnvifPtzClient::new("not a host", 80, Credential::new("a", "b"));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
