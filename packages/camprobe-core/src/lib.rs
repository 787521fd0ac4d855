//! camprobe core library
//!
//! Finds unmanaged IP cameras on the local network and works out how to talk
//! to them:
//! - Discovery (ONVIF WS-Discovery multicast, then a TCP sweep of the /24)
//! - RTSP path probing with Digest/Basic challenge-response
//! - ONVIF PTZ commands authenticated with WS-Security UsernameToken
//!
//! Library code logs through `tracing` and never installs a subscriber.
//! Scanner and prober sessions also accept a [`DiagnosticsSink`] for
//! structured progress.
//!
//! # Example
//!
//! ```no_run
//! use camprobe_core::{NetworkScanner, ProbeOutcome, RtspProber, load_config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = load_config();
//!
//!     let scanner = NetworkScanner::new(config.scan.clone());
//!     let hosts = scanner.scan().await;
//!     println!("{}", scanner.status_message());
//!
//!     let prober = RtspProber::new(config.rtsp.clone());
//!     for host in hosts {
//!         let ip = host.host.to_string();
//!         if let ProbeOutcome::Found(result) = prober.probe(&ip, host.port, None).await {
//!             println!("{} -> {}", ip, result.path);
//!         }
//!     }
//! }
//! ```

pub mod auth;
pub mod camera;
pub mod config;
pub mod diagnostics;
pub mod discovery;
pub mod error;
pub mod net;
pub mod onvif;
pub mod rtsp;

// Re-export commonly used types
pub use auth::{Challenge, Credential, DigestChallenge};
pub use camera::{Camera, CameraStore, JsonCameraStore, PtzCapability, StreamTarget};
pub use config::{Config, ConfigSource, load_config};
pub use diagnostics::{Diagnostic, DiagnosticsSink};
pub use discovery::{
    DiscoveredHost, DiscoverySource, NetworkScanner, ScanProgress, ScanSnapshot, ScanStage,
    SubnetBase,
};
pub use error::{Error, Result};
pub use onvif::{OnvifPtzClient, PtzCommand};
pub use rtsp::{AuthState, ProbeAttempt, ProbeOutcome, ProbeResult, RtspProber};
